//! Capability resolution: capability set in, backend factory and version out.
//!
//! Resolution is a pure function of the capabilities and the registry. The
//! only side effects are log lines; the same notices are also returned on
//! [`ResolvedDriver`] so callers can surface or assert on them.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};
use umbra_protocol::Capabilities;

use crate::driver::DriverFactory;
use crate::error::{Error, ResolutionFailure, Result};
use crate::registry::{DriverDescriptor, DriverRegistry, Lookup, Platform, automation};

const BANNER_WIDTH: usize = 70;

const ANDROID_DEFAULT_NOTICE: &[&str] = &[
	"The 'automationName' capability was not provided in the desired capabilities for this Android session",
	"Setting 'automationName=UiAutomator2' by default and using the UiAutomator2 Driver",
	"The next major version will **require** the 'automationName' capability to be set for all sessions on all platforms",
	"In previous versions the default was 'automationName=UiAutomator1'",
	"If you wish to use that automation instead of UiAutomator2, please add 'automationName=UiAutomator1' to your desired capabilities",
	"Each automation engine is a separately installed driver; run `umbra drivers` to list the engines this server knows about",
];

const IOS_DEFAULT_NOTICE: &str = "DeprecationWarning: 'automationName' capability was not provided. \
	 Future versions will require 'automationName' capability to be set for iOS sessions.";

static VERSION_PREFIX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").unwrap());

/// Message emitted while resolving a capability set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionNotice {
	/// Default-engine selection the client should stop relying on.
	Deprecation(String),
	Info(String),
}

impl ResolutionNotice {
	pub fn is_deprecation(&self) -> bool {
		matches!(self, ResolutionNotice::Deprecation(_))
	}

	pub fn message(&self) -> &str {
		match self {
			ResolutionNotice::Deprecation(msg) | ResolutionNotice::Info(msg) => msg,
		}
	}
}

/// Backend selected for a capability set.
#[derive(Clone)]
pub struct ResolvedDriver {
	pub descriptor: DriverDescriptor,
	pub factory: Arc<dyn DriverFactory>,
	/// Best-effort implementation version.
	pub version: Option<String>,
	pub notices: Vec<ResolutionNotice>,
}

impl std::fmt::Debug for ResolvedDriver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResolvedDriver")
			.field("descriptor", &self.descriptor)
			.field("version", &self.version)
			.field("notices", &self.notices)
			.finish()
	}
}

impl ResolvedDriver {
	pub fn driver_name(&self) -> &str {
		&self.descriptor.driver_name
	}
}

/// Picks the backend for `caps`.
///
/// `platformName` is mandatory. `automationName` is optional; when absent or
/// the `Appium` placeholder, a platform default is chosen.
pub fn resolve_driver(caps: &Capabilities, registry: &DriverRegistry) -> Result<ResolvedDriver> {
	let platform_name = caps
		.platform_name
		.as_deref()
		.filter(|name| !name.is_empty())
		.ok_or_else(|| Error::MissingCapability("You must include a platformName capability".into()))?;
	let platform = Platform::parse(platform_name).ok_or_else(|| {
		Error::MissingCapability(format!(
			"platformName '{platform_name}' is not supported; expected one of: {}",
			Platform::ALL.map(Platform::as_str).join(", ")
		))
	})?;

	let mut notices = Vec::new();
	let automation_name = match caps.automation_name.as_deref() {
		Some(name) if !name.eq_ignore_ascii_case(automation::APPIUM) => name.to_string(),
		_ => default_automation_name(platform, caps.platform_version.as_deref(), &mut notices).to_string(),
	};

	for notice in &notices {
		match notice {
			ResolutionNotice::Deprecation(msg) => warn!(target: "umbra.resolve", "{msg}"),
			ResolutionNotice::Info(msg) => info!(target: "umbra.resolve", "{msg}"),
		}
	}

	let failure = match registry.lookup(&automation_name) {
		Lookup::Loaded(descriptor, factory) => {
			let version = factory.version();
			if version.is_none() {
				warn!(target: "umbra.resolve", driver = %descriptor.driver_name, "Unable to get version of driver '{}'", descriptor.driver_name);
			}
			debug!(target: "umbra.resolve", automation = %automation_name, driver = %descriptor.driver_name, "resolved driver");
			return Ok(ResolvedDriver {
				descriptor: descriptor.clone(),
				factory,
				version,
				notices,
			});
		}
		Lookup::Unloadable(descriptor) => {
			debug!(
				target: "umbra.resolve",
				driver = %descriptor.driver_name,
				package = %descriptor.package,
				"no implementation registered"
			);
			ResolutionFailure::Load
		}
		Lookup::Missing => ResolutionFailure::Find,
	};

	let msg = match caps.automation_name.as_deref() {
		Some(requested) => format!(
			"Could not {} a driver for automationName '{requested}' and platformName '{platform_name}'",
			failure.verb()
		),
		None => format!("Could not {} a driver for platformName '{platform_name}'", failure.verb()),
	};
	Err(Error::driver_resolution(failure, format!("{msg}. {}", failure.suggestion())))
}

fn default_automation_name(
	platform: Platform,
	platform_version: Option<&str>,
	notices: &mut Vec<ResolutionNotice>,
) -> &'static str {
	match platform {
		Platform::Fake => automation::FAKE,
		Platform::Android => {
			notices.push(ResolutionNotice::Deprecation(android_deprecation_banner()));
			automation::UIAUTOMATOR2
		}
		Platform::Ios => {
			notices.push(ResolutionNotice::Deprecation(IOS_DEFAULT_NOTICE.to_string()));
			if platform_version.and_then(coerce_version).is_some_and(|v| v >= (10, 0, 0)) {
				notices.push(ResolutionNotice::Info(format!(
					"Requested iOS support with version >= 10, using '{}' driver instead of \
					 UIAutomation-based driver, since the latter is unsupported on iOS 10 and up.",
					automation::XCUITEST
				)));
				automation::XCUITEST
			} else {
				automation::INSTRUMENTS
			}
		}
		Platform::Tvos => automation::XCUITEST,
		Platform::Windows => automation::WINDOWS,
		Platform::Mac => automation::MAC,
		Platform::Tizen => automation::TIZEN,
	}
}

/// Loosely parses the first `major[.minor[.patch]]` run in `raw`.
///
/// Missing components default to zero, so `"9.3"` is `(9, 3, 0)` and
/// `"v12"` is `(12, 0, 0)`.
pub fn coerce_version(raw: &str) -> Option<(u64, u64, u64)> {
	let caps = VERSION_PREFIX.captures(raw)?;
	let part = |i: usize| -> Option<u64> {
		match caps.get(i) {
			Some(m) => m.as_str().parse().ok(),
			None => Some(0),
		}
	};
	Some((part(1)?, part(2)?, part(3)?))
}

/// Multi-line notice logged when an Android session falls back to the default engine.
pub fn android_deprecation_banner() -> String {
	let divider = format!("\n{}\n", "=".repeat(BANNER_WIDTH));
	let mut banner = divider.clone();
	banner.push_str("  DEPRECATION WARNING:\n");
	for line in ANDROID_DEFAULT_NOTICE {
		banner.push('\n');
		banner.push_str(&word_wrap(line, BANNER_WIDTH - 2, "  "));
		banner.push('\n');
	}
	banner.push_str(&divider);
	banner
}

/// Greedy word wrap. Words longer than `width` get a line of their own.
fn word_wrap(text: &str, width: usize, indent: &str) -> String {
	let mut lines: Vec<String> = Vec::new();
	let mut current = String::new();
	for word in text.split_whitespace() {
		if !current.is_empty() && current.len() + 1 + word.len() > width {
			lines.push(std::mem::take(&mut current));
		}
		if !current.is_empty() {
			current.push(' ');
		}
		current.push_str(word);
	}
	if !current.is_empty() {
		lines.push(current);
	}
	lines
		.iter()
		.map(|line| format!("{indent}{line}"))
		.collect::<Vec<_>>()
		.join("\n")
}
