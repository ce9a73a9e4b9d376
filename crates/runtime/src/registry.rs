//! Static driver registry.
//!
//! Maps platform identifiers and automation-engine names to backend
//! descriptors. Implementations are installed by explicit registration of a
//! [`DriverFactory`]; a descriptor without a factory is a known engine that
//! is not available in this build.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::driver::DriverFactory;

/// Canonical automation-engine names.
pub mod automation {
	/// Placeholder meaning "pick the platform default".
	pub const APPIUM: &str = "Appium";
	pub const UIAUTOMATOR2: &str = "UiAutomator2";
	pub const UIAUTOMATOR1: &str = "UiAutomator1";
	pub const XCUITEST: &str = "XCUITest";
	pub const YOUIENGINE: &str = "YouiEngine";
	pub const ESPRESSO: &str = "Espresso";
	pub const TIZEN: &str = "Tizen";
	pub const FAKE: &str = "Fake";
	pub const INSTRUMENTS: &str = "Instruments";
	pub const WINDOWS: &str = "Windows";
	pub const MAC: &str = "Mac";
	pub const MAC2: &str = "Mac2";
	pub const FLUTTER: &str = "Flutter";
	pub const SAFARI: &str = "Safari";
	pub const GECKO: &str = "Gecko";
}

/// Target platform named by the `platformName` capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
	Fake,
	Android,
	Ios,
	Tvos,
	Windows,
	Mac,
	Tizen,
}

impl Platform {
	pub const ALL: [Platform; 7] = [
		Platform::Fake,
		Platform::Android,
		Platform::Ios,
		Platform::Tvos,
		Platform::Windows,
		Platform::Mac,
		Platform::Tizen,
	];

	/// Case-insensitive lookup. `appletvos` is accepted as an alias of `tvos`.
	pub fn parse(name: &str) -> Option<Self> {
		match name.to_ascii_lowercase().as_str() {
			"fake" => Some(Platform::Fake),
			"android" => Some(Platform::Android),
			"ios" => Some(Platform::Ios),
			"tvos" | "appletvos" => Some(Platform::Tvos),
			"windows" => Some(Platform::Windows),
			"mac" => Some(Platform::Mac),
			"tizen" => Some(Platform::Tizen),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Platform::Fake => "fake",
			Platform::Android => "android",
			Platform::Ios => "ios",
			Platform::Tvos => "tvos",
			Platform::Windows => "windows",
			Platform::Mac => "mac",
			Platform::Tizen => "tizen",
		}
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A registered automation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverDescriptor {
	/// Canonical automation name (`automationName` capability value).
	pub automation_name: String,
	/// Display name of the implementation; identifies the driver type.
	pub driver_name: String,
	/// Package the implementation ships in.
	pub package: String,
}

impl DriverDescriptor {
	pub fn new(automation_name: impl Into<String>, driver_name: impl Into<String>, package: impl Into<String>) -> Self {
		Self {
			automation_name: automation_name.into(),
			driver_name: driver_name.into(),
			package: package.into(),
		}
	}
}

const BUILTIN_DRIVERS: &[(&str, &str, &str)] = &[
	(automation::UIAUTOMATOR2, "AndroidUiautomator2Driver", "appium-uiautomator2-driver"),
	(automation::XCUITEST, "XCUITestDriver", "appium-xcuitest-driver"),
	(automation::YOUIENGINE, "YouiEngineDriver", "appium-youiengine-driver"),
	(automation::FAKE, "FakeDriver", "umbra-runtime"),
	(automation::UIAUTOMATOR1, "AndroidDriver", "appium-android-driver"),
	(automation::INSTRUMENTS, "IosDriver", "appium-ios-driver"),
	(automation::WINDOWS, "WindowsDriver", "appium-windows-driver"),
	(automation::MAC, "MacDriver", "appium-mac-driver"),
	(automation::MAC2, "Mac2Driver", "appium-mac2-driver"),
	(automation::ESPRESSO, "EspressoDriver", "appium-espresso-driver"),
	(automation::TIZEN, "TizenDriver", "appium-tizen-driver"),
	(automation::FLUTTER, "FlutterDriver", "appium-flutter-driver"),
	(automation::SAFARI, "SafariDriver", "appium-safari-driver"),
	(automation::GECKO, "GeckoDriver", "appium-geckodriver"),
];

/// Outcome of a registry lookup.
pub enum Lookup<'a> {
	/// No engine with that name.
	Missing,
	/// Known engine without an installed implementation.
	Unloadable(&'a DriverDescriptor),
	Loaded(&'a DriverDescriptor, Arc<dyn DriverFactory>),
}

/// Automation-engine table, immutable once handed to the orchestrator.
#[derive(Clone, Default)]
pub struct DriverRegistry {
	/// Keyed by lower-cased automation name.
	descriptors: HashMap<String, DriverDescriptor>,
	factories: HashMap<String, Arc<dyn DriverFactory>>,
}

impl fmt::Debug for DriverRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut installed: Vec<&str> = self.factories.keys().map(String::as_str).collect();
		installed.sort_unstable();
		f.debug_struct("DriverRegistry")
			.field("descriptors", &self.descriptors.len())
			.field("installed", &installed)
			.finish()
	}
}

impl DriverRegistry {
	/// Registry with no engines at all.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Registry preloaded with the built-in engine table and no implementations.
	pub fn builtin() -> Self {
		BUILTIN_DRIVERS
			.iter()
			.fold(Self::empty(), |registry, (automation_name, driver_name, package)| {
				registry.with_descriptor(DriverDescriptor::new(*automation_name, *driver_name, *package))
			})
	}

	pub fn with_descriptor(mut self, descriptor: DriverDescriptor) -> Self {
		self.descriptors
			.insert(descriptor.automation_name.to_ascii_lowercase(), descriptor);
		self
	}

	/// Installs the implementation for `automation_name`.
	///
	/// Engines missing from the table are added with the factory's driver name.
	pub fn with_factory(mut self, automation_name: &str, factory: Arc<dyn DriverFactory>) -> Self {
		let key = automation_name.to_ascii_lowercase();
		self.descriptors.entry(key.clone()).or_insert_with(|| {
			DriverDescriptor::new(automation_name, factory.driver_name(), factory.driver_name())
		});
		self.factories.insert(key, factory);
		self
	}

	pub fn descriptor(&self, automation_name: &str) -> Option<&DriverDescriptor> {
		self.descriptors.get(&automation_name.to_ascii_lowercase())
	}

	pub fn lookup(&self, automation_name: &str) -> Lookup<'_> {
		let key = automation_name.to_ascii_lowercase();
		match (self.descriptors.get(&key), self.factories.get(&key)) {
			(None, _) => Lookup::Missing,
			(Some(descriptor), None) => Lookup::Unloadable(descriptor),
			(Some(descriptor), Some(factory)) => Lookup::Loaded(descriptor, Arc::clone(factory)),
		}
	}

	/// All known descriptors, sorted by automation name.
	pub fn descriptors(&self) -> Vec<&DriverDescriptor> {
		let mut all: Vec<&DriverDescriptor> = self.descriptors.values().collect();
		all.sort_by(|a, b| a.automation_name.cmp(&b.automation_name));
		all
	}

	pub fn is_installed(&self, automation_name: &str) -> bool {
		self.factories.contains_key(&automation_name.to_ascii_lowercase())
	}
}
