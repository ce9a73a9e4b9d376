//! Settings embedded in capability payloads.
//!
//! Settings are session behavior toggles, not protocol capabilities. Clients
//! smuggle them in as `settings[name]` keys (optionally vendor-prefixed); they
//! are pulled out before capability negotiation and applied once the backend
//! has created its session.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capabilities::{CapabilityMap, NewSessionRequest};
use crate::types::Protocol;

static SETTINGS_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bsettings\[(\S+)\]$").unwrap());

/// Named setting values, later sources overriding earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(CapabilityMap);

impl Settings {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn get(&self, name: &str) -> Option<&Value> {
		self.0.get(name)
	}

	pub fn insert(&mut self, name: impl Into<String>, value: Value) {
		self.0.insert(name.into(), value);
	}

	/// Overlays `other` on top of `self`.
	pub fn merge(&mut self, other: Settings) {
		self.0.extend(other.0);
	}

	pub fn as_map(&self) -> &CapabilityMap {
		&self.0
	}

	pub fn into_map(self) -> CapabilityMap {
		self.0
	}
}

/// Removes every `settings[...]` key from `caps` and returns them by setting name.
pub fn pull_settings(caps: &mut CapabilityMap) -> Settings {
	let keys: Vec<(String, String)> = caps
		.keys()
		.filter_map(|key| {
			SETTINGS_KEY
				.captures(key)
				.and_then(|c| c.get(1))
				.map(|name| (key.clone(), name.as_str().to_string()))
		})
		.collect();

	let mut settings = Settings::new();
	for (key, name) in keys {
		if let Some(value) = caps.remove(&key) {
			settings.insert(name, value);
		}
	}
	settings
}

/// Settings accumulated per protocol from every capability source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsBundle {
	/// Operator defaults overlaid with JSONWP desired capabilities.
	pub jsonwp: Settings,
	/// The JSONWP bundle overlaid with `alwaysMatch` and then each `firstMatch` entry in order.
	pub w3c: Settings,
}

impl SettingsBundle {
	/// Pulls settings out of the operator defaults and every client source.
	///
	/// Mutates the inputs: settings keys are removed so they never reach
	/// capability matching.
	pub fn extract(defaults: &mut CapabilityMap, request: &mut NewSessionRequest) -> Self {
		let mut jsonwp = pull_settings(defaults);
		if let Some(desired) = request.desired_capabilities.as_mut() {
			jsonwp.merge(pull_settings(desired));
		}

		let mut w3c = jsonwp.clone();
		if let Some(caps) = request.capabilities.as_mut() {
			w3c.merge(pull_settings(&mut caps.always_match));
			for entry in &mut caps.first_match {
				w3c.merge(pull_settings(entry));
			}
		}

		Self { jsonwp, w3c }
	}

	/// Bundle matching the negotiated protocol.
	pub fn for_protocol(&self, protocol: Protocol) -> &Settings {
		match protocol {
			Protocol::W3c => &self.w3c,
			Protocol::Jsonwp => &self.jsonwp,
		}
	}
}
