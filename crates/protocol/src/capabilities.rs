//! Capability payloads accepted when a session is requested.
//!
//! Clients may send legacy JSONWP `desiredCapabilities`/`requiredCapabilities`,
//! W3C `capabilities.alwaysMatch`/`capabilities.firstMatch[]`, or both. Only
//! `platformName`, `automationName` and `platformVersion` are interpreted at
//! this layer; every other key is carried opaquely to the backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open capability object as it appears on the wire.
pub type CapabilityMap = Map<String, Value>;

/// Vendor prefix W3C requires on non-standard capability names.
pub const VENDOR_PREFIX: &str = "appium:";

/// Capability key naming the target platform.
pub const PLATFORM_NAME: &str = "platformName";
/// Capability key naming the automation engine.
pub const AUTOMATION_NAME: &str = "automationName";
/// Capability key carrying the target platform version.
pub const PLATFORM_VERSION: &str = "platformVersion";

/// W3C capability negotiation payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct W3cCapabilities {
	/// Capabilities every candidate must satisfy.
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub always_match: CapabilityMap,
	/// Ordered candidates, each merged with `always_match`.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub first_match: Vec<CapabilityMap>,
}

/// Body of a new-session request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionRequest {
	/// Legacy JSONWP desired capabilities.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub desired_capabilities: Option<CapabilityMap>,
	/// Legacy JSONWP required capabilities, forwarded untouched.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub required_capabilities: Option<CapabilityMap>,
	/// W3C capabilities.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub capabilities: Option<W3cCapabilities>,
}

impl NewSessionRequest {
	/// Request carrying only JSONWP desired capabilities.
	pub fn jsonwp(desired: CapabilityMap) -> Self {
		Self {
			desired_capabilities: Some(desired),
			..Default::default()
		}
	}

	/// Request carrying only W3C capabilities.
	pub fn w3c(capabilities: W3cCapabilities) -> Self {
		Self {
			capabilities: Some(capabilities),
			..Default::default()
		}
	}
}

/// Merged capability set with the recognized fields lifted out.
///
/// Recognized fields are only lifted when they hold a usable value; anything
/// else (including a non-string `platformName`) stays in `extra` and the
/// typed field is left empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "CapabilityMap", into = "CapabilityMap")]
pub struct Capabilities {
	pub platform_name: Option<String>,
	pub automation_name: Option<String>,
	pub platform_version: Option<String>,
	/// Passthrough payload forwarded to the backend unmodified.
	pub extra: CapabilityMap,
}

impl Capabilities {
	/// Looks up any capability by its wire name.
	pub fn get(&self, key: &str) -> Option<Value> {
		match key {
			PLATFORM_NAME => self.platform_name.clone().map(Value::String),
			AUTOMATION_NAME => self.automation_name.clone().map(Value::String),
			PLATFORM_VERSION => self.platform_version.clone().map(Value::String),
			_ => self.extra.get(key).cloned(),
		}
	}

	/// Rebuilds the flat wire object.
	pub fn to_map(&self) -> CapabilityMap {
		let mut map = self.extra.clone();
		if let Some(name) = &self.platform_name {
			map.insert(PLATFORM_NAME.to_string(), Value::String(name.clone()));
		}
		if let Some(name) = &self.automation_name {
			map.insert(AUTOMATION_NAME.to_string(), Value::String(name.clone()));
		}
		if let Some(version) = &self.platform_version {
			map.insert(PLATFORM_VERSION.to_string(), Value::String(version.clone()));
		}
		map
	}
}

impl From<CapabilityMap> for Capabilities {
	fn from(mut map: CapabilityMap) -> Self {
		let platform_name = take_string(&mut map, PLATFORM_NAME);
		let automation_name = take_string(&mut map, AUTOMATION_NAME);
		let platform_version = match map.get(PLATFORM_VERSION) {
			Some(Value::String(_)) => take_string(&mut map, PLATFORM_VERSION),
			Some(Value::Number(n)) => {
				let version = n.to_string();
				map.remove(PLATFORM_VERSION);
				Some(version)
			}
			_ => None,
		};

		Self {
			platform_name,
			automation_name,
			platform_version,
			extra: map,
		}
	}
}

impl From<Capabilities> for CapabilityMap {
	fn from(caps: Capabilities) -> Self {
		caps.to_map()
	}
}

fn take_string(map: &mut CapabilityMap, key: &str) -> Option<String> {
	match map.get(key) {
		Some(Value::String(_)) => match map.remove(key) {
			Some(Value::String(s)) => Some(s),
			_ => None,
		},
		_ => None,
	}
}

/// Removes the `appium:` vendor prefix from every key.
pub fn strip_vendor_prefix(map: CapabilityMap) -> CapabilityMap {
	map.into_iter()
		.map(|(key, value)| match key.strip_prefix(VENDOR_PREFIX) {
			Some(bare) => (bare.to_string(), value),
			None => (key, value),
		})
		.collect()
}
