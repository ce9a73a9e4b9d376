//! Capability matching and protocol negotiation.
//!
//! The orchestrator treats matching as a pure collaborator behind
//! [`CapabilityMatcher`]; [`StandardMatcher`] is the stock implementation.

use serde_json::Map;
use thiserror::Error;
use umbra_protocol::{Capabilities, CapabilityMap, NewSessionRequest, Protocol, W3cCapabilities, strip_vendor_prefix};

/// Output of a successful match.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCapabilities {
	/// Negotiated protocol, fixed for the life of the session.
	pub protocol: Protocol,
	/// Merged capability set used for driver resolution.
	pub desired: Capabilities,
	/// JSONWP payload for the backend, when the client sent one.
	pub processed_jsonwp: Option<CapabilityMap>,
	/// W3C payload for the backend, when negotiated.
	pub processed_w3c: Option<W3cCapabilities>,
}

/// Matching failure. Still carries the protocol when negotiation got that far.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MatchError {
	pub protocol: Option<Protocol>,
	pub message: String,
}

impl MatchError {
	fn new(protocol: Option<Protocol>, message: impl Into<String>) -> Self {
		Self {
			protocol,
			message: message.into(),
		}
	}
}

/// Reconciles client capabilities with operator defaults.
pub trait CapabilityMatcher: Send + Sync {
	fn parse(&self, request: &NewSessionRequest, defaults: &CapabilityMap) -> Result<ParsedCapabilities, MatchError>;
}

/// Default matching rules.
///
/// W3C wins whenever `capabilities` is present. Vendor prefixes are stripped
/// and operator defaults only fill keys the client left out. Each `firstMatch`
/// entry is merged with `alwaysMatch`; an entry redefining an `alwaysMatch`
/// key is rejected and the first mergeable entry wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardMatcher;

impl CapabilityMatcher for StandardMatcher {
	fn parse(&self, request: &NewSessionRequest, defaults: &CapabilityMap) -> Result<ParsedCapabilities, MatchError> {
		let defaults = strip_vendor_prefix(defaults.clone());
		let jsonwp = request
			.desired_capabilities
			.clone()
			.map(|desired| fill_defaults(strip_vendor_prefix(desired), &defaults));

		let Some(w3c) = &request.capabilities else {
			let Some(desired) = jsonwp else {
				return Err(MatchError::new(
					None,
					"Neither W3C 'capabilities' nor JSONWP 'desiredCapabilities' were provided",
				));
			};
			return Ok(ParsedCapabilities {
				protocol: Protocol::Jsonwp,
				desired: Capabilities::from(desired.clone()),
				processed_jsonwp: Some(desired),
				processed_w3c: None,
			});
		};

		let merged = merge_w3c(w3c)?;
		let desired = fill_defaults(merged, &defaults);
		Ok(ParsedCapabilities {
			protocol: Protocol::W3c,
			desired: Capabilities::from(desired.clone()),
			processed_jsonwp: jsonwp,
			processed_w3c: Some(W3cCapabilities {
				always_match: desired,
				first_match: vec![Map::new()],
			}),
		})
	}
}

fn merge_w3c(caps: &W3cCapabilities) -> Result<CapabilityMap, MatchError> {
	let always = strip_vendor_prefix(caps.always_match.clone());
	let candidates: Vec<CapabilityMap> = if caps.first_match.is_empty() {
		vec![Map::new()]
	} else {
		caps.first_match.iter().cloned().map(strip_vendor_prefix).collect()
	};

	let mut rejections = Vec::new();
	for (index, candidate) in candidates.into_iter().enumerate() {
		let clashes: Vec<&str> = candidate
			.keys()
			.filter(|key| always.contains_key(key.as_str()))
			.map(String::as_str)
			.collect();
		if !clashes.is_empty() {
			rejections.push(format!(
				"firstMatch[{index}] redefines alwaysMatch capabilities: {}",
				clashes.join(", ")
			));
			continue;
		}
		let mut merged = always.clone();
		merged.extend(candidate);
		return Ok(merged);
	}

	Err(MatchError::new(
		Some(Protocol::W3c),
		format!("Could not find matching capabilities. {}", rejections.join("; ")),
	))
}

fn fill_defaults(mut caps: CapabilityMap, defaults: &CapabilityMap) -> CapabilityMap {
	for (key, value) in defaults {
		caps.entry(key.clone()).or_insert_with(|| value.clone());
	}
	caps
}
