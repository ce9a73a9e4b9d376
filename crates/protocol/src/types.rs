//! Core protocol types used across the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Negotiated automation protocol dialect.
///
/// Fixed for the lifetime of a session once the backend has accepted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
	/// W3C WebDriver (`alwaysMatch`/`firstMatch` capabilities)
	#[serde(rename = "W3C")]
	W3c,
	/// Legacy (Mobile) JSON Wire Protocol
	#[serde(rename = "MJSONWP")]
	Jsonwp,
}

impl Protocol {
	/// Wire name of the protocol.
	pub fn as_str(self) -> &'static str {
		match self {
			Protocol::W3c => "W3C",
			Protocol::Jsonwp => "MJSONWP",
		}
	}
}

impl fmt::Display for Protocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Opaque session identifier assigned by the owning backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for SessionId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

impl From<String> for SessionId {
	fn from(value: String) -> Self {
		Self(value)
	}
}
