//! Uniform result carrier for every public operation.
//!
//! The negotiated protocol travels alongside the result instead of inside it,
//! so callers can still answer in the right dialect when an operation fails.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Protocol;

/// Error that can be rendered into a wire envelope.
pub trait WireError: Display {
	/// W3C error code (for example `invalid session id`).
	fn code(&self) -> &str;

	/// Human-readable message.
	fn message(&self) -> String {
		self.to_string()
	}
}

/// Outcome of a public operation plus the protocol it was negotiated in.
#[derive(Debug)]
pub struct Envelope<T, E> {
	/// `None` only when the operation failed before a protocol was known.
	pub protocol: Option<Protocol>,
	pub result: Result<T, E>,
}

impl<T, E> Envelope<T, E> {
	pub fn value(protocol: Option<Protocol>, value: T) -> Self {
		Self {
			protocol,
			result: Ok(value),
		}
	}

	pub fn error(protocol: Option<Protocol>, error: E) -> Self {
		Self {
			protocol,
			result: Err(error),
		}
	}

	pub fn is_ok(&self) -> bool {
		self.result.is_ok()
	}

	pub fn value_ref(&self) -> Option<&T> {
		self.result.as_ref().ok()
	}

	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U, E> {
		Envelope {
			protocol: self.protocol,
			result: self.result.map(f),
		}
	}

	pub fn into_result(self) -> Result<T, E> {
		self.result
	}
}

impl<T: Serialize, E: WireError> Envelope<T, E> {
	/// Renders the envelope into its serializable wire form.
	pub fn to_wire(&self) -> WireEnvelope {
		match &self.result {
			Ok(value) => match serde_json::to_value(value) {
				Ok(value) => WireEnvelope {
					protocol: self.protocol,
					value: Some(value),
					error: None,
				},
				Err(err) => WireEnvelope::failure(
					self.protocol,
					"unknown error",
					format!("failed to serialize result: {err}"),
				),
			},
			Err(error) => WireEnvelope::failure(self.protocol, error.code(), error.message()),
		}
	}
}

/// Serialized `{protocol, value | error}` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
	pub protocol: Option<Protocol>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<WireErrorBody>,
}

impl WireEnvelope {
	pub fn failure(protocol: Option<Protocol>, code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			protocol,
			value: None,
			error: Some(WireErrorBody {
				error: code.into(),
				message: message.into(),
			}),
		}
	}

	pub fn is_ok(&self) -> bool {
		self.error.is_none()
	}
}

/// Error half of a [`WireEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireErrorBody {
	/// W3C error code.
	pub error: String,
	pub message: String,
}
