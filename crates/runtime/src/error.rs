//! Error types for session orchestration.

use thiserror::Error;
use umbra_protocol::{SessionId, WireError};

/// Result type alias for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a driver could not be resolved for a capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionFailure {
	/// No registered engine matches the requested automation name.
	Find,
	/// The engine is known but no implementation is installed for it.
	Load,
}

impl ResolutionFailure {
	pub fn verb(self) -> &'static str {
		match self {
			ResolutionFailure::Find => "find",
			ResolutionFailure::Load => "load",
		}
	}

	/// Operator-facing remediation hint.
	pub fn suggestion(self) -> &'static str {
		match self {
			ResolutionFailure::Find => "Please check your desired capabilities",
			ResolutionFailure::Load => "Please verify your server installation",
		}
	}
}

/// Errors surfaced by the orchestration core.
#[derive(Debug, Error)]
pub enum Error {
	/// `platformName` is absent, not a string, or not a known platform.
	#[error("{0}")]
	MissingCapability(String),

	/// No usable backend for the requested automation name.
	#[error("{message}")]
	DriverResolution {
		failure: ResolutionFailure,
		message: String,
	},

	/// Capability matching rejected the request.
	#[error("{0}")]
	CapabilityParse(String),

	/// Existing sessions of the same driver type could not be inspected.
	#[error("A new session could not be created. Details: {0}")]
	SessionNotCreated(String),

	/// Failure reported by a backend, passed through verbatim.
	#[error(transparent)]
	Backend(#[from] BackendError),

	/// A command referenced a session that is not registered.
	#[error("The session with id '{0}' does not exist")]
	UnknownSession(SessionId),
}

impl Error {
	pub fn driver_resolution(failure: ResolutionFailure, message: impl Into<String>) -> Self {
		Error::DriverResolution {
			failure,
			message: message.into(),
		}
	}

	/// Returns the resolution discriminator for driver resolution errors.
	pub fn resolution_failure(&self) -> Option<ResolutionFailure> {
		match self {
			Error::DriverResolution { failure, .. } => Some(*failure),
			_ => None,
		}
	}

	pub fn is_unknown_session(&self) -> bool {
		matches!(self, Error::UnknownSession(_))
	}
}

impl WireError for Error {
	fn code(&self) -> &str {
		match self {
			Error::MissingCapability(_) | Error::CapabilityParse(_) => "invalid argument",
			Error::DriverResolution { .. } | Error::SessionNotCreated(_) => "session not created",
			Error::Backend(err) => &err.code,
			Error::UnknownSession(_) => "invalid session id",
		}
	}
}

/// Opaque error raised by a backend operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
	/// W3C error code chosen by the backend.
	pub code: String,
	pub message: String,
}

impl BackendError {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			code: code.into(),
			message: message.into(),
		}
	}

	/// Error with the generic `unknown error` code.
	pub fn unknown(message: impl Into<String>) -> Self {
		Self::new("unknown error", message)
	}
}
