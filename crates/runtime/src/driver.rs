//! Backend contract.
//!
//! Every automation engine plugs into the orchestrator through two traits:
//! [`DriverFactory`] builds instances from server arguments, and [`Driver`]
//! is one instance owning at most one session. The orchestrator only ever
//! talks to backends through these traits; it never inspects concrete types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use umbra_protocol::{CapabilityMap, Protocol, SessionId, Settings, W3cCapabilities};

use crate::config::{SecurityPolicy, ServerArgs};
use crate::error::BackendError;
use crate::shutdown::ShutdownSignal;

/// Backend-reported state shared with sibling sessions of the same type.
pub type DriverData = Value;

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Arguments for [`Driver::create_session`].
#[derive(Debug, Clone, Default)]
pub struct CreateSessionArgs {
	/// Processed JSONWP capabilities.
	pub jsonwp: Option<CapabilityMap>,
	/// Client `requiredCapabilities`, forwarded untouched.
	pub required: Option<CapabilityMap>,
	/// Processed W3C capabilities.
	pub w3c: Option<W3cCapabilities>,
	/// Data from committed and in-flight sessions of the same driver type.
	pub siblings: Vec<DriverData>,
}

/// Request route a reverse proxy must never forward to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRoute {
	/// HTTP method, upper-case.
	pub method: String,
	/// Regular expression matched against the request path.
	pub pattern: String,
}

impl ProxyRoute {
	pub fn new(method: impl Into<String>, pattern: impl Into<String>) -> Self {
		Self {
			method: method.into(),
			pattern: pattern.into(),
		}
	}
}

/// One backend instance.
///
/// Instances are created per session request, registered as pending while
/// their session is being created, and committed to the session registry on
/// success.
#[async_trait]
pub trait Driver: Send + Sync {
	/// Display name of the implementation (for example `XCUITestDriver`).
	fn name(&self) -> &str;

	/// Applies insecure-feature gating. Called once, before the session exists.
	fn set_security(&mut self, policy: SecurityPolicy);

	/// Protocol the backend settled on, once known.
	fn protocol(&self) -> Option<Protocol>;

	/// State published to siblings for device/port/singleton coordination.
	///
	/// Committed sessions must return `Some`; pending instances may not know
	/// their data yet.
	fn driver_data(&self) -> Option<DriverData>;

	/// Creates the backend session. May run for minutes.
	async fn create_session(&self, args: CreateSessionArgs) -> BackendResult<(SessionId, Value)>;

	async fn update_settings(&self, settings: Settings) -> BackendResult<()>;

	/// Starts the backend's own idle-session timer.
	fn start_new_command_timeout(&self);

	/// Crash notification for the current session.
	fn shutdown_signal(&self) -> ShutdownSignal;

	/// Aborts the session immediately, firing the crash notification.
	async fn start_unexpected_shutdown(&self, reason: Option<String>) -> BackendResult<()>;

	/// Orderly teardown. `siblings` holds data of the other sessions of this type.
	async fn delete_session(&self, session_id: &SessionId, siblings: Vec<DriverData>) -> BackendResult<Value>;

	/// Executes a protocol command; the session id is the trailing argument.
	async fn execute_command(&self, command: &str, args: Vec<Value>) -> BackendResult<Value>;

	fn proxy_active(&self, _session_id: &SessionId) -> bool {
		false
	}

	fn can_proxy(&self, _session_id: &SessionId) -> bool {
		false
	}

	fn proxy_avoid_list(&self, _session_id: &SessionId) -> Vec<ProxyRoute> {
		Vec::new()
	}
}

/// Builds [`Driver`] instances for one automation engine.
pub trait DriverFactory: Send + Sync {
	/// Display name of the drivers this factory builds.
	fn driver_name(&self) -> &str;

	/// Implementation version, if the factory knows it.
	fn version(&self) -> Option<String>;

	fn create(&self, args: &ServerArgs) -> BackendResult<Box<dyn Driver>>;
}
