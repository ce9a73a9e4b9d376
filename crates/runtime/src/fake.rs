//! Reference backend.
//!
//! `FakeDriver` implements the whole backend contract without touching a
//! device. It is what the `fake` platform resolves to and what the test
//! suites drive the orchestrator with.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info};
use umbra_protocol::{CapabilityMap, Protocol, SessionId, Settings, strip_vendor_prefix};

use crate::build_info;
use crate::config::{SecurityPolicy, ServerArgs};
use crate::driver::{BackendResult, CreateSessionArgs, Driver, DriverData, DriverFactory, ProxyRoute};
use crate::error::BackendError;
use crate::shutdown::{ShutdownNotifier, ShutdownSignal};

pub const DRIVER_NAME: &str = "FakeDriver";

/// Insecure feature gating the `execShell` command.
pub const SHELL_FEATURE: &str = "fake_shell";

/// Capability asking for exclusive use of the fake device.
pub const UNIQUE_APP: &str = "uniqueApp";

/// Capability turning on the reverse-proxy mode.
pub const PROXY_MODE: &str = "fakeProxy";

#[derive(Debug, Default)]
struct FakeState {
	session_id: Option<SessionId>,
	protocol: Option<Protocol>,
	caps: CapabilityMap,
	settings: Settings,
}

impl FakeState {
	fn is_unique(&self) -> bool {
		self.caps.get(UNIQUE_APP).and_then(Value::as_bool).unwrap_or(false)
	}

	fn proxying(&self, session_id: &SessionId) -> bool {
		self.session_id.as_ref() == Some(session_id)
			&& self.caps.get(PROXY_MODE).and_then(Value::as_bool).unwrap_or(false)
	}
}

/// In-memory backend with a test-controllable crash trigger.
#[derive(Debug)]
pub struct FakeDriver {
	args: ServerArgs,
	security: SecurityPolicy,
	state: Mutex<FakeState>,
	shutdown: ShutdownNotifier,
	command_timeouts: AtomicUsize,
}

impl FakeDriver {
	pub fn new(args: ServerArgs) -> Self {
		Self {
			args,
			security: SecurityPolicy::default(),
			state: Mutex::new(FakeState::default()),
			shutdown: ShutdownNotifier::new(),
			command_timeouts: AtomicUsize::new(0),
		}
	}

	pub fn session_id(&self) -> Option<SessionId> {
		self.state.lock().session_id.clone()
	}

	pub fn settings(&self) -> Settings {
		self.state.lock().settings.clone()
	}

	/// How many times the idle timer was (re)started.
	pub fn command_timeouts_started(&self) -> usize {
		self.command_timeouts.load(Ordering::SeqCst)
	}

	fn check_siblings(unique: bool, siblings: &[DriverData]) -> BackendResult<()> {
		if unique && !siblings.is_empty() {
			return Err(BackendError::new(
				"session not created",
				"Cannot start a unique session while other sessions are running",
			));
		}
		let sibling_unique = siblings
			.iter()
			.any(|data| data.get("isUnique").and_then(Value::as_bool).unwrap_or(false));
		if sibling_unique {
			return Err(BackendError::new(
				"session not created",
				"Cannot start session; another unique session is in progress that requires all resources",
			));
		}
		Ok(())
	}

	fn crash(&self, reason: Option<String>) {
		let cause = reason.unwrap_or_else(|| "Fake driver crashed".to_string());
		info!(target: "umbra.shutdown", driver = DRIVER_NAME, %cause, "fake driver shutting down unexpectedly");
		self.shutdown.notify(cause);
		self.state.lock().session_id = None;
	}
}

#[async_trait]
impl Driver for FakeDriver {
	fn name(&self) -> &str {
		DRIVER_NAME
	}

	fn set_security(&mut self, policy: SecurityPolicy) {
		self.security = policy;
	}

	fn protocol(&self) -> Option<Protocol> {
		self.state.lock().protocol
	}

	fn driver_data(&self) -> Option<DriverData> {
		Some(json!({ "isUnique": self.state.lock().is_unique() }))
	}

	async fn create_session(&self, args: CreateSessionArgs) -> BackendResult<(SessionId, Value)> {
		let (protocol, caps) = match (args.w3c, args.jsonwp) {
			(Some(w3c), _) => {
				let mut caps = strip_vendor_prefix(w3c.always_match);
				if let Some(first) = w3c.first_match.into_iter().next() {
					caps.extend(strip_vendor_prefix(first));
				}
				(Protocol::W3c, caps)
			}
			(None, Some(jsonwp)) => (Protocol::Jsonwp, strip_vendor_prefix(jsonwp)),
			(None, None) => {
				return Err(BackendError::new("session not created", "No capabilities were supplied"));
			}
		};

		let unique = caps.get(UNIQUE_APP).and_then(Value::as_bool).unwrap_or(false);
		Self::check_siblings(unique, &args.siblings)?;

		let session_id = SessionId::new(uuid::Uuid::new_v4().to_string());
		let mut state = self.state.lock();
		state.session_id = Some(session_id.clone());
		state.protocol = Some(protocol);
		state.caps = caps.clone();
		debug!(
			target: "umbra.session",
			driver = DRIVER_NAME,
			session_id = %session_id,
			tmp_dir = ?self.args.tmp_dir,
			"fake session created"
		);
		Ok((session_id, Value::Object(caps)))
	}

	async fn update_settings(&self, settings: Settings) -> BackendResult<()> {
		self.state.lock().settings.merge(settings);
		Ok(())
	}

	fn start_new_command_timeout(&self) {
		self.command_timeouts.fetch_add(1, Ordering::SeqCst);
	}

	fn shutdown_signal(&self) -> ShutdownSignal {
		self.shutdown.subscribe()
	}

	async fn start_unexpected_shutdown(&self, reason: Option<String>) -> BackendResult<()> {
		self.crash(reason);
		Ok(())
	}

	async fn delete_session(&self, session_id: &SessionId, siblings: Vec<DriverData>) -> BackendResult<Value> {
		debug!(
			target: "umbra.session",
			driver = DRIVER_NAME,
			session_id = %session_id,
			siblings = siblings.len(),
			"deleting fake session"
		);
		self.shutdown.cancel();
		let mut state = self.state.lock();
		state.session_id = None;
		state.caps.clear();
		Ok(Value::Null)
	}

	async fn execute_command(&self, command: &str, args: Vec<Value>) -> BackendResult<Value> {
		match command {
			"getSession" => Ok(Value::Object(self.state.lock().caps.clone())),
			"getSettings" => Ok(Value::Object(self.state.lock().settings.as_map().clone())),
			"updateSettings" => {
				let settings = args
					.first()
					.cloned()
					.and_then(|v| serde_json::from_value::<Settings>(v).ok())
					.ok_or_else(|| BackendError::new("invalid argument", "Settings must be an object"))?;
				self.update_settings(settings).await?;
				Ok(Value::Null)
			}
			"getStatus" => Ok(json!({ "build": { "version": build_info::VERSION } })),
			"crash" => {
				let reason = args.first().and_then(Value::as_str).map(str::to_string);
				self.crash(reason);
				Ok(Value::Null)
			}
			"execShell" => {
				if !self.security.is_feature_enabled(SHELL_FEATURE) {
					return Err(BackendError::new(
						"unknown error",
						format!(
							"Potentially insecure feature '{SHELL_FEATURE}' has not been enabled. \
							 If you want to enable this feature and accept the security ramifications, \
							 please do so by following the documented process and try again."
						),
					));
				}
				let line = args.first().and_then(Value::as_str).unwrap_or_default();
				Ok(json!({ "stdout": line, "exitCode": 0 }))
			}
			other => Err(BackendError::new(
				"unknown method",
				format!("Method has not yet been implemented: {other}"),
			)),
		}
	}

	fn proxy_active(&self, session_id: &SessionId) -> bool {
		self.state.lock().proxying(session_id)
	}

	fn can_proxy(&self, session_id: &SessionId) -> bool {
		self.state.lock().proxying(session_id)
	}

	fn proxy_avoid_list(&self, session_id: &SessionId) -> Vec<ProxyRoute> {
		if !self.state.lock().proxying(session_id) {
			return Vec::new();
		}
		vec![
			ProxyRoute::new("GET", r"^/session/[^/]+/appium/settings$"),
			ProxyRoute::new("POST", r"^/session/[^/]+/appium/settings$"),
			ProxyRoute::new("POST", r"^/session/[^/]+/appium/execute_shell$"),
		]
	}
}

/// Factory registered under the `Fake` automation name.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeDriverFactory;

impl DriverFactory for FakeDriverFactory {
	fn driver_name(&self) -> &str {
		DRIVER_NAME
	}

	fn version(&self) -> Option<String> {
		Some(build_info::VERSION.to_string())
	}

	fn create(&self, args: &ServerArgs) -> BackendResult<Box<dyn Driver>> {
		Ok(Box::new(FakeDriver::new(args.clone())))
	}
}
