//! Session orchestrator: create, delete and bulk-delete sessions.

use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, info, warn};
use umbra_protocol::{Envelope, NewSessionRequest, Protocol, SessionId, SettingsBundle};
use umbra_runtime::{
	BuildInfo, CapabilityMatcher, CreateSessionArgs, Driver, DriverData, DriverRegistry, Error, FakeDriverFactory,
	ParsedCapabilities, PendingRegistry, ReadPolicy, Result, SessionEntry, SessionRegistry, ServerArgs,
	StandardMatcher, automation, resolve_driver,
};

use crate::observer;

/// Result envelope returned by every public umbrella operation.
pub type UmbrellaEnvelope<T> = Envelope<T, Error>;

/// A freshly created session. Serializes as `[sessionId, capabilities, protocol]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedSession {
	pub session_id: SessionId,
	pub capabilities: Value,
	pub protocol: Protocol,
}

impl Serialize for CreatedSession {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		(&self.session_id, &self.capabilities, self.protocol).serialize(serializer)
	}
}

/// How [`UmbrellaDriver::delete_all_sessions`] tears sessions down.
#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
	/// Abort backends immediately instead of deleting sessions in order.
	pub force: bool,
	/// Reason handed to aborted backends.
	pub reason: Option<String>,
}

impl CleanupOptions {
	pub fn force(reason: impl Into<String>) -> Self {
		Self {
			force: true,
			reason: Some(reason.into()),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupFailure {
	pub session_id: SessionId,
	pub message: String,
}

/// Outcome of a bulk teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
	/// Sessions a teardown was attempted for.
	pub attempted: usize,
	pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
	pub fn succeeded(&self) -> usize {
		self.attempted - self.failures.len()
	}
}

/// Umbrella driver owning the session and pending-driver registries.
pub struct UmbrellaDriver {
	pub(crate) args: ServerArgs,
	pub(crate) registry: DriverRegistry,
	pub(crate) matcher: Arc<dyn CapabilityMatcher>,
	pub(crate) build_info: BuildInfo,
	pub(crate) sessions: Arc<SessionRegistry>,
	pub(crate) pending: PendingRegistry,
}

impl std::fmt::Debug for UmbrellaDriver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("UmbrellaDriver")
			.field("args", &self.args)
			.field("registry", &self.registry)
			.field("sessions", &self.sessions.len())
			.finish_non_exhaustive()
	}
}

impl UmbrellaDriver {
	/// Umbrella with the built-in engine table and the fake backend installed.
	pub fn new(args: ServerArgs) -> Self {
		let registry = DriverRegistry::builtin().with_factory(automation::FAKE, Arc::new(FakeDriverFactory));
		Self::with_registry(args, registry)
	}

	pub fn with_registry(args: ServerArgs, registry: DriverRegistry) -> Self {
		let sessions = Arc::new(SessionRegistry::new(args.read_policy));
		Self {
			args,
			registry,
			matcher: Arc::new(StandardMatcher),
			build_info: BuildInfo::compiled(),
			sessions,
			pending: PendingRegistry::new(),
		}
	}

	pub fn with_matcher(mut self, matcher: Arc<dyn CapabilityMatcher>) -> Self {
		self.matcher = matcher;
		self
	}

	pub fn with_build_info(mut self, build_info: BuildInfo) -> Self {
		self.build_info = build_info;
		self
	}

	pub fn args(&self) -> &ServerArgs {
		&self.args
	}

	pub fn registry(&self) -> &DriverRegistry {
		&self.registry
	}

	pub fn read_policy(&self) -> ReadPolicy {
		self.sessions.policy()
	}

	/// Whether any backend is still between instantiation and commit.
	pub fn has_pending(&self) -> bool {
		!self.pending.is_empty()
	}

	/// Creates a session on the backend selected by the request's capabilities.
	pub async fn create_session(&self, mut request: NewSessionRequest) -> UmbrellaEnvelope<CreatedSession> {
		let mut defaults = self.args.default_capabilities.clone();
		let settings = SettingsBundle::extract(&mut defaults, &mut request);

		let parsed = match self.matcher.parse(&request, &defaults) {
			Ok(parsed) => parsed,
			Err(err) => {
				warn!(target: "umbra.session", protocol = ?err.protocol, "capability parsing failed: {err}");
				return Envelope::error(err.protocol, Error::CapabilityParse(err.message));
			}
		};

		let protocol = parsed.protocol;
		match self.start_session(parsed, request.required_capabilities, &settings).await {
			Ok(created) => Envelope::value(Some(protocol), created),
			Err(err) => {
				warn!(target: "umbra.session", %protocol, "session creation failed: {err}");
				Envelope::error(Some(protocol), err)
			}
		}
	}

	async fn start_session(
		&self,
		parsed: ParsedCapabilities,
		required: Option<umbra_protocol::CapabilityMap>,
		settings: &SettingsBundle,
	) -> Result<CreatedSession> {
		let resolved = resolve_driver(&parsed.desired, &self.registry)?;
		let kind = resolved.driver_name().to_string();
		info!(target: "umbra.session", driver = %kind, "{}", announcement(&kind, resolved.version.as_deref()));

		if self.args.session_override {
			let active = self.sessions.len();
			if active > 0 {
				info!(target: "umbra.session", "Session override is on. Deleting other {active} active session(s).");
			}
			self.delete_all_sessions(CleanupOptions::default()).await;
		}

		let mut driver = resolved.factory.create(&self.args)?;
		self.apply_security(driver.as_mut(), &kind);
		let driver: Arc<dyn Driver> = Arc::from(driver);

		let mut siblings = self.committed_sibling_data(&kind).await?;
		// held until the session is committed so a same-type creation always
		// finds this backend in one of the two registries
		let ticket = self.pending.register(&kind, Arc::clone(&driver));
		// let same-type creations that started alongside this one register too
		tokio::task::yield_now().await;
		siblings.extend(ticket.siblings());
		debug!(target: "umbra.session", driver = %kind, siblings = siblings.len(), "starting backend session");

		let (session_id, capabilities) = driver
			.create_session(CreateSessionArgs {
				jsonwp: parsed.processed_jsonwp,
				required,
				w3c: parsed.processed_w3c,
				siblings,
			})
			.await?;

		let protocol = driver.protocol().unwrap_or(parsed.protocol);
		let entry = Arc::new(SessionEntry {
			id: session_id.clone(),
			kind: kind.clone(),
			driver: Arc::clone(&driver),
			protocol: Some(protocol),
			capabilities: capabilities.clone(),
		});
		let committed = self.sessions.insert(entry).await;
		drop(ticket);
		if committed.is_err() {
			if let Err(err) = driver.delete_session(&session_id, Vec::new()).await {
				debug!(target: "umbra.session", session_id = %session_id, "discarding duplicate session failed: {err}");
			}
			return Err(Error::SessionNotCreated(format!(
				"backend {kind} returned session id '{session_id}' which is already in use"
			)));
		}
		observer::watch(Arc::clone(&self.sessions), session_id.clone(), &driver);
		info!(
			target: "umbra.session",
			session_id = %session_id,
			driver = %kind,
			%protocol,
			"New {kind} session created successfully, session {session_id} added to master session list"
		);

		driver.start_new_command_timeout();

		let initial = settings.for_protocol(protocol);
		if !initial.is_empty() {
			info!(target: "umbra.session", session_id = %session_id, "Applying the initial values to {protocol} settings: {:?}", initial.as_map());
			if let Err(err) = driver.update_settings(initial.clone()).await {
				warn!(target: "umbra.session", session_id = %session_id, "initial settings were rejected; session {session_id} stays active: {err}");
				return Err(Error::Backend(err));
			}
		}

		Ok(CreatedSession {
			session_id,
			capabilities,
			protocol,
		})
	}

	fn apply_security(&self, driver: &mut dyn Driver, kind: &str) {
		let policy = self.args.security_policy();
		if policy.relaxed {
			info!(target: "umbra.session", driver = %kind, "Applying relaxed security to {kind} as per server command line argument. All insecure features will be enabled unless explicitly disabled by --deny-insecure");
		}
		if !policy.allow.is_empty() {
			info!(target: "umbra.session", driver = %kind, "Explicitly enabling use of insecure features: {}", policy.allow.join(", "));
		}
		if !policy.deny.is_empty() {
			info!(target: "umbra.session", driver = %kind, "Explicitly preventing use of insecure features: {}", policy.deny.join(", "));
		}
		driver.set_security(policy);
	}

	/// Data of the committed sessions of `kind`; every one of them must expose it.
	async fn committed_sibling_data(&self, kind: &str) -> Result<Vec<DriverData>> {
		self.sessions
			.of_kind(kind)
			.await
			.iter()
			.map(|entry| {
				entry.driver.driver_data().ok_or_else(|| {
					Error::SessionNotCreated(format!(
						"Problem getting session data for driver type {kind}; does it implement 'driver_data'?"
					))
				})
			})
			.collect()
	}

	/// Removes the session, then tears its backend down.
	pub async fn delete_session(&self, session_id: &SessionId) -> UmbrellaEnvelope<Value> {
		let Some((entry, siblings)) = self.sessions.take_with_siblings(session_id).await else {
			return Envelope::error(None, Error::UnknownSession(session_id.clone()));
		};
		let sibling_data: Vec<DriverData> = siblings.iter().filter_map(|s| s.driver.driver_data()).collect();
		info!(target: "umbra.session", session_id = %session_id, driver = %entry.kind, "Removing session {session_id} from our master session list");

		match entry.driver.delete_session(session_id, sibling_data).await {
			Ok(value) => Envelope::value(entry.protocol, value),
			Err(err) => {
				warn!(target: "umbra.session", session_id = %session_id, "Had trouble ending session {session_id}: {err}");
				Envelope::error(entry.protocol, Error::Backend(err))
			}
		}
	}

	/// Tears down every tracked session concurrently; one failure never blocks the rest.
	pub async fn delete_all_sessions(&self, opts: CleanupOptions) -> CleanupReport {
		let entries = self.sessions.snapshot().await;
		if entries.is_empty() {
			return CleanupReport::default();
		}
		info!(
			target: "umbra.session",
			force = opts.force,
			"Cleaning up {} active session{}",
			entries.len(),
			if entries.len() == 1 { "" } else { "s" }
		);

		let force = opts.force;
		let outcomes = join_all(entries.iter().map(|entry| {
			let reason = opts.reason.clone();
			async move {
				let outcome = if force {
					entry.driver.start_unexpected_shutdown(reason).await.map_err(Error::from)
				} else {
					self.delete_session(&entry.id).await.into_result().map(drop)
				};
				(entry.id.clone(), outcome)
			}
		}))
		.await;

		let failures: Vec<CleanupFailure> = outcomes
			.into_iter()
			.filter_map(|(session_id, outcome)| {
				let err = outcome.err()?;
				warn!(target: "umbra.session", session_id = %session_id, "Unable to clean up session: {err}");
				Some(CleanupFailure {
					session_id,
					message: err.to_string(),
				})
			})
			.collect();

		CleanupReport {
			attempted: entries.len(),
			failures,
		}
	}
}

fn announcement(driver: &str, version: Option<&str>) -> String {
	match version {
		Some(version) => format!("creating new {driver} (v{version}) session"),
		None => format!("creating new {driver} session"),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn announcement_omits_unknown_version() {
		assert_eq!(announcement("FakeDriver", Some("1.0.0")), "creating new FakeDriver (v1.0.0) session");
		assert_eq!(announcement("FakeDriver", None), "creating new FakeDriver session");
	}

	#[test]
	fn created_session_serializes_as_triple() {
		let created = CreatedSession {
			session_id: SessionId::new("abc"),
			capabilities: json!({"platformName": "Fake"}),
			protocol: Protocol::W3c,
		};
		assert_eq!(
			serde_json::to_value(&created).unwrap(),
			json!(["abc", {"platformName": "Fake"}, "W3C"])
		);
	}

	#[test]
	fn cleanup_report_counts_successes() {
		let report = CleanupReport {
			attempted: 3,
			failures: vec![CleanupFailure {
				session_id: SessionId::new("b"),
				message: "boom".into(),
			}],
		};
		assert_eq!(report.succeeded(), 2);
	}
}
