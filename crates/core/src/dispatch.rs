//! Command dispatcher and proxy-decision queries.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, trace};
use umbra_protocol::{CapabilityMap, Envelope, NewSessionRequest, SessionId, W3cCapabilities};
use umbra_runtime::{Error, ProxyRoute};

use crate::orchestrator::{UmbrellaDriver, UmbrellaEnvelope};

/// Commands that never carry a session id.
const NO_SESSION_ID_COMMANDS: &[&str] = &["createSession", "getStatus", "getSessions"];

/// Whether `command` targets an existing session.
pub fn is_session_command(command: &str) -> bool {
	!NO_SESSION_ID_COMMANDS.contains(&command)
}

/// Whether the umbrella handles `command` itself instead of routing it.
pub fn is_umbrella_command(command: &str) -> bool {
	UmbrellaCommand::parse(command).is_some()
}

/// Commands answered by the umbrella rather than a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UmbrellaCommand {
	CreateSession,
	GetStatus,
	GetSessions,
	DeleteSession,
}

impl UmbrellaCommand {
	fn parse(command: &str) -> Option<Self> {
		match command {
			"createSession" => Some(Self::CreateSession),
			"getStatus" => Some(Self::GetStatus),
			"getSessions" => Some(Self::GetSessions),
			"deleteSession" => Some(Self::DeleteSession),
			_ => None,
		}
	}
}

/// Entry of the `getSessions` listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
	pub id: SessionId,
	pub capabilities: Value,
}

impl UmbrellaDriver {
	/// Build metadata. Needs no session and never waits on a registry.
	pub fn status(&self) -> Value {
		json!({ "build": self.build_info })
	}

	/// Every live session, from a consistent snapshot.
	pub async fn sessions(&self) -> Vec<SessionSummary> {
		self.sessions
			.snapshot()
			.await
			.iter()
			.map(|entry| SessionSummary {
				id: entry.id.clone(),
				capabilities: entry.capabilities.clone(),
			})
			.collect()
	}

	pub async fn session_exists(&self, session_id: &SessionId) -> bool {
		self.sessions.exists(session_id).await
	}

	/// Runs a protocol command.
	///
	/// Per-session commands take the session id as their trailing argument.
	/// Backend failures come back inside the envelope.
	pub async fn execute_command(&self, command: &str, args: Vec<Value>) -> UmbrellaEnvelope<Value> {
		match UmbrellaCommand::parse(command) {
			Some(UmbrellaCommand::GetStatus) => return Envelope::value(None, self.status()),
			Some(umbrella) => return self.execute_umbrella_command(umbrella, args).await,
			None => {}
		}

		let session_id = trailing_session_id(&args);
		let Some(entry) = self.sessions.get(&session_id).await else {
			debug!(target: "umbra.dispatch", %command, session_id = %session_id, "command for unknown session");
			return Envelope::error(None, Error::UnknownSession(session_id));
		};

		trace!(target: "umbra.dispatch", %command, session_id = %session_id, driver = %entry.kind, "routing command");
		let protocol = entry.driver.protocol().or(entry.protocol);
		match entry.driver.execute_command(command, args).await {
			Ok(value) => Envelope::value(protocol, value),
			Err(err) => {
				debug!(target: "umbra.dispatch", %command, session_id = %session_id, "backend error: {err}");
				Envelope::error(protocol, Error::Backend(err))
			}
		}
	}

	async fn execute_umbrella_command(&self, command: UmbrellaCommand, args: Vec<Value>) -> UmbrellaEnvelope<Value> {
		match command {
			UmbrellaCommand::CreateSession => match new_session_request(args) {
				Ok(request) => self.create_session(request).await.map(|created| {
					json!([created.session_id, created.capabilities, created.protocol])
				}),
				Err(err) => Envelope::error(None, err),
			},
			UmbrellaCommand::GetStatus => Envelope::value(None, self.status()),
			UmbrellaCommand::GetSessions => {
				let sessions = self.sessions().await;
				Envelope::value(None, json!(sessions))
			}
			UmbrellaCommand::DeleteSession => self.delete_session(&trailing_session_id(&args)).await,
		}
	}

	pub async fn proxy_active(&self, session_id: &SessionId) -> bool {
		match self.sessions.lookup(session_id).await {
			Some(entry) => entry.driver.proxy_active(session_id),
			None => false,
		}
	}

	pub async fn can_proxy(&self, session_id: &SessionId) -> bool {
		match self.sessions.lookup(session_id).await {
			Some(entry) => entry.driver.can_proxy(session_id),
			None => false,
		}
	}

	pub async fn proxy_avoid_list(&self, session_id: &SessionId) -> Vec<ProxyRoute> {
		match self.sessions.lookup(session_id).await {
			Some(entry) => entry.driver.proxy_avoid_list(session_id),
			None => Vec::new(),
		}
	}
}

fn trailing_session_id(args: &[Value]) -> SessionId {
	match args.last() {
		Some(Value::String(id)) => SessionId::new(id.as_str()),
		Some(other) => SessionId::new(other.to_string()),
		None => SessionId::new(""),
	}
}

/// Builds a request from positional `[desired, required, w3c]` arguments.
fn new_session_request(args: Vec<Value>) -> Result<NewSessionRequest, Error> {
	let mut args = args.into_iter();
	let desired = optional_arg::<CapabilityMap>(args.next(), "desiredCapabilities")?;
	let required = optional_arg::<CapabilityMap>(args.next(), "requiredCapabilities")?;
	let capabilities = optional_arg::<W3cCapabilities>(args.next(), "capabilities")?;
	Ok(NewSessionRequest {
		desired_capabilities: desired,
		required_capabilities: required,
		capabilities,
	})
}

fn optional_arg<T: serde::de::DeserializeOwned>(value: Option<Value>, name: &str) -> Result<Option<T>, Error> {
	match value {
		None | Some(Value::Null) => Ok(None),
		Some(value) => serde_json::from_value(value)
			.map(Some)
			.map_err(|err| Error::CapabilityParse(format!("'{name}' is malformed: {err}"))),
	}
}
