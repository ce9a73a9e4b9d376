use serde::{Deserialize, Serialize};
use serde_json::Value;
use umbra_protocol::{NewSessionRequest, SessionId, WireEnvelope};

/// One newline-delimited request line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonRequest {
	Status,
	/// New-session request; the capability fields sit next to `type`.
	CreateSession {
		#[serde(flatten)]
		request: NewSessionRequest,
	},
	DeleteSession {
		session_id: SessionId,
	},
	/// Protocol command; per-session commands end with the session id.
	Execute {
		command: String,
		#[serde(default)]
		args: Vec<Value>,
	},
	ListSessions,
	/// Force-deletes every session and stops the daemon.
	Shutdown,
}

/// Every request is answered with the result envelope's wire form.
pub type DaemonResponse = WireEnvelope;
