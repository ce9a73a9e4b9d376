//! Umbrella session orchestration.
//!
//! [`UmbrellaDriver`] accepts WebDriver session requests, resolves the
//! backend for the requested platform, tracks live sessions and routes
//! every later command to the backend that owns it. Every public operation
//! answers with an [`Envelope`](umbra_protocol::Envelope) instead of failing.
//!
//! ```ignore
//! let umbrella = UmbrellaDriver::new(ServerArgs::default());
//! let created = umbrella.create_session(NewSessionRequest::w3c(caps)).await;
//! ```

mod dispatch;
mod observer;
mod orchestrator;

pub use dispatch::{SessionSummary, is_session_command, is_umbrella_command};
pub use orchestrator::{CleanupFailure, CleanupOptions, CleanupReport, CreatedSession, UmbrellaDriver, UmbrellaEnvelope};
pub use umbra_protocol as protocol;
pub use umbra_runtime as runtime;
