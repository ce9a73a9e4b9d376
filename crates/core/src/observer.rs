//! Shutdown observer: repairs the session registry when a backend dies.

use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};
use umbra_protocol::SessionId;
use umbra_runtime::{Driver, SessionRegistry, ShutdownEvent};

/// Watches `driver` and drops `session_id` from `sessions` if it shuts down unexpectedly.
///
/// Holds the backend weakly; once the registry lets go of it the signal
/// resolves as cancelled and the task ends.
pub(crate) fn watch(sessions: Arc<SessionRegistry>, session_id: SessionId, driver: &Arc<dyn Driver>) {
	let signal = driver.shutdown_signal();
	let driver: Weak<dyn Driver> = Arc::downgrade(driver);
	tokio::spawn(async move {
		match signal.wait().await {
			ShutdownEvent::Cancelled => {
				debug!(target: "umbra.shutdown", session_id = %session_id, "shutdown watch released");
			}
			ShutdownEvent::Unexpected(cause) => {
				warn!(target: "umbra.shutdown", session_id = %session_id, "Closing session, cause was '{cause}'");
				let Some(driver) = driver.upgrade() else {
					return;
				};
				if sessions.remove_if_backed_by(&session_id, &driver).await.is_some() {
					info!(target: "umbra.shutdown", session_id = %session_id, "Removing session '{session_id}' from our master session list");
				}
			}
		}
	});
}
