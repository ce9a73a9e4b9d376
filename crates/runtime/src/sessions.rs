//! Session and pending-driver registries.
//!
//! The two registries are guarded independently. The session registry keeps
//! entries in a [`DashMap`] and serializes every mutation through its own
//! FIFO critical section; the pending registry is a short synchronous map
//! behind a `parking_lot` mutex. Neither lock is ever held across a backend
//! call.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::trace;
use umbra_protocol::{Protocol, SessionId};

use crate::config::ReadPolicy;
use crate::driver::{Driver, DriverData};

/// A committed session.
pub struct SessionEntry {
	pub id: SessionId,
	/// Driver type name; sessions of the same kind are siblings.
	pub kind: String,
	pub driver: Arc<dyn Driver>,
	pub protocol: Option<Protocol>,
	/// Capabilities reported by the backend at creation.
	pub capabilities: Value,
}

impl std::fmt::Debug for SessionEntry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionEntry")
			.field("id", &self.id)
			.field("kind", &self.kind)
			.field("protocol", &self.protocol)
			.finish_non_exhaustive()
	}
}

impl SessionEntry {
	/// Whether `driver` is the instance backing this session.
	pub fn is_backed_by(&self, driver: &Arc<dyn Driver>) -> bool {
		same_driver(&self.driver, driver)
	}
}

fn same_driver(a: &Arc<dyn Driver>, b: &Arc<dyn Driver>) -> bool {
	std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Live sessions keyed by id.
pub struct SessionRegistry {
	entries: DashMap<SessionId, Arc<SessionEntry>>,
	guard: AsyncMutex<()>,
	policy: ReadPolicy,
}

impl Default for SessionRegistry {
	fn default() -> Self {
		Self::new(ReadPolicy::default())
	}
}

impl SessionRegistry {
	pub fn new(policy: ReadPolicy) -> Self {
		Self {
			entries: DashMap::new(),
			guard: AsyncMutex::new(()),
			policy,
		}
	}

	pub fn policy(&self) -> ReadPolicy {
		self.policy
	}

	/// Commits a session. Returns the entry back if the id is already taken.
	pub async fn insert(&self, entry: Arc<SessionEntry>) -> Result<(), Arc<SessionEntry>> {
		let _lock = self.guard.lock().await;
		if self.entries.contains_key(&entry.id) {
			return Err(entry);
		}
		trace!(target: "umbra.session", session_id = %entry.id, kind = %entry.kind, "session committed");
		self.entries.insert(entry.id.clone(), entry);
		Ok(())
	}

	/// Removes `id` only while it is still backed by `driver`.
	///
	/// Guards against a late crash notification evicting a newer session that
	/// happens to reuse the id.
	pub async fn remove_if_backed_by(&self, id: &SessionId, driver: &Arc<dyn Driver>) -> Option<Arc<SessionEntry>> {
		let _lock = self.guard.lock().await;
		self.entries
			.remove_if(id, |_, entry| entry.is_backed_by(driver))
			.map(|(_, entry)| entry)
	}

	/// Removes `id` and returns it with the remaining sessions of the same kind.
	pub async fn take_with_siblings(&self, id: &SessionId) -> Option<(Arc<SessionEntry>, Vec<Arc<SessionEntry>>)> {
		let _lock = self.guard.lock().await;
		let (_, entry) = self.entries.remove(id)?;
		let siblings = self.collect(|other| other.kind == entry.kind);
		Some((entry, siblings))
	}

	/// Locked point lookup.
	pub async fn get(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
		let _lock = self.guard.lock().await;
		self.get_relaxed(id)
	}

	/// Point lookup outside the critical section.
	pub fn get_relaxed(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
		self.entries.get(id).map(|entry| Arc::clone(entry.value()))
	}

	/// Point lookup honoring the configured [`ReadPolicy`].
	pub async fn lookup(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
		match self.policy {
			ReadPolicy::Relaxed => self.get_relaxed(id),
			ReadPolicy::Locked => self.get(id).await,
		}
	}

	pub async fn exists(&self, id: &SessionId) -> bool {
		self.lookup(id).await.is_some()
	}

	/// Consistent copy of every session, ordered by id.
	pub async fn snapshot(&self) -> Vec<Arc<SessionEntry>> {
		let _lock = self.guard.lock().await;
		self.collect(|_| true)
	}

	/// Committed sessions of the given driver type.
	pub async fn of_kind(&self, kind: &str) -> Vec<Arc<SessionEntry>> {
		let _lock = self.guard.lock().await;
		self.collect(|entry| entry.kind == kind)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	fn collect(&self, keep: impl Fn(&SessionEntry) -> bool) -> Vec<Arc<SessionEntry>> {
		let mut out: Vec<Arc<SessionEntry>> = self
			.entries
			.iter()
			.filter(|entry| keep(entry.value()))
			.map(|entry| Arc::clone(entry.value()))
			.collect();
		out.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
		out
	}
}

/// Backends whose session is still being created, grouped by driver type.
#[derive(Default)]
pub struct PendingRegistry {
	inner: Mutex<PendingInner>,
}

#[derive(Default)]
struct PendingInner {
	next_ticket: u64,
	by_kind: HashMap<String, Vec<(u64, Arc<dyn Driver>)>>,
}

impl PendingRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an in-flight backend. Dropping the ticket unregisters it.
	pub fn register(&self, kind: &str, driver: Arc<dyn Driver>) -> PendingTicket<'_> {
		let mut inner = self.inner.lock();
		inner.next_ticket += 1;
		let ticket = inner.next_ticket;
		inner.by_kind.entry(kind.to_string()).or_default().push((ticket, driver));
		trace!(target: "umbra.session", kind, ticket, "pending driver registered");
		PendingTicket {
			registry: self,
			kind: kind.to_string(),
			ticket,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.inner.lock().by_kind.is_empty()
	}

	fn siblings(&self, kind: &str, ticket: u64) -> Vec<DriverData> {
		let drivers: Vec<Arc<dyn Driver>> = self
			.inner
			.lock()
			.by_kind
			.get(kind)
			.map(|list| {
				list.iter()
					.filter(|(id, _)| *id != ticket)
					.map(|(_, driver)| Arc::clone(driver))
					.collect()
			})
			.unwrap_or_default();
		drivers.iter().filter_map(|driver| driver.driver_data()).collect()
	}

	fn unregister(&self, kind: &str, ticket: u64) {
		let mut inner = self.inner.lock();
		if let Some(list) = inner.by_kind.get_mut(kind) {
			list.retain(|(id, _)| *id != ticket);
			if list.is_empty() {
				inner.by_kind.remove(kind);
			}
		}
		trace!(target: "umbra.session", kind, ticket, "pending driver released");
	}
}

/// Registration of one in-flight backend.
#[must_use = "dropping the ticket unregisters the pending driver"]
pub struct PendingTicket<'a> {
	registry: &'a PendingRegistry,
	kind: String,
	ticket: u64,
}

impl PendingTicket<'_> {
	/// Data of the other in-flight backends of the same type.
	pub fn siblings(&self) -> Vec<DriverData> {
		self.registry.siblings(&self.kind, self.ticket)
	}
}

impl Drop for PendingTicket<'_> {
	fn drop(&mut self) {
		self.registry.unregister(&self.kind, self.ticket);
	}
}
