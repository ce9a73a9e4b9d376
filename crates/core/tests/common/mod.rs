//! Scripted backend shared by the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{Barrier, Notify};
use umbra::protocol::{CapabilityMap, NewSessionRequest, Protocol, SessionId, Settings, W3cCapabilities};
use umbra::runtime::{
	BackendError, BackendResult, CreateSessionArgs, Driver, DriverData, DriverFactory, DriverRegistry, FakeDriverFactory,
	SecurityPolicy, ServerArgs, ShutdownNotifier, ShutdownSignal, automation,
};

pub const SCRIPTED: &str = "Scripted";
pub const SCRIPTED_DRIVER: &str = "ScriptedDriver";

/// Observations shared between a factory and every driver it built.
#[derive(Default)]
pub struct Script {
	/// Sibling data handed to each `create_session`, in call order.
	pub seen_siblings: Mutex<Vec<Vec<DriverData>>>,
	pub deletes: AtomicUsize,
	pub aborts: AtomicUsize,
	pub settings: Mutex<Vec<Settings>>,
	/// When set, every `create_session` waits here before returning.
	pub barrier: Option<Barrier>,
	pub commit_gate: Option<CommitGate>,
	built: AtomicUsize,
}

impl Script {
	pub fn with_barrier(parties: usize) -> Arc<Self> {
		Arc::new(Self {
			barrier: Some(Barrier::new(parties)),
			..Default::default()
		})
	}

	pub fn with_commit_gate() -> Arc<Self> {
		Arc::new(Self {
			commit_gate: Some(CommitGate {
				parked: Notify::new(),
				release: std::sync::Barrier::new(2),
				armed: AtomicBool::new(true),
			}),
			..Default::default()
		})
	}
}

/// Parks the first backend after its backend session exists and before the
/// umbrella commits it, until the second backend has received its siblings.
///
/// Blocks worker threads, so only use it on a multi-thread runtime.
pub struct CommitGate {
	/// Notified once the first backend is parked.
	pub parked: Notify,
	release: std::sync::Barrier,
	armed: AtomicBool,
}

pub struct ScriptedFactory(pub Arc<Script>);

impl DriverFactory for ScriptedFactory {
	fn driver_name(&self) -> &str {
		SCRIPTED_DRIVER
	}

	fn version(&self) -> Option<String> {
		None
	}

	fn create(&self, _args: &ServerArgs) -> BackendResult<Box<dyn Driver>> {
		let index = self.0.built.fetch_add(1, Ordering::SeqCst);
		Ok(Box::new(ScriptedDriver {
			index,
			script: Arc::clone(&self.0),
			caps: Mutex::new(CapabilityMap::new()),
			protocol: Mutex::new(None),
			shutdown: ShutdownNotifier::new(),
		}))
	}
}

/// Backend whose behavior is chosen by capabilities:
/// `failCreate`, `failDelete`, `hideData`, `fixedId`, `noProtocol`,
/// `rejectSettings`.
pub struct ScriptedDriver {
	index: usize,
	script: Arc<Script>,
	caps: Mutex<CapabilityMap>,
	protocol: Mutex<Option<Protocol>>,
	shutdown: ShutdownNotifier,
}

impl ScriptedDriver {
	fn flag(&self, name: &str) -> bool {
		self.caps.lock().get(name).and_then(Value::as_bool).unwrap_or(false)
	}
}

#[async_trait]
impl Driver for ScriptedDriver {
	fn name(&self) -> &str {
		SCRIPTED_DRIVER
	}

	fn set_security(&mut self, _policy: SecurityPolicy) {}

	fn protocol(&self) -> Option<Protocol> {
		let protocol = *self.protocol.lock();
		if let Some(gate) = &self.script.commit_gate {
			if self.index == 0 && protocol.is_some() && gate.armed.swap(false, Ordering::SeqCst) {
				gate.parked.notify_one();
				gate.release.wait();
			}
		}
		protocol
	}

	fn driver_data(&self) -> Option<DriverData> {
		if self.flag("hideData") {
			return None;
		}
		Some(json!({ "index": self.index }))
	}

	async fn create_session(&self, args: CreateSessionArgs) -> BackendResult<(SessionId, Value)> {
		let (protocol, caps) = match (args.w3c, args.jsonwp) {
			(Some(w3c), _) => (Protocol::W3c, w3c.always_match),
			(None, Some(jsonwp)) => (Protocol::Jsonwp, jsonwp),
			(None, None) => return Err(BackendError::unknown("no capabilities")),
		};
		self.script.seen_siblings.lock().push(args.siblings);
		if let Some(barrier) = &self.script.barrier {
			barrier.wait().await;
		}
		if let Some(gate) = &self.script.commit_gate {
			if self.index == 1 {
				gate.release.wait();
			}
		}
		if caps.get("failCreate").and_then(Value::as_bool).unwrap_or(false) {
			return Err(BackendError::new("session not created", "scripted create failure"));
		}
		let id = match caps.get("fixedId").and_then(Value::as_str) {
			Some(id) => id.to_string(),
			None => format!("scripted-{}", self.index),
		};
		*self.caps.lock() = caps.clone();
		if !caps.get("noProtocol").and_then(Value::as_bool).unwrap_or(false) {
			*self.protocol.lock() = Some(protocol);
		}
		Ok((SessionId::new(id), Value::Object(caps)))
	}

	async fn update_settings(&self, settings: Settings) -> BackendResult<()> {
		if self.flag("rejectSettings") {
			return Err(BackendError::unknown("scripted settings failure"));
		}
		self.script.settings.lock().push(settings);
		Ok(())
	}

	fn start_new_command_timeout(&self) {}

	fn shutdown_signal(&self) -> ShutdownSignal {
		self.shutdown.subscribe()
	}

	async fn start_unexpected_shutdown(&self, reason: Option<String>) -> BackendResult<()> {
		self.script.aborts.fetch_add(1, Ordering::SeqCst);
		self.shutdown.notify(reason.unwrap_or_default());
		Ok(())
	}

	async fn delete_session(&self, _session_id: &SessionId, _siblings: Vec<DriverData>) -> BackendResult<Value> {
		self.script.deletes.fetch_add(1, Ordering::SeqCst);
		self.shutdown.cancel();
		if self.flag("failDelete") {
			return Err(BackendError::unknown("scripted delete failure"));
		}
		Ok(Value::Null)
	}

	async fn execute_command(&self, command: &str, _args: Vec<Value>) -> BackendResult<Value> {
		Err(BackendError::new("unknown method", format!("scripted backend cannot run {command}")))
	}
}

/// Built-in table with the fake backend and a scripted backend installed.
pub fn registry(script: &Arc<Script>) -> DriverRegistry {
	DriverRegistry::builtin()
		.with_factory(automation::FAKE, Arc::new(FakeDriverFactory))
		.with_factory(SCRIPTED, Arc::new(ScriptedFactory(Arc::clone(script))))
}

pub fn caps(value: Value) -> CapabilityMap {
	match value {
		Value::Object(map) => map,
		_ => panic!("capabilities must be a JSON object"),
	}
}

pub fn w3c(value: Value) -> NewSessionRequest {
	NewSessionRequest::w3c(W3cCapabilities {
		always_match: caps(value),
		first_match: Vec::new(),
	})
}

pub fn jsonwp(value: Value) -> NewSessionRequest {
	NewSessionRequest::jsonwp(caps(value))
}

pub fn scripted(extra: Value) -> NewSessionRequest {
	let mut map = caps(json!({ "platformName": "Fake", "appium:automationName": SCRIPTED }));
	map.extend(caps(extra));
	NewSessionRequest::w3c(W3cCapabilities {
		always_match: map,
		first_match: Vec::new(),
	})
}
