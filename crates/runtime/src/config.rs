//! Server-level arguments handed to the orchestrator and every backend.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use umbra_protocol::CapabilityMap;

/// How hot-path session lookups interact with the session registry lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadPolicy {
	/// Existence and proxy queries read without entering the critical section
	/// and may observe a registry mid-mutation.
	#[default]
	Relaxed,
	/// Every read enters the critical section.
	Locked,
}

/// Server arguments shared by the orchestrator and instantiated backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerArgs {
	/// Terminate every existing session before creating a new one.
	pub session_override: bool,
	/// Enable all insecure backend features unless explicitly denied.
	pub relaxed_security: bool,
	/// Insecure features explicitly enabled.
	pub allow_insecure: Vec<String>,
	/// Insecure features explicitly disabled; wins over everything else.
	pub deny_insecure: Vec<String>,
	/// Operator default capabilities merged under every client request.
	pub default_capabilities: CapabilityMap,
	/// Scratch directory exported to backends.
	pub tmp_dir: Option<PathBuf>,
	pub read_policy: ReadPolicy,
}

impl ServerArgs {
	/// Security flags applied to each backend instance.
	pub fn security_policy(&self) -> SecurityPolicy {
		SecurityPolicy {
			relaxed: self.relaxed_security,
			allow: self.allow_insecure.clone(),
			deny: self.deny_insecure.clone(),
		}
	}
}

/// Insecure-feature gating for one backend instance.
///
/// Only ever derived from server arguments; client capabilities cannot
/// influence it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityPolicy {
	pub relaxed: bool,
	pub allow: Vec<String>,
	pub deny: Vec<String>,
}

impl SecurityPolicy {
	pub fn is_feature_enabled(&self, feature: &str) -> bool {
		if self.deny.iter().any(|f| f == feature) {
			return false;
		}
		self.relaxed || self.allow.iter().any(|f| f == feature)
	}
}
