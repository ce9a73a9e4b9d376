use serde::Serialize;

// ============================================================================
// Constants
// ============================================================================

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = match option_env!("UMBRA_BUILD_COMMIT") {
	Some(c) => c,
	None => "unknown",
};
pub const BUILD_DATE: &str = match option_env!("UMBRA_BUILD_DATE") {
	Some(d) => d,
	None => "unknown",
};

/// Full version string including commit and build date.
pub fn version_string() -> String {
	format!("{} (commit: {}, built: {})", VERSION, COMMIT, BUILD_DATE)
}

// ============================================================================
// BuildInfo
// ============================================================================

/// Build metadata answered by the status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
	pub version: String,
	#[serde(rename = "git-sha")]
	pub commit: String,
	pub built: String,
}

impl BuildInfo {
	/// Metadata stamped into this binary at compile time.
	pub fn compiled() -> Self {
		Self {
			version: VERSION.to_string(),
			commit: COMMIT.to_string(),
			built: BUILD_DATE.to_string(),
		}
	}
}

impl Default for BuildInfo {
	fn default() -> Self {
		Self::compiled()
	}
}

// ============================================================================
// Tests
// ============================================================================
