//! Server arguments assembled from command-line flags.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use umbra_protocol::CapabilityMap;
use umbra_runtime::{ReadPolicy, ServerArgs};

use crate::cli::ServeArgs;

/// Environment variable backends read their scratch directory from.
pub const TMP_DIR_ENV: &str = "UMBRA_TMP_DIR";

pub fn server_args(args: &ServeArgs) -> Result<ServerArgs> {
	let default_capabilities = match args.default_capabilities.as_deref() {
		Some(raw) => parse_default_capabilities(raw)?,
		None => CapabilityMap::new(),
	};

	Ok(ServerArgs {
		session_override: args.session_override,
		relaxed_security: args.relaxed_security,
		allow_insecure: args.allow_insecure.clone(),
		deny_insecure: args.deny_insecure.clone(),
		default_capabilities,
		tmp_dir: args.tmp_dir.clone(),
		read_policy: if args.strict_reads {
			ReadPolicy::Locked
		} else {
			ReadPolicy::Relaxed
		},
	})
}

/// Parses inline JSON, or the contents of the file named after a leading `@`.
pub fn parse_default_capabilities(raw: &str) -> Result<CapabilityMap> {
	let (source, text) = match raw.strip_prefix('@') {
		Some(path) => (path, read_file(Path::new(path))?),
		None => ("--default-capabilities", raw.to_string()),
	};

	let value: Value =
		serde_json::from_str(&text).with_context(|| format!("Failed to parse default capabilities from {source}"))?;
	match value {
		Value::Object(map) => Ok(map),
		other => bail!("Default capabilities must be a JSON object, got: {other}"),
	}
}

fn read_file(path: &Path) -> Result<String> {
	std::fs::read_to_string(path)
		.with_context(|| format!("Failed to read default capabilities file: {}", path.display()))
}
