//! Build script for umbra-runtime
//!
//! Stamps build metadata reported by the status query. Values already present
//! in the environment (release pipelines export them) take precedence over
//! what can be discovered locally.

use std::env;
use std::process::Command;

fn main() {
	println!("cargo:rerun-if-changed=build.rs");
	println!("cargo:rerun-if-env-changed=UMBRA_BUILD_COMMIT");
	println!("cargo:rerun-if-env-changed=UMBRA_BUILD_DATE");
	println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");

	if let Some(commit) = env::var("UMBRA_BUILD_COMMIT").ok().or_else(git_commit) {
		println!("cargo:rustc-env=UMBRA_BUILD_COMMIT={commit}");
	}

	if let Some(date) = env::var("UMBRA_BUILD_DATE").ok().or_else(|| env::var("SOURCE_DATE_EPOCH").ok()) {
		println!("cargo:rustc-env=UMBRA_BUILD_DATE={date}");
	}
}

fn git_commit() -> Option<String> {
	let output = Command::new("git")
		.args(["rev-parse", "--short", "HEAD"])
		.output()
		.ok()?;
	if !output.status.success() {
		return None;
	}
	let commit = String::from_utf8(output.stdout).ok()?;
	let commit = commit.trim();
	if commit.is_empty() { None } else { Some(commit.to_string()) }
}
