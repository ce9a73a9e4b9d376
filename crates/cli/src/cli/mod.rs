
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Root CLI for umbra.
#[derive(Parser, Debug)]
#[command(name = "umbra")]
#[command(about = "Umbrella WebDriver session orchestrator")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Daemon socket path (defaults to a per-user runtime location)
	#[arg(long, global = true, value_name = "PATH")]
	pub socket: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the orchestrator daemon in the foreground.
	Serve(ServeArgs),
	/// Send one JSON request to a running daemon and print the reply.
	Call(CallArgs),
	/// List the automation engines this build knows about.
	Drivers,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
	/// Delete every existing session before creating a new one
	#[arg(long)]
	pub session_override: bool,

	/// Enable all insecure backend features unless denied
	#[arg(long)]
	pub relaxed_security: bool,

	/// Insecure features to enable
	#[arg(long, value_name = "FEATURES", value_delimiter = ',')]
	pub allow_insecure: Vec<String>,

	/// Insecure features to disable, even under --relaxed-security
	#[arg(long, value_name = "FEATURES", value_delimiter = ',')]
	pub deny_insecure: Vec<String>,

	/// Capabilities merged under every request: inline JSON or @path to a JSON file
	#[arg(long, value_name = "JSON|@FILE")]
	pub default_capabilities: Option<String>,

	/// Scratch directory for backends (exported as UMBRA_TMP_DIR)
	#[arg(long, value_name = "DIR")]
	pub tmp_dir: Option<PathBuf>,

	/// Route session existence and proxy queries through the registry lock
	#[arg(long)]
	pub strict_reads: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CallArgs {
	/// Request object, for example '{"type":"status"}'
	#[arg(value_name = "JSON")]
	pub request: String,
}
