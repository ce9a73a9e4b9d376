use anyhow::{Context, Result};
use clap::Parser;
use umbra::UmbrellaDriver;
use umbra_cli::cli::{Cli, Commands};
use umbra_cli::{config, daemon, logging};
use umbra_runtime::ServerArgs;

fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = run(cli) {
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}

fn run(cli: Cli) -> Result<()> {
	let socket = cli.socket.clone().unwrap_or_else(daemon::default_socket_path);

	match cli.command {
		Commands::Serve(args) => {
			let server_args = config::server_args(&args)?;
			if let Some(dir) = &server_args.tmp_dir {
				// SAFETY: no other threads exist yet; the runtime is built below.
				unsafe { std::env::set_var(config::TMP_DIR_ENV, dir) };
			}
			runtime()?.block_on(async move {
				let umbrella = UmbrellaDriver::new(server_args);
				daemon::Daemon::start(umbrella, socket).await?.run().await
			})
		}
		Commands::Call(args) => runtime()?.block_on(async move {
			let response = daemon::send_request(&socket, &args.request).await?;
			println!("{}", serde_json::to_string_pretty(&response)?);
			Ok(())
		}),
		Commands::Drivers => {
			let umbrella = UmbrellaDriver::new(ServerArgs::default());
			for descriptor in umbrella.registry().descriptors() {
				let installed = if umbrella.registry().is_installed(&descriptor.automation_name) {
					"installed"
				} else {
					"-"
				};
				println!(
					"{:<14} {:<28} {:<30} {installed}",
					descriptor.automation_name, descriptor.driver_name, descriptor.package
				);
			}
			Ok(())
		}
	}
}

fn runtime() -> Result<tokio::runtime::Runtime> {
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("Failed to start async runtime")
}
