use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
#[cfg(windows)]
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use umbra::{CleanupOptions, UmbrellaDriver};
use umbra_protocol::{Envelope, WireEnvelope};
use umbra_runtime::Error;

#[cfg(windows)]
use super::DAEMON_TCP_PORT;
use super::protocol::{DaemonRequest, DaemonResponse};

pub(crate) const SHUTDOWN_REASON: &str = "server shutting down";

pub struct Daemon {
	umbrella: Arc<UmbrellaDriver>,
	socket_path: PathBuf,
	shutdown_tx: watch::Sender<bool>,
	shutdown_rx: watch::Receiver<bool>,
	#[cfg(unix)]
	listener: UnixListener,
	#[cfg(windows)]
	listener: TcpListener,
}

impl Daemon {
	pub async fn start(umbrella: UmbrellaDriver, socket_path: PathBuf) -> Result<Self> {
		let (shutdown_tx, shutdown_rx) = watch::channel(false);

		#[cfg(unix)]
		{
			if socket_path.exists() {
				std::fs::remove_file(&socket_path)
					.with_context(|| format!("Failed to remove existing socket: {}", socket_path.display()))?;
			}
			if let Some(parent) = socket_path.parent() {
				if !parent.as_os_str().is_empty() && !parent.exists() {
					std::fs::create_dir_all(parent)
						.with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;
				}
			}
			let listener = UnixListener::bind(&socket_path)
				.with_context(|| format!("Failed to bind daemon socket: {}", socket_path.display()))?;
			info!(
				target: "umbra.daemon",
				version = %umbra_runtime::build_info::version_string(),
				socket = %socket_path.display(),
				"daemon listening"
			);
			Ok(Self {
				umbrella: Arc::new(umbrella),
				socket_path,
				shutdown_tx,
				shutdown_rx,
				listener,
			})
		}

		#[cfg(windows)]
		{
			let addr = format!("127.0.0.1:{DAEMON_TCP_PORT}");
			let listener = TcpListener::bind(&addr)
				.await
				.with_context(|| format!("Failed to bind daemon TCP socket: {addr}"))?;
			info!(target: "umbra.daemon", addr, "daemon listening");
			Ok(Self {
				umbrella: Arc::new(umbrella),
				socket_path,
				shutdown_tx,
				shutdown_rx,
				listener,
			})
		}
	}

	pub async fn run(mut self) -> Result<()> {
		let result = self.accept_loop().await;

		if !*self.shutdown_rx.borrow() {
			let report = self
				.umbrella
				.delete_all_sessions(CleanupOptions::force(SHUTDOWN_REASON))
				.await;
			info!(target: "umbra.daemon", attempted = report.attempted, failed = report.failures.len(), "sessions cleaned up");
		}

		#[cfg(unix)]
		{
			if let Err(err) = std::fs::remove_file(&self.socket_path) {
				debug!(target: "umbra.daemon", error = %err, "socket cleanup failed");
			}
		}
		result
	}

	#[cfg(unix)]
	async fn accept_loop(&mut self) -> Result<()> {
		use tokio::signal::unix::{SignalKind, signal};

		let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
		let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

		loop {
			tokio::select! {
				_ = self.shutdown_rx.changed() => {
					if *self.shutdown_rx.borrow() {
						info!(target: "umbra.daemon", "shutdown requested via message");
						break;
					}
				}
				_ = sigterm.recv() => {
					info!(target: "umbra.daemon", "received SIGTERM, shutting down");
					break;
				}
				_ = sigint.recv() => {
					info!(target: "umbra.daemon", "received SIGINT, shutting down");
					break;
				}
				accept = self.listener.accept() => {
					let (stream, _) = accept.context("Daemon accept failed")?;
					self.spawn_client(stream);
				}
			}
		}

		Ok(())
	}

	#[cfg(windows)]
	async fn accept_loop(&mut self) -> Result<()> {
		loop {
			tokio::select! {
				_ = self.shutdown_rx.changed() => {
					if *self.shutdown_rx.borrow() {
						info!(target: "umbra.daemon", "shutdown requested via message");
						break;
					}
				}
				_ = tokio::signal::ctrl_c() => {
					info!(target: "umbra.daemon", "received Ctrl+C, shutting down");
					break;
				}
				accept = self.listener.accept() => {
					let (stream, _) = accept.context("Daemon accept failed")?;
					self.spawn_client(stream);
				}
			}
		}

		Ok(())
	}

	fn spawn_client<S>(&self, stream: S)
	where
		S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
	{
		let umbrella = Arc::clone(&self.umbrella);
		let shutdown_tx = self.shutdown_tx.clone();
		tokio::spawn(async move {
			if let Err(err) = handle_client(stream, umbrella, shutdown_tx).await {
				warn!(target: "umbra.daemon", error = %err, "daemon connection error");
			}
		});
	}
}

async fn handle_client<S>(stream: S, umbrella: Arc<UmbrellaDriver>, shutdown_tx: watch::Sender<bool>) -> Result<()>
where
	S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
	let (read_half, mut write_half) = tokio::io::split(stream);
	let mut reader = BufReader::new(read_half);
	let mut line = String::new();

	loop {
		line.clear();
		let bytes = reader
			.read_line(&mut line)
			.await
			.context("Failed reading daemon request")?;
		if bytes == 0 {
			break;
		}
		if line.trim().is_empty() {
			continue;
		}

		let response = match serde_json::from_str::<DaemonRequest>(line.trim_end()) {
			Ok(request) => handle_request(&umbrella, &shutdown_tx, request).await,
			Err(err) => WireEnvelope::failure(None, "invalid argument", format!("Malformed daemon request: {err}")),
		};
		write_response(&mut write_half, &response).await?;
	}

	Ok(())
}

async fn write_response<W>(writer: &mut W, response: &DaemonResponse) -> Result<()>
where
	W: tokio::io::AsyncWrite + Unpin,
{
	let payload = serde_json::to_string(response).context("Failed to serialize response")?;
	writer
		.write_all(format!("{payload}\n").as_bytes())
		.await
		.context("Failed writing daemon response")?;
	writer.flush().await.context("Failed flushing daemon response")?;
	Ok(())
}

async fn handle_request(
	umbrella: &UmbrellaDriver,
	shutdown_tx: &watch::Sender<bool>,
	request: DaemonRequest,
) -> DaemonResponse {
	debug!(target: "umbra.daemon", ?request, "handling request");
	match request {
		DaemonRequest::Status => plain(umbrella.status()),
		DaemonRequest::CreateSession { request } => umbrella.create_session(request).await.to_wire(),
		DaemonRequest::DeleteSession { session_id } => umbrella.delete_session(&session_id).await.to_wire(),
		DaemonRequest::Execute { command, args } => umbrella.execute_command(&command, args).await.to_wire(),
		DaemonRequest::ListSessions => plain(json!(umbrella.sessions().await)),
		DaemonRequest::Shutdown => {
			let report = umbrella
				.delete_all_sessions(CleanupOptions::force(SHUTDOWN_REASON))
				.await;
			let _ = shutdown_tx.send(true);
			plain(json!(report))
		}
	}
}

fn plain(value: Value) -> DaemonResponse {
	Envelope::<Value, Error>::value(None, value).to_wire()
}

#[cfg(test)]
mod tests {
	use umbra_runtime::ServerArgs;

	use super::*;

	fn request(value: Value) -> DaemonRequest {
		serde_json::from_value(value).unwrap()
	}

	#[tokio::test]
	async fn status_is_answered_without_sessions() {
		let umbrella = UmbrellaDriver::new(ServerArgs::default());
		let (tx, _rx) = watch::channel(false);
		let response = handle_request(&umbrella, &tx, request(json!({"type": "status"}))).await;
		assert!(response.is_ok());
		assert!(response.value.unwrap()["build"]["version"].is_string());
	}

	#[tokio::test]
	async fn session_lifecycle_over_requests() {
		let umbrella = UmbrellaDriver::new(ServerArgs::default());
		let (tx, _rx) = watch::channel(false);

		let created = handle_request(
			&umbrella,
			&tx,
			request(json!({"type": "create_session", "capabilities": {"alwaysMatch": {"platformName": "Fake"}}})),
		)
		.await;
		assert_eq!(created.protocol, Some(umbra_protocol::Protocol::W3c));
		let id = created.value.unwrap()[0].as_str().unwrap().to_string();

		let listed = handle_request(&umbrella, &tx, request(json!({"type": "list_sessions"}))).await;
		assert_eq!(listed.value.unwrap()[0]["id"], json!(id));

		let deleted = handle_request(&umbrella, &tx, request(json!({"type": "delete_session", "session_id": id}))).await;
		assert!(deleted.is_ok());

		let missing = handle_request(
			&umbrella,
			&tx,
			request(json!({"type": "execute", "command": "getSession", "args": [id]})),
		)
		.await;
		assert_eq!(missing.error.unwrap().error, "invalid session id");
	}

	#[tokio::test]
	async fn shutdown_request_cleans_up_and_signals() {
		let umbrella = UmbrellaDriver::new(ServerArgs::default());
		let (tx, rx) = watch::channel(false);
		handle_request(
			&umbrella,
			&tx,
			request(json!({"type": "create_session", "desiredCapabilities": {"platformName": "Fake"}})),
		)
		.await;

		let response = handle_request(&umbrella, &tx, request(json!({"type": "shutdown"}))).await;
		assert_eq!(response.value.unwrap()["attempted"], json!(1));
		assert!(*rx.borrow());
	}

	#[tokio::test]
	async fn client_lines_get_one_reply_each() {
		let umbrella = Arc::new(UmbrellaDriver::new(ServerArgs::default()));
		let (tx, _rx) = watch::channel(false);
		let (client, server) = tokio::io::duplex(4096);
		let task = tokio::spawn(handle_client(server, umbrella, tx));

		let (read_half, mut write_half) = tokio::io::split(client);
		write_half
			.write_all(b"{\"type\":\"status\"}\nnot json\n")
			.await
			.unwrap();
		write_half.shutdown().await.unwrap();

		let mut lines = BufReader::new(read_half).lines();
		let first: WireEnvelope = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
		assert!(first.is_ok());
		let second: WireEnvelope = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
		assert_eq!(second.error.unwrap().error, "invalid argument");
		assert!(lines.next_line().await.unwrap().is_none());

		task.await.unwrap().unwrap();
	}
}
