mod protocol;
mod server;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
pub use protocol::{DaemonRequest, DaemonResponse};
pub use server::Daemon;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
#[cfg(windows)]
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

pub const DAEMON_TCP_PORT: u16 = 4723;

/// Returns the daemon socket path for the current user.
///
/// Uses `$XDG_RUNTIME_DIR/umbra.sock` if available (already user-permissioned),
/// otherwise falls back to `/tmp/umbra-{uid}.sock`.
#[cfg(unix)]
pub fn default_socket_path() -> PathBuf {
	if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
		return PathBuf::from(xdg_runtime).join("umbra.sock");
	}

	let uid = unsafe { libc::getuid() };
	PathBuf::from(format!("/tmp/umbra-{uid}.sock"))
}

#[cfg(windows)]
pub fn default_socket_path() -> PathBuf {
	PathBuf::from(format!("127.0.0.1:{DAEMON_TCP_PORT}"))
}

/// Sends one raw JSON request line to a running daemon.
pub async fn send_request(socket: &Path, request: &str) -> Result<DaemonResponse> {
	let request: DaemonRequest = serde_json::from_str(request).context("Invalid daemon request")?;
	let stream = connect_daemon(socket)
		.await
		.with_context(|| format!("Failed to connect to daemon at {}", socket.display()))?;
	send_request_stream(stream, &request).await
}

#[cfg(unix)]
async fn connect_daemon(socket: &Path) -> std::io::Result<UnixStream> {
	UnixStream::connect(socket).await
}

#[cfg(windows)]
async fn connect_daemon(_socket: &Path) -> std::io::Result<TcpStream> {
	TcpStream::connect(("127.0.0.1", DAEMON_TCP_PORT)).await
}

async fn send_request_stream<S>(mut stream: S, request: &DaemonRequest) -> Result<DaemonResponse>
where
	S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
	let payload = serde_json::to_string(request).context("Failed to serialize daemon request")?;
	stream
		.write_all(format!("{payload}\n").as_bytes())
		.await
		.context("Failed writing daemon request")?;
	stream.flush().await.context("Failed flushing daemon request")?;

	let mut reader = BufReader::new(stream);
	let mut line = String::new();
	reader
		.read_line(&mut line)
		.await
		.context("Failed reading daemon response")?;
	let response = serde_json::from_str(&line).context("Failed parsing daemon response")?;
	Ok(response)
}
