mod server;

pub use server::{serve, serve_on};

use std::path::PathBuf;

use crucible_protocol::{JobRequest, JobResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::error::{CliError, Result};

/// Returns the daemon socket path for the current user.
///
/// Uses `$XDG_RUNTIME_DIR/crucible.sock` if available (already
/// user-permissioned), otherwise falls back to a per-user path under the
/// system temp directory.
pub fn daemon_socket_path() -> PathBuf {
	if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
		return PathBuf::from(xdg_runtime).join("crucible.sock");
	}
	let user = std::env::var("USER").unwrap_or_else(|_| "default".to_string());
	std::env::temp_dir().join(format!("crucible-{user}.sock"))
}

/// Sends one request to the daemon and reads one reply.
pub async fn send_request(socket: Option<PathBuf>, request: JobRequest) -> Result<JobResponse> {
	let path = socket.unwrap_or_else(daemon_socket_path);
	let stream = UnixStream::connect(&path).await?;
	send_request_stream(stream, request).await
}

async fn send_request_stream<S>(mut stream: S, request: JobRequest) -> Result<JobResponse>
where
	S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
	let payload = serde_json::to_string(&request)?;
	stream.write_all(format!("{payload}\n").as_bytes()).await?;
	stream.flush().await?;

	let mut reader = BufReader::new(stream);
	let mut line = String::new();
	reader.read_line(&mut line).await?;
	Ok(serde_json::from_str(&line)?)
}

/// Asks a running daemon to shut down.
pub async fn stop(socket: Option<PathBuf>) -> Result<()> {
	match send_request(socket, JobRequest::Shutdown).await? {
		JobResponse::Ok => {
			println!("daemon stopping");
			Ok(())
		}
		JobResponse::Error { code, message } => Err(CliError::Daemon { code, message }),
		_ => Err(CliError::UnexpectedResponse),
	}
}

/// Prints queue depth and per-state counts from a running daemon.
pub async fn status(socket: Option<PathBuf>) -> Result<()> {
	let response = send_request(socket, JobRequest::Status).await?;
	match response {
		JobResponse::Status { .. } => {
			println!("{}", serde_json::to_string_pretty(&response)?);
			Ok(())
		}
		JobResponse::Error { code, message } => Err(CliError::Daemon { code, message }),
		_ => Err(CliError::UnexpectedResponse),
	}
}
