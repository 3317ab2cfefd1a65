//! Daemon serving the job interface over a unix socket.
//!
//! One JSON object per line in both directions. Execute replies carry the
//! request id and are written as each job completes, so a pipelining client
//! may see outcomes out of submission order.

use std::path::PathBuf;
use std::sync::Arc;

use crucible::{BrowserEngine, CdpEngine, Dispatcher, DispatcherConfig, ExecutionRequest, RequestId};
use crucible_protocol::{JobRequest, JobResponse, LaunchConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use crate::cli::DaemonStartArgs;
use crate::error::Result;

/// Launches the production engine and runs the daemon until a shutdown
/// message or signal arrives.
pub async fn serve(args: DaemonStartArgs) -> Result<()> {
	let config = DispatcherConfig {
		pool_size: args.pool_size,
		eval_timeout_ms: args.timeout_ms,
		isolation: args.isolation.into(),
	};
	let launch = LaunchConfig {
		headless: !args.headed,
		sandbox_disabled: !args.sandbox,
	};

	let dispatcher = Dispatcher::new(CdpEngine::new(), launch, config);
	// A launch failure here is fatal and belongs to the operator.
	dispatcher.start().await?;

	let socket_path = args.socket.unwrap_or_else(super::daemon_socket_path);
	serve_on(dispatcher, socket_path).await
}

/// Serves an already-started dispatcher on `socket_path`.
///
/// Generic over the engine so the wire protocol can be exercised with the
/// mock engine in tests.
pub async fn serve_on<E: BrowserEngine>(
	dispatcher: Dispatcher<E>,
	socket_path: PathBuf,
) -> Result<()> {
	if socket_path.exists() {
		std::fs::remove_file(&socket_path)?;
	}
	if let Some(parent) = socket_path.parent() {
		if !parent.exists() {
			std::fs::create_dir_all(parent)?;
		}
	}
	let listener = UnixListener::bind(&socket_path)?;
	info!(
		target = "crucible.daemon",
		socket = %socket_path.display(),
		"daemon listening"
	);

	let dispatcher = Arc::new(dispatcher);
	let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
	let mut sigterm = signal(SignalKind::terminate())?;
	let mut sigint = signal(SignalKind::interrupt())?;

	loop {
		tokio::select! {
			_ = shutdown_rx.changed() => {
				if *shutdown_rx.borrow() {
					info!(target = "crucible.daemon", "shutdown requested via message");
					break;
				}
			}
			_ = sigterm.recv() => {
				info!(target = "crucible.daemon", "received SIGTERM, shutting down");
				break;
			}
			_ = sigint.recv() => {
				info!(target = "crucible.daemon", "received SIGINT, shutting down");
				break;
			}
			accept = listener.accept() => {
				let (stream, _) = accept?;
				let dispatcher = Arc::clone(&dispatcher);
				let shutdown_tx = shutdown_tx.clone();
				tokio::spawn(async move {
					if let Err(err) = handle_client(stream, dispatcher, shutdown_tx).await {
						warn!(target = "crucible.daemon", error = %err, "daemon connection error");
					}
				});
			}
		}
	}

	// Drain or force-close everything in flight before releasing the engine.
	dispatcher.shutdown().await;
	let _ = std::fs::remove_file(&socket_path);
	Ok(())
}

async fn handle_client<E: BrowserEngine>(
	stream: UnixStream,
	dispatcher: Arc<Dispatcher<E>>,
	shutdown_tx: watch::Sender<bool>,
) -> Result<()> {
	let (read_half, write_half) = stream.into_split();
	let mut reader = BufReader::new(read_half);
	let writer = Arc::new(Mutex::new(write_half));
	let mut line = String::new();

	loop {
		line.clear();
		let bytes = reader.read_line(&mut line).await?;
		if bytes == 0 {
			break;
		}

		let request = match serde_json::from_str::<JobRequest>(line.trim_end()) {
			Ok(request) => request,
			Err(err) => {
				let response = JobResponse::Error {
					code: "invalid_request".to_string(),
					message: err.to_string(),
				};
				write_response(&writer, &response).await?;
				continue;
			}
		};

		match request {
			JobRequest::Execute { script, id } => {
				// Answered from its own task so a slow script does not block
				// this connection; the reply is correlated by id.
				let dispatcher = Arc::clone(&dispatcher);
				let writer = Arc::clone(&writer);
				tokio::spawn(async move {
					let response = execute_request(&dispatcher, script, id).await;
					if let Err(err) = write_response(&writer, &response).await {
						warn!(target = "crucible.daemon", error = %err, "failed writing outcome");
					}
				});
			}
			other => {
				let response = handle_request(&dispatcher, &shutdown_tx, other);
				write_response(&writer, &response).await?;
			}
		}
	}

	Ok(())
}

async fn execute_request<E: BrowserEngine>(
	dispatcher: &Dispatcher<E>,
	script: String,
	id: Option<String>,
) -> JobResponse {
	let request = match id {
		Some(id) => ExecutionRequest::with_id(RequestId::new(id), script),
		None => ExecutionRequest::new(script),
	};
	let id = request.id.to_string();
	match dispatcher.submit_request(request) {
		Ok(handle) => match handle.outcome().await {
			Ok(outcome) => JobResponse::Outcome { id, outcome },
			Err(err) => JobResponse::Error {
				code: "dispatch_failed".to_string(),
				message: err.to_string(),
			},
		},
		Err(err) => JobResponse::Error {
			code: "rejected".to_string(),
			message: err.to_string(),
		},
	}
}

fn handle_request<E: BrowserEngine>(
	dispatcher: &Dispatcher<E>,
	shutdown_tx: &watch::Sender<bool>,
	request: JobRequest,
) -> JobResponse {
	match request {
		JobRequest::Ping => JobResponse::Pong,
		JobRequest::Cancel { id } => {
			if dispatcher.cancel(&RequestId::new(id)) {
				JobResponse::Ok
			} else {
				JobResponse::Error {
					code: "not_found".to_string(),
					message: "no queued or running request with that id".to_string(),
				}
			}
		}
		JobRequest::Status => {
			let stats = dispatcher.stats();
			JobResponse::Status {
				queued: stats.queued,
				running: stats.running,
				completed: stats.completed,
				failed: stats.failed,
			}
		}
		JobRequest::Shutdown => {
			let _ = shutdown_tx.send(true);
			JobResponse::Ok
		}
		// Execute is handled on its own task by the connection loop.
		JobRequest::Execute { .. } => JobResponse::Error {
			code: "internal".to_string(),
			message: "execute must be dispatched asynchronously".to_string(),
		},
	}
}

async fn write_response(
	writer: &Arc<Mutex<OwnedWriteHalf>>,
	response: &JobResponse,
) -> Result<()> {
	let payload = serde_json::to_string(response)?;
	let mut writer = writer.lock().await;
	writer.write_all(format!("{payload}\n").as_bytes()).await?;
	writer.flush().await?;
	Ok(())
}
