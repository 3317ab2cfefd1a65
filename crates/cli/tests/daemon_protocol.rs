//! Wire-protocol tests for the daemon, driven with the mock engine.

use std::path::PathBuf;
use std::time::Duration;

use crucible::testing::MockEngine;
use crucible::{Dispatcher, DispatcherConfig, LaunchConfig};
use crucible_cli::daemon::{self, serve_on};
use crucible_protocol::{ExecutionOutcome, FailureKind, JobRequest, JobResponse};
use tempfile::TempDir;
use tokio::task::JoinHandle;

struct TestDaemon {
	// Held for the lifetime of the daemon so the socket dir survives.
	_dir: TempDir,
	socket: PathBuf,
	server: JoinHandle<()>,
}

async fn start_daemon(pool_size: usize) -> TestDaemon {
	let dir = TempDir::new().unwrap();
	let socket = dir.path().join("crucible.sock");

	let dispatcher = Dispatcher::new(
		MockEngine::new(),
		LaunchConfig::default(),
		DispatcherConfig {
			pool_size,
			..DispatcherConfig::default()
		},
	);
	dispatcher.start().await.unwrap();

	let server = tokio::spawn({
		let socket = socket.clone();
		async move {
			serve_on(dispatcher, socket).await.unwrap();
		}
	});

	for _ in 0..200 {
		if socket.exists() {
			break;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	assert!(socket.exists(), "daemon socket never appeared");

	TestDaemon {
		_dir: dir,
		socket,
		server,
	}
}

async fn request(daemon: &TestDaemon, request: JobRequest) -> JobResponse {
	daemon::send_request(Some(daemon.socket.clone()), request)
		.await
		.unwrap()
}

#[tokio::test]
async fn ping_answers_pong() {
	let daemon = start_daemon(2).await;
	assert!(matches!(request(&daemon, JobRequest::Ping).await, JobResponse::Pong));
	request(&daemon, JobRequest::Shutdown).await;
	daemon.server.await.unwrap();
}

#[tokio::test]
async fn execute_returns_a_correlated_success_outcome() {
	let daemon = start_daemon(2).await;

	let response = request(
		&daemon,
		JobRequest::Execute {
			script: "1+1".to_string(),
			id: Some("my-job".to_string()),
		},
	)
	.await;

	match response {
		JobResponse::Outcome { id, outcome } => {
			assert_eq!(id, "my-job");
			assert_eq!(outcome, ExecutionOutcome::success(serde_json::json!(2)));
		}
		other => panic!("unexpected response: {other:?}"),
	}

	request(&daemon, JobRequest::Shutdown).await;
	daemon.server.await.unwrap();
}

#[tokio::test]
async fn execute_reports_script_errors_as_failure_outcomes() {
	let daemon = start_daemon(2).await;

	let response = request(
		&daemon,
		JobRequest::Execute {
			script: "throw new Error('x')".to_string(),
			id: None,
		},
	)
	.await;

	match response {
		JobResponse::Outcome { outcome, .. } => {
			assert_eq!(outcome.failure_kind(), Some(FailureKind::Evaluation));
			match outcome {
				ExecutionOutcome::Failure { message, .. } => assert!(message.contains('x')),
				other => panic!("unexpected outcome: {other:?}"),
			}
		}
		other => panic!("unexpected response: {other:?}"),
	}

	request(&daemon, JobRequest::Shutdown).await;
	daemon.server.await.unwrap();
}

#[tokio::test]
async fn concurrent_submissions_each_get_their_own_outcome() {
	let daemon = start_daemon(2).await;

	let mut join = Vec::new();
	for i in 0..5 {
		let socket = daemon.socket.clone();
		join.push(tokio::spawn(async move {
			daemon::send_request(
				Some(socket),
				JobRequest::Execute {
					script: "sleep:20".to_string(),
					id: Some(format!("req-{i}")),
				},
			)
			.await
			.unwrap()
		}));
	}

	let mut seen = Vec::new();
	for task in join {
		match task.await.unwrap() {
			JobResponse::Outcome { id, outcome } => {
				assert!(outcome.is_success());
				seen.push(id);
			}
			other => panic!("unexpected response: {other:?}"),
		}
	}
	seen.sort();
	assert_eq!(seen, ["req-0", "req-1", "req-2", "req-3", "req-4"]);

	request(&daemon, JobRequest::Shutdown).await;
	daemon.server.await.unwrap();
}

#[tokio::test]
async fn status_reports_counts() {
	let daemon = start_daemon(1).await;

	request(
		&daemon,
		JobRequest::Execute {
			script: "1+1".to_string(),
			id: None,
		},
	)
	.await;

	match request(&daemon, JobRequest::Status).await {
		JobResponse::Status {
			queued,
			running,
			completed,
			failed,
		} => {
			assert_eq!(queued, 0);
			assert_eq!(running, 0);
			assert_eq!(completed, 1);
			assert_eq!(failed, 0);
		}
		other => panic!("unexpected response: {other:?}"),
	}

	request(&daemon, JobRequest::Shutdown).await;
	daemon.server.await.unwrap();
}

#[tokio::test]
async fn cancel_of_unknown_id_is_an_error_response() {
	let daemon = start_daemon(1).await;

	match request(
		&daemon,
		JobRequest::Cancel {
			id: "no-such-job".to_string(),
		},
	)
	.await
	{
		JobResponse::Error { code, .. } => assert_eq!(code, "not_found"),
		other => panic!("unexpected response: {other:?}"),
	}

	request(&daemon, JobRequest::Shutdown).await;
	daemon.server.await.unwrap();
}

#[tokio::test]
async fn malformed_lines_get_an_invalid_request_error() {
	use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
	use tokio::net::UnixStream;

	let daemon = start_daemon(1).await;

	let mut stream = UnixStream::connect(&daemon.socket).await.unwrap();
	stream.write_all(b"not json at all\n").await.unwrap();
	stream.flush().await.unwrap();

	let mut reader = BufReader::new(&mut stream);
	let mut line = String::new();
	reader.read_line(&mut line).await.unwrap();
	match serde_json::from_str::<JobResponse>(&line).unwrap() {
		JobResponse::Error { code, .. } => assert_eq!(code, "invalid_request"),
		other => panic!("unexpected response: {other:?}"),
	}

	request(&daemon, JobRequest::Shutdown).await;
	daemon.server.await.unwrap();
}

#[tokio::test]
async fn shutdown_removes_the_socket() {
	let daemon = start_daemon(1).await;
	request(&daemon, JobRequest::Shutdown).await;
	daemon.server.await.unwrap();
	assert!(!daemon.socket.exists());
}
