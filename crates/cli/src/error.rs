use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("no script provided (pass SCRIPT or --file)")]
	MissingScript,

	#[error("failed to read script file: {path}")]
	ScriptFile {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("script execution failed ({kind})")]
	ExecutionFailed { kind: crucible::FailureKind },

	#[error("daemon error {code}: {message}")]
	Daemon { code: String, message: String },

	#[error("unexpected daemon response")]
	UnexpectedResponse,

	#[error(transparent)]
	Engine(#[from] crucible::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}
