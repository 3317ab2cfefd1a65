mod exec;
mod submit;

use std::path::PathBuf;

use crate::cli::{Cli, Commands, DaemonAction};
use crate::daemon;
use crate::error::{CliError, Result};

pub async fn dispatch(cli: Cli) -> Result<()> {
	match cli.command {
		Commands::Exec(args) => exec::run(args).await,
		Commands::Submit(args) => submit::run(args).await,
		Commands::Daemon(args) => match args.action {
			DaemonAction::Start(args) => daemon::serve(args).await,
			DaemonAction::Stop { socket } => daemon::stop(socket).await,
			DaemonAction::Status { socket } => daemon::status(socket).await,
		},
	}
}

/// Resolves the script payload from a positional argument or a file.
pub(crate) fn load_script(script: Option<String>, file: Option<PathBuf>) -> Result<String> {
	if let Some(script) = script {
		return Ok(script);
	}
	let Some(path) = file else {
		return Err(CliError::MissingScript);
	};
	std::fs::read_to_string(&path).map_err(|source| CliError::ScriptFile { path, source })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn load_script_prefers_inline_payload() {
		let script = load_script(Some("1+1".into()), None).unwrap();
		assert_eq!(script, "1+1");
	}

	#[test]
	fn load_script_requires_a_source() {
		assert!(matches!(load_script(None, None), Err(CliError::MissingScript)));
	}

	#[test]
	fn load_script_reports_missing_file() {
		let err = load_script(None, Some("/definitely/missing/payload.js".into())).unwrap_err();
		assert!(err.to_string().contains("failed to read script file"));
	}
}
