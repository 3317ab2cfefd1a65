//! Client side of the daemon job interface.

use crucible_protocol::{JobRequest, JobResponse};

use crate::cli::SubmitArgs;
use crate::daemon;
use crate::error::{CliError, Result};

pub async fn run(args: SubmitArgs) -> Result<()> {
	let script = super::load_script(args.script, args.file)?;
	let response = daemon::send_request(
		args.socket,
		JobRequest::Execute {
			script,
			id: args.id,
		},
	)
	.await?;

	match response {
		JobResponse::Outcome { ref outcome, .. } => {
			let kind = outcome.failure_kind();
			println!("{}", serde_json::to_string_pretty(&response)?);
			match kind {
				Some(kind) => Err(CliError::ExecutionFailed { kind }),
				None => Ok(()),
			}
		}
		JobResponse::Error { code, message } => Err(CliError::Daemon { code, message }),
		_ => Err(CliError::UnexpectedResponse),
	}
}
