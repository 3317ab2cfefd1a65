//! One-shot execution: launch, evaluate, tear down, print.

use std::sync::Arc;
use std::time::Duration;

use crucible::{CdpEngine, ContextManager, ExecutionRequest, ExecutionUnit, LaunchConfig};
use tracing::info;

use crate::cli::ExecArgs;
use crate::error::{CliError, Result};

pub async fn run(args: ExecArgs) -> Result<()> {
	let script = super::load_script(args.script, args.file)?;
	let config = LaunchConfig {
		headless: !args.headed,
		sandbox_disabled: !args.sandbox,
	};

	let manager = ContextManager::new(Arc::new(CdpEngine::new()), config);
	manager.start().await?;

	let unit = ExecutionUnit::new(Duration::from_millis(args.timeout_ms));
	let request = ExecutionRequest::new(script);
	info!(target = "crucible.cli", id = %request.id, "executing script");
	let outcome = unit.run(&manager, &request).await;
	manager.stop().await;

	println!("{}", serde_json::to_string_pretty(&outcome)?);
	match outcome.failure_kind() {
		Some(kind) => Err(CliError::ExecutionFailed { kind }),
		None => Ok(()),
	}
}
