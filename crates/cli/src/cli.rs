use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use crucible::IsolationMode;

/// Root CLI for the crucible execution engine.
#[derive(Parser, Debug)]
#[command(name = "crucible")]
#[command(about = "Isolated script execution over disposable browser contexts")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Launch a browser, execute one script, print the outcome.
	Exec(ExecArgs),
	/// Submit a script to a running daemon and print the outcome.
	Submit(SubmitArgs),
	/// Manage the execution daemon.
	Daemon(DaemonArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
	/// Script payload to evaluate.
	#[arg(value_name = "SCRIPT", conflicts_with = "file")]
	pub script: Option<String>,

	/// Read the script payload from a file.
	#[arg(long, value_name = "FILE")]
	pub file: Option<PathBuf>,

	/// Execution bound in milliseconds.
	#[arg(long, value_name = "MS", default_value_t = crucible::DEFAULT_EVAL_TIMEOUT_MS)]
	pub timeout_ms: u64,

	/// Run the browser with a visible window.
	#[arg(long)]
	pub headed: bool,

	/// Keep the engine sandbox enabled (disabled by default for constrained hosts).
	#[arg(long)]
	pub sandbox: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
	/// Script payload to evaluate.
	#[arg(value_name = "SCRIPT", conflicts_with = "file")]
	pub script: Option<String>,

	/// Read the script payload from a file.
	#[arg(long, value_name = "FILE")]
	pub file: Option<PathBuf>,

	/// Correlation id; generated by the daemon when omitted.
	#[arg(long, value_name = "ID")]
	pub id: Option<String>,

	/// Daemon socket path override.
	#[arg(long, value_name = "PATH")]
	pub socket: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct DaemonArgs {
	#[command(subcommand)]
	pub action: DaemonAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DaemonAction {
	/// Run the daemon in the foreground.
	Start(DaemonStartArgs),
	/// Ask a running daemon to shut down.
	Stop {
		/// Daemon socket path override.
		#[arg(long, value_name = "PATH")]
		socket: Option<PathBuf>,
	},
	/// Show queue depth and per-state counts.
	Status {
		/// Daemon socket path override.
		#[arg(long, value_name = "PATH")]
		socket: Option<PathBuf>,
	},
}

#[derive(Args, Debug, Clone)]
pub struct DaemonStartArgs {
	/// Concurrent execution slots.
	#[arg(long, value_name = "N", default_value_t = crucible_protocol::DEFAULT_POOL_SIZE)]
	pub pool_size: usize,

	/// Execution bound per script, in milliseconds.
	#[arg(long, value_name = "MS", default_value_t = crucible::DEFAULT_EVAL_TIMEOUT_MS)]
	pub timeout_ms: u64,

	/// Browser-per-job isolation instead of the shared pool.
	#[arg(long, value_enum, default_value_t = Isolation::Shared)]
	pub isolation: Isolation,

	/// Run the browser with a visible window.
	#[arg(long)]
	pub headed: bool,

	/// Keep the engine sandbox enabled (disabled by default for constrained hosts).
	#[arg(long)]
	pub sandbox: bool,

	/// Daemon socket path override.
	#[arg(long, value_name = "PATH")]
	pub socket: Option<PathBuf>,
}

/// CLI wrapper for [`IsolationMode`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Isolation {
	#[default]
	Shared,
	PerJob,
}

impl From<Isolation> for IsolationMode {
	fn from(value: Isolation) -> Self {
		match value {
			Isolation::Shared => IsolationMode::Shared,
			Isolation::PerJob => IsolationMode::PerJob,
		}
	}
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;

	use super::*;

	#[test]
	fn cli_definition_is_consistent() {
		Cli::command().debug_assert();
	}

	#[test]
	fn exec_parses_positional_script() {
		let cli = Cli::try_parse_from(["crucible", "exec", "1+1"]).unwrap();
		match cli.command {
			Commands::Exec(args) => assert_eq!(args.script.as_deref(), Some("1+1")),
			other => panic!("unexpected command: {other:?}"),
		}
	}

	#[test]
	fn daemon_start_defaults() {
		let cli = Cli::try_parse_from(["crucible", "daemon", "start"]).unwrap();
		match cli.command {
			Commands::Daemon(args) => match args.action {
				DaemonAction::Start(start) => {
					assert_eq!(start.pool_size, crucible_protocol::DEFAULT_POOL_SIZE);
					assert_eq!(start.isolation, Isolation::Shared);
				}
				other => panic!("unexpected action: {other:?}"),
			},
			other => panic!("unexpected command: {other:?}"),
		}
	}
}
