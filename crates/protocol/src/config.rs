//! Launch and dispatcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default execution bound applied when none is configured.
pub const DEFAULT_EVAL_TIMEOUT_MS: u64 = 30_000;

/// Default number of concurrent execution slots.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Browser launch configuration recognized by every engine adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct LaunchConfig {
    /// Run the engine without a visible window.
    pub headless: bool,
    /// Pass the engine's sandbox-disabling flags, required in constrained
    /// hosting environments (containers without a user namespace).
    pub sandbox_disabled: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox_disabled: true,
        }
    }
}

/// How execution units map onto browser instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// One shared browser; each job gets its own disposable context.
    #[default]
    Shared,
    /// A freshly launched browser per job. Stronger isolation, higher cost.
    PerJob,
}

/// Dispatcher pool tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct DispatcherConfig {
    /// Concurrent execution slots. Requests beyond this queue FIFO.
    pub pool_size: usize,
    /// Execution bound per script, in milliseconds.
    pub eval_timeout_ms: u64,
    pub isolation: IsolationMode,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            eval_timeout_ms: DEFAULT_EVAL_TIMEOUT_MS,
            isolation: IsolationMode::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn eval_timeout(&self) -> Duration {
        Duration::from_millis(self.eval_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_config_defaults_to_constrained_host_settings() {
        let config = LaunchConfig::default();
        assert!(config.headless);
        assert!(config.sandbox_disabled);
    }

    #[test]
    fn dispatcher_config_fills_missing_fields() {
        let config: DispatcherConfig = serde_json::from_str(r#"{ "pool_size": 2 }"#).unwrap();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.eval_timeout_ms, DEFAULT_EVAL_TIMEOUT_MS);
        assert_eq!(config.isolation, IsolationMode::Shared);
    }
}
