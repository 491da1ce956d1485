use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::execution;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum duration (in milliseconds) a script may run. 0 waits forever.
    #[serde(default = "ExecutorConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    /// Time between the interrupt and the forced kill of a timed-out script.
    #[serde(default = "ExecutorConfig::default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Time allowed for reaping a killed script before giving up on it.
    #[serde(default = "ExecutorConfig::default_reap_wait_ms")]
    pub reap_wait_ms: u64,
    /// Program used to run scripts with elevated privileges.
    #[serde(default = "ExecutorConfig::default_elevation_program")]
    pub elevation_program: String,
    /// Program used to run scripts without elevation.
    #[serde(default = "ExecutorConfig::default_shell_program")]
    pub shell_program: String,
    /// Bytes kept per output stream.
    #[serde(default = "ExecutorConfig::default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
            grace_period_ms: Self::default_grace_period_ms(),
            reap_wait_ms: Self::default_reap_wait_ms(),
            elevation_program: Self::default_elevation_program(),
            shell_program: Self::default_shell_program(),
            max_output_bytes: Self::default_max_output_bytes(),
        }
    }
}

impl ExecutorConfig {
    const fn default_timeout_ms() -> u64 {
        execution::DEFAULT_TIMEOUT_MS
    }

    const fn default_grace_period_ms() -> u64 {
        execution::DEFAULT_GRACE_PERIOD_MS
    }

    const fn default_reap_wait_ms() -> u64 {
        execution::DEFAULT_REAP_WAIT_MS
    }

    fn default_elevation_program() -> String {
        execution::DEFAULT_ELEVATION_PROGRAM.to_string()
    }

    fn default_shell_program() -> String {
        execution::DEFAULT_SHELL_PROGRAM.to_string()
    }

    const fn default_max_output_bytes() -> usize {
        execution::DEFAULT_MAX_OUTPUT_BYTES
    }

    /// Normalize the configured timeout into an optional duration.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms))
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn reap_wait(&self) -> Duration {
        Duration::from_millis(self.reap_wait_ms)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.elevation_program.trim().is_empty(),
            "executor.elevation_program must not be empty"
        );
        ensure!(
            !self.shell_program.trim().is_empty(),
            "executor.shell_program must not be empty"
        );
        ensure!(
            self.max_output_bytes > 0,
            "executor.max_output_bytes must be greater than zero"
        );
        ensure!(
            self.timeout_ms == 0 || self.grace_period_ms <= self.timeout_ms,
            "executor.grace_period_ms ({}) must not exceed executor.timeout_ms ({})",
            self.grace_period_ms,
            self.timeout_ms
        );
        Ok(())
    }
}
