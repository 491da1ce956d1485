use std::path::PathBuf;

use droidwall_config::constants::exit_codes;
use droidwall_script_runner::{DID_NOT_COMPLETE, ExecutionResult};
use thiserror::Error;

/// Failures surfaced by [`crate::Firewall`] operations.
#[derive(Debug, Error)]
pub enum FirewallError {
    /// Tool discovery, chain creation or rule installation failed.
    #[error("rule setup failed at step {exit_code}: {diagnostic}")]
    Setup { exit_code: i32, diagnostic: String },

    /// The script could not be spawned or its output could not be read.
    #[error("script execution failed: {diagnostic}")]
    Execution { diagnostic: String },

    #[error("script timed out: {diagnostic}")]
    Timeout { diagnostic: String },

    #[error("failed to parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error(transparent)]
    Persistence(#[from] PreferenceError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("disabling the firewall is password protected")]
    PasswordProtected,
}

impl FirewallError {
    /// Map a failed execution to its error class by exit code.
    ///
    /// Codes 1-5 are tool discovery and chain creation; 6-11 and any other
    /// non-zero code come from installing or flushing rules. `-1` means the
    /// script never completed.
    pub fn from_execution(result: &ExecutionResult) -> Self {
        let diagnostic = result.diagnostic().trim().to_string();
        match result.exit_code {
            DID_NOT_COMPLETE if result.timed_out => FirewallError::Timeout { diagnostic },
            DID_NOT_COMPLETE => FirewallError::Execution { diagnostic },
            exit_code => FirewallError::Setup {
                exit_code,
                diagnostic,
            },
        }
    }

    /// Human-readable step name for a rule-script exit code.
    pub fn step_name(exit_code: i32) -> &'static str {
        match exit_code {
            DID_NOT_COMPLETE => "script did not complete",
            exit_codes::TOOL_VERSION => "filter tool version check",
            exit_codes::CREATE_ENTRY => "create entry chain",
            exit_codes::CREATE_MOBILE => "create mobile chain",
            exit_codes::CREATE_WIFI => "create wifi chain",
            exit_codes::CREATE_REJECT => "create reject chain",
            exit_codes::INSTALL_JUMP => "install output jump",
            exit_codes::FLUSH_ENTRY => "flush entry chain",
            exit_codes::FLUSH_MOBILE => "flush mobile chain",
            exit_codes::FLUSH_WIFI => "flush wifi chain",
            exit_codes::FLUSH_REJECT => "flush reject chain",
            exit_codes::INSTALL_REJECT => "install reject rule",
            _ => "apply filtering rules",
        }
    }

    /// Whether the failure happened before any existing rule was touched.
    pub fn is_setup_stage(&self) -> bool {
        matches!(
            self,
            FirewallError::Setup { exit_code, .. }
                if (exit_codes::TOOL_VERSION..=exit_codes::CREATE_REJECT).contains(exit_code)
        )
    }
}

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("failed to read preferences from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("preferences file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to commit preferences to {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode preferences: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read package list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
