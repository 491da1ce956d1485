//! Configuration loader and protocol constants for droidwall.
//!
//! The constants in [`constants`] describe the wire protocol spoken with the
//! external filter tool (chain names, exit codes, log tag, interface
//! prefixes, persisted preference keys). They are compiled in on purpose;
//! everything a deployment may want to tune lives in [`DroidwallConfig`]
//! and is loaded from TOML by [`ConfigManager`].

pub mod constants;
pub mod executor;
pub mod loader;

pub use executor::ExecutorConfig;
pub use loader::{
    ConfigManager, DroidwallConfig, LoggingConfig, PathsConfig, ToolchainConfig,
};
