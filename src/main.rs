//! droidwall - per-application network firewall control plane
//!
//! Thin binary entry point that delegates to the handlers in `src/cli`.

use anyhow::{Context, Result};
use clap::Parser;
use droidwall_config::{ConfigManager, DroidwallConfig};
use droidwall_core::Firewall;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let manager = match args.config.as_deref() {
        Some(path) => ConfigManager::load_from_file(path)?,
        None => ConfigManager::load()?,
    };
    initialize_tracing(manager.config(), args.verbose);
    if let Some(path) = manager.config_path() {
        tracing::debug!(path = %path.display(), "using configuration file");
    }

    let config = manager.into_config();
    let firewall = Firewall::from_config(&config).context("failed to initialize firewall")?;
    cli::dispatch(&firewall, &config, args.command).await
}

/// `RUST_LOG` takes precedence; otherwise the `[logging]` section builds the
/// filter, and `--verbose` raises it to debug.
fn initialize_tracing(config: &DroidwallConfig, verbose: bool) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => {
            let mut logging = config.logging.clone();
            logging.level = "debug".to_string();
            EnvFilter::new(logging.filter_directive())
        }
        Err(_) => EnvFilter::new(config.logging.filter_directive()),
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if let Err(err) = installed {
        eprintln!("warning: failed to initialize tracing: {err}");
    }
}
