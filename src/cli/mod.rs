use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use droidwall_config::DroidwallConfig;
use droidwall_core::{FilterMode, Firewall, TrafficClass};

mod inspect;
mod settings;
mod state;

#[derive(Debug, Parser)]
#[command(name = "droidwall")]
#[command(about = "Per-application network firewall built on iptables owner matching")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to DROIDWALL_CONFIG_PATH or the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the enabled state, filter mode and logging flag
    Status,
    /// Apply the saved rules and mark the firewall enabled
    Enable,
    /// Purge the rules and mark the firewall disabled
    Disable,
    /// Flip the enabled state
    Toggle,
    /// Save the current selections and apply them
    Apply,
    /// Apply the persisted selections without enumerating applications
    ApplySaved,
    /// Flush every droidwall chain
    Purge,
    /// Print the current filter table
    Rules,
    /// Summarize the packets blocked by the reject chain
    Log {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear the kernel log buffer
    ClearLog,
    /// List owner identities and their selections
    Apps {
        /// Print the identities as JSON
        #[arg(long)]
        json: bool,
    },
    /// Allow an owner id on the selected traffic classes
    Allow(SelectionArgs),
    /// Remove an owner id from the selected traffic classes
    Deny(SelectionArgs),
    /// Set the filter mode
    Mode {
        #[arg(value_enum)]
        mode: ModeArg,
    },
    /// Turn logging of rejected packets on or off
    Logging {
        #[arg(value_enum)]
        switch: Switch,
    },
    /// Forget an uninstalled package's owner id
    Removed { uid: i64 },
    /// Print the rule script for the saved selections without running it
    Compile,
    /// Set the password guarding `disable`; an empty value clears it
    Password { password: String },
    /// Check whether scripts can run with elevated privileges
    CheckRoot,
}

#[derive(Debug, Args)]
pub struct SelectionArgs {
    /// Owner id (-10 for any application, -11 for the kernel)
    #[arg(allow_negative_numbers = true)]
    pub id: i64,

    /// Apply to Wi-Fi traffic
    #[arg(long)]
    pub wifi: bool,

    /// Apply to mobile-data traffic
    #[arg(long)]
    pub mobile: bool,
}

impl SelectionArgs {
    /// Both classes when neither flag is given.
    fn classes(&self) -> Vec<TrafficClass> {
        match (self.wifi, self.mobile) {
            (true, false) => vec![TrafficClass::Wifi],
            (false, true) => vec![TrafficClass::Mobile],
            _ => vec![TrafficClass::Wifi, TrafficClass::Mobile],
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Whitelist,
    Blacklist,
}

impl From<ModeArg> for FilterMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Whitelist => FilterMode::Whitelist,
            ModeArg::Blacklist => FilterMode::Blacklist,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

pub async fn dispatch(firewall: &Firewall, config: &DroidwallConfig, command: Commands) -> Result<()> {
    match command {
        Commands::Status => state::handle_status_command(firewall, config),
        Commands::Enable => state::handle_enable_command(firewall).await,
        Commands::Disable => state::handle_disable_command(firewall).await,
        Commands::Toggle => state::handle_toggle_command(firewall).await,
        Commands::Apply => state::handle_apply_command(firewall, false).await,
        Commands::ApplySaved => state::handle_apply_command(firewall, true).await,
        Commands::Purge => state::handle_purge_command(firewall).await,
        Commands::Removed { uid } => state::handle_removed_command(firewall, uid).await,
        Commands::Rules => inspect::handle_rules_command(firewall).await,
        Commands::Log { json } => inspect::handle_log_command(firewall, json).await,
        Commands::ClearLog => inspect::handle_clear_log_command(firewall).await,
        Commands::Apps { json } => inspect::handle_apps_command(firewall, json),
        Commands::Compile => inspect::handle_compile_command(firewall),
        Commands::CheckRoot => inspect::handle_check_root_command(firewall).await,
        Commands::Allow(args) => settings::handle_selection_command(firewall, &args, true),
        Commands::Deny(args) => settings::handle_selection_command(firewall, &args, false),
        Commands::Mode { mode } => settings::handle_mode_command(firewall, mode.into()),
        Commands::Logging { switch } => {
            settings::handle_logging_command(firewall, matches!(switch, Switch::On))
        }
        Commands::Password { password } => settings::handle_password_command(firewall, &password),
    }
}
