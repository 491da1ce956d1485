//! Control plane for per-application network access.
//!
//! The crate turns a user's per-app Wi-Fi / mobile-data selections into a
//! filter-tool script ([`rules::RuleCompiler`]), applies it through a
//! [`droidwall_script_runner::ScriptRunner`], groups installed packages into
//! owner identities ([`identity::IdentityRegistry`]) and summarizes what the
//! reject chain logged ([`log::LogAnalyzer`]).
//!
//! [`Firewall`] ties those pieces to the persisted preference store.

pub mod error;
pub mod firewall;
pub mod identity;
pub mod log;
pub mod prefs;
pub mod rules;

pub use error::{DirectoryError, FirewallError, PreferenceError};
pub use firewall::{Firewall, StatusEvent};
pub use identity::{IdentityRegistry, IdentitySnapshot, OwnerIdentity};
pub use log::{BlockReport, LogAnalyzer, LogOwner};
pub use prefs::{JsonFilePreferences, MemoryPreferences, PreferenceEditor, PreferenceStore};
pub use rules::{FilterMode, RuleCompiler, RuleSet, Script, TrafficClass};
