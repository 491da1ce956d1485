//! Blocked-packet statistics from the reject chain's kernel log lines.

pub mod analyzer;

pub use analyzer::{BlockReport, LogAnalyzer, LogOwner, OwnerBlocks};
