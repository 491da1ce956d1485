use droidwall_config::constants::{log, uids};
use indexmap::IndexMap;
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use tracing::debug;

use crate::identity::IdentitySnapshot;
use crate::rules::{LogFormat, OwnerId};

/// Owner a blocked packet was attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOwner {
    Uid(OwnerId),
    /// Line carried no usable `UID=` token.
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OwnerBlocks {
    pub total_blocked: u64,
    /// Destination to packet count, in first-seen order.
    pub per_destination: IndexMap<String, u64>,
}

/// Per-owner blocked-packet statistics in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockReport {
    owners: IndexMap<LogOwner, OwnerBlocks>,
}

impl BlockReport {
    pub fn get(&self, owner: LogOwner) -> Option<&OwnerBlocks> {
        self.owners.get(&owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LogOwner, &OwnerBlocks)> {
        self.owners.iter()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn total_blocked(&self) -> u64 {
        self.owners.values().map(|blocks| blocks.total_blocked).sum()
    }

    fn record(&mut self, owner: LogOwner, destination: Option<&str>) {
        let blocks = self.owners.entry(owner).or_default();
        blocks.total_blocked += 1;
        if let Some(destination) = destination {
            *blocks
                .per_destination
                .entry(destination.to_string())
                .or_insert(0) += 1;
        }
    }
}

impl Serialize for BlockReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Entry<'a>(&'a LogOwner, &'a OwnerBlocks);

        impl Serialize for Entry<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut state = serializer.serialize_struct("OwnerEntry", 3)?;
                state.serialize_field("owner", self.0)?;
                state.serialize_field("total_blocked", &self.1.total_blocked)?;
                state.serialize_field("per_destination", &self.1.per_destination)?;
                state.end()
            }
        }

        serializer.collect_seq(self.owners.iter().map(|(owner, blocks)| Entry(owner, blocks)))
    }
}

/// Reconstructs blocked-packet statistics from the kernel ring buffer.
#[derive(Debug, Clone, Default)]
pub struct LogAnalyzer {
    format: LogFormat,
}

impl LogAnalyzer {
    pub fn new(format: LogFormat) -> Self {
        Self { format }
    }

    /// Aggregate every tagged line of `raw`.
    ///
    /// Malformed `UID=` values fall into [`LogOwner::Unknown`]; a line
    /// without `DST=` still counts towards its owner's total.
    pub fn parse(&self, raw: &str) -> BlockReport {
        let mut report = BlockReport::default();
        for line in raw.lines().filter(|line| line.contains(&self.format.tag)) {
            let owner = self
                .token(line, &self.format.uid_key)
                .and_then(|value| match value.parse::<OwnerId>() {
                    Ok(id) => Some(LogOwner::Uid(id)),
                    Err(err) => {
                        debug!(value, error = %err, "malformed owner id in log line");
                        None
                    }
                })
                .unwrap_or(LogOwner::Unknown);
            let destination = self
                .token(line, &self.format.dst_key)
                .filter(|value| !value.is_empty());
            report.record(owner, destination);
        }
        report
    }

    fn token<'a>(&self, line: &'a str, key: &str) -> Option<&'a str> {
        line.split_whitespace()
            .find_map(|token| token.strip_prefix(key))
    }

    /// One paragraph per owner, or the empty-log notice.
    pub fn render(&self, report: &BlockReport, snapshot: &IdentitySnapshot) -> String {
        if report.is_empty() {
            return log::EMPTY_REPORT.to_string();
        }

        let mut out = String::new();
        for (owner, blocks) in report.iter() {
            out.push_str("App ID ");
            match owner {
                LogOwner::Uid(id) if *id != uids::KERNEL => {
                    out.push_str(&id.to_string());
                    if let Some(identity) = snapshot.get(*id)
                        && let Some(first) = identity.primary_name()
                    {
                        let more = if identity.display_names.len() > 1 { ", ..." } else { "" };
                        out.push_str(&format!(" ({first}{more})"));
                    }
                }
                _ => out.push_str(log::KERNEL_LABEL),
            }

            out.push_str(&format!(" - Blocked {} packets", blocks.total_blocked));
            if !blocks.per_destination.is_empty() {
                let destinations = blocks
                    .per_destination
                    .iter()
                    .map(|(destination, count)| format!("{count} packets for {destination}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push_str(&format!(" ({destinations})"));
            }
            out.push_str("\n\n");
        }
        out
    }
}
