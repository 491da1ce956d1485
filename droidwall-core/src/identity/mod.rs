//! Owner identities: installed packages grouped by numeric id, plus
//! synthetic entries for the wildcard, the kernel and system accounts.

pub mod accounts;
pub mod directory;
pub mod registry;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::rules::{OwnerId, TrafficClass};

pub use accounts::{NixAccounts, SystemAccounts};
pub use directory::{AppDirectory, InstalledUnit, PackagesList};
pub use registry::IdentityRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerIdentity {
    pub id: OwnerId,
    /// Labels of every unit sharing the id, in encounter order.
    pub display_names: Vec<String>,
    pub allowed_on_wifi: bool,
    pub allowed_on_mobile: bool,
}

impl OwnerIdentity {
    pub fn new(id: OwnerId, name: impl Into<String>) -> Self {
        Self {
            id,
            display_names: vec![name.into()],
            allowed_on_wifi: false,
            allowed_on_mobile: false,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.id < 0
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.display_names.first().map(String::as_str)
    }

    pub fn allowed_on(&self, class: TrafficClass) -> bool {
        match class {
            TrafficClass::Wifi => self.allowed_on_wifi,
            TrafficClass::Mobile => self.allowed_on_mobile,
        }
    }
}

/// Immutable set of identities keyed by id, iterated in ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IdentitySnapshot {
    identities: BTreeMap<OwnerId, OwnerIdentity>,
}

impl IdentitySnapshot {
    pub fn get(&self, id: OwnerId) -> Option<&OwnerIdentity> {
        self.identities.get(&id)
    }

    pub fn contains(&self, id: OwnerId) -> bool {
        self.identities.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OwnerIdentity> {
        self.identities.values()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl FromIterator<OwnerIdentity> for IdentitySnapshot {
    /// Later identities with a duplicate id are dropped.
    fn from_iter<T: IntoIterator<Item = OwnerIdentity>>(iter: T) -> Self {
        let mut identities = BTreeMap::new();
        for identity in iter {
            identities.entry(identity.id).or_insert(identity);
        }
        Self { identities }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_iterates_by_id_and_keeps_first_duplicate() {
        let snapshot: IdentitySnapshot = [
            OwnerIdentity::new(10005, "Browser"),
            OwnerIdentity::new(-10, "(any)"),
            OwnerIdentity::new(10005, "Duplicate"),
            OwnerIdentity::new(1000, "System"),
        ]
        .into_iter()
        .collect();

        let ids: Vec<_> = snapshot.iter().map(|identity| identity.id).collect();
        assert_eq!(ids, vec![-10, 1000, 10005]);
        assert_eq!(
            snapshot.get(10005).and_then(OwnerIdentity::primary_name),
            Some("Browser")
        );
        assert!(snapshot.get(-10).is_some_and(OwnerIdentity::is_synthetic));
    }
}
