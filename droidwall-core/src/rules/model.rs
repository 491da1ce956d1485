use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use droidwall_config::constants::{chains, prefs, uids};
use serde::{Deserialize, Serialize};

use crate::error::FirewallError;
use crate::identity::IdentitySnapshot;
use crate::prefs::{PreferenceStore, parse_id_list};

/// Numeric execution identity. Negative values are synthetic sentinels.
pub type OwnerId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Default-deny, explicit allow.
    #[default]
    Whitelist,
    /// Default-allow, explicit reject.
    Blacklist,
}

impl FilterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::Whitelist => prefs::MODE_WHITELIST,
            FilterMode::Blacklist => prefs::MODE_BLACKLIST,
        }
    }

    /// Mode stored under `BlockMode`; anything but `blacklist` is whitelist.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some(prefs::MODE_BLACKLIST) => FilterMode::Blacklist,
            _ => FilterMode::Whitelist,
        }
    }

    /// Jump target for a selected owner.
    pub fn owner_target(self) -> &'static str {
        match self {
            FilterMode::Whitelist => "RETURN",
            FilterMode::Blacklist => chains::REJECT,
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterMode {
    type Err = FirewallError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            prefs::MODE_WHITELIST => Ok(FilterMode::Whitelist),
            prefs::MODE_BLACKLIST => Ok(FilterMode::Blacklist),
            other => Err(FirewallError::Parse {
                what: "filter mode",
                detail: format!("expected `whitelist` or `blacklist`, got `{other}`"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficClass {
    Wifi,
    Mobile,
}

impl TrafficClass {
    /// Order in which classes are routed and filtered.
    pub const COMPILE_ORDER: [TrafficClass; 2] = [TrafficClass::Mobile, TrafficClass::Wifi];

    pub fn chain(self) -> &'static str {
        match self {
            TrafficClass::Wifi => chains::WIFI,
            TrafficClass::Mobile => chains::MOBILE,
        }
    }

    /// Preference key holding this class's selected ids.
    pub fn preference_key(self) -> &'static str {
        match self {
            TrafficClass::Wifi => prefs::WIFI_UIDS,
            TrafficClass::Mobile => prefs::MOBILE_UIDS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TrafficClass::Wifi => "wifi",
            TrafficClass::Mobile => "mobile",
        }
    }
}

/// Ids selected for one traffic class, kept sorted and unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSelection {
    ids: BTreeSet<OwnerId>,
}

impl ClassSelection {
    pub fn new<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = OwnerId>,
    {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.ids.contains(&uids::ANY)
    }

    pub fn includes_kernel(&self) -> bool {
        self.ids.contains(&uids::KERNEL)
    }

    pub fn contains(&self, id: OwnerId) -> bool {
        self.ids.contains(&id)
    }

    /// Concrete owner ids (`>= 0`) in ascending order.
    pub fn owner_ids(&self) -> impl Iterator<Item = OwnerId> + '_ {
        self.ids.iter().copied().filter(|id| *id >= 0)
    }

    /// Every id, sentinels included, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = OwnerId> + '_ {
        self.ids.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Resolved ids of the accounts kept reachable on Wi-Fi in whitelist mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BringUpAccounts {
    /// `(account name, id)` in emission order.
    pub accounts: Vec<(String, OwnerId)>,
}

/// Immutable input of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    mode: FilterMode,
    logging_enabled: bool,
    wifi: ClassSelection,
    mobile: ClassSelection,
    bring_up: BringUpAccounts,
}

impl RuleSet {
    pub fn new(
        mode: FilterMode,
        logging_enabled: bool,
        wifi: ClassSelection,
        mobile: ClassSelection,
    ) -> Self {
        Self {
            mode,
            logging_enabled,
            wifi,
            mobile,
            bring_up: BringUpAccounts::default(),
        }
    }

    pub fn with_bring_up(mut self, bring_up: BringUpAccounts) -> Self {
        self.bring_up = bring_up;
        self
    }

    /// Selections taken from the flags of an identity snapshot.
    pub fn from_snapshot(
        snapshot: &IdentitySnapshot,
        mode: FilterMode,
        logging_enabled: bool,
    ) -> Self {
        let wifi = snapshot
            .iter()
            .filter(|identity| identity.allowed_on_wifi)
            .map(|identity| identity.id);
        let mobile = snapshot
            .iter()
            .filter(|identity| identity.allowed_on_mobile)
            .map(|identity| identity.id);
        Self::new(
            mode,
            logging_enabled,
            ClassSelection::new(wifi),
            ClassSelection::new(mobile),
        )
    }

    /// Selections, mode and logging flag read from persisted preferences.
    pub fn from_preferences(store: &dyn PreferenceStore) -> Self {
        let mode = FilterMode::from_stored(store.get_string(prefs::MODE).as_deref());
        let logging_enabled = store.get_bool(prefs::LOG_ENABLED).unwrap_or(false);
        let selection = |class: TrafficClass| {
            ClassSelection::new(parse_id_list(
                &store
                    .get_string(class.preference_key())
                    .unwrap_or_default(),
            ))
        };
        Self::new(
            mode,
            logging_enabled,
            selection(TrafficClass::Wifi),
            selection(TrafficClass::Mobile),
        )
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    pub fn selection(&self, class: TrafficClass) -> &ClassSelection {
        match class {
            TrafficClass::Wifi => &self.wifi,
            TrafficClass::Mobile => &self.mobile,
        }
    }

    pub fn bring_up(&self) -> &BringUpAccounts {
        &self.bring_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPreferences;

    #[test]
    fn mode_parses_and_defaults_to_whitelist() {
        assert_eq!(
            "Blacklist".parse::<FilterMode>().ok(),
            Some(FilterMode::Blacklist)
        );
        assert!("greylist".parse::<FilterMode>().is_err());
        assert_eq!(FilterMode::from_stored(None), FilterMode::Whitelist);
        assert_eq!(
            FilterMode::from_stored(Some("garbage")),
            FilterMode::Whitelist
        );
    }

    #[test]
    fn selection_sorts_and_filters_sentinels() {
        let selection = ClassSelection::new([10005, uids::ANY, 1000, 10005, uids::KERNEL]);
        assert!(selection.is_wildcard());
        assert!(selection.includes_kernel());
        assert_eq!(selection.owner_ids().collect::<Vec<_>>(), vec![1000, 10005]);
        assert_eq!(selection.len(), 4);
    }

    #[test]
    fn rule_set_reads_preferences() -> Result<(), crate::PreferenceError> {
        let store = MemoryPreferences::new();
        let mut editor = store.edit();
        editor
            .put_string(prefs::MODE, "blacklist")
            .put_bool(prefs::LOG_ENABLED, true)
            .put_string(prefs::WIFI_UIDS, "10001|x|-10")
            .put_string(prefs::MOBILE_UIDS, "2000");
        store.commit(editor)?;

        let rules = RuleSet::from_preferences(&store);
        assert_eq!(rules.mode(), FilterMode::Blacklist);
        assert!(rules.logging_enabled());
        assert!(rules.selection(TrafficClass::Wifi).is_wildcard());
        assert!(rules.selection(TrafficClass::Mobile).contains(2000));
        Ok(())
    }
}
