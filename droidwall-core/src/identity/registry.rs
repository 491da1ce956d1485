use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use droidwall_config::constants::{accounts, prefs, uids};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::accounts::SystemAccounts;
use super::directory::{AppDirectory, InstalledUnit};
use super::{IdentitySnapshot, OwnerIdentity};
use crate::error::FirewallError;
use crate::prefs::{PreferenceEditor, PreferenceStore, parse_id_list};
use crate::rules::{BringUpAccounts, OwnerId, TrafficClass};

/// Builds and memoizes the identity snapshot.
///
/// The build runs under a mutex, so concurrent first callers trigger exactly
/// one build and share its result. [`IdentityRegistry::invalidate`] forces
/// the next call to rebuild (package installed or removed, selections
/// edited).
pub struct IdentityRegistry {
    directory: Arc<dyn AppDirectory>,
    accounts: Arc<dyn SystemAccounts>,
    store: Arc<dyn PreferenceStore>,
    memo: Mutex<Option<Arc<IdentitySnapshot>>>,
}

impl std::fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("cached", &self.memo.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl IdentityRegistry {
    pub fn new(
        directory: Arc<dyn AppDirectory>,
        accounts: Arc<dyn SystemAccounts>,
        store: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            directory,
            accounts,
            store,
            memo: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> Result<Arc<IdentitySnapshot>, FirewallError> {
        let mut memo = self.memo.lock();
        if let Some(snapshot) = memo.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = Arc::new(self.build()?);
        info!(identities = snapshot.len(), "identity snapshot built");
        *memo = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn invalidate(&self) {
        if self.memo.lock().take().is_some() {
            debug!("identity snapshot invalidated");
        }
    }

    /// Ids of the accounts kept reachable on whitelisted Wi-Fi.
    pub fn bring_up_accounts(&self) -> BringUpAccounts {
        BringUpAccounts {
            accounts: accounts::BRING_UP
                .iter()
                .filter_map(|name| {
                    self.accounts
                        .uid_for_name(name)
                        .map(|id| ((*name).to_string(), id))
                })
                .collect(),
        }
    }

    fn build(&self) -> Result<IdentitySnapshot, FirewallError> {
        let units = self.directory.installed_units()?;
        let wifi = self.selected_ids(TrafficClass::Wifi);
        let mobile = self.selected_ids(TrafficClass::Mobile);

        // An id is network-capable when any unit sharing it holds the
        // permission, regardless of the order units are listed in.
        let capable: HashSet<OwnerId> = units
            .iter()
            .filter(|unit| unit.has_network_permission)
            .map(|unit| unit.uid)
            .collect();

        let mut labels = self.store.edit();
        let mut grouped: BTreeMap<OwnerId, OwnerIdentity> = BTreeMap::new();
        for unit in units.iter().filter(|unit| capable.contains(&unit.uid)) {
            let name = self.label_for(unit, &mut labels);
            grouped
                .entry(unit.uid)
                .and_modify(|identity| identity.display_names.push(name.clone()))
                .or_insert_with(|| OwnerIdentity::new(unit.uid, name));
        }

        if !labels.is_empty() {
            let cached = labels.len();
            // Labels are a cache; a failed write only costs a slower next build.
            match self.store.commit(labels) {
                Ok(()) => debug!(cached, "label cache updated"),
                Err(err) => warn!(error = %err, "failed to persist label cache"),
            }
        }

        for (id, label) in self.synthetic_identities() {
            grouped
                .entry(id)
                .or_insert_with(|| OwnerIdentity::new(id, label));
        }

        for identity in grouped.values_mut() {
            identity.allowed_on_wifi = wifi.contains(&identity.id);
            identity.allowed_on_mobile = mobile.contains(&identity.id);
        }

        Ok(grouped.into_values().collect())
    }

    fn label_for(&self, unit: &InstalledUnit, pending: &mut PreferenceEditor) -> String {
        let key = format!("{}{}", prefs::LABEL_CACHE_PREFIX, unit.package);
        if let Some(label) = self.store.get_string(&key).filter(|label| !label.is_empty()) {
            return label;
        }
        let label = self.directory.load_label(unit);
        pending.put_string(key, label.clone());
        label
    }

    fn synthetic_identities(&self) -> Vec<(OwnerId, String)> {
        let mut synthetic = vec![
            (uids::ANY, accounts::ANY_LABEL.to_string()),
            (uids::KERNEL, accounts::KERNEL_LABEL.to_string()),
        ];
        for (name, label) in accounts::SPECIAL {
            match self.accounts.uid_for_name(name) {
                Some(id) => synthetic.push((id, (*label).to_string())),
                None => debug!(account = name, "system account not present"),
            }
        }
        synthetic
    }

    fn selected_ids(&self, class: TrafficClass) -> BTreeSet<OwnerId> {
        self.store
            .get_string(class.preference_key())
            .map(|raw| parse_id_list(&raw).into_iter().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::DirectoryError;
    use crate::prefs::MemoryPreferences;

    struct FakeDirectory {
        units: Vec<InstalledUnit>,
        builds: AtomicUsize,
        label_loads: AtomicUsize,
    }

    impl FakeDirectory {
        fn new(units: &[(&str, OwnerId, bool)]) -> Self {
            Self {
                units: units
                    .iter()
                    .map(|(package, uid, permitted)| InstalledUnit {
                        package: (*package).to_string(),
                        uid: *uid,
                        has_network_permission: *permitted,
                    })
                    .collect(),
                builds: AtomicUsize::new(0),
                label_loads: AtomicUsize::new(0),
            }
        }
    }

    impl AppDirectory for FakeDirectory {
        fn installed_units(&self) -> Result<Vec<InstalledUnit>, DirectoryError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(self.units.clone())
        }

        fn load_label(&self, unit: &InstalledUnit) -> String {
            self.label_loads.fetch_add(1, Ordering::SeqCst);
            format!("Label of {}", unit.package)
        }
    }

    struct FakeAccounts(HashMap<&'static str, OwnerId>);

    impl SystemAccounts for FakeAccounts {
        fn uid_for_name(&self, name: &str) -> Option<OwnerId> {
            self.0.get(name).copied()
        }
    }

    fn accounts() -> Arc<FakeAccounts> {
        Arc::new(FakeAccounts(HashMap::from([
            ("root", 0),
            ("media", 1013),
            ("shell", 2000),
            ("dhcp", 1014),
            ("wifi", 1010),
        ])))
    }

    #[test]
    fn groups_by_id_regardless_of_permission_order() -> Result<(), FirewallError> {
        let directory = Arc::new(FakeDirectory::new(&[
            ("com.shared.first", 10050, false),
            ("com.shared.second", 10050, true),
            ("com.offline", 10060, false),
            ("com.browser", 10005, true),
        ]));
        let registry = IdentityRegistry::new(directory, accounts(), Arc::new(MemoryPreferences::new()));

        let snapshot = registry.snapshot()?;
        let shared = snapshot.get(10050);
        assert_eq!(
            shared.map(|identity| identity.display_names.clone()),
            Some(vec![
                "Label of com.shared.first".to_string(),
                "Label of com.shared.second".to_string(),
            ])
        );
        assert!(!snapshot.contains(10060));
        assert!(snapshot.contains(10005));
        Ok(())
    }

    #[test]
    fn injects_synthetic_identities_without_overriding_real_ones() -> Result<(), FirewallError> {
        let directory = Arc::new(FakeDirectory::new(&[("com.android.shell", 2000, true)]));
        let registry = IdentityRegistry::new(directory, accounts(), Arc::new(MemoryPreferences::new()));

        let snapshot = registry.snapshot()?;
        let ids: Vec<_> = snapshot.iter().map(|identity| identity.id).collect();
        assert_eq!(ids, vec![uids::KERNEL, uids::ANY, 0, 1013, 2000]);
        assert_eq!(
            snapshot.get(2000).and_then(OwnerIdentity::primary_name),
            Some("Label of com.android.shell")
        );
        assert_eq!(
            snapshot.get(1013).and_then(OwnerIdentity::primary_name),
            Some("Media server")
        );
        Ok(())
    }

    #[test]
    fn marks_selections_from_persisted_lists() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryPreferences::new());
        let mut editor = store.edit();
        editor
            .put_string(prefs::WIFI_UIDS, "10005|-10")
            .put_string(prefs::MOBILE_UIDS, "10005|junk");
        store.commit(editor)?;

        let directory = Arc::new(FakeDirectory::new(&[("com.browser", 10005, true)]));
        let registry = IdentityRegistry::new(directory, accounts(), store);
        let snapshot = registry.snapshot()?;

        let browser = snapshot.get(10005);
        assert!(browser.is_some_and(|identity| identity.allowed_on_wifi && identity.allowed_on_mobile));
        assert!(snapshot.get(uids::ANY).is_some_and(|identity| identity.allowed_on_wifi));
        assert!(snapshot.get(uids::ANY).is_some_and(|identity| !identity.allowed_on_mobile));
        Ok(())
    }

    #[test]
    fn memoizes_until_invalidated_and_caches_labels() -> Result<(), FirewallError> {
        let directory = Arc::new(FakeDirectory::new(&[("com.browser", 10005, true)]));
        let store = Arc::new(MemoryPreferences::new());
        let registry = IdentityRegistry::new(directory.clone(), accounts(), store.clone());

        let first = registry.snapshot()?;
        let second = registry.snapshot()?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(directory.builds.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get_string("cache.label.com.browser").as_deref(),
            Some("Label of com.browser")
        );

        registry.invalidate();
        registry.snapshot()?;
        assert_eq!(directory.builds.load(Ordering::SeqCst), 2);
        // Second build hits the label cache.
        assert_eq!(directory.label_loads.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn concurrent_first_callers_build_once() -> Result<(), FirewallError> {
        let directory = Arc::new(FakeDirectory::new(&[("com.browser", 10005, true)]));
        let registry = Arc::new(IdentityRegistry::new(
            directory.clone(),
            accounts(),
            Arc::new(MemoryPreferences::new()),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.snapshot().map(|snapshot| snapshot.len()))
            })
            .collect();
        for handle in handles {
            let joined = handle.join();
            assert!(matches!(joined, Ok(Ok(_))));
        }
        assert_eq!(directory.builds.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn resolves_bring_up_accounts_in_order() {
        let registry = IdentityRegistry::new(
            Arc::new(FakeDirectory::new(&[])),
            accounts(),
            Arc::new(MemoryPreferences::new()),
        );
        assert_eq!(
            registry.bring_up_accounts().accounts,
            vec![("dhcp".to_string(), 1014), ("wifi".to_string(), 1010)]
        );
    }
}
