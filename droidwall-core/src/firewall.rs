use std::collections::BTreeSet;
use std::sync::Arc;

use droidwall_config::DroidwallConfig;
use droidwall_config::constants::prefs;
use droidwall_script_runner::{DID_NOT_COMPLETE, ExecutionResult, ScriptExecutor, ScriptRunner};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::FirewallError;
use crate::identity::{IdentityRegistry, IdentitySnapshot, NixAccounts, PackagesList};
use crate::log::{BlockReport, LogAnalyzer};
use crate::prefs::{JsonFilePreferences, PreferenceStore, format_id_list, parse_id_list};
use crate::rules::{
    CpuInfoProbe, FilterMode, OwnerId, RuleCompiler, RuleSet, Script, Toolchain, TrafficClass,
};

const STATUS_CHANNEL_CAPACITY: usize = 16;

/// Published on enabled-state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    StatusChanged(bool),
}

/// Firewall controller.
///
/// Owns the preference store, the identity registry, the compiler and the
/// script runner. Nothing here is process-global; construct one and pass it
/// by reference.
pub struct Firewall {
    store: Arc<dyn PreferenceStore>,
    registry: IdentityRegistry,
    compiler: RuleCompiler,
    analyzer: LogAnalyzer,
    runner: Arc<dyn ScriptRunner>,
    events: broadcast::Sender<StatusEvent>,
}

impl std::fmt::Debug for Firewall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Firewall")
            .field("registry", &self.registry)
            .field("compiler", &self.compiler)
            .finish_non_exhaustive()
    }
}

impl Firewall {
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        registry: IdentityRegistry,
        compiler: RuleCompiler,
        runner: Arc<dyn ScriptRunner>,
    ) -> Self {
        let (events, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let analyzer = LogAnalyzer::new(compiler.log_format().clone());
        Self {
            store,
            registry,
            compiler,
            analyzer,
            runner,
            events,
        }
    }

    /// Wire the default collaborators described by `config`.
    pub fn from_config(config: &DroidwallConfig) -> Result<Self, FirewallError> {
        let store: Arc<dyn PreferenceStore> =
            Arc::new(JsonFilePreferences::open(&config.paths.state_file)?);
        let registry = IdentityRegistry::new(
            Arc::new(PackagesList::new(&config.paths.packages_list)),
            Arc::new(NixAccounts),
            Arc::clone(&store),
        );
        let probe = CpuInfoProbe::new(&config.toolchain.cpu_info_path);
        let compiler = RuleCompiler::new(Toolchain::from_config(config, &probe));
        let runner = Arc::new(ScriptExecutor::new(
            config.executor.clone(),
            config.paths.cache_dir.clone(),
        ));
        Ok(Self::new(store, registry, compiler, runner))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn compiler(&self) -> &RuleCompiler {
        &self.compiler
    }

    pub fn is_enabled(&self) -> bool {
        self.store.get_bool(prefs::ENABLED).unwrap_or(false)
    }

    pub fn mode(&self) -> FilterMode {
        FilterMode::from_stored(self.store.get_string(prefs::MODE).as_deref())
    }

    pub fn logging_enabled(&self) -> bool {
        self.store.get_bool(prefs::LOG_ENABLED).unwrap_or(false)
    }

    pub fn is_password_protected(&self) -> bool {
        self.store
            .get_string(prefs::PASSWORD)
            .is_some_and(|password| !password.is_empty())
    }

    pub fn snapshot(&self) -> Result<Arc<IdentitySnapshot>, FirewallError> {
        self.registry.snapshot()
    }

    /// Rule set built from the persisted lists, without enumerating apps.
    pub fn saved_rules(&self) -> RuleSet {
        RuleSet::from_preferences(self.store.as_ref()).with_bring_up(self.registry.bring_up_accounts())
    }

    /// Persist the selection flags of `snapshot` as the two id lists.
    pub fn save_rules(&self, snapshot: &IdentitySnapshot) -> Result<(), FirewallError> {
        let selected = |class: TrafficClass| {
            format_id_list(
                snapshot
                    .iter()
                    .filter(|identity| identity.allowed_on(class))
                    .map(|identity| identity.id),
            )
        };
        let mut editor = self.store.edit();
        editor
            .put_string(prefs::WIFI_UIDS, selected(TrafficClass::Wifi))
            .put_string(prefs::MOBILE_UIDS, selected(TrafficClass::Mobile));
        self.store.commit(editor)?;
        Ok(())
    }

    /// Save the current snapshot's selections, then apply them.
    pub async fn apply_rules(&self) -> Result<(), FirewallError> {
        let snapshot = self.registry.snapshot()?;
        self.save_rules(&snapshot)?;
        let rules = RuleSet::from_snapshot(&snapshot, self.mode(), self.logging_enabled())
            .with_bring_up(self.registry.bring_up_accounts());
        self.apply(&rules).await
    }

    pub async fn apply_saved_rules(&self) -> Result<(), FirewallError> {
        let rules = self.saved_rules();
        self.apply(&rules).await
    }

    async fn apply(&self, rules: &RuleSet) -> Result<(), FirewallError> {
        let script = self.compiler.compile(rules);
        self.run_elevated(script, "apply rules").await?;
        info!(
            mode = %rules.mode(),
            logging = rules.logging_enabled(),
            wifi = rules.selection(TrafficClass::Wifi).len(),
            mobile = rules.selection(TrafficClass::Mobile).len(),
            "filter rules applied"
        );
        Ok(())
    }

    /// Flush the chains.
    ///
    /// Any completed run counts: a missing chain leaves nothing to flush.
    /// Only a script that never completed is an error.
    pub async fn purge(&self) -> Result<(), FirewallError> {
        let result = self
            .runner
            .execute_elevated(self.compiler.purge().render())
            .await;
        if result.exit_code == DID_NOT_COMPLETE {
            let err = FirewallError::from_execution(&result);
            warn!(error = %err, "purge failed");
            return Err(err);
        }
        if !result.success() {
            warn!(
                exit_code = result.exit_code,
                output = result.output.trim(),
                "purge completed with errors"
            );
        }
        info!("filter rules purged");
        Ok(())
    }

    /// Persist the enabled flag and publish the change.
    ///
    /// Returns `false` without touching storage when the value is unchanged.
    pub fn set_enabled(&self, enabled: bool) -> Result<bool, FirewallError> {
        if self.is_enabled() == enabled {
            return Ok(false);
        }
        let mut editor = self.store.edit();
        editor.put_bool(prefs::ENABLED, enabled);
        self.store.commit(editor)?;
        info!(enabled, "firewall status changed");
        if self.events.send(StatusEvent::StatusChanged(enabled)).is_err() {
            debug!("no status subscribers");
        }
        Ok(true)
    }

    /// Flip the enabled state: enabling applies the saved rules, disabling
    /// purges them. Disabling is refused while a password is set. The new
    /// state is persisted only after the script succeeds.
    pub async fn handle_toggle_request(&self) -> Result<bool, FirewallError> {
        let enable = !self.is_enabled();
        if enable {
            self.apply_saved_rules().await?;
        } else {
            if self.is_password_protected() {
                return Err(FirewallError::PasswordProtected);
            }
            self.purge().await?;
        }
        self.set_enabled(enable)?;
        Ok(enable)
    }

    /// Forget a removed package's id and reapply when enabled.
    pub async fn application_removed(&self, uid: OwnerId) -> Result<(), FirewallError> {
        let mut editor = self.store.edit();
        let mut changed = false;
        for class in [TrafficClass::Wifi, TrafficClass::Mobile] {
            let key = class.preference_key();
            let ids = parse_id_list(&self.store.get_string(key).unwrap_or_default());
            if ids.contains(&uid) {
                let kept = ids.into_iter().filter(|id| *id != uid);
                editor.put_string(key, format_id_list(kept));
                changed = true;
            }
        }
        if changed {
            self.store.commit(editor)?;
            debug!(uid, "removed package id from selections");
        }
        self.registry.invalidate();
        if changed && self.is_enabled() {
            self.apply_saved_rules().await?;
        }
        Ok(())
    }

    pub fn set_selection(
        &self,
        id: OwnerId,
        class: TrafficClass,
        allowed: bool,
    ) -> Result<(), FirewallError> {
        let key = class.preference_key();
        let mut ids: BTreeSet<OwnerId> = parse_id_list(&self.store.get_string(key).unwrap_or_default())
            .into_iter()
            .collect();
        let changed = if allowed { ids.insert(id) } else { ids.remove(&id) };
        if !changed {
            return Ok(());
        }
        let mut editor = self.store.edit();
        editor.put_string(key, format_id_list(ids));
        self.store.commit(editor)?;
        self.registry.invalidate();
        debug!(id, class = class.label(), allowed, "selection updated");
        Ok(())
    }

    pub fn set_mode(&self, mode: FilterMode) -> Result<(), FirewallError> {
        let mut editor = self.store.edit();
        editor.put_string(prefs::MODE, mode.as_str());
        self.store.commit(editor)?;
        Ok(())
    }

    pub fn set_logging(&self, enabled: bool) -> Result<(), FirewallError> {
        let mut editor = self.store.edit();
        editor.put_bool(prefs::LOG_ENABLED, enabled);
        self.store.commit(editor)?;
        Ok(())
    }

    /// An empty password clears the gate.
    pub fn set_password(&self, password: &str) -> Result<(), FirewallError> {
        let mut editor = self.store.edit();
        if password.is_empty() {
            editor.remove(prefs::PASSWORD);
        } else {
            editor.put_string(prefs::PASSWORD, password);
        }
        self.store.commit(editor)?;
        Ok(())
    }

    pub async fn has_root_access(&self) -> bool {
        let result = self
            .runner
            .execute_elevated(self.compiler.root_probe().render())
            .await;
        if !result.success() {
            debug!(exit_code = result.exit_code, "root probe failed");
        }
        result.success()
    }

    /// Current filter-tool listing.
    pub async fn show_rules(&self) -> Result<String, FirewallError> {
        let result = self.run_elevated(self.compiler.list_rules(), "list rules").await?;
        Ok(result.output)
    }

    /// Aggregated statistics of the logged blocks.
    ///
    /// A silent non-zero exit (grep matched nothing) is an empty report; a
    /// non-zero exit that printed something is a failure carrying that text.
    pub async fn block_report(&self) -> Result<BlockReport, FirewallError> {
        let result = self
            .runner
            .execute_elevated(self.compiler.dump_log().render())
            .await;
        if result.success() {
            return Ok(self.analyzer.parse(&result.output));
        }
        if result.exit_code != DID_NOT_COMPLETE && result.output.trim().is_empty() {
            debug!(exit_code = result.exit_code, "log dump matched nothing");
            return Ok(BlockReport::default());
        }
        let err = FirewallError::from_execution(&result);
        warn!(error = %err, "log dump failed");
        Err(err)
    }

    /// Rendered block report, resolving owners through the current snapshot.
    pub async fn show_log(&self) -> Result<String, FirewallError> {
        let report = self.block_report().await?;
        let snapshot = match self.registry.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "rendering log without app names");
                Arc::new(IdentitySnapshot::default())
            }
        };
        Ok(self.analyzer.render(&report, &snapshot))
    }

    pub async fn clear_log(&self) -> Result<(), FirewallError> {
        self.run_elevated(self.compiler.clear_log(), "clear log").await?;
        Ok(())
    }

    async fn run_elevated(
        &self,
        script: Script,
        action: &'static str,
    ) -> Result<ExecutionResult, FirewallError> {
        let result = self.runner.execute_elevated(script.render()).await;
        if result.success() {
            return Ok(result);
        }
        let err = FirewallError::from_execution(&result);
        warn!(
            action,
            exit_code = result.exit_code,
            step = FirewallError::step_name(result.exit_code),
            error = %err,
            "script failed"
        );
        Err(err)
    }
}
