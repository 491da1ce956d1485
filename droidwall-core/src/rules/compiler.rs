use droidwall_config::constants::{chains, exit_codes, uids};

use super::model::{FilterMode, RuleSet, TrafficClass};
use super::profile::{InterfaceProfile, LogFormat};
use super::script::Script;
use super::toolchain::Toolchain;

const FLUSH_ORDER: [(&str, i32); 4] = [
    (chains::ENTRY, exit_codes::FLUSH_ENTRY),
    (chains::MOBILE, exit_codes::FLUSH_MOBILE),
    (chains::WIFI, exit_codes::FLUSH_WIFI),
    (chains::REJECT, exit_codes::FLUSH_REJECT),
];

const CREATE_ORDER: [(&str, i32); 4] = [
    (chains::ENTRY, exit_codes::CREATE_ENTRY),
    (chains::MOBILE, exit_codes::CREATE_MOBILE),
    (chains::WIFI, exit_codes::CREATE_WIFI),
    (chains::REJECT, exit_codes::CREATE_REJECT),
];

/// Translates a [`RuleSet`] into filter-tool script text.
///
/// Compilation is pure: the same rule set always yields the same script, and
/// every script flushes the chains before repopulating them, so reapplying
/// converges on the same table.
#[derive(Debug, Clone)]
pub struct RuleCompiler {
    toolchain: Toolchain,
    profile: InterfaceProfile,
    log_format: LogFormat,
}

impl RuleCompiler {
    pub fn new(toolchain: Toolchain) -> Self {
        Self {
            toolchain,
            profile: InterfaceProfile::default(),
            log_format: LogFormat::default(),
        }
    }

    pub fn with_profile(mut self, profile: InterfaceProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_log_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn log_format(&self) -> &LogFormat {
        &self.log_format
    }

    pub fn compile(&self, rules: &RuleSet) -> Script {
        let mut script = self.toolchain.preamble();
        script.guarded("$IPTABLES --version", exit_codes::TOOL_VERSION);

        self.emit_setup(&mut script);
        emit_flush(&mut script);
        self.emit_reject_chain(&mut script, rules.logging_enabled());

        if rules.mode() == FilterMode::Whitelist && rules.logging_enabled() {
            script
                .comment("Allow DNS lookups on white-list for a better logging (ignore errors)")
                .best_effort(format!(
                    "$IPTABLES -A {} -p udp --dport 53 -j RETURN",
                    chains::ENTRY
                ));
        }

        self.emit_routing(&mut script);

        script.comment("Filtering rules");
        emit_bring_up(&mut script, rules);
        for class in TrafficClass::COMPILE_ORDER {
            emit_class_filter(&mut script, rules, class);
        }
        for class in TrafficClass::COMPILE_ORDER {
            emit_kernel_rules(&mut script, rules, class);
        }

        script
    }

    /// Flush every chain, leaving the chains and the output jump in place.
    ///
    /// Flushes are unguarded: a chain that was never created must not stop
    /// the remaining ones from being cleared.
    pub fn purge(&self) -> Script {
        let mut script = self.toolchain.preamble();
        script.comment("Flush existing rules");
        for (chain, _) in FLUSH_ORDER {
            script.best_effort(format!("$IPTABLES -F {chain}"));
        }
        script
    }

    pub fn list_rules(&self) -> Script {
        let mut script = self.toolchain.preamble();
        script
            .best_effort("$ECHO $IPTABLES")
            .best_effort("$IPTABLES -L -v");
        script
    }

    pub fn dump_log(&self) -> Script {
        let mut script = self.toolchain.preamble();
        script.best_effort(format!("dmesg | $GREP {}", self.log_format.grep_token));
        script
    }

    pub fn clear_log(&self) -> Script {
        let mut script = Script::new();
        script.guarded_bare("dmesg -c >/dev/null");
        script
    }

    /// Trivial script whose success proves elevation works.
    pub fn root_probe(&self) -> Script {
        let mut script = Script::new();
        script.best_effort("exit 0");
        script
    }

    fn emit_setup(&self, script: &mut Script) {
        script.comment("Create the droidwall chains if necessary");
        for (chain, code) in CREATE_ORDER {
            script.guarded(
                format!("$IPTABLES -L {chain} >/dev/null 2>/dev/null || $IPTABLES --new {chain}"),
                code,
            );
        }
        script
            .comment("Add droidwall chain to OUTPUT chain if necessary")
            .guarded(
                format!(
                    "$IPTABLES -L {output} | $GREP -q {entry} || $IPTABLES -A {output} -j {entry}",
                    output = chains::GLOBAL_OUTPUT,
                    entry = chains::ENTRY,
                ),
                exit_codes::INSTALL_JUMP,
            );
    }

    fn emit_reject_chain(&self, script: &mut Script, logging: bool) {
        if logging {
            script
                .comment("Create the log and reject rules (ignore errors on the LOG target)")
                .best_effort(format!(
                    "$IPTABLES -A {} -j LOG --log-prefix \"{}\" --log-uid",
                    chains::REJECT,
                    self.log_format.prefix
                ));
        } else {
            script.comment("Create the reject rule (log disabled)");
        }
        script.guarded(
            format!("$IPTABLES -A {} -j REJECT", chains::REJECT),
            exit_codes::INSTALL_REJECT,
        );
    }

    fn emit_routing(&self, script: &mut Script) {
        script.comment("Main rules (per interface)");
        for class in TrafficClass::COMPILE_ORDER {
            for prefix in self.profile.prefixes(class) {
                script.guarded_bare(format!(
                    "$IPTABLES -A {} -o {prefix} -j {}",
                    chains::ENTRY,
                    class.chain()
                ));
            }
        }
    }
}

fn emit_flush(script: &mut Script) {
    script.comment("Flush existing rules");
    for (chain, code) in FLUSH_ORDER {
        script.guarded(format!("$IPTABLES -F {chain}"), code);
    }
}

/// Whitelisted Wi-Fi must still let address assignment and radio
/// management through.
fn emit_bring_up(script: &mut Script, rules: &RuleSet) {
    if rules.mode() != FilterMode::Whitelist
        || rules.selection(TrafficClass::Wifi).is_wildcard()
    {
        return;
    }
    for (name, id) in &rules.bring_up().accounts {
        script
            .comment(format!("{name} user"))
            .guarded_bare(owner_rule(TrafficClass::Wifi, &id.to_string(), "RETURN"));
    }
}

fn emit_class_filter(script: &mut Script, rules: &RuleSet, class: TrafficClass) {
    let selection = rules.selection(class);
    let target = rules.mode().owner_target();
    if selection.is_wildcard() {
        if rules.mode() == FilterMode::Blacklist {
            script.guarded_bare(format!("$IPTABLES -A {} -j {target}", class.chain()));
        }
        return;
    }
    for id in selection.owner_ids() {
        script.guarded_bare(owner_rule(class, &id.to_string(), target));
    }
}

fn emit_kernel_rules(script: &mut Script, rules: &RuleSet, class: TrafficClass) {
    let selection = rules.selection(class);
    if selection.is_wildcard() {
        return;
    }
    let chain = class.chain();
    match rules.mode() {
        FilterMode::Whitelist if selection.includes_kernel() => {
            script
                .comment("Allow kernel packets on white-list")
                .guarded_bare(owner_rule(class, uids::ALL_OWNED_RANGE, chains::REJECT));
        }
        FilterMode::Whitelist => {
            script.guarded_bare(format!("$IPTABLES -A {chain} -j {}", chains::REJECT));
        }
        FilterMode::Blacklist if selection.includes_kernel() => {
            script
                .comment("Block kernel packets on black-list")
                .guarded_bare(owner_rule(class, uids::ALL_OWNED_RANGE, "RETURN"))
                .guarded_bare(format!("$IPTABLES -A {chain} -j {}", chains::REJECT));
        }
        FilterMode::Blacklist => {}
    }
}

fn owner_rule(class: TrafficClass, owner: &str, target: &str) -> String {
    format!(
        "$IPTABLES -A {} -m owner --uid-owner {owner} -j {target}",
        class.chain()
    )
}
