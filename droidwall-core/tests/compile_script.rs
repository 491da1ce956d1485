use droidwall_config::constants::uids;
use droidwall_core::rules::{
    BringUpAccounts, ClassSelection, CpuVariant, FilterMode, RuleCompiler, RuleSet, Toolchain,
};
use pretty_assertions::assert_eq;

fn compiler() -> RuleCompiler {
    RuleCompiler::new(Toolchain::new(
        "/cache",
        CpuVariant::Generic,
        vec![
            "/system/xbin/busybox".to_string(),
            "/system/bin/busybox".to_string(),
        ],
    ))
}

fn body_after_preamble(script: &str) -> &str {
    let start = script.find("$IPTABLES --version").unwrap_or(0);
    &script[start..]
}

#[test]
fn whitelist_script_matches_expected_text() {
    let rules = RuleSet::new(
        FilterMode::Whitelist,
        false,
        ClassSelection::new([10005, 10001, uids::KERNEL]),
        ClassSelection::new([10005]),
    )
    .with_bring_up(BringUpAccounts {
        accounts: vec![("dhcp".to_string(), 1014)],
    });

    let script = compiler().compile(&rules).render();

    let expected = "\
$IPTABLES --version || exit 1
# Create the droidwall chains if necessary
$IPTABLES -L droidwall >/dev/null 2>/dev/null || $IPTABLES --new droidwall || exit 2
$IPTABLES -L droidwall-3g >/dev/null 2>/dev/null || $IPTABLES --new droidwall-3g || exit 3
$IPTABLES -L droidwall-wifi >/dev/null 2>/dev/null || $IPTABLES --new droidwall-wifi || exit 4
$IPTABLES -L droidwall-reject >/dev/null 2>/dev/null || $IPTABLES --new droidwall-reject || exit 5
# Add droidwall chain to OUTPUT chain if necessary
$IPTABLES -L OUTPUT | $GREP -q droidwall || $IPTABLES -A OUTPUT -j droidwall || exit 6
# Flush existing rules
$IPTABLES -F droidwall || exit 7
$IPTABLES -F droidwall-3g || exit 8
$IPTABLES -F droidwall-wifi || exit 9
$IPTABLES -F droidwall-reject || exit 10
# Create the reject rule (log disabled)
$IPTABLES -A droidwall-reject -j REJECT || exit 11
# Main rules (per interface)
$IPTABLES -A droidwall -o rmnet+ -j droidwall-3g || exit
$IPTABLES -A droidwall -o pdp+ -j droidwall-3g || exit
$IPTABLES -A droidwall -o ppp+ -j droidwall-3g || exit
$IPTABLES -A droidwall -o uwbr+ -j droidwall-3g || exit
$IPTABLES -A droidwall -o wimax+ -j droidwall-3g || exit
$IPTABLES -A droidwall -o tiwlan+ -j droidwall-wifi || exit
$IPTABLES -A droidwall -o wlan+ -j droidwall-wifi || exit
$IPTABLES -A droidwall -o eth+ -j droidwall-wifi || exit
# Filtering rules
# dhcp user
$IPTABLES -A droidwall-wifi -m owner --uid-owner 1014 -j RETURN || exit
$IPTABLES -A droidwall-3g -m owner --uid-owner 10005 -j RETURN || exit
$IPTABLES -A droidwall-wifi -m owner --uid-owner 10001 -j RETURN || exit
$IPTABLES -A droidwall-wifi -m owner --uid-owner 10005 -j RETURN || exit
$IPTABLES -A droidwall-3g -j droidwall-reject || exit
# Allow kernel packets on white-list
$IPTABLES -A droidwall-wifi -m owner --uid-owner 0:999999999 -j droidwall-reject || exit
";
    assert_eq!(body_after_preamble(&script), expected);
}

#[test]
fn preamble_resolves_tools_before_use() {
    let script = compiler()
        .compile(&RuleSet::new(
            FilterMode::Blacklist,
            true,
            ClassSelection::default(),
            ClassSelection::default(),
        ))
        .render();

    let preamble_end = script.find("$IPTABLES --version").unwrap_or(0);
    let preamble = &script[..preamble_end];
    for variable in ["IPTABLES=", "BUSYBOX=", "GREP=", "ECHO="] {
        assert!(preamble.contains(variable), "{variable} not assigned");
    }
    assert!(preamble.contains("if /cache/iptables_n1 --version"));
    assert!(preamble.contains("elif /system/bin/busybox --help"));
    // Blacklist never adds the DNS bypass, even with logging.
    assert!(!script.contains("--dport 53"));
    assert!(script.contains("-j LOG --log-prefix \"[DROIDWALL] \" --log-uid\n"));
}

#[test]
fn recompiling_yields_identical_text() {
    let rules = RuleSet::new(
        FilterMode::Blacklist,
        true,
        ClassSelection::new([10020, uids::KERNEL, 10003]),
        ClassSelection::new([uids::ANY, 10003]),
    );
    let compiler = compiler();
    let first = compiler.compile(&rules).render();
    for _ in 0..3 {
        assert_eq!(compiler.compile(&rules).render(), first);
    }
}
