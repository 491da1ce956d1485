/// Chain names installed in the filter tool.
pub mod chains {
    /// Entry chain, jumped to from the global output chain.
    pub const ENTRY: &str = "droidwall";
    pub const MOBILE: &str = "droidwall-3g";
    pub const WIFI: &str = "droidwall-wifi";
    /// Shared terminal chain applying the deny action.
    pub const REJECT: &str = "droidwall-reject";
    /// The OS global output chain.
    pub const GLOBAL_OUTPUT: &str = "OUTPUT";
}

/// Positional exit codes emitted by the rule script.
///
/// Callers classify failures from the exit code alone.
pub mod exit_codes {
    pub const TOOL_VERSION: i32 = 1;
    pub const CREATE_ENTRY: i32 = 2;
    pub const CREATE_MOBILE: i32 = 3;
    pub const CREATE_WIFI: i32 = 4;
    pub const CREATE_REJECT: i32 = 5;
    pub const INSTALL_JUMP: i32 = 6;
    pub const FLUSH_ENTRY: i32 = 7;
    pub const FLUSH_MOBILE: i32 = 8;
    pub const FLUSH_WIFI: i32 = 9;
    pub const FLUSH_REJECT: i32 = 10;
    pub const INSTALL_REJECT: i32 = 11;
}

/// Owner id sentinels and ranges.
pub mod uids {
    /// Wildcard selection meaning "every identity".
    pub const ANY: i64 = -10;
    /// Packets with no owning process.
    pub const KERNEL: i64 = -11;
    /// Owner match covering every non-negative id.
    pub const ALL_OWNED_RANGE: &str = "0:999999999";
    /// Supplementary group granted to packages holding the network permission.
    pub const INET_GID: u32 = 3003;
}

/// Keys in the persisted preference store.
pub mod prefs {
    pub const ENABLED: &str = "Enabled";
    pub const MODE: &str = "BlockMode";
    pub const WIFI_UIDS: &str = "AllowedUidsWifi";
    pub const MOBILE_UIDS: &str = "AllowedUids3G";
    pub const PASSWORD: &str = "Password";
    pub const LOG_ENABLED: &str = "LogEnabled";
    pub const LABEL_CACHE_PREFIX: &str = "cache.label.";

    pub const MODE_WHITELIST: &str = "whitelist";
    pub const MODE_BLACKLIST: &str = "blacklist";

    /// Separator of the persisted id lists.
    pub const ID_LIST_SEPARATOR: char = '|';
}

/// Interface-name prefixes used to classify traffic.
pub mod interfaces {
    pub const WIFI: &[&str] = &["tiwlan+", "wlan+", "eth+"];
    pub const MOBILE: &[&str] = &["rmnet+", "pdp+", "ppp+", "uwbr+", "wimax+"];
}

/// Kernel log format produced by the reject chain's logging rule.
pub mod log {
    /// Prefix handed to the filter tool's log target.
    pub const PREFIX: &str = "[DROIDWALL] ";
    /// Bracket tag identifying our lines in the ring buffer.
    pub const TAG: &str = "[DROIDWALL]";
    /// Token used to pre-filter the ring buffer dump.
    pub const GREP_TOKEN: &str = "DROIDWALL";
    pub const UID_KEY: &str = "UID=";
    pub const DST_KEY: &str = "DST=";
    pub const KERNEL_LABEL: &str = "(kernel)";
    pub const EMPTY_REPORT: &str = "Log is empty";
}

/// Well-known system accounts.
pub mod accounts {
    /// Accounts that must stay reachable on Wi-Fi in whitelist mode
    /// (address assignment and radio management).
    pub const BRING_UP: &[&str] = &["dhcp", "wifi"];

    /// Accounts injected into the identity registry, with their labels.
    pub const SPECIAL: &[(&str, &str)] = &[
        ("root", "(root) - Applications running as root"),
        ("media", "Media server"),
        ("vpn", "VPN networking"),
        ("shell", "Linux shell"),
    ];

    pub const ANY_LABEL: &str = "(Any application) - Same as selecting all applications";
    pub const KERNEL_LABEL: &str = "(Kernel) - Linux kernel";
}

/// Script execution defaults.
pub mod execution {
    pub const DEFAULT_TIMEOUT_MS: u64 = 40_000;
    pub const DEFAULT_GRACE_PERIOD_MS: u64 = 150;
    pub const DEFAULT_REAP_WAIT_MS: u64 = 50;
    pub const DEFAULT_ELEVATION_PROGRAM: &str = "su";
    pub const DEFAULT_SHELL_PROGRAM: &str = "sh";
    /// Per-stream capture limit; bytes past it are read and discarded.
    pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;
    /// Interpreters tried, in order, for the script's first line.
    pub const INTERPRETER_CANDIDATES: &[&str] = &["/system/bin/sh", "/bin/sh"];
    pub const SCRIPT_FILE_PREFIX: &str = "droidwall-";
    pub const SCRIPT_FILE_SUFFIX: &str = ".sh";
    pub const TIMEOUT_NOTICE: &str = "\nOperation timed-out";
    /// Generic hint appended by the filter tool on usage errors.
    pub const TOOL_HELP_HINT: &str =
        "\nTry `iptables -h' or 'iptables --help' for more information.";
}

/// Filter-tool and helper binary locations.
pub mod toolchain {
    pub const BUNDLED_IPTABLES_LEGACY: &str = "iptables_g1";
    pub const BUNDLED_IPTABLES: &str = "iptables_n1";
    pub const BUNDLED_BUSYBOX: &str = "busybox_g1";
    pub const SYSTEM_BUSYBOX_PATHS: &[&str] = &["/system/xbin/busybox", "/system/bin/busybox"];
    pub const CPU_INFO_PATH: &str = "/proc/cpuinfo";
    pub const PACKAGES_LIST_PATH: &str = "/data/system/packages.list";
}

pub mod defaults {
    pub const CONFIG_FILE_NAME: &str = "droidwall.toml";
    pub const CONFIG_DIR_NAME: &str = "droidwall";
    pub const SYSTEM_CONFIG_PATH: &str = "/etc/droidwall/droidwall.toml";
    pub const CONFIG_PATH_ENV_VAR: &str = "DROIDWALL_CONFIG_PATH";
    pub const STATE_FILE_NAME: &str = "prefs.json";
    pub const DEFAULT_LOG_LEVEL: &str = "info";
    pub const DEFAULT_TRACE_TARGETS: &[&str] = &[
        "droidwall",
        "droidwall_core",
        "droidwall_script_runner",
        "droidwall_config",
    ];
}
