//! Filter-tool and helper binary resolution.

use std::fs;
use std::path::{Path, PathBuf};

use droidwall_config::DroidwallConfig;
use droidwall_config::constants::toolchain;
use tracing::debug;

use super::script::{Script, shell_quote};

/// CPU family the bundled filter tool was built for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CpuVariant {
    /// ARMv6 / ARMv5TE devices needing the legacy build.
    LegacyArm,
    #[default]
    Generic,
}

impl CpuVariant {
    pub fn bundled_iptables(self) -> &'static str {
        match self {
            CpuVariant::LegacyArm => toolchain::BUNDLED_IPTABLES_LEGACY,
            CpuVariant::Generic => toolchain::BUNDLED_IPTABLES,
        }
    }
}

/// Strategy deciding which bundled build matches the device.
pub trait VariantProbe: Send + Sync {
    fn detect(&self) -> CpuVariant;
}

/// Probe that always answers the same variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedVariant(pub CpuVariant);

impl VariantProbe for FixedVariant {
    fn detect(&self) -> CpuVariant {
        self.0
    }
}

/// Reads `/proc/cpuinfo`-style text.
#[derive(Debug, Clone)]
pub struct CpuInfoProbe {
    path: PathBuf,
}

impl CpuInfoProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn parse(contents: &str) -> CpuVariant {
        let legacy = contents.lines().any(|line| {
            (line.starts_with("Processor") && line.contains("ARMv6"))
                || (line.starts_with("CPU architecture")
                    && (line.contains("6TE") || line.contains("5TE")))
        });
        if legacy {
            CpuVariant::LegacyArm
        } else {
            CpuVariant::Generic
        }
    }
}

impl VariantProbe for CpuInfoProbe {
    fn detect(&self) -> CpuVariant {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Self::parse(&contents),
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "cpu info unavailable; assuming generic variant");
                CpuVariant::Generic
            }
        }
    }
}

/// Locations searched by the script preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    cache_dir: PathBuf,
    variant: CpuVariant,
    system_busybox_paths: Vec<String>,
}

impl Toolchain {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        variant: CpuVariant,
        system_busybox_paths: Vec<String>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            variant,
            system_busybox_paths,
        }
    }

    pub fn from_config(config: &DroidwallConfig, probe: &dyn VariantProbe) -> Self {
        Self::new(
            config.paths.cache_dir.clone(),
            probe.detect(),
            config.toolchain.system_busybox_paths.clone(),
        )
    }

    pub fn variant(&self) -> CpuVariant {
        self.variant
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn bundled_iptables(&self) -> PathBuf {
        self.cache_dir.join(self.variant.bundled_iptables())
    }

    pub fn bundled_busybox(&self) -> PathBuf {
        self.cache_dir.join(toolchain::BUNDLED_BUSYBOX)
    }

    /// Shell preamble assigning `$IPTABLES`, `$BUSYBOX`, `$GREP` and `$ECHO`.
    ///
    /// The script aborts with status 1 when no working grep exists.
    pub fn preamble(&self) -> Script {
        let bundled_busybox = shell_quote(&self.bundled_busybox().to_string_lossy());
        let bundled_iptables = shell_quote(&self.bundled_iptables().to_string_lossy());

        let mut busybox = format!(
            "if {bundled_busybox} --help >/dev/null 2>/dev/null ; then\n\
             \tBUSYBOX={bundled_busybox}\n\
             \tGREP=\"$BUSYBOX grep\"\n\
             \tECHO=\"$BUSYBOX echo\"\n\
             elif busybox --help >/dev/null 2>/dev/null ; then\n\
             \tBUSYBOX=busybox\n"
        );
        for candidate in &self.system_busybox_paths {
            let candidate = shell_quote(candidate);
            busybox.push_str(&format!(
                "elif {candidate} --help >/dev/null 2>/dev/null ; then\n\tBUSYBOX={candidate}\n"
            ));
        }
        busybox.push_str("fi");

        let mut script = Script::new();
        script
            .raw("IPTABLES=iptables\nBUSYBOX=busybox\nGREP=grep\nECHO=echo")
            .comment("Try to find busybox")
            .raw(busybox)
            .comment("Try to find grep")
            .raw(
                "if ! $ECHO 1 | $GREP -q 1 >/dev/null 2>/dev/null ; then\n\
                 \tif $ECHO 1 | $BUSYBOX grep -q 1 >/dev/null 2>/dev/null ; then\n\
                 \t\tGREP=\"$BUSYBOX grep\"\n\
                 \tfi\n\
                 \tif ! $ECHO 1 | $GREP -q 1 >/dev/null 2>/dev/null ; then\n\
                 \t\t$ECHO The grep command is required. DroidWall will not work.\n\
                 \t\texit 1\n\
                 \tfi\n\
                 fi",
            )
            .comment("Try to find iptables")
            .raw(format!(
                "if {bundled_iptables} --version >/dev/null 2>/dev/null ; then\n\
                 \tIPTABLES={bundled_iptables}\n\
                 fi"
            ));
        script
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_legacy_arm_from_cpuinfo() {
        let armv6 = "Processor\t: ARMv6-compatible processor rev 2 (v6l)\nBogoMIPS\t: 527.97\n";
        assert_eq!(CpuInfoProbe::parse(armv6), CpuVariant::LegacyArm);

        let armv5 = "Processor\t: ARM926EJ-S rev 5 (v5l)\nCPU architecture: 5TEJ\n";
        assert_eq!(CpuInfoProbe::parse(armv5), CpuVariant::LegacyArm);

        let modern = "Processor\t: ARMv7 Processor rev 2 (v7l)\nCPU architecture: 7\n";
        assert_eq!(CpuInfoProbe::parse(modern), CpuVariant::Generic);
    }

    #[test]
    fn missing_cpuinfo_is_generic() {
        let probe = CpuInfoProbe::new("/nonexistent/cpuinfo");
        assert_eq!(probe.detect(), CpuVariant::Generic);
    }

    #[test]
    fn preamble_prefers_bundled_binaries() {
        let toolchain = Toolchain::new(
            "/data/data/droidwall/cache",
            CpuVariant::LegacyArm,
            vec!["/system/xbin/busybox".to_string()],
        );
        let text = toolchain.preamble().render();

        assert!(text.starts_with("IPTABLES=iptables\n"));
        assert!(text.contains("if /data/data/droidwall/cache/busybox_g1 --help"));
        assert!(text.contains("elif /system/xbin/busybox --help"));
        assert!(text.contains("\t\texit 1\n"));
        assert!(text.contains("\tIPTABLES=/data/data/droidwall/cache/iptables_g1\n"));

        let busybox_at = text.find("busybox_g1 --help");
        let grep_at = text.find("# Try to find grep");
        let iptables_at = text.find("# Try to find iptables");
        assert!(busybox_at < grep_at && grep_at < iptables_at);
    }

    #[test]
    fn generic_variant_uses_newer_build() {
        let toolchain = Toolchain::new("/cache", CpuVariant::Generic, Vec::new());
        assert_eq!(toolchain.bundled_iptables(), PathBuf::from("/cache/iptables_n1"));
        assert_eq!(
            FixedVariant(CpuVariant::LegacyArm).detect(),
            CpuVariant::LegacyArm
        );
    }
}
