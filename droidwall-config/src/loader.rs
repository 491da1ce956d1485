use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::constants::{defaults, toolchain};
use crate::executor::ExecutorConfig;

const KNOWN_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Root configuration document (`droidwall.toml`).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DroidwallConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DroidwallConfig {
    pub fn validate(&self) -> Result<()> {
        self.executor.validate()?;
        self.logging.validate()?;
        ensure!(
            !self.paths.cache_dir.as_os_str().is_empty(),
            "paths.cache_dir must not be empty"
        );
        ensure!(
            !self.paths.state_file.as_os_str().is_empty(),
            "paths.state_file must not be empty"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PathsConfig {
    /// Directory holding bundled binaries and temporary scripts.
    #[serde(default = "PathsConfig::default_cache_dir")]
    pub cache_dir: PathBuf,
    /// JSON file backing the preference store.
    #[serde(default = "PathsConfig::default_state_file")]
    pub state_file: PathBuf,
    /// Installed-package listing consulted by the identity registry.
    #[serde(default = "PathsConfig::default_packages_list")]
    pub packages_list: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: Self::default_cache_dir(),
            state_file: Self::default_state_file(),
            packages_list: Self::default_packages_list(),
        }
    }
}

impl PathsConfig {
    fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(defaults::CONFIG_DIR_NAME)
    }

    fn default_state_file() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(defaults::CONFIG_DIR_NAME)
            .join(defaults::STATE_FILE_NAME)
    }

    fn default_packages_list() -> PathBuf {
        PathBuf::from(toolchain::PACKAGES_LIST_PATH)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ToolchainConfig {
    /// System busybox locations probed after the bundled one.
    #[serde(default = "ToolchainConfig::default_system_busybox_paths")]
    pub system_busybox_paths: Vec<String>,
    /// Source used to detect the CPU variant of the bundled filter tool.
    #[serde(default = "ToolchainConfig::default_cpu_info_path")]
    pub cpu_info_path: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            system_busybox_paths: Self::default_system_busybox_paths(),
            cpu_info_path: Self::default_cpu_info_path(),
        }
    }
}

impl ToolchainConfig {
    fn default_system_busybox_paths() -> Vec<String> {
        toolchain::SYSTEM_BUSYBOX_PATHS
            .iter()
            .map(|path| (*path).to_string())
            .collect()
    }

    fn default_cpu_info_path() -> PathBuf {
        PathBuf::from(toolchain::CPU_INFO_PATH)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// Tracing targets the level applies to. Empty means every droidwall crate.
    #[serde(default)]
    pub targets: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            targets: Vec::new(),
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        defaults::DEFAULT_LOG_LEVEL.to_string()
    }

    /// Build an `EnvFilter` directive such as `droidwall=info,droidwall_core=info`.
    pub fn filter_directive(&self) -> String {
        let level = self.level.trim().to_ascii_lowercase();
        if self.targets.is_empty() {
            defaults::DEFAULT_TRACE_TARGETS
                .iter()
                .map(|target| format!("{target}={level}"))
                .collect::<Vec<_>>()
                .join(",")
        } else {
            self.targets
                .iter()
                .map(|target| format!("{}={level}", target.trim()))
                .collect::<Vec<_>>()
                .join(",")
        }
    }

    pub fn validate(&self) -> Result<()> {
        let level = self.level.trim().to_ascii_lowercase();
        ensure!(
            KNOWN_LOG_LEVELS.contains(&level.as_str()),
            "logging.level must be one of {}, got `{}`",
            KNOWN_LOG_LEVELS.join(", "),
            self.level
        );
        Ok(())
    }
}

/// Configuration manager for locating, loading and validating configuration.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: DroidwallConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from the default locations.
    ///
    /// Order: `DROIDWALL_CONFIG_PATH`, the user config directory, the system
    /// config file, then built-in defaults. The first file found wins.
    pub fn load() -> Result<Self> {
        if let Ok(config_path) = std::env::var(defaults::CONFIG_PATH_ENV_VAR) {
            let trimmed = config_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_file(trimmed).with_context(|| {
                    format!(
                        "Failed to load configuration from {}={}",
                        defaults::CONFIG_PATH_ENV_VAR,
                        trimmed
                    )
                });
            }
        }

        for candidate in Self::candidate_paths() {
            if candidate.exists() {
                return Self::load_from_file(&candidate);
            }
        }

        let config = DroidwallConfig::default();
        config
            .validate()
            .context("Default configuration failed validation")?;
        tracing::debug!("no configuration file found, using defaults");

        Ok(Self {
            config,
            config_path: None,
        })
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded configuration");

        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<DroidwallConfig> {
        let config: DroidwallConfig =
            toml::from_str(content).context("Invalid droidwall configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(
                config_dir
                    .join(defaults::CONFIG_DIR_NAME)
                    .join(defaults::CONFIG_FILE_NAME),
            );
        }
        paths.push(PathBuf::from(defaults::SYSTEM_CONFIG_PATH));
        paths
    }

    pub fn config(&self) -> &DroidwallConfig {
        &self.config
    }

    pub fn into_config(self) -> DroidwallConfig {
        self.config
    }

    /// Path of the file the configuration came from, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ConfigManager::parse("").expect("empty config parses");
        assert_eq!(config, DroidwallConfig::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = ConfigManager::parse("[executor]\ntimeout_ms = 5000\n")
            .expect("partial config parses");
        assert_eq!(config.executor.timeout_ms, 5000);
        assert_eq!(config.executor.grace_period_ms, 150);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let err = ConfigManager::parse("[logging]\nlevel = \"loud\"\n")
            .expect_err("unknown level must fail");
        assert!(format!("{err:#}").contains("logging.level"));
    }

    #[test]
    fn filter_directive_covers_all_crates_by_default() {
        let logging = LoggingConfig {
            level: "DEBUG".to_string(),
            targets: Vec::new(),
        };
        let directive = logging.filter_directive();
        assert!(directive.contains("droidwall=debug"));
        assert!(directive.contains("droidwall_core=debug"));
    }

    #[test]
    fn filter_directive_uses_explicit_targets() {
        let logging = LoggingConfig {
            level: "warn".to_string(),
            targets: vec!["droidwall_core".to_string()],
        };
        assert_eq!(logging.filter_directive(), "droidwall_core=warn");
    }
}
