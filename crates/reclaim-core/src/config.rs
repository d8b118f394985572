use config::{Config, ConfigError, Environment, File as ConfigFile};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_TOMBSTONE_SUFFIX: &str = ".reclaim-tombstone.txt";
const DEFAULT_OUTPUT_DIR: &str = "reclaim-runs";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub root_path: String,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// When set, tombstones are not written and nothing is deleted.
    pub dry_run: bool,
    /// Parent directory of the per-run directories holding ledger and summary.
    pub output_dir: String,
    pub tombstone_suffix: String,
    pub grouper: GrouperConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_path: ".".to_string(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            dry_run: true,
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            tombstone_suffix: DEFAULT_TOMBSTONE_SUFFIX.to_string(),
            grouper: GrouperConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrouperKind {
    #[default]
    Builtin,
    External,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrouperConfig {
    pub kind: GrouperKind,
    /// Executable of the external grouping tool.
    pub command: Option<String>,
    /// Arguments passed to the tool. `{list}` and `{output}` are substituted
    /// with the candidate list and raw output paths.
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
}

/// Load configuration from `Config.toml` (if present) overlaid with `RECLAIM_*`
/// environment variables.
pub fn load_configuration() -> std::result::Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(environment())
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Same as [`load_configuration`] but reading an explicit file, which must exist.
pub fn load_configuration_from(path: &Path) -> std::result::Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::from(path).required(true))
        .add_source(environment())
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

fn environment() -> Environment {
    Environment::with_prefix("RECLAIM")
        .prefix_separator("_")
        .separator("__")
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tombstone_suffix.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "tombstone_suffix must not be empty".to_string(),
            ));
        }

        if self.grouper.kind == GrouperKind::External
            && self
                .grouper
                .command
                .as_deref()
                .map_or(true, |c| c.trim().is_empty())
        {
            return Err(Error::InvalidConfig(
                "external grouper requires a command".to_string(),
            ));
        }

        for glob in self.include_patterns.iter().chain(&self.exclude_patterns) {
            Pattern::new(glob)?;
        }

        Ok(())
    }

    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.root_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_dry_run() {
        let config = AppConfig::default();
        assert!(config.dry_run);
        assert_eq!(config.grouper.kind, GrouperKind::Builtin);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_suffix() {
        let config = AppConfig {
            tombstone_suffix: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_external_without_command() {
        let mut config = AppConfig::default();
        config.grouper.kind = GrouperKind::External;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        config.grouper.command = Some("fingerprint-tool".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let config = AppConfig {
            exclude_patterns: vec!["[unclosed".to_string()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Pattern(_))));
    }

    #[test]
    fn test_load_configuration_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reclaim.toml");
        std::fs::write(
            &path,
            r#"
root_path = "/data"
exclude_patterns = ["*.tmp"]
dry_run = false

[grouper]
kind = "external"
command = "fingerprint-tool"
args = ["--list", "{list}"]
timeout_secs = 30
"#,
        )
        .unwrap();

        let config = load_configuration_from(&path).unwrap();
        assert_eq!(config.root_path, "/data");
        assert_eq!(config.exclude_patterns, vec!["*.tmp".to_string()]);
        assert!(!config.dry_run);
        assert_eq!(config.grouper.kind, GrouperKind::External);
        assert_eq!(config.grouper.timeout_secs, Some(30));
        assert_eq!(config.tombstone_suffix, DEFAULT_TOMBSTONE_SUFFIX);
    }
}
