//! Configuration for the Stylefuzz front end
//!
//! Read from `stylefuzz.toml` in the working directory unless `--config`
//! or `STYLEFUZZ_CONFIG` names another file. Every field has a default, so
//! a missing file or a partial one is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "stylefuzz.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Number of worker threads replaying passes
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Plain-text log file, appended to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Debug-level logging
    #[serde(default)]
    pub verbose: bool,

    /// Abort `evolve` when trace events cannot be mapped to a schema position
    #[serde(default)]
    pub fail_on_unresolved: bool,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            log_file: None,
            verbose: false,
            fail_on_unresolved: false,
        }
    }
}

impl EvolutionConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: EvolutionConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Load `path`, or the defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EvolutionConfig::default();
        assert!(config.workers > 0);
        assert!(!config.verbose);
        assert!(!config.fail_on_unresolved);
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = EvolutionConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EvolutionConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "fail_on_unresolved = true\n").unwrap();

        let config = EvolutionConfig::load_or_default(&path).unwrap();
        assert!(config.fail_on_unresolved);
        assert_eq!(config.workers, default_workers());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let config = EvolutionConfig {
            workers: 3,
            log_file: Some(dir.path().join("logs").join("stylefuzz.log")),
            verbose: true,
            fail_on_unresolved: true,
        };

        config.save(&path).unwrap();
        assert_eq!(EvolutionConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "workers = \"many\"\n").unwrap();
        assert!(EvolutionConfig::load_or_default(&path).is_err());
    }
}
