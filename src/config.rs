//! Configuration file management.
//!
//! Reads `gantry.toml` from the working directory first, then the user config
//! directory. Environment variables override file values; flags override
//! both (applied by the CLI layer).

use crate::env_vars;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "gantry.toml";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Application configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Registry source URL.
    #[serde(default)]
    pub source: Option<String>,

    /// Destination module tree.
    #[serde(default)]
    pub destination: Option<String>,

    /// Archive cache directory.
    #[serde(default)]
    pub cache_dir: Option<String>,

    /// Include pre-release versions by default.
    #[serde(default)]
    pub prerelease: Option<bool>,

    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl Config {
    /// Load configuration from the working directory or the user config
    /// directory; absent files yield the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when a config file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let local = Path::new(CONFIG_FILE);
        if local.is_file() {
            return Self::load_from(local);
        }
        if let Some(config_dir) = dirs::config_dir() {
            let global = config_dir.join("gantry").join(CONFIG_FILE);
            if global.is_file() {
                return Self::load_from(&global);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Effective registry source: environment, then config, then the default.
    #[must_use]
    pub fn source(&self) -> String {
        env_vars::source()
            .or_else(|| self.source.clone())
            .unwrap_or_else(|| crate::DEFAULT_SOURCE.to_string())
    }

    /// Effective destination module tree. Defaults to the user's module
    /// directory under the platform data dir.
    #[must_use]
    pub fn destination(&self) -> PathBuf {
        env_vars::destination()
            .or_else(|| self.destination.clone())
            .map_or_else(default_destination, PathBuf::from)
    }

    /// Effective archive cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        env_vars::cache_dir()
            .or_else(|| self.cache_dir.clone())
            .map_or_else(default_cache_dir, PathBuf::from)
    }

    /// Effective request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            env_vars::timeout()
                .or(self.timeout)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn prerelease(&self) -> bool {
        self.prerelease.unwrap_or(false)
    }
}

fn default_destination() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("powershell")
        .join("Modules")
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("gantry")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.source(), crate::DEFAULT_SOURCE);
        assert!(!config.prerelease());
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn file_values_are_used() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "source = \"https://registry.example.test/index.json\"\nprerelease = true\ntimeout = 5\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.source(), "https://registry.example.test/index.json");
        assert!(config.prerelease());
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn malformed_file_fails() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, "source = [not toml").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
