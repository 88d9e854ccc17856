//! Configuration file handling.
//!
//! This module provides loading and saving of regwatch configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/regwatch/config.toml`
//! - macOS: `~/Library/Application Support/regwatch/config.toml`
//! - Windows: `%APPDATA%\regwatch\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! feed_url = "https://replicate.npmjs.com/_changes"
//! registry_url = "https://registry.npmjs.org"
//! page_size = 500
//! max_per_run = 50
//! http_timeout_secs = 30
//! subprocess_timeout_secs = 120
//! max_tarball_mb = 50
//!
//! [github]
//! repo = "example/registry-findings"
//! token_env = "GITHUB_TOKEN"
//! ```
//!
//! No configuration value affects scoring: weights and thresholds are
//! compiled in so re-scanning an unchanged package is deterministic.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Change-feed endpoint (CouchDB `_changes` style).
    pub feed_url: String,

    /// Registry base URL for package lookups.
    pub registry_url: String,

    /// Directory holding the cursor and the discovered/scanned sets.
    ///
    /// Default: platform data directory, e.g. `~/.local/share/regwatch`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Feed entries requested per discovery run.
    pub page_size: usize,

    /// Cap on newly discovered identifiers per discovery run, and on
    /// packages scanned per scan run.
    pub max_per_run: usize,

    /// Timeout for every registry and feed HTTP call, in seconds.
    pub http_timeout_secs: u64,

    /// Timeout for external tool invocations and tarball extraction.
    pub subprocess_timeout_secs: u64,

    /// Largest tarball the sandbox will download, in megabytes.
    pub max_tarball_mb: u64,

    /// Issue-reporting configuration. Reporting is disabled until a
    /// repository is configured.
    #[serde(default)]
    pub github: GithubConfig,
}

/// Where findings get reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Target repository as `owner/repo`. `None` disables reporting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,

    /// Environment variable holding the API token. The token itself is
    /// never stored in the config file.
    pub token_env: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            repo: None,
            token_env: "GITHUB_TOKEN".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: "https://replicate.npmjs.com/_changes".to_string(),
            registry_url: "https://registry.npmjs.org".to_string(),
            state_dir: None,
            page_size: 500,
            max_per_run: 50,
            http_timeout_secs: 30,
            subprocess_timeout_secs: 120,
            max_tarball_mb: 50,
            github: GithubConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves the configuration to the config file, creating the parent
    /// directory if needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("regwatch")
            .join("config.toml")
    }

    /// The state directory, honoring the configured override.
    pub fn state_dir(&self) -> PathBuf {
        match &self.state_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("regwatch"),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn subprocess_timeout(&self) -> Duration {
        Duration::from_secs(self.subprocess_timeout_secs)
    }

    pub fn max_tarball_bytes(&self) -> u64 {
        self.max_tarball_mb * 1024 * 1024
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
