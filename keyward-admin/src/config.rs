//! TOML configuration for the dispatcher.

use anyhow::{Context, Result};
use keyward_license::LicenseConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Who may do what. Entries are identities as passed to `--as`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub admins: Vec<String>,
    pub buyers: Vec<String>,
    pub relays: Vec<String>,
}

/// Top-level configuration file.
///
/// ```toml
/// database = "keyward.db"
///
/// [license]
/// cooldown_secs = 86400
///
/// [access]
/// admins = ["owner"]
/// buyers = ["alice", "bob"]
/// relays = ["confirm-bot"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub database: PathBuf,
    pub license: LicenseConfig,
    pub access: AccessConfig,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("keyward.db"),
            license: LicenseConfig::default(),
            access: AccessConfig::default(),
        }
    }
}

impl AdminConfig {
    /// Reads the config file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text)
                .with_context(|| format!("Failed to parse config {}", path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to read config {}", path.display()))
            }
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.license.validate()?;
        Ok(config)
    }
}
