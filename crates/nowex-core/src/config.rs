//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the backend address, request timeout, token store backend and
//! last used email.
//!
//! Configuration is stored at `~/.config/nowex-admin/config.json`. The
//! environment variables `NOWEX_API_URL`, `NOWEX_TIMEOUT_MS` and
//! `NOWEX_STORE` override the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_MS};
use crate::auth::{EncryptedFileStore, FileStore, KeyringStore, MemoryStore, SessionStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "nowex-admin";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_API_URL: &str = "NOWEX_API_URL";
pub const ENV_TIMEOUT_MS: &str = "NOWEX_TIMEOUT_MS";
pub const ENV_STORE: &str = "NOWEX_STORE";

/// Where session tokens are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Keyring,
    Encrypted,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StoreKind::File),
            "keyring" | "keychain" => Ok(StoreKind::Keyring),
            "encrypted" => Ok(StoreKind::Encrypted),
            "memory" => Ok(StoreKind::Memory),
            other => Err(anyhow::anyhow!(
                "Unknown store '{}' (expected file, keyring, encrypted or memory)",
                other
            )),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKind::File => "file",
            StoreKind::Keyring => "keyring",
            StoreKind::Encrypted => "encrypted",
            StoreKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub timeout_ms: u64,
    pub store: StoreKind,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            store: StoreKind::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in `load`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = timeout
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds", ENV_TIMEOUT_MS))?;
        }
        if let Some(store) = lookup(ENV_STORE) {
            self.store = store.parse()?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding persisted session files
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.api_url.clone()).with_timeout(Duration::from_millis(self.timeout_ms))
    }

    /// Open the configured token store. `passphrase` is only used by the
    /// encrypted store, which requires it.
    pub fn open_store(&self, passphrase: Option<String>) -> Result<Arc<dyn SessionStore>> {
        let store: Arc<dyn SessionStore> = match self.store {
            StoreKind::File => Arc::new(FileStore::new(&self.data_dir()?)),
            StoreKind::Keyring => Arc::new(KeyringStore::default()),
            StoreKind::Encrypted => {
                let passphrase = passphrase
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| anyhow::anyhow!("The encrypted store requires a passphrase"))?;
                Arc::new(EncryptedFileStore::new(&self.data_dir()?, passphrase))
            }
            StoreKind::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }
}
