use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

/// Store key holding the bearer token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Store key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(String),

    #[error("Stored session is corrupt: {0}")]
    Serialization(String),

    #[error("Keychain error: {0}")]
    Keyring(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Session store lock poisoned")]
    Poisoned,
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Durable key/value storage for session tokens.
///
/// Writes are whole-value overwrites. `clear` on a missing key succeeds.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store; contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.entries.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Plain JSON key/value file, e.g. `~/.local/share/nowex-admin/session.json`.
///
/// The whole map is rewritten on every change; the file is removed once
/// the last key is cleared.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(data_dir: &Path) -> Self {
        Self::at(data_dir.join(SESSION_FILE))
    }

    /// Use an explicit file path
    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<HashMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<(), StoreError> {
        if map.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        let contents = serde_json::to_string_pretty(map)?;
        write_private(&self.path, contents.as_bytes())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Write a file readable only by the current user.
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    // New files are created owner-only, so the tokens are never readable by others.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;

    // `mode` only applies on creation; tighten files left by older versions.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}
