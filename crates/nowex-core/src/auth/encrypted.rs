use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::store::{write_private, SessionStore, StoreError};

/// Encrypted session file name in the data directory
const ENCRYPTED_SESSION_FILE: &str = "session.enc.json";

const ENVELOPE_VERSION: u32 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// On-disk envelope. The token map is sealed as a single JSON blob.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    salt: Vec<u8>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

struct DerivedKey {
    salt: Vec<u8>,
    key: [u8; KEY_LEN],
}

/// Token file sealed with ChaCha20-Poly1305 under an Argon2-derived key.
///
/// A wrong passphrase or a tampered file surfaces as `StoreError::Crypto`.
pub struct EncryptedFileStore {
    path: PathBuf,
    passphrase: String,
    cached: Mutex<Option<DerivedKey>>,
}

impl EncryptedFileStore {
    pub fn new(data_dir: &Path, passphrase: impl Into<String>) -> Self {
        Self::at(data_dir.join(ENCRYPTED_SESSION_FILE), passphrase)
    }

    pub fn at(path: PathBuf, passphrase: impl Into<String>) -> Self {
        Self {
            path,
            passphrase: passphrase.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn derive(&self, cached: &mut Option<DerivedKey>, salt: &[u8]) -> Result<[u8; KEY_LEN], StoreError> {
        if let Some(derived) = cached.as_ref() {
            if derived.salt == salt {
                return Ok(derived.key);
            }
        }
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| StoreError::Crypto(format!("Key derivation failed: {}", e)))?;
        *cached = Some(DerivedKey {
            salt: salt.to_vec(),
            key,
        });
        Ok(key)
    }

    fn read_envelope(&self) -> Result<Option<Envelope>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let envelope: Envelope = serde_json::from_str(&contents)?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(StoreError::Serialization(format!(
                "Unsupported envelope version {}",
                envelope.version
            )));
        }
        if envelope.nonce.len() != NONCE_LEN || envelope.salt.len() < SALT_LEN {
            return Err(StoreError::Serialization("Malformed envelope".to_string()));
        }
        Ok(Some(envelope))
    }

    fn open(
        &self,
        cached: &mut Option<DerivedKey>,
        envelope: &Envelope,
    ) -> Result<HashMap<String, String>, StoreError> {
        let key = self.derive(cached, &envelope.salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
            .map_err(|_| StoreError::Crypto("Wrong passphrase or corrupted session file".to_string()))?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn seal(
        &self,
        cached: &mut Option<DerivedKey>,
        salt: Vec<u8>,
        map: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        if map.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }

        let key = self.derive(cached, &salt)?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let plaintext = serde_json::to_vec(map)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| StoreError::Crypto("Failed to encrypt session".to_string()))?;

        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            salt,
            nonce: nonce.to_vec(),
            ciphertext,
        };
        write_private(&self.path, serde_json::to_string(&envelope)?.as_bytes())
    }

    /// Apply a change to the decrypted map and re-seal it.
    fn modify<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut HashMap<String, String>) -> bool,
    {
        let mut cached = self.cached.lock().map_err(|_| StoreError::Poisoned)?;
        let (salt, mut map) = match self.read_envelope()? {
            Some(envelope) => {
                let map = self.open(&mut cached, &envelope)?;
                (envelope.salt, map)
            }
            None => {
                let mut salt = vec![0u8; SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt);
                (salt, HashMap::new())
            }
        };
        if change(&mut map) {
            self.seal(&mut cached, salt, &map)?;
        }
        Ok(())
    }
}

impl SessionStore for EncryptedFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut cached = self.cached.lock().map_err(|_| StoreError::Poisoned)?;
        match self.read_envelope()? {
            Some(envelope) => Ok(self.open(&mut cached, &envelope)?.remove(key)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.modify(|map| {
            map.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.modify(|map| map.remove(key).is_some())
    }
}
