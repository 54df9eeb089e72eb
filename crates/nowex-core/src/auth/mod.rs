//! Authentication session management.
//!
//! This module provides:
//! - `AuthManager`: login/logout orchestration with observable loading/error state
//! - `SessionStore`: injectable token persistence, with memory, file,
//!   encrypted-file and OS keychain implementations
//!
//! Tokens live until explicitly cleared; there is no expiry or refresh
//! exchange.

pub mod encrypted;
pub mod keyring_store;
pub mod manager;
pub mod store;

pub use encrypted::EncryptedFileStore;
pub use keyring_store::KeyringStore;
pub use manager::{AuthError, AuthManager, AuthState};
pub use store::{FileStore, MemoryStore, SessionStore, StoreError, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
