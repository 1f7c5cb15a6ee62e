//! High-level API for the durable session credential.

use crate::{SecureStorage, StorageKeys, StorageResult};

/// High-level store for the single durable session credential.
///
/// The long-lived access token is the only resource shared with the
/// environment outside process memory: written by a successful second-factor
/// verification, erased by logout or credential invalidation, read once at
/// process start.
pub struct CredentialStore {
    storage: Box<dyn SecureStorage>,
}

impl CredentialStore {
    /// Create a new credential store with the given storage backend
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Persist the long-lived access token
    pub fn set_access_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::ACCESS_TOKEN, token)
    }

    /// Retrieve the persisted access token, if any
    pub fn get_access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ACCESS_TOKEN)
    }

    /// Check whether a persisted access token exists
    pub fn has_access_token(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::ACCESS_TOKEN)
    }

    /// Erase the persisted access token. Safe to call when none exists.
    pub fn clear(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::ACCESS_TOKEN)?;
        Ok(())
    }
}
