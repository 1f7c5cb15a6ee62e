//! Durable credential storage for the clinic client.
//!
//! This crate provides:
//! - A [`SecureStorage`] trait over simple key/value backends
//! - [`FileStorage`]: a single JSON file on disk, the durable backend
//! - [`MemoryStorage`]: an in-memory backend for tests and ephemeral sessions
//! - [`CredentialStore`]: the high-level API holding the one durable
//!   session credential

mod credentials;
mod file;
mod keys;
mod memory;
mod traits;

pub use credentials::CredentialStore;
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();

        storage.set("test_key", "test_value").unwrap();
        assert_eq!(
            storage.get("test_key").unwrap(),
            Some("test_value".to_string())
        );

        assert!(storage.has("test_key").unwrap());
        assert!(!storage.has("nonexistent").unwrap());

        assert!(storage.delete("test_key").unwrap());
        assert!(!storage.delete("test_key").unwrap());
        assert_eq!(storage.get("test_key").unwrap(), None);
    }

    #[test]
    fn test_credential_store() {
        let storage = Box::new(MemoryStorage::new());
        let store = CredentialStore::new(storage);

        assert!(!store.has_access_token().unwrap());
        assert_eq!(store.get_access_token().unwrap(), None);

        store.set_access_token("token-123").unwrap();
        assert!(store.has_access_token().unwrap());
        assert_eq!(
            store.get_access_token().unwrap(),
            Some("token-123".to_string())
        );

        store.clear().unwrap();
        assert!(!store.has_access_token().unwrap());
    }

    #[test]
    fn test_credential_store_clear_is_idempotent() {
        let store = CredentialStore::new(Box::new(MemoryStorage::new()));
        store.set_access_token("t").unwrap();

        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.get_access_token().unwrap(), None);
    }

    #[test]
    fn test_credential_store_overwrite() {
        let store = CredentialStore::new(Box::new(MemoryStorage::new()));
        store.set_access_token("first").unwrap();
        store.set_access_token("second").unwrap();
        assert_eq!(
            store.get_access_token().unwrap(),
            Some("second".to_string())
        );
    }
}
