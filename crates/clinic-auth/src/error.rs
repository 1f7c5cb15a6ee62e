//! Error types for session operations.

use thiserror::Error;

/// Error type for session and authentication operations.
///
/// Every variant already carries a human-readable message; raw transport
/// errors are normalized by the API client before they get here.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Credentials were rejected (login or code verification). Recoverable;
    /// the session stays in its current stage and the user may retry.
    #[error("{0}")]
    Credentials(String),

    /// The server answered with something outside the expected protocol
    /// (e.g. an unknown login stage). Fatal for the current attempt.
    #[error("{0}")]
    Protocol(String),

    /// Durable credential storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] clinic_storage::StorageError),
}

/// Result type for session operations.
pub type AuthResult<T> = Result<T, AuthError>;
