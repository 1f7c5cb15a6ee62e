//! Client-level error type.

use clinic_auth::AuthError;
use thiserror::Error;

/// Error type for high-level client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The operation requires a logged-in session.
    #[error("You must be logged in to perform this action.")]
    NotAuthenticated,

    /// The step-up approval window elapsed. Retryable.
    #[error("Authorization request timed out.")]
    StepUpTimedOut,

    /// The step-up flow was dismissed or superseded before it resolved.
    #[error("Authorization was dismissed.")]
    StepUpDismissed,

    /// Step-up initiation failed; carries the normalized server message.
    #[error("{0}")]
    StepUpFailed(String),

    /// Session-level failure (login, verification, storage).
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A backend call failed; carries the normalized server message.
    #[error("{0}")]
    Api(String),
}

/// Result type for high-level client operations.
pub type ClientResult<T> = Result<T, ClientError>;
