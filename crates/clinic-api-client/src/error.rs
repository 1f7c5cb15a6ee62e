//! API error types and normalization.

use thiserror::Error;

/// Error type for backend API operations.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The backend answered with a non-success status. `message` is already
    /// normalized to a human-readable string.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The backend answered with a shape that violates the protocol
    /// (e.g. an unknown login stage).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport-level failure (connection, TLS, body decoding).
    #[error("Request error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Result type for backend API operations.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Reduce any variant to the single human-readable string surfaced to
    /// the user. Raw transport structures never leave this crate.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Api { message, .. } => message.clone(),
            ApiError::Protocol(message) => message.clone(),
            ApiError::Transport(e) => e.to_string(),
        }
    }
}

/// Extract the most specific error message from a backend response body.
///
/// The backend is FastAPI-shaped; in order of preference:
/// - `{"detail": [{"loc": [...], "msg": "..."}]}` validation arrays
/// - `{"detail": "..."}` plain detail strings
/// - `{"message": "..."}`
/// - a generic fallback carrying the HTTP status
pub(crate) fn normalize_error_body(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        match value.get("detail") {
            Some(serde_json::Value::Array(items)) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|item| {
                        let msg = item.get("msg")?.as_str()?;
                        let loc = item
                            .get("loc")
                            .and_then(|l| l.as_array())
                            .map(|l| {
                                l.iter()
                                    .map(|seg| match seg {
                                        serde_json::Value::String(s) => s.clone(),
                                        other => other.to_string(),
                                    })
                                    .collect::<Vec<_>>()
                                    .join(".")
                            })
                            .unwrap_or_default();
                        Some(format!("{} - {}", loc, msg))
                    })
                    .collect();
                if !parts.is_empty() {
                    return parts.join("; ");
                }
            }
            Some(serde_json::Value::String(detail)) => return detail.clone(),
            _ => {}
        }

        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }

    format!("Request failed with status {}", status)
}
