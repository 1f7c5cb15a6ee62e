//! Storage key constants.

/// Storage keys used by the client
pub struct StorageKeys;

impl StorageKeys {
    /// Long-lived session access token, written on successful second-factor
    /// verification and erased on logout or credential invalidation.
    pub const ACCESS_TOKEN: &'static str = "final_auth_token";
}
