//! The slice of the backend API the session machinery depends on.

use async_trait::async_trait;
use clinic_api_client::{ApiClient, ApiResult, LoginResponse, UserIdentity, VerifiedSession};

/// Authentication endpoints consumed by [`crate::SessionManager`].
///
/// Held as a trait object so tests can substitute an in-memory fake.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /login/access-token`
    async fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse>;

    /// `POST /login/access-token/verify-otp`
    async fn verify_otp(&self, temp_token: &str, code: &str) -> ApiResult<VerifiedSession>;

    /// `GET /users/me`
    async fn current_user(&self, access_token: &str) -> ApiResult<UserIdentity>;
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse> {
        ApiClient::login(self, email, password).await
    }

    async fn verify_otp(&self, temp_token: &str, code: &str) -> ApiResult<VerifiedSession> {
        ApiClient::verify_otp(self, temp_token, code).await
    }

    async fn current_user(&self, access_token: &str) -> ApiResult<UserIdentity> {
        ApiClient::current_user(self, access_token).await
    }
}
