//! Typed client over the clinic backend REST API.

use crate::error::{normalize_error_body, ApiError, ApiResult};
use crate::types::{
    ElevatedToken, HealthRecord, HealthRecordPage, HealthRecordUpdate, LoginResponse,
    NewHealthRecord, StepUpChallenge, StepUpRequest, VerifiedSession,
};
use crate::UserIdentity;
use serde::de::DeserializeOwned;

/// Header carrying the elevated credential on protected resource calls,
/// distinct from the long-lived `Authorization` bearer.
pub const THIRD_TOKEN_HEADER: &str = "X-Third-Token";

/// REST API client for the clinic backend.
#[derive(Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    api_url: String,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Arguments
    /// * `api_url` - Base URL of the backend API (e.g. `https://clinic.example.com/api/v1`)
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into();
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build the full URL for an endpoint path.
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Check the response status and decode the JSON body, normalizing any
    /// backend failure into a single human-readable message.
    async fn into_json<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = normalize_error_body(status.as_u16(), &body);
            tracing::debug!(status = %status, message = %message, "API request failed");
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    /// Check the response status for calls with no interesting body.
    async fn into_unit(response: reqwest::Response) -> ApiResult<()> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = normalize_error_body(status.as_u16(), &body);
            tracing::debug!(status = %status, message = %message, "API request failed");
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    /// Authenticate with email and password.
    ///
    /// The backend expects OAuth2-style form fields and answers with the
    /// stage it has moved the attempt to; a successful password check yields
    /// `stage = "totp_required"` plus an interim token.
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse> {
        let response = self
            .http_client
            .post(self.endpoint("/login/access-token"))
            .form(&[("username", email), ("password", password)])
            .send()
            .await?;

        Self::into_json(response).await
    }

    /// Exchange the interim token and a TOTP code for the long-lived token.
    pub async fn verify_otp(&self, temp_token: &str, code: &str) -> ApiResult<VerifiedSession> {
        let response = self
            .http_client
            .post(self.endpoint("/login/access-token/verify-otp"))
            .bearer_auth(temp_token)
            .json(&serde_json::json!({ "code": code, "type": "totp" }))
            .send()
            .await?;

        Self::into_json(response).await
    }

    /// Fetch the profile of the currently authenticated user.
    ///
    /// Any failure here means the long-lived credential is no longer valid.
    pub async fn current_user(&self, access_token: &str) -> ApiResult<UserIdentity> {
        let response = self
            .http_client
            .get(self.endpoint("/users/me"))
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::into_json(response).await
    }

    /// Request a step-up challenge for a sensitive resource class.
    ///
    /// The backend pushes an approval prompt to the user's registered
    /// mobile device and returns the transaction handle.
    pub async fn initiate_step_up(
        &self,
        access_token: &str,
        request: &StepUpRequest,
    ) -> ApiResult<StepUpChallenge> {
        let response = self
            .http_client
            .post(self.endpoint("/third-factor/step-up-auth"))
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await?;

        Self::into_json(response).await
    }

    /// Attempt to redeem the elevated token for the current step-up
    /// transaction.
    ///
    /// Fails until the out-of-band approval has been granted; callers poll
    /// this and treat failure as the normal waiting state.
    pub async fn redeem_elevated_token(&self, access_token: &str) -> ApiResult<ElevatedToken> {
        let response = self
            .http_client
            .get(self.endpoint("/third-factor/third-token"))
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::into_json(response).await
    }

    /// List health records, paginated.
    pub async fn list_health_records(
        &self,
        access_token: &str,
        third_token: &str,
        skip: u32,
        limit: u32,
    ) -> ApiResult<HealthRecordPage> {
        let url = format!(
            "{}?skip={}&limit={}",
            self.endpoint("/health-records/list"),
            skip,
            limit
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .header(THIRD_TOKEN_HEADER, third_token)
            .send()
            .await?;

        Self::into_json(response).await
    }

    /// Create a health record.
    pub async fn create_health_record(
        &self,
        access_token: &str,
        third_token: &str,
        record: &NewHealthRecord,
    ) -> ApiResult<HealthRecord> {
        let response = self
            .http_client
            .post(self.endpoint("/health-records/create"))
            .bearer_auth(access_token)
            .header(THIRD_TOKEN_HEADER, third_token)
            .json(record)
            .send()
            .await?;

        Self::into_json(response).await
    }

    /// Update an existing health record.
    pub async fn update_health_record(
        &self,
        access_token: &str,
        third_token: &str,
        record_id: i64,
        record: &HealthRecordUpdate,
    ) -> ApiResult<HealthRecord> {
        let url = format!(
            "{}?record_id={}",
            self.endpoint("/health-records/update"),
            record_id
        );

        let response = self
            .http_client
            .put(&url)
            .bearer_auth(access_token)
            .header(THIRD_TOKEN_HEADER, third_token)
            .json(record)
            .send()
            .await?;

        Self::into_json(response).await
    }

    /// Delete a health record.
    pub async fn delete_health_record(
        &self,
        access_token: &str,
        third_token: &str,
        record_id: i64,
    ) -> ApiResult<()> {
        let url = format!(
            "{}?record_id={}",
            self.endpoint("/health-records/delete"),
            record_id
        );

        let response = self
            .http_client
            .delete(&url)
            .bearer_auth(access_token)
            .header(THIRD_TOKEN_HEADER, third_token)
            .send()
            .await?;

        Self::into_unit(response).await
    }
}
