//! Step-up API adapter that injects the session bearer.

use async_trait::async_trait;
use clinic_api_client::{
    ApiClient, ApiError, ApiResult, ElevatedToken, StepUpChallenge, StepUpRequest,
};
use clinic_auth::SessionManager;
use clinic_step_up::StepUpApi;
use std::sync::Arc;

/// Attaches the current session's long-lived bearer to step-up calls, the
/// way the original client's request interceptor did.
pub struct SessionStepUpApi {
    api: ApiClient,
    session: Arc<SessionManager>,
}

impl SessionStepUpApi {
    pub fn new(api: ApiClient, session: Arc<SessionManager>) -> Self {
        Self { api, session }
    }

    fn access_token(&self) -> ApiResult<String> {
        self.session
            .access_token()
            .ok_or_else(|| ApiError::Protocol("Not authenticated.".to_string()))
    }
}

#[async_trait]
impl StepUpApi for SessionStepUpApi {
    async fn initiate(&self, request: &StepUpRequest) -> ApiResult<StepUpChallenge> {
        let token = self.access_token()?;
        self.api.initiate_step_up(&token, request).await
    }

    async fn redeem(&self) -> ApiResult<ElevatedToken> {
        let token = self.access_token()?;
        self.api.redeem_elevated_token(&token).await
    }
}
