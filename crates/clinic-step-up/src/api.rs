//! The slice of the backend API the coordinator depends on.

use async_trait::async_trait;
use clinic_api_client::{ApiResult, ElevatedToken, StepUpChallenge, StepUpRequest};

/// Step-up endpoints consumed by [`crate::StepUpCoordinator`].
///
/// Implementations attach the session bearer themselves (the coordinator
/// never sees the long-lived credential); tests substitute an in-memory
/// fake.
#[async_trait]
pub trait StepUpApi: Send + Sync {
    /// `POST /third-factor/step-up-auth`
    async fn initiate(&self, request: &StepUpRequest) -> ApiResult<StepUpChallenge>;

    /// `GET /third-factor/third-token`
    ///
    /// Fails until the out-of-band approval has been granted.
    async fn redeem(&self) -> ApiResult<ElevatedToken>;
}
