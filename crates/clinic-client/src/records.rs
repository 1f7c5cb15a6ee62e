//! Gated operations on the protected health-records resource class.

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use chrono::Utc;
use clinic_api_client::{
    ApiClient, ApiResult, HealthRecord, HealthRecordPage, HealthRecordUpdate, NewHealthRecord,
    StepUpRequest,
};
use clinic_auth::{has_role, Elevation, ElevationSlot, SessionManager, ROLE_DOCTOR};
use clinic_step_up::{StepUpCoordinator, StepUpOutcome};
use std::sync::Arc;
use tracing::{debug, info};

/// Health-record endpoints consumed by [`HealthRecords`].
///
/// Every call carries both the session bearer and the elevated credential;
/// tests substitute an in-memory fake.
#[async_trait]
pub trait RecordsApi: Send + Sync {
    async fn list(
        &self,
        access_token: &str,
        third_token: &str,
        skip: u32,
        limit: u32,
    ) -> ApiResult<HealthRecordPage>;

    async fn create(
        &self,
        access_token: &str,
        third_token: &str,
        record: &NewHealthRecord,
    ) -> ApiResult<HealthRecord>;

    async fn update(
        &self,
        access_token: &str,
        third_token: &str,
        record_id: i64,
        record: &HealthRecordUpdate,
    ) -> ApiResult<HealthRecord>;

    async fn delete(&self, access_token: &str, third_token: &str, record_id: i64)
        -> ApiResult<()>;
}

#[async_trait]
impl RecordsApi for ApiClient {
    async fn list(
        &self,
        access_token: &str,
        third_token: &str,
        skip: u32,
        limit: u32,
    ) -> ApiResult<HealthRecordPage> {
        self.list_health_records(access_token, third_token, skip, limit)
            .await
    }

    async fn create(
        &self,
        access_token: &str,
        third_token: &str,
        record: &NewHealthRecord,
    ) -> ApiResult<HealthRecord> {
        self.create_health_record(access_token, third_token, record)
            .await
    }

    async fn update(
        &self,
        access_token: &str,
        third_token: &str,
        record_id: i64,
        record: &HealthRecordUpdate,
    ) -> ApiResult<HealthRecord> {
        self.update_health_record(access_token, third_token, record_id, record)
            .await
    }

    async fn delete(
        &self,
        access_token: &str,
        third_token: &str,
        record_id: i64,
    ) -> ApiResult<()> {
        self.delete_health_record(access_token, third_token, record_id)
            .await
    }
}

/// Operations on the protected health-records resource class.
///
/// Every operation consults the authorization gate first. When the gate
/// rejects, the operation is deferred behind a step-up flow and executes
/// only once the approval lands; timeout, failure, and dismissal surface as
/// typed errors so the caller can retry.
#[derive(Clone)]
pub struct HealthRecords {
    api: Arc<dyn RecordsApi>,
    session: Arc<SessionManager>,
    step_up: Arc<StepUpCoordinator>,
    elevation: ElevationSlot,
}

impl HealthRecords {
    pub fn new(
        api: Arc<dyn RecordsApi>,
        session: Arc<SessionManager>,
        step_up: Arc<StepUpCoordinator>,
        elevation: ElevationSlot,
    ) -> Self {
        Self {
            api,
            session,
            step_up,
            elevation,
        }
    }

    /// Advisory check mirroring the backend's role rules: only doctors
    /// create and modify records. Not a security boundary.
    pub fn can_modify(&self) -> bool {
        has_role(self.session.current().identity.as_ref(), ROLE_DOCTOR)
    }

    fn access_token(&self) -> ClientResult<String> {
        self.session
            .access_token()
            .ok_or(ClientError::NotAuthenticated)
    }

    /// The gate: reuse a still-valid elevation, otherwise defer behind a
    /// full step-up flow.
    async fn ensure_elevated(&self) -> ClientResult<Elevation> {
        if let Some(elevation) = self.elevation.current_valid(Utc::now()) {
            return Ok(elevation);
        }

        debug!("No valid elevated credential; starting step-up authorization");
        match self.step_up.run(StepUpRequest::health_records()).await {
            StepUpOutcome::Approved(elevation) => {
                info!("Elevated access granted");
                Ok(elevation)
            }
            StepUpOutcome::TimedOut => Err(ClientError::StepUpTimedOut),
            StepUpOutcome::Failed(message) => Err(ClientError::StepUpFailed(message)),
            StepUpOutcome::Dismissed => Err(ClientError::StepUpDismissed),
        }
    }

    /// List health records. `page` is 1-based.
    pub async fn list(&self, page: u32, limit: u32) -> ClientResult<HealthRecordPage> {
        let access_token = self.access_token()?;
        let elevation = self.ensure_elevated().await?;

        let skip = page.saturating_sub(1) * limit;
        self.api
            .list(&access_token, &elevation.token, skip, limit)
            .await
            .map_err(|e| ClientError::Api(e.user_message()))
    }

    /// Create a health record.
    pub async fn create(&self, record: &NewHealthRecord) -> ClientResult<HealthRecord> {
        let access_token = self.access_token()?;
        let elevation = self.ensure_elevated().await?;

        self.api
            .create(&access_token, &elevation.token, record)
            .await
            .map_err(|e| ClientError::Api(e.user_message()))
    }

    /// Update a health record.
    pub async fn update(
        &self,
        record_id: i64,
        record: &HealthRecordUpdate,
    ) -> ClientResult<HealthRecord> {
        let access_token = self.access_token()?;
        let elevation = self.ensure_elevated().await?;

        self.api
            .update(&access_token, &elevation.token, record_id, record)
            .await
            .map_err(|e| ClientError::Api(e.user_message()))
    }

    /// Delete a health record.
    pub async fn delete(&self, record_id: i64) -> ClientResult<()> {
        let access_token = self.access_token()?;
        let elevation = self.ensure_elevated().await?;

        self.api
            .delete(&access_token, &elevation.token, record_id)
            .await
            .map_err(|e| ClientError::Api(e.user_message()))
    }
}
