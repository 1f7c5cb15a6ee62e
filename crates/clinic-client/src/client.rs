//! The top-level client facade.

use crate::authed::SessionStepUpApi;
use crate::error::ClientResult;
use crate::records::{HealthRecords, RecordsApi};
use chrono::Utc;
use clinic_api_client::{ApiClient, UserIdentity};
use clinic_auth::{AuthApi, AuthStage, ElevationSlot, Session, SessionManager};
use clinic_core::{Config, Paths};
use clinic_step_up::{StepUpApi, StepUpConfig, StepUpCoordinator};
use clinic_storage::{CredentialStore, FileStorage};
use std::sync::Arc;
use tracing::info;

/// The assembled clinic client: session, step-up coordination, and gated
/// record access over one backend.
pub struct ClinicClient {
    session: Arc<SessionManager>,
    step_up: Arc<StepUpCoordinator>,
    elevation: ElevationSlot,
    records: HealthRecords,
}

impl ClinicClient {
    /// Build a client from configuration, with the durable credential store
    /// under the given paths.
    pub fn new(config: &Config, paths: &Paths) -> Self {
        let api = ApiClient::new(config.api_url.clone());
        let store = CredentialStore::new(Box::new(FileStorage::new(paths.credentials_file())));

        let session = Arc::new(SessionManager::new(Arc::new(api.clone()), store));
        let step_up_api: Arc<dyn StepUpApi> =
            Arc::new(SessionStepUpApi::new(api.clone(), session.clone()));

        Self::assemble(session, step_up_api, Arc::new(api), StepUpConfig::default())
    }

    /// Build a client from explicit collaborators. This is the seam tests
    /// use to substitute in-memory backends.
    pub fn with_collaborators(
        auth_api: Arc<dyn AuthApi>,
        step_up_api: Arc<dyn StepUpApi>,
        records_api: Arc<dyn RecordsApi>,
        store: CredentialStore,
        step_up_config: StepUpConfig,
    ) -> Self {
        let session = Arc::new(SessionManager::new(auth_api, store));
        Self::assemble(session, step_up_api, records_api, step_up_config)
    }

    fn assemble(
        session: Arc<SessionManager>,
        step_up_api: Arc<dyn StepUpApi>,
        records_api: Arc<dyn RecordsApi>,
        step_up_config: StepUpConfig,
    ) -> Self {
        let elevation = ElevationSlot::new();
        let step_up = Arc::new(StepUpCoordinator::new(
            step_up_api,
            elevation.clone(),
            step_up_config,
        ));
        let records = HealthRecords::new(
            records_api,
            session.clone(),
            step_up.clone(),
            elevation.clone(),
        );

        Self {
            session,
            step_up,
            elevation,
            records,
        }
    }

    /// Restore the session from the durable credential at process start.
    pub async fn bootstrap(&self) -> ClientResult<AuthStage> {
        Ok(self.session.bootstrap().await?)
    }

    /// Submit email and password; moves the session to `OtpRequired`.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<()> {
        Ok(self.session.login(email, password).await?)
    }

    /// Submit the second-factor code; establishes the full session.
    pub async fn verify_code(&self, code: &str) -> ClientResult<()> {
        Ok(self.session.verify_code(code).await?)
    }

    /// Log out.
    ///
    /// Synchronously cancels any in-flight step-up timers and polling, drops
    /// the elevated credential, then clears session state and the persisted
    /// credential. Idempotent.
    pub fn logout(&self) -> ClientResult<()> {
        self.step_up.dismiss();
        self.elevation.clear();
        self.session.logout()?;
        info!("Client logged out");
        Ok(())
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.session.current()
    }

    /// Current authentication stage.
    pub fn stage(&self) -> AuthStage {
        self.session.stage()
    }

    /// The cached identity, when logged in and validated.
    pub fn identity(&self) -> Option<UserIdentity> {
        self.session.current().identity
    }

    /// Gate check: whether a valid elevated credential is held right now.
    pub fn is_elevated(&self) -> bool {
        self.elevation.is_elevated(Utc::now())
    }

    /// The step-up coordinator, for observing or dismissing the flow.
    pub fn step_up(&self) -> &StepUpCoordinator {
        &self.step_up
    }

    /// Operations on the protected health-records resource class.
    pub fn records(&self) -> &HealthRecords {
        &self.records
    }
}
