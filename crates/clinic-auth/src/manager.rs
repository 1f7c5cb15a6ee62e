//! Effectful session orchestration.

use crate::api::AuthApi;
use crate::error::{AuthError, AuthResult};
use crate::session::{reduce, AuthStage, Session, SessionEvent};
use clinic_api_client::STAGE_TOTP_REQUIRED;
use clinic_storage::CredentialStore;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

struct ManagerInner {
    session: Session,
    /// Incremented on every transition into `LoggedIn` and on logout; an
    /// identity-fetch outcome is applied only if its captured epoch is still
    /// current, so a stale fetch can never resurrect or corrupt a session.
    login_epoch: u64,
}

/// Orchestrates session transitions and their effects: credential
/// persistence and the identity refresh that validates a login.
///
/// All network calls are awaited inline (cooperative scheduling); the inner
/// mutex is never held across an await point.
pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    store: CredentialStore,
    inner: Mutex<ManagerInner>,
    stage_tx: watch::Sender<AuthStage>,
}

impl SessionManager {
    /// Create a manager starting from a logged-out session. Call
    /// [`bootstrap`](Self::bootstrap) to restore persisted state.
    pub fn new(api: Arc<dyn AuthApi>, store: CredentialStore) -> Self {
        let (stage_tx, _) = watch::channel(AuthStage::LoggedOut);
        Self {
            api,
            store,
            inner: Mutex::new(ManagerInner {
                session: Session::logged_out(),
                login_epoch: 0,
            }),
            stage_tx,
        }
    }

    /// Restore the session from the durable credential at process start.
    ///
    /// A persisted token seeds an optimistic `LoggedIn` stage and an
    /// immediate identity refresh; if the refresh is rejected the session
    /// falls back to `LoggedOut` and the persisted credential is erased.
    pub async fn bootstrap(&self) -> AuthResult<AuthStage> {
        let token = self.store.get_access_token()?;

        match token {
            None => {
                debug!("No persisted credential; starting logged out");
                self.apply(SessionEvent::LoggedOut);
                Ok(AuthStage::LoggedOut)
            }
            Some(token) => {
                info!("Restoring session from persisted credential");
                {
                    let mut inner = self.inner.lock().expect("lock poisoned");
                    inner.session = Session::from_persisted(Some(token));
                    inner.login_epoch += 1;
                }
                self.stage_tx.send_replace(AuthStage::LoggedIn);

                self.refresh_identity().await?;
                Ok(self.stage())
            }
        }
    }

    /// Submit email and password.
    ///
    /// The backend always demands a second factor: on success the session
    /// moves to `OtpRequired` carrying the interim token. A response with
    /// any other stage is a protocol error and leaves the session unchanged.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<()> {
        let response = self
            .api
            .login(email, password)
            .await
            .map_err(|e| AuthError::Credentials(e.user_message()))?;

        if response.stage != STAGE_TOTP_REQUIRED {
            warn!(stage = %response.stage, "Unexpected login stage from server");
            return Err(AuthError::Protocol(
                "Unknown login stage received.".to_string(),
            ));
        }

        let temp_token = response.temp_token.ok_or_else(|| {
            AuthError::Protocol("Login response is missing the interim token.".to_string())
        })?;

        self.apply(SessionEvent::OtpChallenged { temp_token });
        info!("Password accepted; second factor required");
        Ok(())
    }

    /// Submit the second-factor code.
    ///
    /// On success the interim token is exchanged for the long-lived token,
    /// which is persisted before the stage transition, and the identity
    /// refresh fires. On failure the session is unchanged and the user may
    /// retry with the same interim token.
    pub async fn verify_code(&self, code: &str) -> AuthResult<()> {
        let temp_token = {
            let inner = self.inner.lock().expect("lock poisoned");
            inner.session.temp_token.clone()
        };
        let temp_token = temp_token.ok_or_else(|| {
            AuthError::Credentials("No temporary token found. Please login again.".to_string())
        })?;

        let verified = self
            .api
            .verify_otp(&temp_token, code)
            .await
            .map_err(|e| AuthError::Credentials(e.user_message()))?;

        self.store.set_access_token(&verified.access_token)?;

        {
            let mut inner = self.inner.lock().expect("lock poisoned");
            inner.session = reduce(
                &inner.session,
                SessionEvent::CodeVerified {
                    access_token: verified.access_token,
                },
            );
            inner.login_epoch += 1;
        }
        self.stage_tx.send_replace(AuthStage::LoggedIn);
        info!("Second factor verified; session established");

        self.refresh_identity().await?;
        Ok(())
    }

    /// Fetch the user profile for the current login.
    ///
    /// Issued exactly once per transition into `LoggedIn`. A rejection is
    /// treated as credential invalidation: it forces a full logout and
    /// erases the persisted credential, and it wins over any concurrent
    /// success. A success from a superseded login is discarded.
    pub async fn refresh_identity(&self) -> AuthResult<()> {
        let (access_token, epoch) = {
            let inner = self.inner.lock().expect("lock poisoned");
            if inner.session.stage != AuthStage::LoggedIn {
                return Ok(());
            }
            let token = inner
                .session
                .access_token
                .clone()
                .expect("logged-in session holds an access token");
            (token, inner.login_epoch)
        };

        match self.api.current_user(&access_token).await {
            Ok(identity) => {
                let mut inner = self.inner.lock().expect("lock poisoned");
                if inner.login_epoch != epoch {
                    debug!("Discarding identity for superseded login");
                    return Ok(());
                }
                inner.session = reduce(&inner.session, SessionEvent::IdentityLoaded { identity });
                info!("Identity refreshed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e.user_message(), "Identity fetch rejected; invalidating session");
                let stale = {
                    let mut inner = self.inner.lock().expect("lock poisoned");
                    if inner.login_epoch != epoch {
                        true
                    } else {
                        inner.session = reduce(&inner.session, SessionEvent::IdentityRejected);
                        inner.login_epoch += 1;
                        false
                    }
                };
                if !stale {
                    self.stage_tx.send_replace(AuthStage::LoggedOut);
                    self.store.clear()?;
                }
                Ok(())
            }
        }
    }

    /// Log out: clears the session, erases the persisted credential, and
    /// invalidates any in-flight identity fetch. Idempotent.
    pub fn logout(&self) -> AuthResult<()> {
        {
            let mut inner = self.inner.lock().expect("lock poisoned");
            inner.session = reduce(&inner.session, SessionEvent::LoggedOut);
            inner.login_epoch += 1;
        }
        self.stage_tx.send_replace(AuthStage::LoggedOut);
        self.store.clear()?;
        info!("Logged out");
        Ok(())
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Session {
        self.inner.lock().expect("lock poisoned").session.clone()
    }

    /// Current authentication stage.
    pub fn stage(&self) -> AuthStage {
        self.inner.lock().expect("lock poisoned").session.stage
    }

    /// The long-lived access token, when logged in.
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("lock poisoned")
            .session
            .access_token
            .clone()
    }

    /// Observe stage changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthStage> {
        self.stage_tx.subscribe()
    }

    fn apply(&self, event: SessionEvent) {
        let stage = {
            let mut inner = self.inner.lock().expect("lock poisoned");
            inner.session = reduce(&inner.session, event);
            inner.session.stage
        };
        self.stage_tx.send_replace(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clinic_api_client::{ApiError, ApiResult, LoginResponse, UserIdentity, VerifiedSession};
    use clinic_storage::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doctor() -> UserIdentity {
        UserIdentity {
            id: 7,
            full_name: "Dana Osei".to_string(),
            email: "dana@clinic.example".to_string(),
            is_active: true,
            role_id: 2,
            role_name: "doctor".to_string(),
        }
    }

    fn rejected(message: &str) -> ApiError {
        ApiError::Api {
            status: 401,
            message: message.to_string(),
        }
    }

    /// In-memory stand-in for the backend auth endpoints.
    struct FakeAuthApi {
        login_stage: String,
        login_fails: bool,
        verify_fails: bool,
        identity_fails: bool,
        identity_calls: AtomicUsize,
    }

    impl Default for FakeAuthApi {
        fn default() -> Self {
            Self {
                login_stage: STAGE_TOTP_REQUIRED.to_string(),
                login_fails: false,
                verify_fails: false,
                identity_fails: false,
                identity_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AuthApi for FakeAuthApi {
        async fn login(&self, _email: &str, _password: &str) -> ApiResult<LoginResponse> {
            if self.login_fails {
                return Err(rejected("Incorrect email or password"));
            }
            Ok(LoginResponse {
                stage: self.login_stage.clone(),
                temp_token: Some("temp-token".to_string()),
            })
        }

        async fn verify_otp(&self, _temp_token: &str, _code: &str) -> ApiResult<VerifiedSession> {
            if self.verify_fails {
                return Err(rejected("Invalid code"));
            }
            Ok(VerifiedSession {
                access_token: "final-token".to_string(),
            })
        }

        async fn current_user(&self, _access_token: &str) -> ApiResult<UserIdentity> {
            self.identity_calls.fetch_add(1, Ordering::SeqCst);
            if self.identity_fails {
                return Err(rejected("Could not validate credentials"));
            }
            Ok(doctor())
        }
    }

    fn manager_with(api: FakeAuthApi) -> (SessionManager, Arc<FakeAuthApi>) {
        let api = Arc::new(api);
        let store = CredentialStore::new(Box::new(MemoryStorage::new()));
        (SessionManager::new(api.clone(), store), api)
    }

    fn manager_with_store(
        api: FakeAuthApi,
        store: CredentialStore,
    ) -> (SessionManager, Arc<FakeAuthApi>) {
        let api = Arc::new(api);
        (SessionManager::new(api.clone(), store), api)
    }

    fn persisted_store(token: &str) -> CredentialStore {
        let store = CredentialStore::new(Box::new(MemoryStorage::new()));
        store.set_access_token(token).unwrap();
        store
    }

    // Scenario A: fresh boot, no persisted credential.
    #[tokio::test]
    async fn bootstrap_without_credential_is_logged_out() {
        let (manager, api) = manager_with(FakeAuthApi::default());

        let stage = manager.bootstrap().await.unwrap();
        assert_eq!(stage, AuthStage::LoggedOut);
        assert_eq!(api.identity_calls.load(Ordering::SeqCst), 0);
    }

    // Scenario B: boot with persisted credential, identity fetch succeeds.
    #[tokio::test]
    async fn bootstrap_with_credential_restores_session() {
        let (manager, api) =
            manager_with_store(FakeAuthApi::default(), persisted_store("persisted"));

        let stage = manager.bootstrap().await.unwrap();
        assert_eq!(stage, AuthStage::LoggedIn);

        let session = manager.current();
        assert_eq!(session.access_token.as_deref(), Some("persisted"));
        assert_eq!(session.identity.as_ref().unwrap().role_name, "doctor");
        assert_eq!(api.identity_calls.load(Ordering::SeqCst), 1);
    }

    // Scenario C: boot with persisted credential, identity fetch fails.
    #[tokio::test]
    async fn bootstrap_with_stale_credential_falls_back_to_logged_out() {
        let api = FakeAuthApi {
            identity_fails: true,
            ..FakeAuthApi::default()
        };
        let (manager, _) = manager_with_store(api, persisted_store("stale"));

        let stage = manager.bootstrap().await.unwrap();
        assert_eq!(stage, AuthStage::LoggedOut);
        assert_eq!(manager.current(), Session::logged_out());
    }

    #[tokio::test]
    async fn stale_credential_is_erased_from_store() {
        let api = FakeAuthApi {
            identity_fails: true,
            ..FakeAuthApi::default()
        };
        let (manager, _) = manager_with_store(api, persisted_store("stale"));
        manager.bootstrap().await.unwrap();

        // A second bootstrap finds nothing persisted.
        let stage = manager.bootstrap().await.unwrap();
        assert_eq!(stage, AuthStage::LoggedOut);
    }

    // Scenario D: login then verify.
    #[tokio::test]
    async fn login_moves_to_otp_required() {
        let (manager, _) = manager_with(FakeAuthApi::default());

        manager.login("dana@clinic.example", "pw").await.unwrap();

        let session = manager.current();
        assert_eq!(session.stage, AuthStage::OtpRequired);
        assert_eq!(session.temp_token.as_deref(), Some("temp-token"));
        assert!(session.access_token.is_none());
    }

    #[tokio::test]
    async fn verify_establishes_session_and_fetches_identity() {
        let (manager, api) = manager_with(FakeAuthApi::default());

        manager.login("dana@clinic.example", "pw").await.unwrap();
        manager.verify_code("123456").await.unwrap();

        let session = manager.current();
        assert_eq!(session.stage, AuthStage::LoggedIn);
        assert_eq!(session.access_token.as_deref(), Some("final-token"));
        assert!(session.temp_token.is_none());
        assert!(session.identity.is_some());
        assert_eq!(api.identity_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn login_failure_keeps_session_logged_out() {
        let api = FakeAuthApi {
            login_fails: true,
            ..FakeAuthApi::default()
        };
        let (manager, _) = manager_with(api);

        let err = manager.login("dana@clinic.example", "wrong").await;
        assert!(matches!(err, Err(AuthError::Credentials(_))));
        assert_eq!(manager.current(), Session::logged_out());
    }

    #[tokio::test]
    async fn unexpected_login_stage_is_protocol_error() {
        let api = FakeAuthApi {
            login_stage: "logged_in".to_string(),
            ..FakeAuthApi::default()
        };
        let (manager, _) = manager_with(api);

        let err = manager.login("dana@clinic.example", "pw").await;
        assert!(matches!(err, Err(AuthError::Protocol(_))));
        // No transition happened.
        assert_eq!(manager.stage(), AuthStage::LoggedOut);
    }

    #[tokio::test]
    async fn verify_failure_keeps_interim_token_for_retry() {
        let api = FakeAuthApi {
            verify_fails: true,
            ..FakeAuthApi::default()
        };
        let (manager, _) = manager_with(api);

        manager.login("dana@clinic.example", "pw").await.unwrap();
        let err = manager.verify_code("000000").await;
        assert!(matches!(err, Err(AuthError::Credentials(_))));

        let session = manager.current();
        assert_eq!(session.stage, AuthStage::OtpRequired);
        assert_eq!(session.temp_token.as_deref(), Some("temp-token"));
    }

    #[tokio::test]
    async fn verify_without_interim_token_is_rejected_locally() {
        let (manager, api) = manager_with(FakeAuthApi::default());

        let err = manager.verify_code("123456").await;
        assert!(matches!(err, Err(AuthError::Credentials(_))));
        assert_eq!(api.identity_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn verify_persists_credential_for_next_boot() {
        let (manager, _) = manager_with(FakeAuthApi::default());
        manager.login("dana@clinic.example", "pw").await.unwrap();
        manager.verify_code("123456").await.unwrap();

        // Simulate a restart over the same manager store: logout clears
        // memory but bootstrap restores from the persisted token first.
        let stage = manager.bootstrap().await.unwrap();
        assert_eq!(stage, AuthStage::LoggedIn);
        assert_eq!(manager.current().access_token.as_deref(), Some("final-token"));
    }

    #[tokio::test]
    async fn identity_rejection_after_verify_forces_logout() {
        let api = FakeAuthApi {
            identity_fails: true,
            ..FakeAuthApi::default()
        };
        let (manager, _) = manager_with(api);

        manager.login("dana@clinic.example", "pw").await.unwrap();
        manager.verify_code("123456").await.unwrap();

        assert_eq!(manager.current(), Session::logged_out());
    }

    #[tokio::test]
    async fn logout_clears_session_and_store() {
        let (manager, _) = manager_with(FakeAuthApi::default());
        manager.login("dana@clinic.example", "pw").await.unwrap();
        manager.verify_code("123456").await.unwrap();

        manager.logout().unwrap();
        assert_eq!(manager.current(), Session::logged_out());

        // Nothing persisted anymore.
        let stage = manager.bootstrap().await.unwrap();
        assert_eq!(stage, AuthStage::LoggedOut);
    }

    #[tokio::test]
    async fn logout_twice_is_identical_to_once() {
        let (manager, _) = manager_with(FakeAuthApi::default());
        manager.login("dana@clinic.example", "pw").await.unwrap();
        manager.verify_code("123456").await.unwrap();

        manager.logout().unwrap();
        let after_once = manager.current();
        manager.logout().unwrap();
        assert_eq!(manager.current(), after_once);
        assert_eq!(manager.current(), Session::logged_out());
    }

    #[tokio::test]
    async fn stage_watch_observes_transitions() {
        let (manager, _) = manager_with(FakeAuthApi::default());
        let rx = manager.subscribe();
        assert_eq!(*rx.borrow(), AuthStage::LoggedOut);

        manager.login("dana@clinic.example", "pw").await.unwrap();
        assert_eq!(*rx.borrow(), AuthStage::OtpRequired);

        manager.verify_code("123456").await.unwrap();
        assert_eq!(*rx.borrow(), AuthStage::LoggedIn);

        manager.logout().unwrap();
        assert_eq!(*rx.borrow(), AuthStage::LoggedOut);
    }

    #[tokio::test]
    async fn stale_identity_fetch_is_discarded_after_logout() {
        let (manager, api) = manager_with(FakeAuthApi::default());
        manager.login("dana@clinic.example", "pw").await.unwrap();
        manager.verify_code("123456").await.unwrap();

        // A fetch captured before logout must not be applied after it.
        manager.logout().unwrap();
        manager.refresh_identity().await.unwrap();
        assert_eq!(manager.current(), Session::logged_out());
        // refresh_identity after logout is a no-op: stage is LoggedOut.
        assert_eq!(api.identity_calls.load(Ordering::SeqCst), 1);
    }
}
