//! The step-up coordinator state machine.

use crate::api::StepUpApi;
use chrono::Utc;
use clinic_api_client::{ElevatedToken, StepUpChallenge, StepUpRequest};
use clinic_auth::{Elevation, ElevationSlot};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default interval between redemption attempts while waiting for the
/// out-of-band approval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Configuration for the coordinator's polling behavior.
///
/// The timeout is not configured here: the approval window comes from the
/// backend with every challenge.
#[derive(Debug, Clone)]
pub struct StepUpConfig {
    /// How often to attempt redemption while pending approval.
    pub poll_interval: Duration,
}

impl Default for StepUpConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// State of the in-flight step-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Initiating,
    PendingApproval,
    TimedOut,
    /// Initiation failed; carries the normalized server message.
    Error(String),
}

/// Terminal outcome of one step-up attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum StepUpOutcome {
    /// The approval was granted and the elevated credential recorded.
    Approved(Elevation),
    /// The approval window elapsed without a grant.
    TimedOut,
    /// Initiation failed; carries the normalized server message.
    Failed(String),
    /// The flow was dismissed or superseded before resolution.
    Dismissed,
}

struct Inner {
    /// Bumped on every new attempt and on dismissal. Task results carrying
    /// a stale epoch are discarded, which is what makes teardown atomic
    /// with respect to state transitions.
    epoch: u64,
    state: RequestState,
    challenge: Option<StepUpChallenge>,
    timeout_task: Option<JoinHandle<()>>,
    poll_task: Option<JoinHandle<()>>,
    outcome_tx: Option<oneshot::Sender<StepUpOutcome>>,
}

struct Shared {
    api: Arc<dyn StepUpApi>,
    elevation: ElevationSlot,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<RequestState>,
}

impl Shared {
    fn set_state(&self, inner: &mut Inner, state: RequestState) {
        inner.state = state.clone();
        self.state_tx.send_replace(state);
    }

    /// Cancel the timer/poller pair and resolve the pending outcome.
    /// Callers decide the follow-up state.
    fn teardown(&self, inner: &mut Inner, outcome: StepUpOutcome) {
        inner.epoch += 1;
        if let Some(task) = inner.timeout_task.take() {
            task.abort();
        }
        if let Some(task) = inner.poll_task.take() {
            task.abort();
        }
        inner.challenge = None;
        if let Some(tx) = inner.outcome_tx.take() {
            let _ = tx.send(outcome);
        }
    }

    /// Applied when the approval window elapses.
    fn resolve_timeout(&self, epoch: u64) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.epoch != epoch || inner.state != RequestState::PendingApproval {
            return;
        }
        // Cancel the poller atomically with the transition so a late
        // redemption can never be applied on top of the timeout.
        if let Some(task) = inner.poll_task.take() {
            task.abort();
        }
        inner.timeout_task = None;
        inner.challenge = None;
        self.set_state(&mut inner, RequestState::TimedOut);
        if let Some(tx) = inner.outcome_tx.take() {
            let _ = tx.send(StepUpOutcome::TimedOut);
        }
        warn!("Step-up authorization timed out");
    }

    /// Applied when a redemption attempt succeeds.
    fn resolve_approved(&self, epoch: u64, token: ElevatedToken) {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.epoch != epoch || inner.state != RequestState::PendingApproval {
            debug!("Discarding elevated token for a finished step-up attempt");
            return;
        }
        if let Some(task) = inner.timeout_task.take() {
            task.abort();
        }
        inner.poll_task = None;
        inner.challenge = None;

        let elevation = Elevation::from_expiry_window(token.third_token, token.expires_in_sec, now);
        self.elevation.set(elevation.clone());
        self.set_state(&mut inner, RequestState::Idle);
        if let Some(tx) = inner.outcome_tx.take() {
            let _ = tx.send(StepUpOutcome::Approved(elevation));
        }
        info!("Step-up authorization approved");
    }
}

/// Drives the out-of-band approval protocol for elevated access.
///
/// A successful attempt records its [`Elevation`] in the shared
/// [`ElevationSlot`]; the coordinator itself never retains a credential.
pub struct StepUpCoordinator {
    shared: Arc<Shared>,
    config: StepUpConfig,
}

impl StepUpCoordinator {
    pub fn new(api: Arc<dyn StepUpApi>, elevation: ElevationSlot, config: StepUpConfig) -> Self {
        let (state_tx, _) = watch::channel(RequestState::Idle);
        Self {
            shared: Arc::new(Shared {
                api,
                elevation,
                inner: Mutex::new(Inner {
                    epoch: 0,
                    state: RequestState::Idle,
                    challenge: None,
                    timeout_task: None,
                    poll_task: None,
                    outcome_tx: None,
                }),
                state_tx,
            }),
            config,
        }
    }

    /// Current request state.
    pub fn state(&self) -> RequestState {
        self.shared.inner.lock().expect("lock poisoned").state.clone()
    }

    /// The challenge of the in-flight transaction, for display.
    pub fn challenge(&self) -> Option<StepUpChallenge> {
        self.shared
            .inner
            .lock()
            .expect("lock poisoned")
            .challenge
            .clone()
    }

    /// Observe request-state changes.
    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.shared.state_tx.subscribe()
    }

    /// Begin a step-up attempt and await its outcome.
    pub async fn run(&self, request: StepUpRequest) -> StepUpOutcome {
        let rx = self.start(request).await;
        match rx.await {
            Ok(outcome) => outcome,
            // The sender is dropped only if the coordinator itself is; treat
            // that as a dismissal.
            Err(_) => StepUpOutcome::Dismissed,
        }
    }

    /// Begin a step-up attempt.
    ///
    /// Any previous attempt is torn down first (its waiter resolves
    /// `Dismissed`), so at most one timer/poller pair is ever alive. The
    /// returned receiver resolves with the attempt's outcome.
    pub async fn start(&self, request: StepUpRequest) -> oneshot::Receiver<StepUpOutcome> {
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let epoch = {
            let mut inner = self.shared.inner.lock().expect("lock poisoned");
            self.shared.teardown(&mut inner, StepUpOutcome::Dismissed);
            inner.outcome_tx = Some(outcome_tx);
            self.shared.set_state(&mut inner, RequestState::Initiating);
            inner.epoch
        };

        debug!(
            target_resource = %request.target_resource,
            "Initiating step-up authorization"
        );
        let initiated = self.shared.api.initiate(&request).await;

        let mut inner = self.shared.inner.lock().expect("lock poisoned");
        if inner.epoch != epoch {
            // Dismissed or superseded while the initiate call was in
            // flight; the waiter has already been resolved.
            return outcome_rx;
        }

        match initiated {
            Ok(challenge) => {
                info!(
                    txn_id = %challenge.txn_id,
                    expires_in_sec = challenge.expires_in_sec,
                    "Approval request sent to the registered device"
                );
                let window = Duration::from_secs(challenge.expires_in_sec);
                inner.challenge = Some(challenge);
                self.shared.set_state(&mut inner, RequestState::PendingApproval);

                let shared = self.shared.clone();
                inner.timeout_task = Some(tokio::spawn(async move {
                    tokio::time::sleep(window).await;
                    shared.resolve_timeout(epoch);
                }));

                let shared = self.shared.clone();
                let poll_interval = self.config.poll_interval;
                inner.poll_task = Some(tokio::spawn(async move {
                    let start = tokio::time::Instant::now() + poll_interval;
                    let mut ticker = tokio::time::interval_at(start, poll_interval);
                    loop {
                        ticker.tick().await;
                        match shared.api.redeem().await {
                            Ok(token) => {
                                shared.resolve_approved(epoch, token);
                                break;
                            }
                            Err(e) => {
                                // Expected while the user has not approved yet.
                                debug!(reason = %e.user_message(), "Elevated token not ready");
                            }
                        }
                    }
                }));
            }
            Err(e) => {
                let message = e.user_message();
                warn!(error = %message, "Step-up initiation failed");
                self.shared
                    .set_state(&mut inner, RequestState::Error(message.clone()));
                if let Some(tx) = inner.outcome_tx.take() {
                    let _ = tx.send(StepUpOutcome::Failed(message));
                }
            }
        }

        outcome_rx
    }

    /// Dismiss the flow: cancel the timer/poller pair and reset to `Idle`.
    ///
    /// Safe to call in any state and idempotent; an already-recorded
    /// elevation is not touched. This is also the teardown surface logout
    /// uses, so no timers survive a logout.
    pub fn dismiss(&self) {
        let mut inner = self.shared.inner.lock().expect("lock poisoned");
        self.shared.teardown(&mut inner, StepUpOutcome::Dismissed);
        if inner.state != RequestState::Idle {
            self.shared.set_state(&mut inner, RequestState::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clinic_api_client::{ApiError, ApiResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pending_error() -> ApiError {
        ApiError::Api {
            status: 403,
            message: "Authorization not yet approved".to_string(),
        }
    }

    /// Programmable backend double for the step-up endpoints.
    struct FakeStepUpApi {
        initiate_fails: bool,
        expires_in_sec: u64,
        /// Redemption succeeds from this call count on; `usize::MAX` never.
        approve_at_call: AtomicUsize,
        redeem_calls: AtomicUsize,
        initiate_calls: AtomicUsize,
    }

    impl FakeStepUpApi {
        fn approving_at(expires_in_sec: u64, approve_at_call: usize) -> Self {
            Self {
                initiate_fails: false,
                expires_in_sec,
                approve_at_call: AtomicUsize::new(approve_at_call),
                redeem_calls: AtomicUsize::new(0),
                initiate_calls: AtomicUsize::new(0),
            }
        }

        fn never_approving(expires_in_sec: u64) -> Self {
            Self::approving_at(expires_in_sec, usize::MAX)
        }

        fn failing_initiate() -> Self {
            Self {
                initiate_fails: true,
                ..Self::never_approving(60)
            }
        }

        fn redeem_count(&self) -> usize {
            self.redeem_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StepUpApi for FakeStepUpApi {
        async fn initiate(&self, _request: &StepUpRequest) -> ApiResult<StepUpChallenge> {
            self.initiate_calls.fetch_add(1, Ordering::SeqCst);
            if self.initiate_fails {
                return Err(ApiError::Api {
                    status: 503,
                    message: "Push service unavailable".to_string(),
                });
            }
            Ok(StepUpChallenge {
                txn_id: "txn-1".to_string(),
                challenge: "42-17".to_string(),
                expires_in_sec: self.expires_in_sec,
                message: Some("Push notification sent".to_string()),
            })
        }

        async fn redeem(&self) -> ApiResult<ElevatedToken> {
            let call = self.redeem_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.approve_at_call.load(Ordering::SeqCst) {
                Ok(ElevatedToken {
                    third_token: "third-token".to_string(),
                    expires_in_sec: 300,
                    message: None,
                })
            } else {
                Err(pending_error())
            }
        }
    }

    fn coordinator(
        api: FakeStepUpApi,
        poll_interval: Duration,
    ) -> (StepUpCoordinator, Arc<FakeStepUpApi>, ElevationSlot) {
        let api = Arc::new(api);
        let slot = ElevationSlot::new();
        let coordinator = StepUpCoordinator::new(
            api.clone(),
            slot.clone(),
            StepUpConfig { poll_interval },
        );
        (coordinator, api, slot)
    }

    #[tokio::test(start_paused = true)]
    async fn initiation_failure_surfaces_error_state() {
        let (coordinator, _, slot) =
            coordinator(FakeStepUpApi::failing_initiate(), Duration::from_secs(3));

        let outcome = coordinator.run(StepUpRequest::health_records()).await;
        assert_eq!(
            outcome,
            StepUpOutcome::Failed("Push service unavailable".to_string())
        );
        assert_eq!(
            coordinator.state(),
            RequestState::Error("Push service unavailable".to_string())
        );
        assert!(slot.current().is_none());
    }

    // Scenario: approval lands one second before the window closes.
    #[tokio::test(start_paused = true)]
    async fn approval_just_before_timeout_wins() {
        // One-second polling; the 59th redemption (t = 59s) succeeds inside
        // a 60-second window.
        let (coordinator, api, slot) = coordinator(
            FakeStepUpApi::approving_at(60, 59),
            Duration::from_secs(1),
        );

        let outcome = coordinator.run(StepUpRequest::health_records()).await;

        let elevation = match outcome {
            StepUpOutcome::Approved(elevation) => elevation,
            other => panic!("expected approval, got {:?}", other),
        };
        assert_eq!(elevation.token, "third-token");
        assert_eq!(coordinator.state(), RequestState::Idle);
        assert_eq!(slot.current().unwrap().token, "third-token");
        assert_eq!(api.redeem_count(), 59);

        // Nothing keeps polling after resolution.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.redeem_count(), 59);
    }

    // Scenario: the window elapses and a late grant is discarded.
    #[tokio::test(start_paused = true)]
    async fn timeout_fires_at_window_end_and_late_grant_is_discarded() {
        let (coordinator, api, slot) = coordinator(
            FakeStepUpApi::never_approving(60),
            Duration::from_secs(3),
        );

        let started = tokio::time::Instant::now();
        let outcome = coordinator.run(StepUpRequest::health_records()).await;
        assert_eq!(outcome, StepUpOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
        assert_eq!(coordinator.state(), RequestState::TimedOut);
        assert!(slot.current().is_none());

        // The backend approves afterwards; the poller is gone and the state
        // stays timed out.
        let polls_at_timeout = api.redeem_count();
        api.approve_at_call.store(0, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.redeem_count(), polls_at_timeout);
        assert_eq!(coordinator.state(), RequestState::TimedOut);
        assert!(slot.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn polling_failures_do_not_change_state() {
        let (coordinator, api, _) = coordinator(
            FakeStepUpApi::never_approving(60),
            Duration::from_secs(3),
        );

        let _rx = coordinator.start(StepUpRequest::health_records()).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(coordinator.state(), RequestState::PendingApproval);
        assert!(api.redeem_count() >= 3);

        coordinator.dismiss();
    }

    // Scenario: dismissal while pending stops the polling loop.
    #[tokio::test(start_paused = true)]
    async fn dismiss_resets_to_idle_and_stops_polling() {
        let (coordinator, api, slot) = coordinator(
            FakeStepUpApi::never_approving(60),
            Duration::from_secs(3),
        );

        let rx = coordinator.start(StepUpRequest::health_records()).await;
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(coordinator.state(), RequestState::PendingApproval);

        coordinator.dismiss();
        assert_eq!(coordinator.state(), RequestState::Idle);
        assert_eq!(rx.await.unwrap(), StepUpOutcome::Dismissed);

        let polls_at_dismiss = api.redeem_count();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.redeem_count(), polls_at_dismiss);
        assert!(slot.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_when_idle_is_a_no_op() {
        let (coordinator, _, _) = coordinator(
            FakeStepUpApi::never_approving(60),
            Duration::from_secs(3),
        );

        coordinator.dismiss();
        coordinator.dismiss();
        assert_eq!(coordinator.state(), RequestState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_supersedes_previous_attempt() {
        let (coordinator, api, _) = coordinator(
            FakeStepUpApi::never_approving(60),
            Duration::from_secs(3),
        );

        // Polls of the first attempt land at t = 3s and t = 6s.
        let first = coordinator.start(StepUpRequest::health_records()).await;
        tokio::time::sleep(Duration::from_secs(7)).await;
        let polls_before_restart = api.redeem_count();
        assert_eq!(polls_before_restart, 2);

        let _second = coordinator.start(StepUpRequest::health_records()).await;
        assert_eq!(first.await.unwrap(), StepUpOutcome::Dismissed);
        assert_eq!(coordinator.state(), RequestState::PendingApproval);

        // Exactly one poller is alive: the count advances at the single
        // poll rate, not doubled. The restarted attempt polls at t = 10s,
        // 13s, and 16s.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.redeem_count(), polls_before_restart + 3);

        coordinator.dismiss();
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_timeout_arms_a_fresh_window() {
        let (coordinator, api, _) = coordinator(
            FakeStepUpApi::never_approving(6),
            Duration::from_secs(3),
        );

        let outcome = coordinator.run(StepUpRequest::health_records()).await;
        assert_eq!(outcome, StepUpOutcome::TimedOut);

        // Retry: the user approves on the second attempt.
        api.approve_at_call
            .store(api.redeem_count() + 1, Ordering::SeqCst);
        let outcome = coordinator.run(StepUpRequest::health_records()).await;
        assert!(matches!(outcome, StepUpOutcome::Approved(_)));
        assert_eq!(coordinator.state(), RequestState::Idle);
        assert_eq!(api.initiate_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn challenge_is_exposed_while_pending_and_cleared_after() {
        let (coordinator, _, _) = coordinator(
            FakeStepUpApi::never_approving(60),
            Duration::from_secs(3),
        );
        assert!(coordinator.challenge().is_none());

        let _rx = coordinator.start(StepUpRequest::health_records()).await;
        let challenge = coordinator.challenge().unwrap();
        assert_eq!(challenge.txn_id, "txn-1");
        assert_eq!(challenge.challenge, "42-17");

        coordinator.dismiss();
        assert!(coordinator.challenge().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn approved_elevation_respects_expiry_window() {
        let (coordinator, _, slot) = coordinator(
            FakeStepUpApi::approving_at(60, 1),
            Duration::from_secs(3),
        );

        let outcome = coordinator.run(StepUpRequest::health_records()).await;
        assert!(matches!(outcome, StepUpOutcome::Approved(_)));

        let now = Utc::now();
        assert!(slot.is_elevated(now));
        assert!(!slot.is_elevated(now + chrono::Duration::seconds(301)));
    }
}
