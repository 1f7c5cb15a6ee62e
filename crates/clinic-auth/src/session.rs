//! The session value and its pure transition function.

use clinic_api_client::UserIdentity;
use serde::{Deserialize, Serialize};

/// Authentication stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStage {
    LoggedOut,
    OtpRequired,
    LoggedIn,
}

/// A snapshot of the client session.
///
/// Invariants maintained by [`reduce`]:
/// - `access_token` is present iff `stage == LoggedIn`
/// - `temp_token` is present only when `stage == OtpRequired`
/// - `identity` is present only when `stage == LoggedIn`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub stage: AuthStage,
    /// Long-lived bearer token for general API access.
    pub access_token: Option<String>,
    /// Interim bearer token, valid only for completing the second factor.
    pub temp_token: Option<String>,
    /// Profile of the authenticated user, populated by the identity fetch.
    pub identity: Option<UserIdentity>,
}

impl Session {
    /// A fresh logged-out session.
    pub fn logged_out() -> Self {
        Self {
            stage: AuthStage::LoggedOut,
            access_token: None,
            temp_token: None,
            identity: None,
        }
    }

    /// Restore a session from the persisted credential at process start.
    ///
    /// A persisted token seeds an optimistic `LoggedIn` stage; the identity
    /// fetch issued right after validates it.
    pub fn from_persisted(access_token: Option<String>) -> Self {
        match access_token {
            Some(token) => Self {
                stage: AuthStage::LoggedIn,
                access_token: Some(token),
                temp_token: None,
                identity: None,
            },
            None => Self::logged_out(),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.stage == AuthStage::LoggedIn
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::logged_out()
    }
}

/// Events driving session transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The password was accepted and the server demands a second factor.
    OtpChallenged { temp_token: String },
    /// The second-factor code was accepted; the interim token is spent.
    CodeVerified { access_token: String },
    /// The identity fetch for the current login resolved.
    IdentityLoaded { identity: UserIdentity },
    /// The identity fetch was rejected: the long-lived credential is stale
    /// or invalid, which forces a full logout.
    IdentityRejected,
    /// Explicit logout.
    LoggedOut,
}

/// Pure transition function: applies one event to a session snapshot.
pub fn reduce(session: &Session, event: SessionEvent) -> Session {
    match event {
        SessionEvent::OtpChallenged { temp_token } => Session {
            stage: AuthStage::OtpRequired,
            access_token: None,
            temp_token: Some(temp_token),
            identity: None,
        },
        SessionEvent::CodeVerified { access_token } => Session {
            stage: AuthStage::LoggedIn,
            access_token: Some(access_token),
            temp_token: None,
            identity: None,
        },
        SessionEvent::IdentityLoaded { identity } => {
            // Only a logged-in session can carry an identity.
            if session.stage == AuthStage::LoggedIn {
                Session {
                    identity: Some(identity),
                    ..session.clone()
                }
            } else {
                session.clone()
            }
        }
        SessionEvent::IdentityRejected | SessionEvent::LoggedOut => Session::logged_out(),
    }
}
