//! Authorization gate: predicates consulted before sensitive operations.
//!
//! Elevation is the authoritative client-side check for the protected
//! resource class; role checks are advisory UI gating only (the backend
//! enforces the real boundary).

use chrono::{DateTime, Duration, Utc};
use clinic_api_client::UserIdentity;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_DOCTOR: &str = "doctor";

/// An elevated credential with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elevation {
    /// Bearer token for the sensitive resource class, sent in a header
    /// distinct from the session bearer.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Elevation {
    /// Build an elevation from a redemption response: the expiry is
    /// `now + expires_in_sec`.
    pub fn from_expiry_window(token: impl Into<String>, expires_in_sec: u64, now: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at: now + Duration::seconds(expires_in_sec as i64),
        }
    }

    /// Whether the elevation is still valid at `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// The gate predicate: an elevated credential exists and has not expired.
pub fn is_elevated(elevation: Option<&Elevation>, now: DateTime<Utc>) -> bool {
    elevation.map(|e| e.is_valid(now)).unwrap_or(false)
}

/// Advisory role predicate, evaluated locally from the cached identity.
pub fn has_role(identity: Option<&UserIdentity>, role: &str) -> bool {
    identity.map(|u| u.role_name == role).unwrap_or(false)
}

/// Process-wide holder of the current elevated credential.
///
/// Written only by a successful step-up redemption; cleared on logout or
/// when a flow is torn down before completion. Clones share the same slot.
#[derive(Clone, Default)]
pub struct ElevationSlot {
    inner: Arc<RwLock<Option<Elevation>>>,
}

impl ElevationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly redeemed elevation.
    pub fn set(&self, elevation: Elevation) {
        let mut guard = self.inner.write().expect("lock poisoned");
        *guard = Some(elevation);
    }

    /// Drop the elevated credential.
    pub fn clear(&self) {
        let mut guard = self.inner.write().expect("lock poisoned");
        *guard = None;
    }

    /// The stored elevation, valid or not.
    pub fn current(&self) -> Option<Elevation> {
        self.inner.read().expect("lock poisoned").clone()
    }

    /// The stored elevation if it is still valid at `now`.
    pub fn current_valid(&self, now: DateTime<Utc>) -> Option<Elevation> {
        self.current().filter(|e| e.is_valid(now))
    }

    /// Gate check at `now`.
    pub fn is_elevated(&self, now: DateTime<Utc>) -> bool {
        let guard = self.inner.read().expect("lock poisoned");
        is_elevated(guard.as_ref(), now)
    }
}
