//! Wire types for the clinic backend API.

use serde::{Deserialize, Serialize};

/// Login stage the backend signals after a successful password check.
/// The backend always demands a second factor; any other stage value is a
/// protocol error for the caller.
pub const STAGE_TOTP_REQUIRED: &str = "totp_required";

/// Response of `POST /login/access-token`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Authentication stage the server has moved the attempt to.
    pub stage: String,
    /// Interim bearer token, scoped to completing the second factor.
    #[serde(default)]
    pub temp_token: Option<String>,
}

/// Response of `POST /login/access-token/verify-otp`.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedSession {
    /// Long-lived bearer token for general API access.
    pub access_token: String,
}

/// User profile returned from `GET /users/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub is_active: bool,
    pub role_id: i64,
    /// Known roles are `admin` and `doctor`; other values are passed through.
    pub role_name: String,
}

/// Request body for `POST /third-factor/step-up-auth`.
#[derive(Debug, Clone, Serialize)]
pub struct StepUpRequest {
    pub target_action: String,
    pub target_resource: String,
}

impl StepUpRequest {
    /// The step-up request guarding the health-records resource class.
    pub fn health_records() -> Self {
        Self {
            target_action: "access_sensitive_data".to_string(),
            target_resource: "health_records".to_string(),
        }
    }
}

/// Response of `POST /third-factor/step-up-auth`.
#[derive(Debug, Clone, Deserialize)]
pub struct StepUpChallenge {
    /// Identifier of the in-flight step-up transaction.
    pub txn_id: String,
    /// Challenge value shown in the out-of-band approval prompt.
    pub challenge: String,
    /// Seconds until the approval window closes.
    pub expires_in_sec: u64,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GET /third-factor/third-token` once the out-of-band
/// approval has been granted.
#[derive(Debug, Clone, Deserialize)]
pub struct ElevatedToken {
    /// Bearer token granting access to the sensitive resource class.
    pub third_token: String,
    /// Seconds until the elevated token expires.
    pub expires_in_sec: u64,
    #[serde(default)]
    pub message: Option<String>,
}

/// A health record as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    /// ISO date string
    pub record_date: String,
    pub diagnosis: String,
    pub treatment: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Payload for creating a health record. The acting doctor is resolved
/// server-side from the bearer token.
#[derive(Debug, Clone, Serialize)]
pub struct NewHealthRecord {
    pub patient_id: i64,
    pub record_date: String,
    pub diagnosis: String,
    pub treatment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Payload for updating a health record.
#[derive(Debug, Clone, Serialize)]
pub struct HealthRecordUpdate {
    pub patient_id: i64,
    pub record_date: String,
    pub diagnosis: String,
    pub treatment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Paginated list response of `GET /health-records/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthRecordPage {
    pub data: Vec<HealthRecord>,
    pub count: i64,
}
