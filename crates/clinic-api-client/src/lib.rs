//! REST API client for the clinic management backend.
//!
//! This crate provides:
//! - [`ApiClient`]: a thin typed client over the backend's REST endpoints
//!   (login, second-factor verification, identity, step-up authorization,
//!   health records)
//! - Wire request/response types
//! - Error normalization: every backend or transport failure reduces to a
//!   single human-readable message before it reaches session state

mod client;
mod error;
mod types;

pub use client::{ApiClient, THIRD_TOKEN_HEADER};
pub use error::{ApiError, ApiResult};
pub use types::{
    ElevatedToken, HealthRecord, HealthRecordPage, HealthRecordUpdate, LoginResponse,
    NewHealthRecord, StepUpChallenge, StepUpRequest, UserIdentity, VerifiedSession,
    STAGE_TOTP_REQUIRED,
};
