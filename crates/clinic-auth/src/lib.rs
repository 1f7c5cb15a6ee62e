//! Session state machine and authorization gate for the clinic client.
//!
//! This crate provides:
//! - [`Session`] and [`reduce`]: the serializable session value and the pure
//!   transition function over it
//! - [`SessionManager`]: the effectful orchestrator — login, second-factor
//!   verification, logout, boot-time restoration, and the epoch-guarded
//!   identity refresh
//! - [`gate`]: the pure predicates consulted before any sensitive operation,
//!   plus the process-wide [`ElevationSlot`] holding the elevated credential

mod api;
mod error;
pub mod gate;
mod manager;
mod session;

pub use api::AuthApi;
pub use error::{AuthError, AuthResult};
pub use gate::{has_role, is_elevated, Elevation, ElevationSlot, ROLE_ADMIN, ROLE_DOCTOR};
pub use manager::SessionManager;
pub use session::{reduce, AuthStage, Session, SessionEvent};
