//! High-level clinic client: session, step-up authorization, and gated
//! access to the protected resource class.
//!
//! [`ClinicClient`] wires the credential store, the session manager, the
//! step-up coordinator, and the health-record operations together. Every
//! protected operation consults the authorization gate first; when the gate
//! rejects, the operation is deferred behind a full step-up flow and only
//! executes once the out-of-band approval lands. Logout synchronously tears
//! down any in-flight step-up scheduling before clearing session state.

mod authed;
mod client;
mod error;
mod records;

pub use authed::SessionStepUpApi;
pub use client::ClinicClient;
pub use error::{ClientError, ClientResult};
pub use records::{HealthRecords, RecordsApi};
