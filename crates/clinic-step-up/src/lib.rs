//! Step-up authorization coordinator for the clinic client.
//!
//! Access to the sensitive resource class requires a third factor: an
//! out-of-band approval (a push prompt on the user's registered mobile
//! device) exchanged for a short-lived elevated credential. This crate
//! drives that protocol without blocking the caller:
//!
//! 1. **Initiate** — request a challenge; the backend pushes the approval
//!    prompt and answers with a transaction id and an approval window.
//! 2. **Arm** — a timeout for exactly the approval window, and a poller
//!    that attempts to redeem the elevated credential at a fixed interval.
//!    Redemption failure is the normal waiting state, not an error.
//! 3. **Resolve** — the first of approval / timeout / dismissal wins;
//!    the losing tasks are torn down atomically with the state transition,
//!    and any result that still arrives late is discarded.
//!
//! At most one step-up transaction is in flight; starting a new attempt
//! first tears down the previous timer/poller pair.

mod api;
mod coordinator;

pub use api::StepUpApi;
pub use coordinator::{RequestState, StepUpConfig, StepUpCoordinator, StepUpOutcome};
