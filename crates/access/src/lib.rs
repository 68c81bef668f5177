//! Visitor ledger and access gate.
//!
//! The ledger counts server-side sessions per visitor and remembers the
//! last detected profile. The gate turns that history, plus any bypass flag
//! a high-value profile earned, into an [`AccessDecision`].

pub mod gate;
pub mod ledger;

pub use gate::{AccessDecision, AccessGate, AccessReason, Observation};
pub use ledger::{Visitor, VisitorLedger};
