//! Routing-slip message envelope: the immutable-on-wire record of workflow
//! identity, itinerary, executed log, compensations, and payload.
//!
//! This crate owns exactly the data model and operations described for the
//! message envelope: construction, canonical (de)serialization, and the
//! three slip-mutating operations (`advance`, `retry_clone`,
//! `insert_steps`). It has no knowledge of transports, repositories, or
//! agent registries — those are built on top of the types here.

mod activity;
mod envelope;
mod error;
mod slip;

pub use activity::{ActivitySpec, DepsBlob};
pub use envelope::{PaigeantMessage, SPEC_VERSION};
pub use error::EnvelopeError;
pub use slip::{ExecutedStep, RoutingSlip, StepOutcome};
