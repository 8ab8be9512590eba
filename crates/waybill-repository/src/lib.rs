//! Idempotent persistence of workflow metadata and per-step lifecycle
//! records, for crash recovery and observability.
//!
//! Three variants share the [`WorkflowRepository`] trait: [`InMemoryRepository`]
//! (maps, no durability), and [`SqlRepository`] driven through `sqlx::Any`
//! against either an embedded SQLite file or a remote PostgreSQL database.
//! The executor treats every method here as best-effort: a failure is
//! logged, never propagated as a reason to nack a message.

mod error;
mod memory;
mod record;
mod repository;
mod sql;

pub use error::RepositoryError;
pub use memory::InMemoryRepository;
pub use record::{
    Pagination, StepKey, StepRecord, StepStatus, WorkflowFilter, WorkflowRecord, WorkflowStatus,
};
pub use repository::WorkflowRepository;
pub use sql::SqlRepository;
