//! The `WorkflowRepository` contract

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::record::{Pagination, StepKey, StepRecord, WorkflowFilter, WorkflowRecord};

/// Idempotent persistence of workflow metadata and per-step lifecycle
/// records, for crash recovery and observability.
///
/// Every write here is best-effort from the executor's point of view: a
/// repository error is logged but never causes a message to be nacked (the
/// routing slip itself, not the repository, is the source of truth for
/// in-flight execution).
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Idempotent on `correlation_id`: the first call for a given key
    /// creates the row, subsequent calls update the mutable fields
    /// (`status`, the two snapshots, `updated_at`).
    async fn record_workflow(&self, record: WorkflowRecord) -> Result<(), RepositoryError>;

    /// Insert-or-ignore on `(correlation_id, agent_name, run_id)`: retries
    /// within the same run produce no duplicate row.
    async fn record_step_started(
        &self,
        key: StepKey,
        attempt: u32,
    ) -> Result<(), RepositoryError>;

    /// Unconditional update of the row identified by `key` to `Completed`.
    /// `attempt` is the 0-based attempt that succeeded, so the final row
    /// reflects how many retries the step actually needed even though
    /// `record_step_started` only ever wrote the first attempt's value.
    async fn record_step_completed(
        &self,
        key: StepKey,
        attempt: u32,
        output_ref: String,
    ) -> Result<(), RepositoryError>;

    /// Unconditional update of the row identified by `key` to `Failed`.
    async fn record_step_failed(
        &self,
        key: StepKey,
        attempt: u32,
        error: String,
    ) -> Result<(), RepositoryError>;

    /// Read-only: fetch one workflow record.
    async fn get_workflow(&self, correlation_id: Uuid) -> Result<Option<WorkflowRecord>, RepositoryError>;

    /// Read-only: list workflow records matching `filter`.
    async fn list_workflows(
        &self,
        filter: WorkflowFilter,
        pagination: Pagination,
    ) -> Result<Vec<WorkflowRecord>, RepositoryError>;

    /// Read-only: fetch every step row recorded for a workflow, in the
    /// order they were first started.
    async fn get_steps(&self, correlation_id: Uuid) -> Result<Vec<StepRecord>, RepositoryError>;
}
