//! Repository-level error taxonomy

use thiserror::Error;

/// Errors surfaced by a [`crate::WorkflowRepository`] implementation.
///
/// The executor treats all of these as non-fatal to the in-flight message:
/// they are logged but never cause a step to be nacked (see §4.6 of the
/// design document).
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The requested workflow does not exist.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(uuid::Uuid),

    /// The requested step does not exist.
    #[error("step not found for correlation_id={correlation_id} agent_name={agent_name}")]
    StepNotFound {
        /// The workflow the step would belong to.
        correlation_id: uuid::Uuid,
        /// The agent name looked up.
        agent_name: String,
    },

    /// The underlying store is unreachable or returned an unrecoverable error.
    #[error("repository backend error: {0}")]
    Backend(String),

    /// A stored JSON snapshot failed to (de)serialize.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
