//! Runtime-level error taxonomy: the dispatcher's and executor's own
//! failures, plus `#[from]` conversions from every crate they depend on so
//! `?` propagates without manual wrapping.

use thiserror::Error;
use uuid::Uuid;

use waybill_envelope::EnvelopeError;
use waybill_registry::RegistryError;
use waybill_repository::RepositoryError;
use waybill_transport::TransportError;

/// Errors raised by [`crate::dispatcher::Dispatcher::dispatch_workflow`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// `dispatch_workflow` was called with an empty runway.
    #[error("cannot dispatch an empty workflow")]
    EmptyWorkflow,

    /// The envelope could not be built or serialized.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The transport rejected the initial publish.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Recording the pending workflow record failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Snapshotting the routing slip or payload as JSON failed.
    #[error("failed to snapshot workflow state: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by [`crate::executor::ActivityExecutor`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// No runner is registered for this worker's agent name.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// Envelope construction/mutation failed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Transport operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Registry operation failed (e.g. resolving a deps factory).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A workflow's step referenced a `correlation_id` the repository has
    /// no record of; surfaced rather than silently dropped.
    #[error("workflow {0} has no repository record")]
    MissingWorkflowRecord(Uuid),
}
