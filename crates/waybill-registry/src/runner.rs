//! The `ActivityRunner` contract: the pluggable callback that actually
//! performs an activity's work.
//!
//! The runner itself (in practice, an LLM invocation) is an external
//! collaborator out of this crate's scope; only its shape is defined here.

use async_trait::async_trait;
use thiserror::Error;

use crate::context::ActivityCtx;
use crate::deps::DepsValue;

/// Whether a runner failure should be retried by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient: the executor retries with backoff, up to `max_attempts`.
    Retryable,
    /// Permanent: the executor fails the workflow immediately.
    Permanent,
}

/// A runner-signaled failure, carrying its retry disposition.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RunnerFailure {
    /// Retryable or permanent.
    pub kind: FailureKind,
    /// Human-readable failure description, stored verbatim as the
    /// eventual `StepRecord.error`.
    pub message: String,
}

impl RunnerFailure {
    /// Construct a retryable failure.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Retryable,
            message: message.into(),
        }
    }

    /// Construct a permanent (non-retryable) failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }

    /// Whether the executor should retry this failure.
    pub fn is_retryable(&self) -> bool {
        self.kind == FailureKind::Retryable
    }
}

/// Executes one activity's work given its prompt and reconstructed
/// dependencies, producing an opaque JSON output.
///
/// Implementations are process-local: the registry resolves `agent_name`
/// to a concrete `ActivityRunner` at worker startup, and messages carry
/// only the reference (`agent_name`), never code.
#[async_trait]
pub trait ActivityRunner: Send + Sync {
    /// Run the activity. `deps` is the dependency value reconstructed via
    /// the registry's `DepsFactory` for this step's `deps_blob.type`.
    async fn run(
        &self,
        prompt: &str,
        deps: &dyn DepsValue,
        ctx: &ActivityCtx,
    ) -> Result<serde_json::Value, RunnerFailure>;
}
