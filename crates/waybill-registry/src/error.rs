//! Registry-level error taxonomy

use thiserror::Error;

/// Errors raised by the agent registry and discovery.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// `agent_name` has no entry in the registry on this worker.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// `agent_name` was registered twice.
    #[error("agent already registered: {0}")]
    DuplicateAgent(String),

    /// A `deps_blob.type` tag has no registered factory and no fallback
    /// could be applied.
    #[error("unknown deps type tag: {0}")]
    UnknownDepsType(String),

    /// Walking the discovery path failed (permissions, missing directory).
    #[error("discovery error: {0}")]
    Discovery(String),
}
