//! Process-local agent registry: the map from agent name to activity
//! runner, plus static discovery of agent declarations on disk.
//!
//! Messages on the wire carry only `agent_name` references; this crate is
//! what resolves a reference into something callable, and the only place in
//! the workspace that reconstructs typed dependencies from a `deps_blob`.

mod context;
mod deps;
mod discovery;
mod error;
mod registry;
mod runner;

pub use context::ActivityCtx;
pub use deps::{DepsFactory, DepsValue, JsonDeps};
pub use discovery::{discover, DiscoveredAgent};
pub use error::RegistryError;
pub use registry::{AgentRegistry, RegistryEntry};
pub use runner::{ActivityRunner, FailureKind, RunnerFailure};
