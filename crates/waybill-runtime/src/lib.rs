//! Workflow Dispatcher and Activity Executor: the two long-running
//! operations that drive a routing-slip workflow from first publish to
//! final acknowledgement.
//!
//! This crate wires together [`waybill_envelope`]'s wire types,
//! [`waybill_transport`]'s pluggable transport, [`waybill_repository`]'s
//! idempotent persistence, and [`waybill_registry`]'s agent resolution into
//! the two operations described in the design: `dispatch_workflow` and the
//! per-agent worker loop.

mod backoff;
mod config;
mod dispatcher;
mod error;
mod executor;

pub use backoff::BackoffPolicy;
pub use config::{RepositoryKind, TransportKind, WaybillConfig};
pub use dispatcher::{DispatchOptions, Dispatcher};
pub use error::{DispatchError, ExecutorError};
pub use executor::{ActivityExecutor, ExecutorConfig};
