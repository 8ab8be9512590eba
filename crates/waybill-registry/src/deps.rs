//! Typed reconstruction of [`waybill_envelope::DepsBlob`] payloads.
//!
//! The source system looks up a dependency's concrete type by runtime
//! class reflection on `(module, type_name)`. This crate never does that:
//! a `type_tag` is an explicit, stable string supplied at registration time,
//! and the registry holds a factory from that tag to a boxed [`DepsValue`].
//! Reconstructing a dependency is therefore a plain hash lookup, not
//! reflection.

use std::any::Any;
use std::sync::Arc;

use crate::error::RegistryError;

/// A reconstructed, typed dependency value.
///
/// Runners downcast via [`DepsValue::as_any`] to recover their concrete
/// type; the registry and executor never inspect the contents.
pub trait DepsValue: Send + Sync {
    /// Borrow this value as `dyn Any` for downcasting in the runner.
    fn as_any(&self) -> &dyn Any;
}

/// The fallback dependency type: the raw JSON `data` field, unparsed.
///
/// Used for any `type_tag` with no registered factory, so an
/// unregistered-but-well-formed deps blob still reaches the runner instead
/// of failing the step outright.
pub struct JsonDeps(pub serde_json::Value);

impl DepsValue for JsonDeps {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A factory reconstructing a [`DepsValue`] from the raw `data` JSON of a
/// `deps_blob`, keyed by `type_tag` in the registry.
pub type DepsFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Box<dyn DepsValue>, RegistryError> + Send + Sync>;
