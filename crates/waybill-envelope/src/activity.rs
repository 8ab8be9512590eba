//! `ActivitySpec` — one itinerary step

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// An opaque, self-describing dependency payload carried with an
/// [`ActivitySpec`].
///
/// The core never inspects `data`; it is forwarded verbatim to whichever
/// agent registry entry declared `type_name` as its dependency descriptor.
/// Wire field names (`type`, `module`) are fixed by the envelope's external
/// interface and differ from the Rust field names for readability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepsBlob {
    /// Stable type tag the agent registry resolves against a factory.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Hint identifying which module declared the agent (opaque to the core).
    #[serde(rename = "module")]
    pub module_hint: String,

    /// The dependency payload itself, forwarded without interpretation.
    pub data: serde_json::Value,
}

impl DepsBlob {
    /// Construct a deps blob with an empty data payload.
    pub fn empty(type_name: impl Into<String>, module_hint: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            module_hint: module_hint.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Construct a deps blob carrying the given JSON data.
    pub fn new(
        type_name: impl Into<String>,
        module_hint: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            module_hint: module_hint.into(),
            data,
        }
    }
}

/// One itinerary step: an agent name, the prompt forwarded to its runner,
/// and the dependency blob the runner needs to reconstruct its typed
/// dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySpec {
    /// Non-empty agent name; must match a registered agent on some worker.
    pub agent_name: String,

    /// Opaque prompt text, forwarded to the runner untouched.
    pub prompt: String,

    /// Dependency payload, keyed as `deps` on the wire.
    #[serde(rename = "deps")]
    pub deps_blob: DepsBlob,

    /// Whether this step expects `payload.previous_output` injected before
    /// invocation. Defaults to `true`.
    #[serde(default = "default_true")]
    pub expects_previous_output: bool,
}

impl ActivitySpec {
    /// Construct a spec with `expects_previous_output = true` and an empty
    /// deps blob, the common case for a freshly authored itinerary step.
    pub fn new(agent_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            prompt: prompt.into(),
            deps_blob: DepsBlob::empty("unit", "none"),
            expects_previous_output: true,
        }
    }

    /// Attach a dependency blob to this spec.
    pub fn with_deps(mut self, deps_blob: DepsBlob) -> Self {
        self.deps_blob = deps_blob;
        self
    }

    /// Override whether this step expects the previous step's output.
    pub fn with_expects_previous_output(mut self, expects: bool) -> Self {
        self.expects_previous_output = expects;
        self
    }
}
