//! `AgentRegistry` — the process-local map from agent name to runner.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use waybill_envelope::{ActivitySpec, DepsBlob};

use crate::deps::{DepsFactory, DepsValue, JsonDeps};
use crate::error::RegistryError;
use crate::runner::ActivityRunner;

/// One registered agent: its runner, the dependency type tag it expects,
/// and its dynamic-itinerary-editing authority.
#[derive(Clone)]
pub struct RegistryEntry {
    /// The callback invoked to execute this agent's activities.
    pub runner: Arc<dyn ActivityRunner>,
    /// Stable tag the registry resolves against a `DepsFactory` when this
    /// agent is the target of an itinerary step.
    pub deps_type_tag: String,
    /// Whether this agent's `ActivityCtx` exposes `edit_itinerary`.
    pub can_edit_itinerary: bool,
    /// Per-agent insertion bound; `None` defers to the registry default.
    pub max_insertions: Option<u32>,
    /// Dependency blob to attach when this agent is dynamically inserted
    /// (rather than part of the original dispatched itinerary), supplied
    /// at registration per §4.5 ("for which the caller has supplied, via
    /// registration, a serialized dependency blob").
    pub insertion_deps_blob: DepsBlob,
}

/// Process-local map `agent_name -> RegistryEntry`, plus the `type_tag ->
/// DepsFactory` table used to reconstruct typed dependencies.
///
/// Explicitly constructed and threaded through worker startup — never a
/// hidden process-wide singleton (§9 design note).
pub struct AgentRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
    deps_factories: RwLock<HashMap<String, DepsFactory>>,
    default_max_insertions: u32,
}

impl AgentRegistry {
    /// Construct an empty registry. `default_max_insertions` is used for
    /// any agent registered without an explicit per-agent override.
    pub fn new(default_max_insertions: u32) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            deps_factories: RwLock::new(HashMap::new()),
            default_max_insertions,
        }
    }

    /// Register an agent that may not edit the itinerary.
    pub fn register(
        &self,
        agent_name: impl Into<String>,
        runner: Arc<dyn ActivityRunner>,
        deps_type_tag: impl Into<String>,
    ) -> Result<(), RegistryError> {
        self.register_full(agent_name, runner, deps_type_tag, false, None, None)
    }

    /// Register an agent authorized to edit the itinerary, optionally
    /// overriding the registry-wide `max_insertions` default.
    pub fn register_editable(
        &self,
        agent_name: impl Into<String>,
        runner: Arc<dyn ActivityRunner>,
        deps_type_tag: impl Into<String>,
        max_insertions: Option<u32>,
    ) -> Result<(), RegistryError> {
        self.register_full(agent_name, runner, deps_type_tag, true, max_insertions, None)
    }

    /// Full registration form, also attaching the deps blob to use when
    /// this agent is dynamically inserted into a running workflow.
    pub fn register_full(
        &self,
        agent_name: impl Into<String>,
        runner: Arc<dyn ActivityRunner>,
        deps_type_tag: impl Into<String>,
        can_edit_itinerary: bool,
        max_insertions: Option<u32>,
        insertion_deps_blob: Option<DepsBlob>,
    ) -> Result<(), RegistryError> {
        let agent_name = agent_name.into();
        let mut entries = self.entries.write();
        if entries.contains_key(&agent_name) {
            return Err(RegistryError::DuplicateAgent(agent_name));
        }
        let deps_type_tag = deps_type_tag.into();
        entries.insert(
            agent_name.clone(),
            RegistryEntry {
                runner,
                deps_type_tag: deps_type_tag.clone(),
                can_edit_itinerary,
                max_insertions,
                insertion_deps_blob: insertion_deps_blob
                    .unwrap_or_else(|| DepsBlob::empty(deps_type_tag, "registry")),
            },
        );
        Ok(())
    }

    /// Register a factory reconstructing `DepsValue`s for `type_tag`.
    /// Type tags with no registered factory fall back to [`JsonDeps`],
    /// carrying the raw `data` JSON unparsed.
    pub fn register_deps_factory(&self, type_tag: impl Into<String>, factory: DepsFactory) {
        self.deps_factories.write().insert(type_tag.into(), factory);
    }

    /// Look up the registry entry for `agent_name`.
    pub fn get(&self, agent_name: &str) -> Option<RegistryEntry> {
        self.entries.read().get(agent_name).cloned()
    }

    /// Whether `agent_name` is registered on this worker.
    pub fn contains(&self, agent_name: &str) -> bool {
        self.entries.read().contains_key(agent_name)
    }

    /// Snapshot of every registered agent name — the "shared registry
    /// snapshot" captured into an `ActivityCtx` at subscribe time (§4.5).
    pub fn agent_names(&self) -> HashSet<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// This worker's configured default insertion bound.
    pub fn default_max_insertions(&self) -> u32 {
        self.default_max_insertions
    }

    /// Reconstruct a typed dependency value from a blob's `type` tag and
    /// raw `data`. Never reflects on `module`; falls back to `JsonDeps`
    /// when no factory is registered for `type_tag`.
    pub fn resolve_deps(
        &self,
        type_tag: &str,
        data: &serde_json::Value,
    ) -> Result<Box<dyn DepsValue>, RegistryError> {
        let factories = self.deps_factories.read();
        match factories.get(type_tag) {
            Some(factory) => factory(data),
            None => Ok(Box::new(JsonDeps(data.clone()))),
        }
    }

    /// Build the `ActivitySpec` to insert for a dynamic `edit_itinerary`
    /// call targeting `agent_name`, using that agent's registered
    /// insertion deps blob.
    pub fn build_insertion_spec(
        &self,
        agent_name: &str,
        prompt: String,
    ) -> Result<ActivitySpec, RegistryError> {
        let entry = self
            .get(agent_name)
            .ok_or_else(|| RegistryError::UnknownAgent(agent_name.to_string()))?;
        Ok(ActivitySpec::new(agent_name, prompt).with_deps(entry.insertion_deps_blob))
    }
}
