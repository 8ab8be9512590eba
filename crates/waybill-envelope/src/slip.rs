//! `RoutingSlip` — itinerary, executed log, compensations, insertion counter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::ActivitySpec;

/// Outcome of a step recorded in the `executed` log.
///
/// Only steps that ran to completion are appended here; a permanently
/// failed step terminates the workflow without an `executed` entry, since
/// there is no further step to advance into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step's runner produced output successfully.
    Completed,
}

/// One entry in the append-only `executed` log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedStep {
    /// The agent that ran this step.
    pub agent_name: String,

    /// When the step began.
    pub started_at: DateTime<Utc>,

    /// When the step finished.
    pub finished_at: DateTime<Utc>,

    /// Opaque handle to the step's output (inline JSON for the in-memory and
    /// embedded repository variants; a reference elsewhere).
    pub output_ref: String,

    /// Terminal status of the step.
    pub status: StepOutcome,
}

/// The routing slip: remaining work, executed history, carried (unexecuted)
/// compensations, and the cumulative dynamic-insertion counter.
///
/// Invariants upheld by [`crate::envelope::PaigeantMessage`]'s operations,
/// never by direct field mutation outside this crate:
/// - `itinerary` never contains an entry already present in `executed` for
///   the same `run_id`.
/// - the head of `itinerary` is the only step eligible for execution.
/// - `executed` is monotonically appended; never reordered or rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSlip {
    /// Remaining work, head = current/next step.
    pub itinerary: Vec<ActivitySpec>,

    /// Append-only history of completed steps.
    pub executed: Vec<ExecutedStep>,

    /// Carried but never invoked by this core (see design notes on Saga
    /// compensation execution).
    pub compensations: Vec<ActivitySpec>,

    /// Cumulative number of dynamically inserted steps, bounded by
    /// `max_insertions` at the point of insertion.
    pub inserted_count: u32,
}

impl RoutingSlip {
    /// Build a fresh slip from a dispatched itinerary, with empty history
    /// and no compensations.
    pub fn new(itinerary: Vec<ActivitySpec>) -> Self {
        Self {
            itinerary,
            executed: Vec::new(),
            compensations: Vec::new(),
            inserted_count: 0,
        }
    }

    /// The step currently eligible for execution, if any.
    pub fn head(&self) -> Option<&ActivitySpec> {
        self.itinerary.first()
    }

    /// Whether any agent name in `executed` matches the given name — used
    /// to reject cyclic itinerary insertions.
    pub fn has_executed(&self, agent_name: &str) -> bool {
        self.executed.iter().any(|e| e.agent_name == agent_name)
    }
}
