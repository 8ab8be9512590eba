//! `PaigeantMessage` — the wire envelope and its operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::ActivitySpec;
use crate::error::EnvelopeError;
use crate::slip::{ExecutedStep, RoutingSlip, StepOutcome};

/// The spec version this crate emits and accepts. Bumped on a breaking wire
/// change; readers MUST preserve unknown keys regardless of this value.
pub const SPEC_VERSION: &str = "1.0";

/// The routing-slip wire envelope.
///
/// Unknown top-level keys encountered on deserialization are captured in
/// `extra` and re-emitted verbatim on serialization, so a future field this
/// crate doesn't yet know about survives a round-trip through this worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaigeantMessage {
    /// Unique per publication; a fresh value is assigned on every `advance`
    /// and `retry_clone`.
    pub message_id: Uuid,

    /// Constant for the lifetime of the workflow.
    pub correlation_id: Uuid,

    /// Constant for a given attempt sequence; changes only on a deliberate
    /// restart, never on retry.
    pub run_id: Uuid,

    /// Propagated verbatim; never interpreted by this crate.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace_id: Option<String>,

    /// UTC timestamp of this publication.
    pub timestamp: DateTime<Utc>,

    /// Opaque on-behalf-of token, forwarded but never validated here.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub obo_token: Option<String>,

    /// Opaque signature. Treated as an inert string; no canonicalization is
    /// performed or assumed (see design notes).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,

    /// The routing slip itself.
    pub routing_slip: RoutingSlip,

    /// Free-form payload. Reserved key `previous_output` holds the
    /// immediately prior step's output.
    pub payload: serde_json::Map<String, serde_json::Value>,

    /// Zero on first emission; incremented by `retry_clone`, reset to zero
    /// by `advance`.
    pub attempt: u32,

    /// Spec version this envelope was produced under.
    pub spec_version: String,

    /// Unknown fields preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

const PREVIOUS_OUTPUT_KEY: &str = "previous_output";

impl PaigeantMessage {
    /// Build a fresh envelope for a freshly dispatched workflow: `attempt =
    /// 0`, empty `executed`/`compensations`, `inserted_count = 0`.
    pub fn new_dispatch(
        itinerary: Vec<ActivitySpec>,
        payload: serde_json::Map<String, serde_json::Value>,
        trace_id: Option<String>,
        obo_token: Option<String>,
    ) -> Self {
        let correlation_id = Uuid::now_v7();
        let run_id = Uuid::now_v7();
        Self {
            message_id: Uuid::now_v7(),
            correlation_id,
            run_id,
            trace_id,
            timestamp: Utc::now(),
            obo_token,
            signature: None,
            routing_slip: RoutingSlip::new(itinerary),
            payload,
            attempt: 0,
            spec_version: SPEC_VERSION.to_string(),
            extra: serde_json::Map::new(),
        }
    }

    /// Canonical on-wire form. Stable under re-serialization of an
    /// unmodified envelope.
    pub fn serialize(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    /// Parse bytes into an envelope, validating required fields and
    /// structural invariants via serde's required-field enforcement.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    /// Pop the head of `itinerary`, append it (with outcome) to `executed`,
    /// set `payload.previous_output`, reset `attempt` to 0, assign a fresh
    /// `message_id`. `correlation_id`, `run_id`, `trace_id`, and security
    /// context are preserved.
    pub fn advance(&self, output: serde_json::Value) -> Result<Self, EnvelopeError> {
        let mut next = self.clone();
        let head = next
            .routing_slip
            .itinerary
            .first()
            .cloned()
            .ok_or(EnvelopeError::EmptyItinerary)?;
        next.routing_slip.itinerary.remove(0);

        let now = Utc::now();
        next.routing_slip.executed.push(ExecutedStep {
            agent_name: head.agent_name,
            started_at: now,
            finished_at: now,
            output_ref: output.to_string(),
            status: StepOutcome::Completed,
        });

        next.payload
            .insert(PREVIOUS_OUTPUT_KEY.to_string(), output);
        next.attempt = 0;
        next.message_id = Uuid::now_v7();
        Ok(next)
    }

    /// Increment `attempt`, preserving `run_id`. Does not mutate `itinerary`
    /// or `executed`. Assigns a fresh `message_id` since the result is
    /// republished.
    pub fn retry_clone(&self) -> Self {
        let mut next = self.clone();
        next.attempt += 1;
        next.message_id = Uuid::now_v7();
        next
    }

    /// Insert `specs` immediately after the current head, bounded by `bound`
    /// total insertions and rejecting any agent already present in
    /// `executed` for this run.
    ///
    /// Registry-membership validation (the insertion's agents must already
    /// be registered) is the caller's responsibility — this crate has no
    /// notion of an agent registry. This method enforces only the bound and
    /// the cycle check, both of which are properties of the slip itself.
    pub fn insert_steps(
        &self,
        specs: Vec<ActivitySpec>,
        bound: u32,
    ) -> Result<Self, EnvelopeError> {
        let attempted_total = self.routing_slip.inserted_count + specs.len() as u32;
        if attempted_total > bound {
            return Err(EnvelopeError::InsertBoundExceeded {
                attempted: attempted_total,
                max: bound,
            });
        }

        for spec in &specs {
            if self.routing_slip.has_executed(&spec.agent_name) {
                return Err(EnvelopeError::CyclicInsertion {
                    agent_name: spec.agent_name.clone(),
                });
            }
        }

        let mut next = self.clone();
        // Callers invoke this post-`advance`: the step that just ran is
        // already in `executed` and index 0 of `itinerary` is the next
        // scheduled step. Insertions land immediately ahead of it, at
        // index 0, per the "immediately after the currently executing
        // step" rule.
        for (offset, spec) in specs.into_iter().enumerate() {
            next.routing_slip.itinerary.insert(offset, spec);
        }
        next.routing_slip.inserted_count = attempted_total;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(agent: &str) -> ActivitySpec {
        ActivitySpec::new(agent, format!("prompt-{agent}"))
    }

    #[test]
    fn round_trip_preserves_equality() {
        let env = PaigeantMessage::new_dispatch(
            vec![spec("a"), spec("b")],
            serde_json::Map::new(),
            Some("trace-1".into()),
            None,
        );
        let bytes = env.serialize().unwrap();
        let parsed = PaigeantMessage::deserialize(&bytes).unwrap();
        assert_eq!(env, parsed);
    }

    #[test]
    fn round_trip_preserves_unknown_keys() {
        let env = PaigeantMessage::new_dispatch(vec![spec("a")], serde_json::Map::new(), None, None);
        let mut value = serde_json::to_value(&env).unwrap();
        value["future_field"] = json!("from-a-newer-writer");
        let parsed: PaigeantMessage = serde_json::from_value(value).unwrap();
        assert_eq!(
            parsed.extra.get("future_field"),
            Some(&json!("from-a-newer-writer"))
        );
        let reserialized = serde_json::to_value(&parsed).unwrap();
        assert_eq!(reserialized["future_field"], json!("from-a-newer-writer"));
    }

    #[test]
    fn advance_law_moves_head_to_executed_tail() {
        let env = PaigeantMessage::new_dispatch(
            vec![spec("a"), spec("b")],
            serde_json::Map::new(),
            None,
            None,
        );
        let advanced = env.advance(json!("out-a")).unwrap();
        assert_eq!(advanced.routing_slip.executed.len(), 1);
        assert_eq!(advanced.routing_slip.executed[0].agent_name, "a");
        assert!(!advanced
            .routing_slip
            .itinerary
            .iter()
            .any(|s| s.agent_name == "a"));
        assert_eq!(advanced.routing_slip.itinerary[0].agent_name, "b");
        assert_eq!(advanced.payload.get("previous_output"), Some(&json!("out-a")));
        assert_eq!(advanced.attempt, 0);
        assert_ne!(advanced.message_id, env.message_id);
        assert_eq!(advanced.correlation_id, env.correlation_id);
        assert_eq!(advanced.run_id, env.run_id);
    }

    #[test]
    fn advance_on_empty_itinerary_errors() {
        let env = PaigeantMessage::new_dispatch(vec![], serde_json::Map::new(), None, None);
        assert!(matches!(
            env.advance(json!(null)),
            Err(EnvelopeError::EmptyItinerary)
        ));
    }

    #[test]
    fn retry_clone_preserves_run_id_and_history() {
        let env = PaigeantMessage::new_dispatch(vec![spec("a")], serde_json::Map::new(), None, None);
        let retried = env.retry_clone();
        assert_eq!(retried.attempt, 1);
        assert_eq!(retried.run_id, env.run_id);
        assert_eq!(retried.routing_slip, env.routing_slip);
        assert_ne!(retried.message_id, env.message_id);
    }

    #[test]
    fn insert_steps_places_at_head_of_post_advance_itinerary() {
        // insert_steps is always invoked after advance(): "planner" is
        // already in `executed` and the post-advance itinerary starts at
        // "d". The insertion must land ahead of "d", not after it.
        let env = PaigeantMessage::new_dispatch(
            vec![spec("planner"), spec("d"), spec("e")],
            serde_json::Map::new(),
            None,
            None,
        );
        let advanced = env.advance(json!("planned")).unwrap();
        let edited = advanced.insert_steps(vec![spec("notifier")], 3).unwrap();
        assert_eq!(edited.routing_slip.inserted_count, 1);
        let names: Vec<_> = edited
            .routing_slip
            .itinerary
            .iter()
            .map(|s| s.agent_name.as_str())
            .collect();
        assert_eq!(names, vec!["notifier", "d", "e"]);
    }

    #[test]
    fn insert_steps_exceeding_bound_errors_and_does_not_mutate() {
        let env = PaigeantMessage::new_dispatch(vec![spec("planner")], serde_json::Map::new(), None, None);
        let err = env.insert_steps(vec![spec("notifier")], 0).unwrap_err();
        assert!(matches!(err, EnvelopeError::InsertBoundExceeded { .. }));
        assert_eq!(env.routing_slip.inserted_count, 0);
    }

    #[test]
    fn insert_steps_rejects_cycle_with_executed() {
        let env = PaigeantMessage::new_dispatch(
            vec![spec("a"), spec("b")],
            serde_json::Map::new(),
            None,
            None,
        );
        let advanced = env.advance(json!("out")).unwrap(); // "a" now in executed
        let err = advanced.insert_steps(vec![spec("a")], 3).unwrap_err();
        assert!(matches!(err, EnvelopeError::CyclicInsertion { .. }));
    }
}
