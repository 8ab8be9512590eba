//! `ActivityCtx` — what a runner sees about the step it is executing,
//! including the bounded itinerary-edit hook.

use std::collections::HashSet;

use parking_lot::Mutex;
use uuid::Uuid;

struct EditSession {
    /// Snapshot of agent names registered on this worker's registry at
    /// subscribe time — the "shared registry snapshot" of §4.5, kept
    /// process-local and never serialized onto the wire.
    available_agents: HashSet<String>,
    /// Agent names already present in `executed` for this run, used for
    /// the cycle check.
    executed_agents: HashSet<String>,
    inserted_count: u32,
    max_insertions: u32,
    pending: Vec<(String, String)>,
}

/// Context passed to an [`crate::ActivityRunner`] for one step invocation.
///
/// Exposes workflow identity, the previous step's output, and — only for
/// agents registered with `can_edit_itinerary = true` — the
/// [`ActivityCtx::edit_itinerary`] hook described in §4.5.
pub struct ActivityCtx {
    /// Constant for the workflow's lifetime.
    pub correlation_id: Uuid,
    /// Constant for this attempt sequence.
    pub run_id: Uuid,
    /// Propagated verbatim from the envelope.
    pub trace_id: Option<String>,
    /// The immediately prior step's output, if this step asked for it.
    pub previous_output: Option<serde_json::Value>,
    edit: Option<Mutex<EditSession>>,
}

impl ActivityCtx {
    /// Construct a context with no itinerary-edit authority.
    pub fn new(
        correlation_id: Uuid,
        run_id: Uuid,
        trace_id: Option<String>,
        previous_output: Option<serde_json::Value>,
    ) -> Self {
        Self {
            correlation_id,
            run_id,
            trace_id,
            previous_output,
            edit: None,
        }
    }

    /// Grant itinerary-edit authority to this context, bounded by
    /// `max_insertions` and validated against `available_agents` /
    /// `executed_agents`.
    pub fn with_edit_authority(
        mut self,
        available_agents: HashSet<String>,
        executed_agents: HashSet<String>,
        inserted_count: u32,
        max_insertions: u32,
    ) -> Self {
        self.edit = Some(Mutex::new(EditSession {
            available_agents,
            executed_agents,
            inserted_count,
            max_insertions,
            pending: Vec::new(),
        }));
        self
    }

    /// Request insertion of `insertions` (ordered `agent_name -> prompt`
    /// pairs) immediately after the currently executing step.
    ///
    /// Synchronous request/response, per the design note in §9: the
    /// validation and bound bookkeeping happen inline, and the caller gets
    /// an immediate `Err` with a human-readable reason on rejection. No
    /// mutation is visible to the runner either way — the executor applies
    /// accepted insertions to the envelope only after `run` returns.
    pub fn edit_itinerary(&self, insertions: Vec<(String, String)>) -> Result<(), String> {
        let Some(session) = &self.edit else {
            return Err("agent is not authorized to edit the itinerary".to_string());
        };
        let mut session = session.lock();

        for (agent_name, _) in &insertions {
            if !session.available_agents.contains(agent_name) {
                return Err(format!(
                    "agent '{agent_name}' is not registered as an available activity"
                ));
            }
            if session.executed_agents.contains(agent_name) {
                return Err(format!(
                    "cyclic insertion: agent '{agent_name}' already executed in this run"
                ));
            }
        }

        let attempted_total = session.inserted_count + insertions.len() as u32;
        if attempted_total > session.max_insertions {
            return Err(format!(
                "insertion bound exceeded: {attempted_total} inserted steps would exceed max_insertions={}",
                session.max_insertions
            ));
        }

        session.inserted_count = attempted_total;
        session.pending.extend(insertions);
        Ok(())
    }

    /// Drain the insertions accepted during this invocation, for the
    /// executor to apply to the envelope after `advance`.
    pub fn take_pending_insertions(&self) -> Vec<(String, String)> {
        match &self.edit {
            Some(session) => std::mem::take(&mut session.lock().pending),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_edit(max: u32) -> ActivityCtx {
        ActivityCtx::new(Uuid::now_v7(), Uuid::now_v7(), None, None).with_edit_authority(
            ["notifier".to_string()].into_iter().collect(),
            HashSet::new(),
            0,
            max,
        )
    }

    #[test]
    fn edit_without_authority_errors() {
        let ctx = ActivityCtx::new(Uuid::now_v7(), Uuid::now_v7(), None, None);
        let err = ctx
            .edit_itinerary(vec![("notifier".into(), "post".into())])
            .unwrap_err();
        assert!(err.contains("not authorized"));
    }

    #[test]
    fn edit_within_bound_accepts_and_tracks_pending() {
        let ctx = ctx_with_edit(3);
        ctx.edit_itinerary(vec![("notifier".into(), "post".into())])
            .unwrap();
        let pending = ctx.take_pending_insertions();
        assert_eq!(pending, vec![("notifier".to_string(), "post".to_string())]);
    }

    #[test]
    fn edit_exceeding_bound_is_rejected() {
        let ctx = ctx_with_edit(0);
        let err = ctx
            .edit_itinerary(vec![("notifier".into(), "post".into())])
            .unwrap_err();
        assert!(err.contains("insertion bound exceeded"));
        assert!(ctx.take_pending_insertions().is_empty());
    }

    #[test]
    fn edit_naming_unregistered_agent_is_rejected() {
        let ctx = ctx_with_edit(3);
        let err = ctx
            .edit_itinerary(vec![("ghost".into(), "boo".into())])
            .unwrap_err();
        assert!(err.contains("not registered"));
    }

    #[test]
    fn edit_naming_already_executed_agent_is_rejected() {
        let ctx = ActivityCtx::new(Uuid::now_v7(), Uuid::now_v7(), None, None).with_edit_authority(
            ["a".to_string()].into_iter().collect(),
            ["a".to_string()].into_iter().collect(),
            0,
            3,
        );
        let err = ctx
            .edit_itinerary(vec![("a".into(), "again".into())])
            .unwrap_err();
        assert!(err.contains("cyclic insertion"));
    }
}
