//! A single built-in demonstration agent.
//!
//! The real `ActivityRunner` (an LLM invocation, or any other external
//! collaborator) is out of this crate's scope — it is supplied by whoever
//! embeds the `waybill-*` crates in their own process. `waybill worker run`
//! has nothing to run against on a bare checkout, so it registers this one
//! `echo` agent: it returns `prompt`, chained onto `previous_output` when
//! the step asked for it. This is wiring, not business logic — the same
//! role `echo` plays in `waybill-runtime`'s own test suite.

use async_trait::async_trait;
use waybill_registry::{ActivityCtx, ActivityRunner, DepsValue, RunnerFailure};

/// Echoes its prompt, chained onto the previous step's output when present.
pub struct EchoRunner;

#[async_trait]
impl ActivityRunner for EchoRunner {
    async fn run(
        &self,
        prompt: &str,
        _deps: &dyn DepsValue,
        ctx: &ActivityCtx,
    ) -> Result<serde_json::Value, RunnerFailure> {
        match &ctx.previous_output {
            Some(serde_json::Value::String(prev)) => Ok(serde_json::json!(format!("{prev}+{prompt}"))),
            _ => Ok(serde_json::json!(prompt)),
        }
    }
}
