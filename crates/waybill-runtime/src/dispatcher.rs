//! Workflow Dispatcher — builds a fresh routing slip and publishes it to
//! the first agent's topic.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use waybill_envelope::{ActivitySpec, PaigeantMessage};
use waybill_repository::{WorkflowRecord, WorkflowRepository, WorkflowStatus};
use waybill_transport::Transport;

use crate::error::DispatchError;

/// Options carried through one `dispatch_workflow` call.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Initial payload fields, merged under the envelope's `payload`.
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Propagated verbatim into the envelope.
    pub trace_id: Option<String>,
    /// Propagated verbatim into the envelope; never validated here.
    pub obo_token: Option<String>,
}

/// Accumulates a workflow's itinerary via `add_to_runway`, then publishes
/// it as a single dispatch.
///
/// Intentionally thin: it performs no validation of runner availability —
/// the worker for the first agent may not yet be running, and the message
/// simply waits in the durable topic until one subscribes.
pub struct Dispatcher {
    runway: Vec<ActivitySpec>,
}

impl Dispatcher {
    /// Start an empty dispatcher.
    pub fn new() -> Self {
        Self { runway: Vec::new() }
    }

    /// Append one step to the runway, in dispatch order.
    pub fn add_to_runway(&mut self, spec: ActivitySpec) -> &mut Self {
        self.runway.push(spec);
        self
    }

    /// Build the envelope, record it as *pending*, and publish it to the
    /// first step's topic.
    ///
    /// Returns the freshly minted `correlation_id` on success. Errors if
    /// the runway is empty, or if building/recording/publishing fails.
    #[instrument(skip(self, transport, repository, options), fields(agent_count = self.runway.len()))]
    pub async fn dispatch_workflow(
        &self,
        transport: &Arc<dyn Transport>,
        repository: &Arc<dyn WorkflowRepository>,
        options: DispatchOptions,
    ) -> Result<Uuid, DispatchError> {
        if self.runway.is_empty() {
            return Err(DispatchError::EmptyWorkflow);
        }

        let envelope = PaigeantMessage::new_dispatch(
            self.runway.clone(),
            options.payload,
            options.trace_id,
            options.obo_token,
        );

        let now = Utc::now();
        repository
            .record_workflow(WorkflowRecord {
                correlation_id: envelope.correlation_id,
                status: WorkflowStatus::Pending,
                routing_slip_snapshot: serde_json::to_value(&envelope.routing_slip)?,
                payload_snapshot: serde_json::Value::Object(envelope.payload.clone()),
                created_at: now,
                updated_at: now,
            })
            .await?;

        let first_topic = &envelope
            .routing_slip
            .head()
            .expect("non-empty runway guarantees a head")
            .agent_name;

        tracing::info!(
            correlation_id = %envelope.correlation_id,
            run_id = %envelope.run_id,
            first_agent = %first_topic,
            "dispatching workflow"
        );

        transport.publish(first_topic, &envelope).await?;

        Ok(envelope.correlation_id)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
