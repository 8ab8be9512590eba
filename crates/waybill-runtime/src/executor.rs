//! Activity Executor — the per-agent worker loop.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use waybill_envelope::PaigeantMessage;
use waybill_registry::{ActivityCtx, AgentRegistry};
use waybill_repository::{StepKey, WorkflowRecord, WorkflowRepository, WorkflowStatus};
use waybill_transport::{Delivery, Transport};

use crate::backoff::BackoffPolicy;
use crate::error::ExecutorError;

/// Configuration for one [`ActivityExecutor`] instance.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// The agent this executor serves; also the topic it subscribes to.
    pub agent_name: String,
    /// This worker's consumer identity, passed to `Transport::subscribe`.
    pub consumer_name: String,
    /// Retry ceiling for a single step.
    pub max_attempts: u32,
    /// Retry/backoff shape.
    pub backoff: BackoffPolicy,
}

/// Drives one agent's worker loop: resolve runner, subscribe, and process
/// deliveries one at a time until shutdown.
///
/// A single executor instance processes one message at a time, preserving
/// per-workflow serialization within this agent; multiple executor
/// instances on the same agent form a competing-consumer group via the
/// transport's consumer-group semantics.
pub struct ActivityExecutor {
    transport: Arc<dyn Transport>,
    repository: Arc<dyn WorkflowRepository>,
    registry: Arc<AgentRegistry>,
    config: ExecutorConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl ActivityExecutor {
    /// Construct an executor. Does not connect or subscribe yet.
    pub fn new(
        transport: Arc<dyn Transport>,
        repository: Arc<dyn WorkflowRepository>,
        registry: Arc<AgentRegistry>,
        config: ExecutorConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            transport,
            repository,
            registry,
            config,
            shutdown_tx,
        }
    }

    /// Request graceful shutdown: the loop stops after its current delivery
    /// (if any) finishes processing.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the worker loop until shutdown is requested or the delivery
    /// stream ends. Connects and subscribes on entry.
    #[instrument(skip(self), fields(agent_name = %self.config.agent_name))]
    pub async fn run(&self) -> Result<(), ExecutorError> {
        if !self.registry.contains(&self.config.agent_name) {
            return Err(ExecutorError::UnknownAgent(self.config.agent_name.clone()));
        }

        self.transport.connect().await?;
        let mut stream = self
            .transport
            .clone()
            .subscribe(&self.config.agent_name, &self.config.consumer_name)
            .await?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(agent_name = %self.config.agent_name, "worker loop shutting down");
                        break;
                    }
                }
                delivery = stream.next() => {
                    match delivery {
                        Some(delivery) => self.handle_delivery(delivery).await?,
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_delivery(&self, delivery: Delivery) -> Result<(), ExecutorError> {
        let envelope = match PaigeantMessage::deserialize(&delivery.bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed delivery");
                self.transport.ack(&delivery.tag).await?;
                return Ok(());
            }
        };

        let Some(head) = envelope.routing_slip.head().cloned() else {
            warn!(correlation_id = %envelope.correlation_id, "delivery with empty itinerary; dropping");
            self.transport.ack(&delivery.tag).await?;
            return Ok(());
        };
        if head.agent_name != self.config.agent_name {
            warn!(
                correlation_id = %envelope.correlation_id,
                expected = %self.config.agent_name,
                actual = %head.agent_name,
                "misrouted delivery; dropping"
            );
            self.transport.ack(&delivery.tag).await?;
            return Ok(());
        }

        let entry = self
            .registry
            .get(&self.config.agent_name)
            .ok_or_else(|| ExecutorError::UnknownAgent(self.config.agent_name.clone()))?;

        let step_key = StepKey::new(envelope.correlation_id, head.agent_name.clone(), envelope.run_id);
        self.log_repo_err(
            self.repository.record_step_started(step_key.clone(), envelope.attempt).await,
            "record_step_started",
        );
        self.mark_running(&envelope).await;

        let deps = self
            .registry
            .resolve_deps(&head.deps_blob.type_name, &head.deps_blob.data)?;

        let previous_output = if head.expects_previous_output {
            envelope.payload.get("previous_output").cloned()
        } else {
            None
        };

        let mut ctx = ActivityCtx::new(
            envelope.correlation_id,
            envelope.run_id,
            envelope.trace_id.clone(),
            previous_output,
        );
        if entry.can_edit_itinerary {
            let executed_agents: HashSet<String> = envelope
                .routing_slip
                .executed
                .iter()
                .map(|s| s.agent_name.clone())
                .collect();
            ctx = ctx.with_edit_authority(
                self.registry.agent_names(),
                executed_agents,
                envelope.routing_slip.inserted_count,
                entry.max_insertions.unwrap_or(self.registry.default_max_insertions()),
            );
        }

        info!(
            correlation_id = %envelope.correlation_id,
            run_id = %envelope.run_id,
            agent_name = %head.agent_name,
            attempt = envelope.attempt,
            "step started"
        );

        match entry.runner.run(&head.prompt, deps.as_ref(), &ctx).await {
            Ok(output) => self.on_step_success(&envelope, step_key, output, &ctx, &delivery).await,
            Err(failure) => self.on_step_failure(&envelope, step_key, failure, &delivery).await,
        }
    }

    async fn on_step_success(
        &self,
        envelope: &PaigeantMessage,
        step_key: StepKey,
        output: serde_json::Value,
        ctx: &ActivityCtx,
        delivery: &Delivery,
    ) -> Result<(), ExecutorError> {
        let output_ref = output.to_string();
        self.log_repo_err(
            self.repository
                .record_step_completed(step_key, envelope.attempt, output_ref)
                .await,
            "record_step_completed",
        );

        let mut advanced = envelope.advance(output)?;

        let pending = ctx.take_pending_insertions();
        if !pending.is_empty() {
            let mut specs = Vec::with_capacity(pending.len());
            for (agent_name, prompt) in pending {
                specs.push(self.registry.build_insertion_spec(&agent_name, prompt)?);
            }
            let bound = self
                .registry
                .get(&self.config.agent_name)
                .and_then(|e| e.max_insertions)
                .unwrap_or(self.registry.default_max_insertions());
            advanced = advanced.insert_steps(specs, bound)?;
        }

        info!(
            correlation_id = %advanced.correlation_id,
            agent_name = %self.config.agent_name,
            "step completed"
        );

        match advanced.routing_slip.head() {
            Some(next) => {
                let next_topic = next.agent_name.clone();
                self.transport.publish(&next_topic, &advanced).await?;
            }
            None => {
                info!(correlation_id = %advanced.correlation_id, "workflow completed");
                self.finalize_workflow(&advanced, WorkflowStatus::Completed).await;
            }
        }
        self.transport.ack(&delivery.tag).await?;
        Ok(())
    }

    async fn on_step_failure(
        &self,
        envelope: &PaigeantMessage,
        step_key: StepKey,
        failure: waybill_registry::RunnerFailure,
        delivery: &Delivery,
    ) -> Result<(), ExecutorError> {
        self.log_repo_err(
            self.repository
                .record_step_failed(step_key, envelope.attempt, failure.message.clone())
                .await,
            "record_step_failed",
        );

        let attempts_used = envelope.attempt + 1;
        if failure.is_retryable() && attempts_used < self.config.max_attempts {
            let retried = envelope.retry_clone();
            warn!(
                correlation_id = %envelope.correlation_id,
                agent_name = %self.config.agent_name,
                attempt = retried.attempt,
                "step failed, retrying"
            );
            let delay = self.config.backoff.delay_for_attempt(retried.attempt);
            tokio::time::sleep(delay).await;
            self.transport.publish(&self.config.agent_name, &retried).await?;
        } else {
            warn!(
                correlation_id = %envelope.correlation_id,
                agent_name = %self.config.agent_name,
                "step failed, no retries remaining; failing workflow"
            );
            self.finalize_workflow(envelope, WorkflowStatus::Failed).await;
        }
        self.transport.ack(&delivery.tag).await?;
        Ok(())
    }

    async fn mark_running(&self, envelope: &PaigeantMessage) {
        let existing = match self.repository.get_workflow(envelope.correlation_id).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(error = %e, "get_workflow failed while marking running");
                return;
            }
        };
        let Some(existing) = existing else { return };
        if existing.status != WorkflowStatus::Pending {
            return;
        }
        self.log_repo_err(
            self.repository
                .record_workflow(WorkflowRecord {
                    status: WorkflowStatus::Running,
                    updated_at: Utc::now(),
                    ..existing
                })
                .await,
            "record_workflow(running)",
        );
    }

    async fn finalize_workflow(&self, envelope: &PaigeantMessage, status: WorkflowStatus) {
        let now = Utc::now();
        let created_at = match self.repository.get_workflow(envelope.correlation_id).await {
            Ok(Some(existing)) => existing.created_at,
            Ok(None) => now,
            Err(e) => {
                warn!(error = %e, "get_workflow failed while finalizing workflow");
                now
            }
        };
        let snapshot = serde_json::to_value(&envelope.routing_slip)
            .unwrap_or(serde_json::Value::Null);
        self.log_repo_err(
            self.repository
                .record_workflow(WorkflowRecord {
                    correlation_id: envelope.correlation_id,
                    status,
                    routing_slip_snapshot: snapshot,
                    payload_snapshot: serde_json::Value::Object(envelope.payload.clone()),
                    created_at,
                    updated_at: now,
                })
                .await,
            "record_workflow(finalize)",
        );
    }

    fn log_repo_err<T>(&self, result: Result<T, waybill_repository::RepositoryError>, context: &str) {
        if let Err(e) = result {
            warn!(error = %e, context, "repository write failed; continuing (non-fatal)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use waybill_envelope::ActivitySpec;
    use waybill_registry::{DepsValue, FailureKind, RunnerFailure};
    use waybill_repository::InMemoryRepository;
    use waybill_transport::InMemoryTransport;

    struct Echo;

    #[async_trait]
    impl waybill_registry::ActivityRunner for Echo {
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

    struct FlakyThenSucceeds {
        calls: AtomicU32,
    }

    #[async_trait]
    impl waybill_registry::ActivityRunner for FlakyThenSucceeds {
        async fn run(
            &self,
            prompt: &str,
            _deps: &dyn DepsValue,
            _ctx: &ActivityCtx,
        ) -> Result<serde_json::Value, RunnerFailure> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Err(RunnerFailure::retryable("transient failure"))
            } else {
                Ok(serde_json::json!(prompt))
            }
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl waybill_registry::ActivityRunner for AlwaysFails {
        async fn run(
            &self,
            _prompt: &str,
            _deps: &dyn DepsValue,
            _ctx: &ActivityCtx,
        ) -> Result<serde_json::Value, RunnerFailure> {
            Err(RunnerFailure::retryable("always fails"))
        }
    }

    struct Planner;

    #[async_trait]
    impl waybill_registry::ActivityRunner for Planner {
        async fn run(
            &self,
            _prompt: &str,
            _deps: &dyn DepsValue,
            ctx: &ActivityCtx,
        ) -> Result<serde_json::Value, RunnerFailure> {
            let _ = ctx.edit_itinerary(vec![("notifier".to_string(), "post".to_string())]);
            Ok(serde_json::json!("planned"))
        }
    }

    struct Notifier;

    #[async_trait]
    impl waybill_registry::ActivityRunner for Notifier {
        async fn run(
            &self,
            prompt: &str,
            _deps: &dyn DepsValue,
            _ctx: &ActivityCtx,
        ) -> Result<serde_json::Value, RunnerFailure> {
            Ok(serde_json::json!(prompt))
        }
    }

    fn harness() -> (Arc<InMemoryTransport>, Arc<InMemoryRepository>) {
        (Arc::new(InMemoryTransport::new()), Arc::new(InMemoryRepository::new()))
    }

    fn config(agent_name: &str, max_attempts: u32) -> ExecutorConfig {
        ExecutorConfig {
            agent_name: agent_name.to_string(),
            consumer_name: format!("{agent_name}-worker"),
            max_attempts,
            backoff: BackoffPolicy {
                base: std::time::Duration::from_millis(1),
                cap: std::time::Duration::from_millis(5),
                jitter: 0.0,
            },
        }
    }

    #[tokio::test]
    async fn single_agent_happy_path_completes_workflow() {
        let (transport, repository) = harness();
        transport.connect().await.unwrap();

        let registry = Arc::new(AgentRegistry::new(3));
        registry.register("echo", Arc::new(Echo), "unit").unwrap();

        let envelope = PaigeantMessage::new_dispatch(
            vec![ActivitySpec::new("echo", "hi")],
            serde_json::Map::new(),
            None,
            None,
        );
        let correlation_id = envelope.correlation_id;
        repository
            .record_workflow(WorkflowRecord {
                correlation_id,
                status: WorkflowStatus::Pending,
                routing_slip_snapshot: serde_json::to_value(&envelope.routing_slip).unwrap(),
                payload_snapshot: serde_json::Value::Object(envelope.payload.clone()),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        transport.publish("echo", &envelope).await.unwrap();

        let executor = ActivityExecutor::new(
            transport.clone() as Arc<dyn Transport>,
            repository.clone() as Arc<dyn WorkflowRepository>,
            registry,
            config("echo", 3),
        );
        let executor = Arc::new(executor);
        let runner_handle = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.run().await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        executor.stop();
        transport.disconnect().await.ok();
        let _ = runner_handle.await;

        let record = repository.get_workflow(correlation_id).await.unwrap().unwrap();
        assert_eq!(record.status, WorkflowStatus::Completed);
        let steps = repository.get_steps(correlation_id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, waybill_repository::StepStatus::Completed);
    }

    #[tokio::test]
    async fn three_agent_pipeline_chains_previous_output() {
        let (transport, repository) = harness();
        transport.connect().await.unwrap();

        let registry = Arc::new(AgentRegistry::new(3));
        registry.register("a", Arc::new(Echo), "unit").unwrap();
        registry.register("b", Arc::new(Echo), "unit").unwrap();
        registry.register("c", Arc::new(Echo), "unit").unwrap();

        let envelope = PaigeantMessage::new_dispatch(
            vec![
                ActivitySpec::new("a", "x"),
                ActivitySpec::new("b", "b"),
                ActivitySpec::new("c", "c"),
            ],
            serde_json::Map::new(),
            None,
            None,
        );
        let correlation_id = envelope.correlation_id;
        repository
            .record_workflow(WorkflowRecord {
                correlation_id,
                status: WorkflowStatus::Pending,
                routing_slip_snapshot: serde_json::to_value(&envelope.routing_slip).unwrap(),
                payload_snapshot: serde_json::Value::Object(envelope.payload.clone()),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        transport.publish("a", &envelope).await.unwrap();

        let mut handles = Vec::new();
        let mut executors = Vec::new();
        for agent in ["a", "b", "c"] {
            let executor = Arc::new(ActivityExecutor::new(
                transport.clone() as Arc<dyn Transport>,
                repository.clone() as Arc<dyn WorkflowRepository>,
                registry.clone(),
                config(agent, 3),
            ));
            let handle = {
                let executor = executor.clone();
                tokio::spawn(async move { executor.run().await })
            };
            executors.push(executor);
            handles.push(handle);
        }

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        for executor in &executors {
            executor.stop();
        }
        transport.disconnect().await.ok();
        for handle in handles {
            let _ = handle.await;
        }

        let record = repository.get_workflow(correlation_id).await.unwrap().unwrap();
        assert_eq!(record.status, WorkflowStatus::Completed);
        assert_eq!(
            record.payload_snapshot.get("previous_output"),
            Some(&serde_json::json!("x+b+c"))
        );
    }

    #[tokio::test]
    async fn retry_then_succeed_records_single_completed_step() {
        let (transport, repository) = harness();
        transport.connect().await.unwrap();

        let registry = Arc::new(AgentRegistry::new(3));
        registry
            .register("b", Arc::new(FlakyThenSucceeds { calls: AtomicU32::new(0) }), "unit")
            .unwrap();

        let envelope = PaigeantMessage::new_dispatch(
            vec![ActivitySpec::new("b", "hi")],
            serde_json::Map::new(),
            None,
            None,
        );
        let correlation_id = envelope.correlation_id;
        repository
            .record_workflow(WorkflowRecord {
                correlation_id,
                status: WorkflowStatus::Pending,
                routing_slip_snapshot: serde_json::to_value(&envelope.routing_slip).unwrap(),
                payload_snapshot: serde_json::Value::Object(envelope.payload.clone()),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        transport.publish("b", &envelope).await.unwrap();

        let executor = Arc::new(ActivityExecutor::new(
            transport.clone() as Arc<dyn Transport>,
            repository.clone() as Arc<dyn WorkflowRepository>,
            registry,
            config("b", 3),
        ));
        let handle = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.run().await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        executor.stop();
        transport.disconnect().await.ok();
        let _ = handle.await;

        let steps = repository.get_steps(correlation_id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, waybill_repository::StepStatus::Completed);
        assert_eq!(steps[0].attempt, 1);
        let record = repository.get_workflow(correlation_id).await.unwrap().unwrap();
        assert_eq!(record.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn retry_exhausted_fails_workflow_without_downstream_publish() {
        let (transport, repository) = harness();
        transport.connect().await.unwrap();

        let registry = Arc::new(AgentRegistry::new(3));
        registry.register("b", Arc::new(AlwaysFails), "unit").unwrap();
        registry.register("c", Arc::new(Echo), "unit").unwrap();

        let envelope = PaigeantMessage::new_dispatch(
            vec![ActivitySpec::new("b", "hi"), ActivitySpec::new("c", "c")],
            serde_json::Map::new(),
            None,
            None,
        );
        let correlation_id = envelope.correlation_id;
        repository
            .record_workflow(WorkflowRecord {
                correlation_id,
                status: WorkflowStatus::Pending,
                routing_slip_snapshot: serde_json::to_value(&envelope.routing_slip).unwrap(),
                payload_snapshot: serde_json::Value::Object(envelope.payload.clone()),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        transport.publish("b", &envelope).await.unwrap();

        let executor = Arc::new(ActivityExecutor::new(
            transport.clone() as Arc<dyn Transport>,
            repository.clone() as Arc<dyn WorkflowRepository>,
            registry,
            config("b", 2),
        ));
        let handle = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.run().await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        executor.stop();
        transport.disconnect().await.ok();
        let _ = handle.await;

        let steps = repository.get_steps(correlation_id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, waybill_repository::StepStatus::Failed);
        assert_eq!(steps[0].attempt, 1);
        let record = repository.get_workflow(correlation_id).await.unwrap().unwrap();
        assert_eq!(record.status, WorkflowStatus::Failed);

        let c_stream = transport.clone().subscribe("c", "probe").await.unwrap();
        tokio::pin!(c_stream);
        let next = tokio::time::timeout(std::time::Duration::from_millis(20), c_stream.next()).await;
        assert!(next.is_err(), "no message should ever have been published for c");
    }

    #[tokio::test]
    async fn dynamic_insertion_within_bound_runs_notifier() {
        let (transport, repository) = harness();
        transport.connect().await.unwrap();

        let registry = Arc::new(AgentRegistry::new(3));
        registry
            .register_editable("planner", Arc::new(Planner), "unit", None)
            .unwrap();
        registry.register("notifier", Arc::new(Notifier), "unit").unwrap();

        let envelope = PaigeantMessage::new_dispatch(
            vec![ActivitySpec::new("planner", "plan")],
            serde_json::Map::new(),
            None,
            None,
        );
        let correlation_id = envelope.correlation_id;
        repository
            .record_workflow(WorkflowRecord {
                correlation_id,
                status: WorkflowStatus::Pending,
                routing_slip_snapshot: serde_json::to_value(&envelope.routing_slip).unwrap(),
                payload_snapshot: serde_json::Value::Object(envelope.payload.clone()),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        transport.publish("planner", &envelope).await.unwrap();

        let planner_exec = Arc::new(ActivityExecutor::new(
            transport.clone() as Arc<dyn Transport>,
            repository.clone() as Arc<dyn WorkflowRepository>,
            registry.clone(),
            config("planner", 3),
        ));
        let notifier_exec = Arc::new(ActivityExecutor::new(
            transport.clone() as Arc<dyn Transport>,
            repository.clone() as Arc<dyn WorkflowRepository>,
            registry,
            config("notifier", 3),
        ));
        let h1 = {
            let e = planner_exec.clone();
            tokio::spawn(async move { e.run().await })
        };
        let h2 = {
            let e = notifier_exec.clone();
            tokio::spawn(async move { e.run().await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        planner_exec.stop();
        notifier_exec.stop();
        transport.disconnect().await.ok();
        let _ = h1.await;
        let _ = h2.await;

        let record = repository.get_workflow(correlation_id).await.unwrap().unwrap();
        assert_eq!(record.status, WorkflowStatus::Completed);
        assert_eq!(record.routing_slip_snapshot["inserted_count"], 1);
        let steps = repository.get_steps(correlation_id).await.unwrap();
        assert!(steps.iter().any(|s| s.agent_name == "notifier"
            && s.status == waybill_repository::StepStatus::Completed));
    }

    #[tokio::test]
    async fn dynamic_insertion_lands_immediately_ahead_of_downstream_steps() {
        // itinerary [planner, d, e]; planner inserts "notifier". Per
        // spec.md §4.5 the insertion lands at the head of the
        // *post-advance* itinerary, so the executed order must be
        // [planner, notifier, d, e] — notifier must run before d, not
        // after it.
        let (transport, repository) = harness();
        transport.connect().await.unwrap();

        let registry = Arc::new(AgentRegistry::new(3));
        registry
            .register_editable("planner", Arc::new(Planner), "unit", None)
            .unwrap();
        registry.register("notifier", Arc::new(Notifier), "unit").unwrap();
        registry.register("d", Arc::new(Echo), "unit").unwrap();
        registry.register("e", Arc::new(Echo), "unit").unwrap();

        let envelope = PaigeantMessage::new_dispatch(
            vec![
                ActivitySpec::new("planner", "plan"),
                ActivitySpec::new("d", "d"),
                ActivitySpec::new("e", "e"),
            ],
            serde_json::Map::new(),
            None,
            None,
        );
        let correlation_id = envelope.correlation_id;
        repository
            .record_workflow(WorkflowRecord {
                correlation_id,
                status: WorkflowStatus::Pending,
                routing_slip_snapshot: serde_json::to_value(&envelope.routing_slip).unwrap(),
                payload_snapshot: serde_json::Value::Object(envelope.payload.clone()),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        transport.publish("planner", &envelope).await.unwrap();

        let mut handles = Vec::new();
        let mut executors = Vec::new();
        for agent in ["planner", "notifier", "d", "e"] {
            let executor = Arc::new(ActivityExecutor::new(
                transport.clone() as Arc<dyn Transport>,
                repository.clone() as Arc<dyn WorkflowRepository>,
                registry.clone(),
                config(agent, 3),
            ));
            let handle = {
                let e = executor.clone();
                tokio::spawn(async move { e.run().await })
            };
            executors.push(executor);
            handles.push(handle);
        }

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        for executor in &executors {
            executor.stop();
        }
        transport.disconnect().await.ok();
        for handle in handles {
            let _ = handle.await;
        }

        let record = repository.get_workflow(correlation_id).await.unwrap().unwrap();
        assert_eq!(record.status, WorkflowStatus::Completed);
        assert_eq!(record.routing_slip_snapshot["inserted_count"], 1);
        let executed_order: Vec<String> = record.routing_slip_snapshot["executed"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["agent_name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(executed_order, vec!["planner", "notifier", "d", "e"]);
    }

    #[tokio::test]
    async fn dynamic_insertion_exceeding_bound_leaves_slip_unchanged() {
        let (transport, repository) = harness();
        transport.connect().await.unwrap();

        let registry = Arc::new(AgentRegistry::new(0));
        registry
            .register_editable("planner", Arc::new(Planner), "unit", Some(0))
            .unwrap();
        registry.register("notifier", Arc::new(Notifier), "unit").unwrap();

        let envelope = PaigeantMessage::new_dispatch(
            vec![ActivitySpec::new("planner", "plan")],
            serde_json::Map::new(),
            None,
            None,
        );
        let correlation_id = envelope.correlation_id;
        repository
            .record_workflow(WorkflowRecord {
                correlation_id,
                status: WorkflowStatus::Pending,
                routing_slip_snapshot: serde_json::to_value(&envelope.routing_slip).unwrap(),
                payload_snapshot: serde_json::Value::Object(envelope.payload.clone()),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        transport.publish("planner", &envelope).await.unwrap();

        let executor = Arc::new(ActivityExecutor::new(
            transport.clone() as Arc<dyn Transport>,
            repository.clone() as Arc<dyn WorkflowRepository>,
            registry,
            config("planner", 3),
        ));
        let handle = {
            let e = executor.clone();
            tokio::spawn(async move { e.run().await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        executor.stop();
        transport.disconnect().await.ok();
        let _ = handle.await;

        let record = repository.get_workflow(correlation_id).await.unwrap().unwrap();
        assert_eq!(record.status, WorkflowStatus::Completed);
        assert_eq!(record.routing_slip_snapshot["inserted_count"], 0);
        let steps = repository.get_steps(correlation_id).await.unwrap();
        assert!(!steps.iter().any(|s| s.agent_name == "notifier"));
    }
}
