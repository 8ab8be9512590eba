//! In-memory `WorkflowRepository`, primarily for testing and the
//! `inmemory` transport/repository development loop.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::record::{
    Pagination, StepKey, StepRecord, StepStatus, WorkflowFilter, WorkflowRecord, WorkflowStatus,
};
use crate::repository::WorkflowRepository;

/// In-memory implementation of [`WorkflowRepository`].
///
/// Stores everything in process memory behind `parking_lot` locks; no
/// durability across process restarts, matching the variant's contract.
#[derive(Default)]
pub struct InMemoryRepository {
    workflows: RwLock<HashMap<Uuid, WorkflowRecord>>,
    steps: RwLock<HashMap<(Uuid, String, Uuid), StepRecord>>,
    // Preserves first-started order for `get_steps`, since `HashMap` does not.
    step_order: RwLock<Vec<(Uuid, String, Uuid)>>,
}

impl InMemoryRepository {
    /// Construct an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryRepository {
    async fn record_workflow(&self, record: WorkflowRecord) -> Result<(), RepositoryError> {
        let mut workflows = self.workflows.write();
        match workflows.get_mut(&record.correlation_id) {
            Some(existing) => {
                existing.status = record.status;
                existing.routing_slip_snapshot = record.routing_slip_snapshot;
                existing.payload_snapshot = record.payload_snapshot;
                existing.updated_at = Utc::now();
            }
            None => {
                workflows.insert(record.correlation_id, record);
            }
        }
        Ok(())
    }

    async fn record_step_started(&self, key: StepKey, attempt: u32) -> Result<(), RepositoryError> {
        let triple = (key.correlation_id, key.agent_name.clone(), key.run_id);
        let mut steps = self.steps.write();
        if steps.contains_key(&triple) {
            return Ok(()); // insert-or-ignore
        }
        steps.insert(
            triple.clone(),
            StepRecord {
                correlation_id: key.correlation_id,
                agent_name: key.agent_name,
                run_id: key.run_id,
                status: StepStatus::Started,
                attempt,
                error: None,
                output_ref: None,
                started_at: Utc::now(),
                finished_at: None,
            },
        );
        self.step_order.write().push(triple);
        Ok(())
    }

    async fn record_step_completed(
        &self,
        key: StepKey,
        attempt: u32,
        output_ref: String,
    ) -> Result<(), RepositoryError> {
        let triple = (key.correlation_id, key.agent_name.clone(), key.run_id);
        let mut steps = self.steps.write();
        let step = steps
            .get_mut(&triple)
            .ok_or(RepositoryError::StepNotFound {
                correlation_id: key.correlation_id,
                agent_name: key.agent_name,
            })?;
        step.status = StepStatus::Completed;
        step.attempt = attempt;
        step.output_ref = Some(output_ref);
        step.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn record_step_failed(
        &self,
        key: StepKey,
        attempt: u32,
        error: String,
    ) -> Result<(), RepositoryError> {
        let triple = (key.correlation_id, key.agent_name.clone(), key.run_id);
        let mut steps = self.steps.write();
        let step = steps
            .get_mut(&triple)
            .ok_or(RepositoryError::StepNotFound {
                correlation_id: key.correlation_id,
                agent_name: key.agent_name,
            })?;
        step.status = StepStatus::Failed;
        step.attempt = attempt;
        step.error = Some(error);
        step.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn get_workflow(&self, correlation_id: Uuid) -> Result<Option<WorkflowRecord>, RepositoryError> {
        Ok(self.workflows.read().get(&correlation_id).cloned())
    }

    async fn list_workflows(
        &self,
        filter: WorkflowFilter,
        pagination: Pagination,
    ) -> Result<Vec<WorkflowRecord>, RepositoryError> {
        let mut matching: Vec<WorkflowRecord> = self
            .workflows
            .read()
            .values()
            .filter(|w| filter.status.map_or(true, |s| s == w.status))
            .cloned()
            .collect();
        matching.sort_by_key(|w| w.created_at);
        let start = pagination.offset as usize;
        let end = start.saturating_add(pagination.limit as usize);
        Ok(matching.into_iter().skip(start).take(end - start).collect())
    }

    async fn get_steps(&self, correlation_id: Uuid) -> Result<Vec<StepRecord>, RepositoryError> {
        let order = self.step_order.read();
        let steps = self.steps.read();
        Ok(order
            .iter()
            .filter(|(cid, ..)| *cid == correlation_id)
            .filter_map(|k| steps.get(k).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow(correlation_id: Uuid) -> WorkflowRecord {
        WorkflowRecord {
            correlation_id,
            status: WorkflowStatus::Pending,
            routing_slip_snapshot: json!({}),
            payload_snapshot: json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_workflow_is_idempotent_on_correlation_id() {
        let repo = InMemoryRepository::new();
        let id = Uuid::now_v7();
        repo.record_workflow(workflow(id)).await.unwrap();

        let mut updated = workflow(id);
        updated.status = WorkflowStatus::Running;
        repo.record_workflow(updated).await.unwrap();

        let fetched = repo.get_workflow(id).await.unwrap().unwrap();
        assert_eq!(fetched.status, WorkflowStatus::Running);
    }

    #[tokio::test]
    async fn record_step_started_twice_yields_one_row() {
        let repo = InMemoryRepository::new();
        let correlation_id = Uuid::now_v7();
        let run_id = Uuid::now_v7();
        let key = StepKey::new(correlation_id, "echo", run_id);

        repo.record_step_started(key.clone(), 0).await.unwrap();
        repo.record_step_started(key.clone(), 0).await.unwrap();

        let steps = repo.get_steps(correlation_id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, StepStatus::Started);
    }

    #[tokio::test]
    async fn step_lifecycle_transitions_to_completed() {
        let repo = InMemoryRepository::new();
        let correlation_id = Uuid::now_v7();
        let run_id = Uuid::now_v7();
        let key = StepKey::new(correlation_id, "echo", run_id);

        repo.record_step_started(key.clone(), 0).await.unwrap();
        repo.record_step_completed(key, 0, "\"ok\"".into()).await.unwrap();

        let steps = repo.get_steps(correlation_id).await.unwrap();
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert_eq!(steps[0].output_ref.as_deref(), Some("\"ok\""));
    }

    #[tokio::test]
    async fn list_workflows_filters_by_status() {
        let repo = InMemoryRepository::new();
        let a = workflow(Uuid::now_v7());
        let mut b = workflow(Uuid::now_v7());
        b.status = WorkflowStatus::Completed;
        repo.record_workflow(a).await.unwrap();
        repo.record_workflow(b).await.unwrap();

        let completed = repo
            .list_workflows(
                WorkflowFilter {
                    status: Some(WorkflowStatus::Completed),
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].status, WorkflowStatus::Completed);
    }
}
