//! Repository-side records: [`WorkflowRecord`] and [`StepRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a workflow as tracked by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Dispatched but no step has started yet.
    Pending,
    /// At least one step has started.
    Running,
    /// The itinerary ran to completion.
    Completed,
    /// A step exhausted its retries.
    Failed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown workflow status: {other}")),
        }
    }
}

/// Status of one step as tracked by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step has been dispatched to a runner and has not yet finished.
    Started,
    /// The step's runner produced output successfully.
    Completed,
    /// The step's runner failed and no further retries remain.
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown step status: {other}")),
        }
    }
}

/// Workflow-level record, keyed by `correlation_id`.
///
/// `snapshot` is the last-seen `(routing_slip, payload)` pair, captured as
/// JSON so the repository never needs to depend on `waybill-envelope`'s
/// concrete types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Primary key.
    pub correlation_id: Uuid,
    /// Lifecycle status.
    pub status: WorkflowStatus,
    /// Last-seen `routing_slip`, as JSON.
    pub routing_slip_snapshot: serde_json::Value,
    /// Last-seen `payload`, as JSON.
    pub payload_snapshot: serde_json::Value,
    /// When the workflow was first dispatched.
    pub created_at: DateTime<Utc>,
    /// When this record was last written.
    pub updated_at: DateTime<Utc>,
}

/// Composite key identifying one step's lifecycle row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepKey {
    /// The owning workflow.
    pub correlation_id: Uuid,
    /// The agent that ran (or is running) this step.
    pub agent_name: String,
    /// The attempt sequence this step belongs to.
    pub run_id: Uuid,
}

impl StepKey {
    /// Construct a step key.
    pub fn new(correlation_id: Uuid, agent_name: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            correlation_id,
            agent_name: agent_name.into(),
            run_id,
        }
    }
}

/// Step-level record, keyed by `(correlation_id, agent_name, run_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// The owning workflow.
    pub correlation_id: Uuid,
    /// The agent that ran (or is running) this step.
    pub agent_name: String,
    /// The attempt sequence this step belongs to.
    pub run_id: Uuid,
    /// Lifecycle status.
    pub status: StepStatus,
    /// 0-based attempt counter at the time this row was last written.
    pub attempt: u32,
    /// Error message, present only when `status == Failed`.
    pub error: Option<String>,
    /// Opaque output handle, present only when `status == Completed`.
    pub output_ref: Option<String>,
    /// When the step first started.
    pub started_at: DateTime<Utc>,
    /// When the step reached a terminal status, if it has.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Filter for [`crate::WorkflowRepository::list_workflows`].
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    /// Restrict to workflows in this status, if given.
    pub status: Option<WorkflowStatus>,
}

/// Pagination for list operations.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Number of rows to skip.
    pub offset: u32,
    /// Maximum number of rows to return.
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}
