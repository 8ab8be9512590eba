//! `sqlx`-backed `WorkflowRepository`, shared between the embedded file
//! store (SQLite) and the remote relational store (PostgreSQL).
//!
//! Both variants are driven through [`sqlx::Any`], which normalizes bind
//! parameter syntax and basic scalar types across backends. IDs and
//! timestamps are stored as text (UUID-as-string, RFC 3339) rather than
//! backend-native `UUID`/`TIMESTAMPTZ` columns, so the same query set works
//! unmodified against either engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::record::{
    Pagination, StepKey, StepRecord, StepStatus, WorkflowFilter, WorkflowRecord, WorkflowStatus,
};
use crate::repository::WorkflowRepository;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS workflows (
    correlation_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    routing_slip_snapshot TEXT NOT NULL,
    payload_snapshot TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS steps (
    correlation_id TEXT NOT NULL,
    agent_name TEXT NOT NULL,
    run_id TEXT NOT NULL,
    status TEXT NOT NULL,
    attempt INTEGER NOT NULL,
    error TEXT,
    output_ref TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    PRIMARY KEY (correlation_id, agent_name, run_id)
);
"#;

fn to_rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Backend(format!("malformed timestamp '{s}': {e}")))
}

fn workflow_from_row(row: &AnyRow) -> Result<WorkflowRecord, RepositoryError> {
    let status: String = row.try_get("status").map_err(backend_err)?;
    let correlation_id: String = row.try_get("correlation_id").map_err(backend_err)?;
    let routing_slip_snapshot: String = row.try_get("routing_slip_snapshot").map_err(backend_err)?;
    let payload_snapshot: String = row.try_get("payload_snapshot").map_err(backend_err)?;
    let created_at: String = row.try_get("created_at").map_err(backend_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(backend_err)?;

    Ok(WorkflowRecord {
        correlation_id: Uuid::parse_str(&correlation_id)
            .map_err(|e| RepositoryError::Backend(e.to_string()))?,
        status: status
            .parse()
            .map_err(RepositoryError::Backend)?,
        routing_slip_snapshot: serde_json::from_str(&routing_slip_snapshot)?,
        payload_snapshot: serde_json::from_str(&payload_snapshot)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn step_from_row(row: &AnyRow) -> Result<StepRecord, RepositoryError> {
    let correlation_id: String = row.try_get("correlation_id").map_err(backend_err)?;
    let run_id: String = row.try_get("run_id").map_err(backend_err)?;
    let status: String = row.try_get("status").map_err(backend_err)?;
    let attempt: i64 = row.try_get("attempt").map_err(backend_err)?;
    let started_at: String = row.try_get("started_at").map_err(backend_err)?;
    let finished_at: Option<String> = row.try_get("finished_at").map_err(backend_err)?;

    Ok(StepRecord {
        correlation_id: Uuid::parse_str(&correlation_id)
            .map_err(|e| RepositoryError::Backend(e.to_string()))?,
        agent_name: row.try_get("agent_name").map_err(backend_err)?,
        run_id: Uuid::parse_str(&run_id).map_err(|e| RepositoryError::Backend(e.to_string()))?,
        status: status.parse().map_err(RepositoryError::Backend)?,
        attempt: attempt as u32,
        error: row.try_get("error").map_err(backend_err)?,
        output_ref: row.try_get("output_ref").map_err(backend_err)?,
        started_at: parse_ts(&started_at)?,
        finished_at: finished_at.map(|s| parse_ts(&s)).transpose()?,
    })
}

fn backend_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(e.to_string())
}

/// `sqlx::Any`-backed workflow repository. Construct with [`SqlRepository::connect`]
/// against a `sqlite:` or `postgres:` DSN.
pub struct SqlRepository {
    pool: AnyPool,
}

impl SqlRepository {
    /// Connect to `dsn` and ensure the schema exists. `dsn` may be any
    /// connection string `sqlx::Any` understands, e.g. `sqlite::memory:`,
    /// `sqlite:///var/lib/waybill/waybill.db`, or `postgres://...`.
    #[instrument]
    pub async fn connect(dsn: &str) -> Result<Self, RepositoryError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(backend_err)?;
        for statement in SCHEMA_SQL.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&pool).await.map_err(|e| {
                error!(error = %e, "failed to apply repository schema");
                backend_err(e)
            })?;
        }
        Ok(Self { pool })
    }

    /// Wrap an already-open pool (useful when the pool is shared with other
    /// parts of the process, or injected in tests).
    pub fn from_pool(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowRepository for SqlRepository {
    #[instrument(skip(self, record), fields(correlation_id = %record.correlation_id))]
    async fn record_workflow(&self, record: WorkflowRecord) -> Result<(), RepositoryError> {
        // A single upsert, not a check-then-act SELECT followed by
        // INSERT/UPDATE: two concurrent callers racing the same
        // correlation_id (e.g. a redelivered dispatch) must not both
        // observe "absent" and attempt a conflicting INSERT. `created_at`
        // is omitted from the DO UPDATE SET clause so the first write
        // still wins on creation, matching `record_step_started`'s
        // insert-or-ignore atomicity standard.
        sqlx::query(
            "INSERT INTO workflows (correlation_id, status, routing_slip_snapshot, payload_snapshot, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (correlation_id) DO UPDATE SET \
             status = excluded.status, \
             routing_slip_snapshot = excluded.routing_slip_snapshot, \
             payload_snapshot = excluded.payload_snapshot, \
             updated_at = excluded.updated_at",
        )
        .bind(record.correlation_id.to_string())
        .bind(record.status.to_string())
        .bind(record.routing_slip_snapshot.to_string())
        .bind(record.payload_snapshot.to_string())
        .bind(to_rfc3339(record.created_at))
        .bind(to_rfc3339(record.updated_at))
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    #[instrument(skip(self), fields(correlation_id = %key.correlation_id, agent_name = %key.agent_name))]
    async fn record_step_started(&self, key: StepKey, attempt: u32) -> Result<(), RepositoryError> {
        let now = to_rfc3339(Utc::now());
        sqlx::query(
            "INSERT INTO steps (correlation_id, agent_name, run_id, status, attempt, started_at) \
             VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(key.correlation_id.to_string())
        .bind(key.agent_name)
        .bind(key.run_id.to_string())
        .bind(StepStatus::Started.to_string())
        .bind(attempt as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    #[instrument(skip(self), fields(correlation_id = %key.correlation_id, agent_name = %key.agent_name))]
    async fn record_step_completed(
        &self,
        key: StepKey,
        attempt: u32,
        output_ref: String,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE steps SET status = ?, attempt = ?, output_ref = ?, finished_at = ? \
             WHERE correlation_id = ? AND agent_name = ? AND run_id = ?",
        )
        .bind(StepStatus::Completed.to_string())
        .bind(attempt as i64)
        .bind(output_ref)
        .bind(to_rfc3339(Utc::now()))
        .bind(key.correlation_id.to_string())
        .bind(key.agent_name)
        .bind(key.run_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    #[instrument(skip(self, error), fields(correlation_id = %key.correlation_id, agent_name = %key.agent_name))]
    async fn record_step_failed(
        &self,
        key: StepKey,
        attempt: u32,
        error: String,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE steps SET status = ?, attempt = ?, error = ?, finished_at = ? \
             WHERE correlation_id = ? AND agent_name = ? AND run_id = ?",
        )
        .bind(StepStatus::Failed.to_string())
        .bind(attempt as i64)
        .bind(error)
        .bind(to_rfc3339(Utc::now()))
        .bind(key.correlation_id.to_string())
        .bind(key.agent_name)
        .bind(key.run_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    async fn get_workflow(&self, correlation_id: Uuid) -> Result<Option<WorkflowRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE correlation_id = ?")
            .bind(correlation_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;
        row.map(|r| workflow_from_row(&r)).transpose()
    }

    async fn list_workflows(
        &self,
        filter: WorkflowFilter,
        pagination: Pagination,
    ) -> Result<Vec<WorkflowRecord>, RepositoryError> {
        let rows = if let Some(status) = filter.status {
            sqlx::query("SELECT * FROM workflows WHERE status = ? ORDER BY created_at LIMIT ? OFFSET ?")
                .bind(status.to_string())
                .bind(pagination.limit as i64)
                .bind(pagination.offset as i64)
                .fetch_all(&self.pool)
                .await
        } else {
            sqlx::query("SELECT * FROM workflows ORDER BY created_at LIMIT ? OFFSET ?")
                .bind(pagination.limit as i64)
                .bind(pagination.offset as i64)
                .fetch_all(&self.pool)
                .await
        }
        .map_err(backend_err)?;
        rows.iter().map(workflow_from_row).collect()
    }

    async fn get_steps(&self, correlation_id: Uuid) -> Result<Vec<StepRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM steps WHERE correlation_id = ? ORDER BY started_at")
            .bind(correlation_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;
        rows.iter().map(step_from_row).collect()
    }
}
