//! `WaybillConfig` — environment-driven process configuration.
//!
//! A small, explicit struct with field-by-field defaults, read once at
//! process start via `dotenvy::dotenv().ok()` followed by `std::env::var`
//! lookups — not a generic deserialize-from-env macro, matching the
//! reference repository's preference for explicit config structs.

use std::time::Duration;

use uuid::Uuid;

/// Which transport backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Process-local, non-durable.
    InMemory,
    /// Redis streams with consumer groups.
    Redis,
}

/// Which repository backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryKind {
    /// Process-local, non-durable.
    InMemory,
    /// `sqlx`-backed, either SQLite or Postgres depending on the DSN scheme.
    Sql,
}

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct WaybillConfig {
    /// Which transport to construct.
    pub transport_kind: TransportKind,
    /// Connection string for the transport, when not in-memory.
    pub transport_dsn: Option<String>,
    /// Which repository to construct.
    pub repository_kind: RepositoryKind,
    /// Connection string for the repository, when not in-memory.
    pub repository_dsn: Option<String>,
    /// Default retry ceiling for a step.
    pub max_attempts: u32,
    /// Default cumulative dynamic-insertion bound.
    pub max_insertions: u32,
    /// Base delay for the first retry.
    pub backoff_base: Duration,
    /// Ceiling no computed retry delay exceeds.
    pub backoff_cap: Duration,
    /// This process's worker identity, used as the transport consumer name.
    pub worker_id: String,
}

impl Default for WaybillConfig {
    fn default() -> Self {
        Self {
            transport_kind: TransportKind::InMemory,
            transport_dsn: None,
            repository_kind: RepositoryKind::InMemory,
            repository_dsn: None,
            max_attempts: 5,
            max_insertions: 3,
            backoff_base: Duration::from_millis(200),
            backoff_cap: Duration::from_secs(30),
            worker_id: format!("worker-{}", Uuid::now_v7()),
        }
    }
}

impl WaybillConfig {
    /// Load configuration from the process environment, falling back to
    /// [`Default`] for any variable that is unset or fails to parse.
    ///
    /// Does not call `dotenvy::dotenv()` itself — that is the CLI binary's
    /// responsibility, run once before any config is loaded.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let transport_kind = match std::env::var("WAYBILL_TRANSPORT").ok().as_deref() {
            Some("redis") => TransportKind::Redis,
            _ => TransportKind::InMemory,
        };
        let repository_kind = match std::env::var("WAYBILL_REPOSITORY").ok().as_deref() {
            Some("sql") => RepositoryKind::Sql,
            _ => RepositoryKind::InMemory,
        };

        Self {
            transport_kind,
            transport_dsn: std::env::var("WAYBILL_TRANSPORT_DSN").ok(),
            repository_kind,
            repository_dsn: std::env::var("WAYBILL_REPOSITORY_DSN").ok(),
            max_attempts: parse_env_or("WAYBILL_MAX_ATTEMPTS", defaults.max_attempts),
            max_insertions: parse_env_or("WAYBILL_MAX_INSERTIONS", defaults.max_insertions),
            backoff_base: parse_millis_env_or("WAYBILL_BACKOFF_BASE_MS", defaults.backoff_base),
            backoff_cap: parse_millis_env_or("WAYBILL_BACKOFF_CAP_MS", defaults.backoff_cap),
            worker_id: std::env::var("WAYBILL_WORKER_ID").unwrap_or(defaults.worker_id),
        }
    }
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_millis_env_or(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
