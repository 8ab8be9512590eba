//! Construct a concrete [`Transport`] / [`WorkflowRepository`] from
//! [`WaybillConfig`]. Wiring only — no business logic, matching the
//! reference repository's convention of keeping its own CLI a thin wrapper
//! over library crates.

use std::sync::Arc;

use waybill_repository::{InMemoryRepository, SqlRepository, WorkflowRepository};
use waybill_runtime::{RepositoryKind, TransportKind, WaybillConfig};
use waybill_transport::{InMemoryTransport, RedisTransport, RedisTransportConfig, Transport};

/// Build the transport named by `config.transport_kind`.
pub fn build_transport(config: &WaybillConfig) -> anyhow::Result<Arc<dyn Transport>> {
    match config.transport_kind {
        TransportKind::InMemory => Ok(Arc::new(InMemoryTransport::new())),
        TransportKind::Redis => {
            let dsn = config
                .transport_dsn
                .clone()
                .ok_or_else(|| anyhow::anyhow!("WAYBILL_TRANSPORT_DSN is required for the redis transport"))?;
            Ok(Arc::new(RedisTransport::new(RedisTransportConfig { dsn })))
        }
    }
}

/// Build the repository named by `config.repository_kind`.
pub async fn build_repository(config: &WaybillConfig) -> anyhow::Result<Arc<dyn WorkflowRepository>> {
    match config.repository_kind {
        RepositoryKind::InMemory => Ok(Arc::new(InMemoryRepository::new())),
        RepositoryKind::Sql => {
            let dsn = config
                .repository_dsn
                .clone()
                .ok_or_else(|| anyhow::anyhow!("WAYBILL_REPOSITORY_DSN is required for the sql repository"))?;
            Ok(Arc::new(SqlRepository::connect(&dsn).await?))
        }
    }
}
