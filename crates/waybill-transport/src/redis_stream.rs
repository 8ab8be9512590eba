//! Durable transport backed by Redis streams.
//!
//! Each topic maps to one Redis stream; a single consumer group named
//! `waybill` is created (idempotently, `MKSTREAM`) per topic on first
//! subscribe. Acknowledgement removes the entry from the group's pending
//! entries list (`XACK`); `nack(requeue = true)` republishes the entry's
//! bytes to the end of the stream and acks the original, since stream
//! entries cannot be moved back to the head of their own log.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use waybill_envelope::PaigeantMessage;

use crate::delivery::{Delivery, DeliveryStream, DeliveryTag};
use crate::error::TransportError;
use crate::transport::Transport;

const GROUP_NAME: &str = "waybill";
const DATA_FIELD: &str = "data";
const BLOCK_MS: usize = 5_000;

/// Configuration for the Redis-backed durable transport.
#[derive(Debug, Clone)]
pub struct RedisTransportConfig {
    /// Redis connection string, e.g. `redis://127.0.0.1/`.
    pub dsn: String,
}

/// Transport variant durable across process and broker restarts, backed by
/// Redis streams with consumer groups.
pub struct RedisTransport {
    config: RedisTransportConfig,
    manager: Mutex<Option<ConnectionManager>>,
}

impl RedisTransport {
    /// Construct a transport that will lazily connect on `connect()`.
    pub fn new(config: RedisTransportConfig) -> Self {
        Self {
            config,
            manager: Mutex::new(None),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, TransportError> {
        let guard = self.manager.lock().await;
        guard.clone().ok_or(TransportError::Closed)
    }

    async fn ensure_group(&self, conn: &mut ConnectionManager, topic: &str) -> Result<(), TransportError> {
        let result: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(topic, GROUP_NAME, "$")
            .await;
        match result {
            Ok(()) => Ok(()),
            // BUSYGROUP: the group already exists, which is the steady state.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(TransportError::Connect(e.to_string())),
        }
    }
}

#[async_trait]
impl Transport for RedisTransport {
    #[instrument(skip(self))]
    async fn connect(&self) -> Result<(), TransportError> {
        let mut guard = self.manager.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let client = redis::Client::open(self.config.dsn.as_str())
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        *guard = Some(manager);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut guard = self.manager.lock().await;
        *guard = None;
        Ok(())
    }

    #[instrument(skip(self, envelope), fields(correlation_id = %envelope.correlation_id))]
    async fn publish(&self, topic: &str, envelope: &PaigeantMessage) -> Result<(), TransportError> {
        let bytes = envelope
            .serialize()
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        let mut conn = self.connection().await?;
        conn.xadd::<_, _, _, _, ()>(topic, "*", &[(DATA_FIELD, bytes)])
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn subscribe(
        self: Arc<Self>,
        topic: &str,
        consumer_name: &str,
    ) -> Result<DeliveryStream, TransportError> {
        let mut conn = self.connection().await?;
        self.ensure_group(&mut conn, topic).await?;

        let topic = topic.to_string();
        let consumer_name = consumer_name.to_string();
        let this = self;

        let stream = async_stream::stream! {
            loop {
                let mut conn = match this.connection().await {
                    Ok(c) => c,
                    Err(_) => return,
                };
                let opts = StreamReadOptions::default()
                    .group(GROUP_NAME, consumer_name.as_str())
                    .count(1)
                    .block(BLOCK_MS);
                let reply: redis::RedisResult<StreamReadReply> =
                    conn.xread_options(&[topic.as_str()], &[">"], &opts).await;
                match reply {
                    Ok(reply) => {
                        for stream_key in reply.keys {
                            for entry in stream_key.ids {
                                let bytes: Vec<u8> = entry
                                    .map
                                    .get(DATA_FIELD)
                                    .and_then(|v| match v {
                                        redis::Value::BulkString(b) => Some(b.clone()),
                                        _ => None,
                                    })
                                    .unwrap_or_default();
                                let tag = DeliveryTag::new(topic.clone(), entry.id.clone());
                                yield Delivery { tag, bytes };
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, topic = %topic, "xreadgroup failed, backing off");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self))]
    async fn ack(&self, tag: &DeliveryTag) -> Result<(), TransportError> {
        let mut conn = self.connection().await?;
        conn.xack::<_, _, _, ()>(&tag.topic, GROUP_NAME, &[tag.raw.as_str()])
            .await
            .map_err(|e| TransportError::UnknownDeliveryTag(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn nack(&self, tag: &DeliveryTag, requeue: bool) -> Result<(), TransportError> {
        let mut conn = self.connection().await?;
        if requeue {
            let range: Vec<(String, Vec<(String, redis::Value)>)> = conn
                .xrange(&tag.topic, &tag.raw, &tag.raw)
                .await
                .map_err(|e| TransportError::Publish(e.to_string()))?;
            if let Some((_, fields)) = range.into_iter().next() {
                let bytes = fields
                    .into_iter()
                    .find(|(k, _)| k == DATA_FIELD)
                    .and_then(|(_, v)| match v {
                        redis::Value::BulkString(b) => Some(b),
                        _ => None,
                    })
                    .unwrap_or_default();
                conn.xadd::<_, _, _, _, ()>(&tag.topic, "*", &[(DATA_FIELD, bytes)])
                    .await
                    .map_err(|e| TransportError::Publish(e.to_string()))?;
            }
        }
        conn.xack::<_, _, _, ()>(&tag.topic, GROUP_NAME, &[tag.raw.as_str()])
            .await
            .map_err(|e| TransportError::UnknownDeliveryTag(e.to_string()))?;
        Ok(())
    }
}
