//! The `Transport` contract

use std::sync::Arc;

use async_trait::async_trait;
use waybill_envelope::PaigeantMessage;

use crate::delivery::{DeliveryStream, DeliveryTag};
use crate::error::TransportError;

/// Pluggable publish/subscribe/ack/nack over named topics with
/// at-least-once delivery.
///
/// Implementations must be safe to share across tasks (`Send + Sync`) since
/// a single transport instance is threaded through dispatcher and executor
/// construction rather than recreated per call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Acquire broker resources. Idempotent; calling `connect` on an
    /// already-connected transport is a no-op success.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Release broker resources. Idempotent; safe to call during an
    /// in-flight subscription, which then yields [`TransportError::Closed`]
    /// to the subscriber.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// At-least-once durable handoff onto `topic`. A successful return
    /// implies the message is recoverable by some subscriber of `topic`
    /// even after a transport restart, for durable variants.
    async fn publish(&self, topic: &str, envelope: &PaigeantMessage) -> Result<(), TransportError>;

    /// Subscribe to `topic` under the given consumer name. Multiple
    /// subscribers on the same topic form a competing-consumer group: each
    /// delivery goes to exactly one of them. `consumer_name` is ignored by
    /// variants with no notion of named consumers.
    ///
    /// Takes `self: Arc<Self>` because the returned stream is `'static` and
    /// must hold its own strong reference to the transport for as long as
    /// it is polled.
    async fn subscribe(
        self: Arc<Self>,
        topic: &str,
        consumer_name: &str,
    ) -> Result<DeliveryStream, TransportError>;

    /// Confirm processing of a delivery. Idempotent; acking an
    /// already-acked or unknown tag is not an error.
    async fn ack(&self, tag: &DeliveryTag) -> Result<(), TransportError>;

    /// Reject a delivery. If `requeue` is true the message becomes eligible
    /// for redelivery; variants that cannot truly requeue (append-only
    /// streams) republish the raw bytes to the end of the same topic and
    /// ack the original, per the transport contract.
    async fn nack(&self, tag: &DeliveryTag, requeue: bool) -> Result<(), TransportError>;
}
