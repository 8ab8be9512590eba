//! Transport-level error taxonomy

use thiserror::Error;

/// Errors surfaced by a [`crate::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Unrecoverable configuration or connectivity issue on `connect`.
    #[error("transport connect failed: {0}")]
    Connect(String),

    /// The transport was disconnected while a subscription was in flight.
    #[error("transport closed")]
    Closed,

    /// `publish` could not hand the message off durably.
    #[error("transport publish failed: {0}")]
    Publish(String),

    /// `ack`/`nack` referenced a delivery tag the transport no longer knows
    /// about (already acked, or from a different connection generation).
    #[error("unknown delivery tag: {0}")]
    UnknownDeliveryTag(String),
}
