//! Pluggable transport abstraction with at-least-once delivery guarantees.
//!
//! Two concrete variants are provided: [`InMemoryTransport`] (process-local
//! FIFO, no durability) and [`RedisTransport`] (durable streams with
//! consumer groups). Both implement the same [`Transport`] trait so the
//! dispatcher and executor never depend on a concrete variant.

mod delivery;
mod error;
mod memory;
mod redis_stream;
mod transport;

pub use delivery::{Delivery, DeliveryStream, DeliveryTag};
pub use error::TransportError;
pub use memory::InMemoryTransport;
pub use redis_stream::{RedisTransport, RedisTransportConfig};
pub use transport::Transport;
