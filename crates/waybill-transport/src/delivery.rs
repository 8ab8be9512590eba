//! Delivery tags and the delivery envelope carried out of `subscribe`.

use futures::stream::BoxStream;

/// Identifies one delivered message so it can later be acked or nacked.
///
/// `topic` is carried alongside the transport-native `raw` tag because
/// durable variants (consumer groups) need the topic to issue the
/// acknowledgement against the right stream/group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTag {
    /// Topic this delivery was received on.
    pub topic: String,
    /// Transport-native identifier (a synthetic counter for the in-memory
    /// variant; a stream entry ID for the durable variant).
    pub raw: String,
}

impl DeliveryTag {
    /// Construct a new tag.
    pub fn new(topic: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            raw: raw.into(),
        }
    }
}

/// One delivered message: its tag and the raw bytes as published.
///
/// Deserialization is deliberately left to the caller (the activity
/// executor), since a malformed delivery must still be acked and dropped
/// per the transport's failure-surface contract — the transport itself has
/// no opinion on envelope structure.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The tag to ack/nack this delivery with.
    pub tag: DeliveryTag,
    /// Raw published bytes.
    pub bytes: Vec<u8>,
}

/// A live stream of deliveries on one topic, as returned by `subscribe`.
pub type DeliveryStream = BoxStream<'static, Delivery>;
