//! Process-local FIFO transport. No durability, no external dependencies.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::instrument;
use waybill_envelope::PaigeantMessage;

use crate::delivery::{Delivery, DeliveryStream, DeliveryTag};
use crate::error::TransportError;
use crate::transport::Transport;

#[derive(Default)]
struct TopicState {
    queue: VecDeque<Vec<u8>>,
    notify: Arc<Notify>,
}

/// In-process FIFO-per-topic transport.
///
/// Subscribing on an empty topic yields a live sequence that blocks
/// cooperatively until a message arrives, via a per-topic [`Notify`].
/// Acknowledgement bookkeeping is in-memory only — there is no durability
/// across process restarts, matching the variant's contract.
pub struct InMemoryTransport {
    topics: Mutex<HashMap<String, TopicState>>,
    inflight: Mutex<HashMap<u64, (String, Vec<u8>)>>,
    next_tag: AtomicU64,
    connected: AtomicBool,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    /// Construct an empty transport with no topics yet created.
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            next_tag: AtomicU64::new(0),
            connected: AtomicBool::new(false),
        }
    }

    fn notify_for(&self, topic: &str) -> Arc<Notify> {
        let mut topics = self.topics.lock();
        topics.entry(topic.to_string()).or_default().notify.clone()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    #[instrument(skip(self))]
    async fn connect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        // Wake any subscribers blocked in `notified()` so they observe the
        // disconnect and surface `TransportError::Closed`.
        let notifies: Vec<_> = self.topics.lock().values().map(|t| t.notify.clone()).collect();
        for n in notifies {
            n.notify_waiters();
        }
        Ok(())
    }

    #[instrument(skip(self, envelope), fields(correlation_id = %envelope.correlation_id))]
    async fn publish(&self, topic: &str, envelope: &PaigeantMessage) -> Result<(), TransportError> {
        let bytes = envelope
            .serialize()
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        let notify = {
            let mut topics = self.topics.lock();
            let state = topics.entry(topic.to_string()).or_default();
            state.queue.push_back(bytes);
            state.notify.clone()
        };
        notify.notify_waiters();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn subscribe(
        self: Arc<Self>,
        topic: &str,
        _consumer_name: &str,
    ) -> Result<DeliveryStream, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let topic = topic.to_string();
        let notify = self.notify_for(&topic);
        let this = self;

        let stream = async_stream::stream! {
            loop {
                if !this.connected.load(Ordering::SeqCst) {
                    return;
                }
                let popped = {
                    let mut guard = this.topics.lock();
                    guard.entry(topic.clone()).or_default().queue.pop_front()
                };
                match popped {
                    Some(bytes) => {
                        let tag_id = this.next_tag.fetch_add(1, Ordering::SeqCst);
                        let tag = DeliveryTag::new(topic.clone(), tag_id.to_string());
                        this
                            .inflight
                            .lock()
                            .insert(tag_id, (topic.clone(), bytes.clone()));
                        yield Delivery { tag, bytes };
                    }
                    None => {
                        notify.notified().await;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self))]
    async fn ack(&self, tag: &DeliveryTag) -> Result<(), TransportError> {
        let tag_id: u64 = tag
            .raw
            .parse()
            .map_err(|_| TransportError::UnknownDeliveryTag(tag.raw.clone()))?;
        self.inflight.lock().remove(&tag_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn nack(&self, tag: &DeliveryTag, requeue: bool) -> Result<(), TransportError> {
        let tag_id: u64 = tag
            .raw
            .parse()
            .map_err(|_| TransportError::UnknownDeliveryTag(tag.raw.clone()))?;
        let entry = self.inflight.lock().remove(&tag_id);
        if let (true, Some((topic, bytes))) = (requeue, entry) {
            let notify = {
                let mut topics = self.topics.lock();
                let state = topics.entry(topic).or_default();
                state.queue.push_back(bytes);
                state.notify.clone()
            };
            notify.notify_waiters();
        }
        Ok(())
    }
}
