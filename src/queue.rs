//! Retry queue abstraction
//!
//! The dispatcher consumes work through [`RetryQueue`] so the core stays
//! broker-agnostic: `publish` enqueues a [`RetryEnvelope`], `consume` hands
//! out bounded groups of [`Delivery`] handles, and `ack`/`nack` settle them.
//! [`MemoryQueue`] is the in-process default broker.

use crate::error::Result;
use crate::types::RetryEnvelope;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One consumed envelope awaiting settlement
///
/// The `tag` identifies this delivery to `ack`/`nack`; it is unique per
/// delivery, not per envelope, so a redelivered envelope gets a fresh tag.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Broker-assigned delivery tag
    pub tag: u64,
    /// The envelope carried by this delivery
    pub envelope: RetryEnvelope,
}

/// Broker interface for queued retry envelopes
#[async_trait]
pub trait RetryQueue: Send + Sync {
    /// Enqueue an envelope for delivery
    async fn publish(&self, envelope: RetryEnvelope) -> Result<()>;

    /// Consume up to `max` pending envelopes
    ///
    /// Returns an empty vec when the queue is idle. Consumed deliveries stay
    /// in flight until settled with [`ack`](Self::ack) or
    /// [`nack`](Self::nack).
    async fn consume(&self, max: usize) -> Result<Vec<Delivery>>;

    /// Mark a delivery consumed; the envelope will not be seen again
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Signal failure; the broker may redeliver the envelope under its own
    /// retry policy
    async fn nack(&self, delivery: &Delivery) -> Result<()>;
}

/// In-process [`RetryQueue`] backed by a mutex-guarded deque
///
/// Nacked deliveries are requeued at the back, up to `max_redeliveries`
/// times per delivery chain; beyond that the envelope is dropped with a
/// warning. This mirrors the bounded retry policy a real broker applies to
/// nacked messages, and it is what keeps an always-failing envelope from
/// circulating forever.
#[derive(Clone)]
pub struct MemoryQueue {
    inner: Arc<Mutex<MemoryQueueInner>>,
    max_redeliveries: u32,
}

struct MemoryQueueInner {
    pending: VecDeque<QueuedItem>,
    in_flight: HashMap<u64, QueuedItem>,
    next_tag: u64,
}

struct QueuedItem {
    envelope: RetryEnvelope,
    redeliveries: u32,
}

/// Default redelivery ceiling for nacked envelopes
pub const DEFAULT_MAX_REDELIVERIES: u32 = 3;

impl MemoryQueue {
    /// Create an empty queue with the default redelivery ceiling
    pub fn new() -> Self {
        Self::with_max_redeliveries(DEFAULT_MAX_REDELIVERIES)
    }

    /// Create an empty queue with a custom redelivery ceiling
    pub fn with_max_redeliveries(max_redeliveries: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryQueueInner {
                pending: VecDeque::new(),
                in_flight: HashMap::new(),
                next_tag: 0,
            })),
            max_redeliveries,
        }
    }

    /// Number of envelopes waiting for delivery (excludes in-flight)
    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// True when nothing is pending and nothing is in flight
    pub async fn is_idle(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.pending.is_empty() && inner.in_flight.is_empty()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetryQueue for MemoryQueue {
    async fn publish(&self, envelope: RetryEnvelope) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.pending.push_back(QueuedItem {
            envelope,
            redeliveries: 0,
        });
        Ok(())
    }

    async fn consume(&self, max: usize) -> Result<Vec<Delivery>> {
        let mut inner = self.inner.lock().await;
        let mut deliveries = Vec::new();

        while deliveries.len() < max {
            let Some(item) = inner.pending.pop_front() else {
                break;
            };
            inner.next_tag += 1;
            let tag = inner.next_tag;
            deliveries.push(Delivery {
                tag,
                envelope: item.envelope.clone(),
            });
            inner.in_flight.insert(tag, item);
        }

        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(&delivery.tag);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(mut item) = inner.in_flight.remove(&delivery.tag) else {
            // Settling an unknown tag is a no-op, matching broker behavior
            // for already-settled deliveries.
            return Ok(());
        };

        item.redeliveries += 1;
        if item.redeliveries > self.max_redeliveries {
            tracing::warn!(
                job_ids = ?item.envelope.job_ids,
                redeliveries = item.redeliveries - 1,
                "dropping envelope after exhausting redeliveries"
            );
            return Ok(());
        }

        inner.pending.push_back(item);
        Ok(())
    }
}
