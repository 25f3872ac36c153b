//! Bounded, partitioned queues connecting pipeline steps.
//!
//! Each partition is a `tokio::sync::mpsc` channel consumed by exactly one
//! task. Producers hold [`QueueWriter`]s; the queue closes when [`close`]
//! is called or when the last writer is dropped, after which consumers
//! drain what is buffered and then see the end of their stream.
//!
//! [`close`]: PartitionedQueue::close

mod heartbeat;
mod input;

pub use heartbeat::HeartbeatTicker;
pub use input::PipelineInput;

use crate::errors::{LoadflowError, Result};
use futures::future::try_join_all;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Something that can be closed to signal its consumers.
pub trait CloseableQueue: Send + Sync {
    /// The queue name, for logs.
    fn name(&self) -> &str;

    /// Stops accepting items. Buffered items are still delivered.
    fn close(&self);

    /// Returns true once closed.
    fn is_closed(&self) -> bool;
}

/// A fixed number of bounded channels, one per consumer partition.
pub struct PartitionedQueue<T> {
    name: String,
    num_partitions: usize,
    senders: RwLock<Option<Vec<mpsc::Sender<T>>>>,
    receivers: Mutex<Vec<Option<mpsc::Receiver<T>>>>,
    writers: AtomicUsize,
}

impl<T: Send + 'static> PartitionedQueue<T> {
    /// Creates `num_partitions` channels holding up to `capacity` items each.
    #[must_use]
    pub fn new(name: impl Into<String>, num_partitions: usize, capacity: usize) -> Arc<Self> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..num_partitions.max(1))
            .map(|_| {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                (tx, Some(rx))
            })
            .unzip();

        Arc::new(Self {
            name: name.into(),
            num_partitions: num_partitions.max(1),
            senders: RwLock::new(Some(senders)),
            receivers: Mutex::new(receivers),
            writers: AtomicUsize::new(0),
        })
    }

    /// Number of partitions.
    #[must_use]
    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Creates a producer handle.
    #[must_use]
    pub fn writer(self: &Arc<Self>) -> QueueWriter<T> {
        self.writers.fetch_add(1, Ordering::AcqRel);
        QueueWriter {
            queue: Arc::clone(self),
        }
    }

    /// Takes the consumer end of `partition`. Each partition has one consumer.
    pub fn consume(&self, partition: usize) -> Result<mpsc::Receiver<T>> {
        let mut receivers = self.receivers.lock();
        let slot = receivers
            .get_mut(partition)
            .ok_or_else(|| self.invalid_partition(partition))?;
        slot.take()
            .ok_or_else(|| LoadflowError::QueueClosed(format!("{}[{partition}] (already consumed)", self.name)))
    }

    fn sender(&self, partition: usize) -> Result<mpsc::Sender<T>> {
        let senders = self.senders.read();
        let senders = senders
            .as_ref()
            .ok_or_else(|| LoadflowError::QueueClosed(self.name.clone()))?;
        senders
            .get(partition)
            .cloned()
            .ok_or_else(|| self.invalid_partition(partition))
    }

    fn invalid_partition(&self, partition: usize) -> LoadflowError {
        LoadflowError::InvalidPartition {
            queue: self.name.clone(),
            partition,
            num_partitions: self.num_partitions,
        }
    }
}

impl<T: Send + 'static> CloseableQueue for PartitionedQueue<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&self) {
        if self.senders.write().take().is_some() {
            debug!(queue = %self.name, "Queue closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.senders.read().is_none()
    }
}

/// A producer handle for a [`PartitionedQueue`].
pub struct QueueWriter<T: Send + 'static> {
    queue: Arc<PartitionedQueue<T>>,
}

impl<T: Send + 'static> QueueWriter<T> {
    /// Sends `item` to `partition`, waiting while that partition is full.
    pub async fn publish(&self, item: T, partition: usize) -> Result<()> {
        let sender = self.queue.sender(partition)?;
        sender
            .send(item)
            .await
            .map_err(|_| LoadflowError::QueueClosed(self.queue.name.clone()))
    }

    /// Sends one item built by `make` to every partition.
    pub async fn broadcast(&self, make: impl Fn() -> T) -> Result<()> {
        try_join_all((0..self.num_partitions()).map(|part| self.publish(make(), part))).await?;
        Ok(())
    }

    /// Number of partitions of the underlying queue.
    #[must_use]
    pub fn num_partitions(&self) -> usize {
        self.queue.num_partitions
    }

    /// Closes the underlying queue for every writer.
    pub fn close(&self) {
        self.queue.close();
    }

    /// Returns true once the underlying queue is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl<T> std::fmt::Debug for PartitionedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedQueue")
            .field("name", &self.name)
            .field("num_partitions", &self.num_partitions)
            .field("writers", &self.writers.load(Ordering::Relaxed))
            .field("closed", &self.senders.read().is_none())
            .finish()
    }
}

impl<T: Send + 'static> std::fmt::Debug for QueueWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueWriter").field("queue", &self.queue.name).finish()
    }
}

impl<T: Send + 'static> Clone for QueueWriter<T> {
    fn clone(&self) -> Self {
        self.queue.writer()
    }
}

impl<T: Send + 'static> Drop for QueueWriter<T> {
    fn drop(&mut self) {
        if self.queue.writers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.queue.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_routes_to_partition() {
        let queue = PartitionedQueue::new("q", 2, 4);
        let writer = queue.writer();
        let mut rx1 = queue.consume(1).unwrap();

        writer.publish(7, 1).await.unwrap();
        assert_eq!(rx1.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_consume_once() {
        let queue = PartitionedQueue::<u32>::new("q", 1, 4);
        let _rx = queue.consume(0).unwrap();

        assert!(matches!(queue.consume(0), Err(LoadflowError::QueueClosed(_))));
        assert!(matches!(
            queue.consume(3),
            Err(LoadflowError::InvalidPartition { partition: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_last_writer_drop_closes() {
        let queue = PartitionedQueue::new("q", 1, 4);
        let mut rx = queue.consume(0).unwrap();
        let a = queue.writer();
        let b = a.clone();

        a.publish(1, 0).await.unwrap();
        drop(a);
        assert!(!queue.is_closed());

        b.publish(2, 0).await.unwrap();
        drop(b);
        assert!(queue.is_closed());

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        let queue = PartitionedQueue::new("q", 1, 4);
        let writer = queue.writer();
        queue.close();

        assert!(matches!(writer.publish(1, 0).await, Err(LoadflowError::QueueClosed(_))));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_partition() {
        let queue = PartitionedQueue::new("q", 3, 4);
        let writer = queue.writer();
        let mut receivers: Vec<_> = (0..3).map(|p| queue.consume(p).unwrap()).collect();

        writer.broadcast(|| "tick").await.unwrap();
        for rx in &mut receivers {
            assert_eq!(rx.recv().await, Some("tick"));
        }
    }
}
