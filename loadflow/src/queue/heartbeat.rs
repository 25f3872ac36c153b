//! Periodic heartbeats merged into a step's input queue.

use super::QueueWriter;
use crate::core::PipelineEvent;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Broadcasts [`PipelineEvent::Heartbeat`] to every partition at a fixed cadence.
///
/// The ticker stops when the queue closes, when [`stop`](Self::stop) is
/// called, or when it is dropped.
#[derive(Debug)]
pub struct HeartbeatTicker {
    handle: JoinHandle<()>,
}

impl HeartbeatTicker {
    /// Starts ticking every `interval`. The first heartbeat is sent after one interval.
    #[must_use]
    pub fn spawn<K, T>(writer: QueueWriter<PipelineEvent<K, T>>, interval: Duration) -> Self
    where
        K: Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks.tick().await;

            loop {
                ticks.tick().await;
                if let Err(e) = writer.broadcast(|| PipelineEvent::Heartbeat).await {
                    debug!(error = %e, "Heartbeat ticker stopping");
                    break;
                }
            }
        });
        Self { handle }
    }

    /// Stops the ticker.
    pub fn stop(self) {
        self.handle.abort();
    }

    /// Returns true once the ticker has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for HeartbeatTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{CloseableQueue, PartitionedQueue};

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_partition() {
        let queue = PartitionedQueue::<PipelineEvent<u8, u8>>::new("q", 2, 8);
        let mut rx0 = queue.consume(0).unwrap();
        let mut rx1 = queue.consume(1).unwrap();
        let ticker = HeartbeatTicker::spawn(queue.writer(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(11)).await;
        ticker.stop();

        for rx in [&mut rx0, &mut rx1] {
            assert!(rx.recv().await.unwrap().is_heartbeat());
            assert!(rx.recv().await.unwrap().is_heartbeat());
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_queue_closes() {
        let queue = PartitionedQueue::<PipelineEvent<u8, u8>>::new("q", 1, 8);
        let _rx = queue.consume(0).unwrap();
        let ticker = HeartbeatTicker::spawn(queue.writer(), Duration::from_secs(1));

        queue.close();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(ticker.is_finished());
    }
}
