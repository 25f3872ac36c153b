//! Destination sinks for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::{CheckpointId, DestinationRecord, StreamDescriptor};
use crate::sink::DestinationSink;

/// One recorded `load_batch` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCall {
    /// The stream loaded.
    pub stream: StreamDescriptor,
    /// The worker that loaded it.
    pub partition: usize,
    /// The payloads, in order.
    pub data: Vec<serde_json::Value>,
    /// The checkpoint of each record.
    pub checkpoints: Vec<CheckpointId>,
}

impl LoadCall {
    /// Number of records in the call.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the call carried no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A sink that records every load and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingSink {
    loads: Mutex<Vec<LoadCall>>,
    delay: Option<Duration>,
}

impl RecordingSink {
    /// Creates a new recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` inside every load.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns all recorded loads.
    #[must_use]
    pub fn loads(&self) -> Vec<LoadCall> {
        self.loads.lock().clone()
    }

    /// Returns the number of loads.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.lock().len()
    }

    /// Returns the number of records loaded over all calls.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.loads.lock().iter().map(LoadCall::len).sum()
    }

    /// Returns the number of records loaded for `stream`.
    #[must_use]
    pub fn record_count_for(&self, stream: &StreamDescriptor) -> usize {
        self.loads
            .lock()
            .iter()
            .filter(|call| &call.stream == stream)
            .map(LoadCall::len)
            .sum()
    }
}

#[async_trait]
impl DestinationSink for RecordingSink {
    async fn load_batch(
        &self,
        stream: &StreamDescriptor,
        partition: usize,
        records: &[DestinationRecord],
    ) -> anyhow::Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.loads.lock().push(LoadCall {
            stream: stream.clone(),
            partition,
            data: records.iter().map(|r| r.data.clone()).collect(),
            checkpoints: records.iter().map(|r| r.checkpoint_id).collect(),
        });
        Ok(())
    }
}

/// A sink that always fails.
#[derive(Debug)]
pub struct FailingSink {
    error: String,
    calls: AtomicUsize,
}

impl FailingSink {
    /// Creates a sink failing with `error`.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of load attempts.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DestinationSink for FailingSink {
    async fn load_batch(
        &self,
        _stream: &StreamDescriptor,
        _partition: usize,
        _records: &[DestinationRecord],
    ) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("{}", self.error)
    }
}

/// A sink that fails a fixed number of times before recording loads.
#[derive(Debug)]
pub struct FlakySink {
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
    inner: RecordingSink,
}

impl FlakySink {
    /// Fails the first `failures` calls.
    #[must_use]
    pub fn new(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            inner: RecordingSink::new(),
        }
    }

    /// Returns every attempt, failed or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Returns the sink recording successful loads.
    #[must_use]
    pub fn recorded(&self) -> &RecordingSink {
        &self.inner
    }
}

#[async_trait]
impl DestinationSink for FlakySink {
    async fn load_batch(
        &self,
        stream: &StreamDescriptor,
        partition: usize,
        records: &[DestinationRecord],
    ) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            anyhow::bail!("transient failure loading {stream}");
        }
        self.inner.load_batch(stream, partition, records).await
    }
}
