//! A direct-loader factory that records what it was asked to do.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::accumulator::{DirectLoadResult, DirectLoader, DirectLoaderFactory};
use crate::core::{DestinationRecord, StreamDescriptor};

#[derive(Debug, Clone, Copy)]
enum Behavior {
    CompleteEvery(usize),
    Never,
    Fail,
}

#[derive(Debug, Default)]
struct Calls {
    created: Vec<(StreamDescriptor, usize)>,
    accepted: usize,
    finished: usize,
}

/// Creates [`RecordingLoader`]s and tracks calls across all of them.
///
/// Clones share their call log.
#[derive(Debug, Clone)]
pub struct RecordingLoaderFactory {
    behavior: Behavior,
    calls: Arc<Mutex<Calls>>,
}

impl RecordingLoaderFactory {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(Mutex::new(Calls::default())),
        }
    }

    /// Loaders report completion after every `n` records.
    #[must_use]
    pub fn completing_every(n: usize) -> Self {
        Self::with_behavior(Behavior::CompleteEvery(n.max(1)))
    }

    /// Loaders only complete on finish.
    #[must_use]
    pub fn never_completing() -> Self {
        Self::with_behavior(Behavior::Never)
    }

    /// Loaders fail on every record.
    #[must_use]
    pub fn failing() -> Self {
        Self::with_behavior(Behavior::Fail)
    }

    /// Every `(stream, partition)` a loader was created for.
    #[must_use]
    pub fn created(&self) -> Vec<(StreamDescriptor, usize)> {
        self.calls.lock().created.clone()
    }

    /// Records accepted over all loaders.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.calls.lock().accepted
    }

    /// Finish calls over all loaders.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.calls.lock().finished
    }
}

#[async_trait]
impl DirectLoaderFactory for RecordingLoaderFactory {
    type Loader = RecordingLoader;

    async fn create(&self, stream: &StreamDescriptor, partition: usize) -> anyhow::Result<RecordingLoader> {
        self.calls.lock().created.push((stream.clone(), partition));
        Ok(RecordingLoader {
            behavior: self.behavior,
            buffered: 0,
            calls: Arc::clone(&self.calls),
        })
    }
}

/// A loader created by [`RecordingLoaderFactory`].
#[derive(Debug)]
pub struct RecordingLoader {
    behavior: Behavior,
    buffered: usize,
    calls: Arc<Mutex<Calls>>,
}

#[async_trait]
impl DirectLoader for RecordingLoader {
    async fn accept(&mut self, record: DestinationRecord) -> anyhow::Result<DirectLoadResult> {
        if matches!(self.behavior, Behavior::Fail) {
            anyhow::bail!("loader rejected record for {}", record.stream);
        }
        self.calls.lock().accepted += 1;
        self.buffered += 1;

        match self.behavior {
            Behavior::CompleteEvery(n) if self.buffered >= n => {
                self.buffered = 0;
                Ok(DirectLoadResult::Complete)
            }
            _ => Ok(DirectLoadResult::Incomplete),
        }
    }

    async fn finish(&mut self) -> anyhow::Result<()> {
        self.buffered = 0;
        self.calls.lock().finished += 1;
        Ok(())
    }
}
