//! Adapter for destinations that buffer internally.
//!
//! Such destinations only expose a per-stream loader with
//! `accept(record) -> Incomplete | Complete` and `finish()`; they need none
//! of the richer per-key batch bookkeeping.

use super::{AccumulatorResult, BatchAccumulator, WithBatchState};
use crate::core::{BatchState, DestinationRecord, StreamDescriptor, StreamKey, WithStream};
use crate::errors::{LoadflowError, Result};
use async_trait::async_trait;

/// Whether a direct loader has finished its current unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectLoadResult {
    /// Keep feeding records.
    Incomplete,
    /// The loader wrote everything it accepted and is done.
    Complete,
}

/// A destination writer that manages its own buffering.
#[async_trait]
pub trait DirectLoader: Send + 'static {
    /// Accepts one record.
    async fn accept(&mut self, record: DestinationRecord) -> anyhow::Result<DirectLoadResult>;

    /// Writes anything still buffered.
    async fn finish(&mut self) -> anyhow::Result<()>;
}

/// Creates a loader per stream and worker.
#[async_trait]
pub trait DirectLoaderFactory: Send + Sync + 'static {
    /// The loader type.
    type Loader: DirectLoader;

    /// Creates a loader for `stream` on worker `partition`.
    async fn create(&self, stream: &StreamDescriptor, partition: usize) -> anyhow::Result<Self::Loader>;
}

/// Accumulator state: the loader and the stream it writes.
#[derive(Debug)]
pub struct DirectLoadState<L> {
    stream: StreamDescriptor,
    loader: L,
}

/// Output of a direct-load batch. Always complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectLoadAccResult;

impl WithBatchState for DirectLoadAccResult {
    fn batch_state(&self) -> BatchState {
        BatchState::Complete
    }
}

/// Adapts a [`DirectLoaderFactory`] to the [`BatchAccumulator`] contract.
#[derive(Debug)]
pub struct DirectLoadRecordAccumulator<F> {
    factory: F,
}

impl<F> DirectLoadRecordAccumulator<F> {
    /// Wraps `factory`.
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl<F> BatchAccumulator for DirectLoadRecordAccumulator<F>
where
    F: DirectLoaderFactory,
{
    type State = DirectLoadState<F::Loader>;
    type Key = StreamKey;
    type Input = DestinationRecord;
    type Output = DirectLoadAccResult;

    async fn start(&self, key: &StreamKey, partition: usize) -> Result<Self::State> {
        let stream = key.stream().clone();
        let loader = self
            .factory
            .create(&stream, partition)
            .await
            .map_err(|e| LoadflowError::sink(&stream, e))?;
        Ok(DirectLoadState { stream, loader })
    }

    async fn accept(
        &self,
        input: DestinationRecord,
        mut state: Self::State,
    ) -> Result<AccumulatorResult<Self::State, DirectLoadAccResult>> {
        let outcome = state.loader.accept(input).await;
        match outcome {
            Ok(DirectLoadResult::Incomplete) => Ok(AccumulatorResult::Incomplete(state)),
            Ok(DirectLoadResult::Complete) => Ok(AccumulatorResult::Complete(DirectLoadAccResult)),
            Err(e) => Err(LoadflowError::sink(&state.stream, e)),
        }
    }

    async fn finish(&self, mut state: Self::State) -> Result<DirectLoadAccResult> {
        state
            .loader
            .finish()
            .await
            .map_err(|e| LoadflowError::sink(&state.stream, e))?;
        Ok(DirectLoadAccResult)
    }
}
