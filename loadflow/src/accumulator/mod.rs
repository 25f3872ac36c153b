//! The batch accumulator contract and its provided variants.
//!
//! An accumulator defines how raw inputs for one key become a
//! destination-ready unit: [`BatchAccumulator::start`] opens per-key state,
//! [`BatchAccumulator::accept`] folds one input into it (and may complete the
//! batch early), and [`BatchAccumulator::finish`] force-completes it. The
//! accumulation task decides *when* to finish; the accumulator decides
//! *what* finishing means.

mod buffer;
mod direct_load;
mod load;

pub use buffer::{RecordBatch, RecordBuffer, RecordBufferAccumulator};
pub use direct_load::{
    DirectLoadAccResult, DirectLoadRecordAccumulator, DirectLoadResult, DirectLoadState,
    DirectLoader, DirectLoaderFactory,
};
pub use load::{IntoRecords, LoadBatchAccumulator, LoadBuffer, LoadedBatch};

use crate::core::{BatchState, PipelineKey};
use crate::errors::Result;
use async_trait::async_trait;

/// Outcome of accepting one input.
#[derive(Debug)]
pub enum AccumulatorResult<S, O> {
    /// The batch stays open with the updated state.
    Incomplete(S),
    /// The accumulator completed the batch on its own.
    Complete(O),
}

impl<S, O> AccumulatorResult<S, O> {
    /// Returns true for an early completion.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// An output that knows which durability state it represents.
pub trait WithBatchState {
    /// The state reported for the records in this output.
    fn batch_state(&self) -> BatchState;
}

/// Per-key state machine turning inputs into outputs.
#[async_trait]
pub trait BatchAccumulator: Send + Sync + 'static {
    /// Per-key state while a batch is open.
    type State: Send + 'static;
    /// The grouping key.
    type Key: PipelineKey;
    /// Values folded into a batch.
    type Input: Send + 'static;
    /// What a completed batch produces.
    type Output: WithBatchState + Send + 'static;

    /// Opens state for a new batch of `key` on worker `partition`.
    async fn start(&self, key: &Self::Key, partition: usize) -> Result<Self::State>;

    /// Folds `input` into `state`.
    async fn accept(
        &self,
        input: Self::Input,
        state: Self::State,
    ) -> Result<AccumulatorResult<Self::State, Self::Output>>;

    /// Force-completes the batch.
    async fn finish(&self, state: Self::State) -> Result<Self::Output>;
}
