//! In-memory record buffering, the first half of a two-step pipeline.

use super::{AccumulatorResult, BatchAccumulator, WithBatchState};
use crate::core::{BatchState, DestinationRecord, StreamDescriptor, StreamKey, WithStream};
use crate::errors::Result;
use async_trait::async_trait;

/// Records collected for one stream by one worker.
#[derive(Debug)]
pub struct RecordBuffer {
    stream: StreamDescriptor,
    partition: usize,
    records: Vec<DestinationRecord>,
    size_bytes: u64,
}

impl RecordBuffer {
    fn into_batch(self) -> RecordBatch {
        RecordBatch {
            stream: self.stream,
            partition: self.partition,
            records: self.records,
            size_bytes: self.size_bytes,
        }
    }
}

/// A staged batch of records, ready for the load step.
#[derive(Debug)]
pub struct RecordBatch {
    /// The stream the records belong to.
    pub stream: StreamDescriptor,
    /// The worker that built the batch.
    pub partition: usize,
    /// The buffered records, in arrival order.
    pub records: Vec<DestinationRecord>,
    /// Summed serialized size of the records.
    pub size_bytes: u64,
}

impl RecordBatch {
    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl WithBatchState for RecordBatch {
    fn batch_state(&self) -> BatchState {
        BatchState::Staged
    }
}

/// Buffers records per stream, completing early once a byte limit is reached.
#[derive(Debug, Clone, Copy)]
pub struct RecordBufferAccumulator {
    max_buffer_bytes: u64,
}

impl RecordBufferAccumulator {
    /// Completes a buffer once it holds `max_buffer_bytes`.
    #[must_use]
    pub fn new(max_buffer_bytes: u64) -> Self {
        Self { max_buffer_bytes }
    }

    /// Never completes on its own; only flush triggers end a buffer.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(u64::MAX)
    }
}

#[async_trait]
impl BatchAccumulator for RecordBufferAccumulator {
    type State = RecordBuffer;
    type Key = StreamKey;
    type Input = DestinationRecord;
    type Output = RecordBatch;

    async fn start(&self, key: &StreamKey, partition: usize) -> Result<RecordBuffer> {
        Ok(RecordBuffer {
            stream: key.stream().clone(),
            partition,
            records: Vec::new(),
            size_bytes: 0,
        })
    }

    async fn accept(
        &self,
        input: DestinationRecord,
        mut state: RecordBuffer,
    ) -> Result<AccumulatorResult<RecordBuffer, RecordBatch>> {
        state.size_bytes += input.serialized_size_bytes;
        state.records.push(input);

        if state.size_bytes >= self.max_buffer_bytes {
            return Ok(AccumulatorResult::Complete(state.into_batch()));
        }
        Ok(AccumulatorResult::Incomplete(state))
    }

    async fn finish(&self, state: RecordBuffer) -> Result<RecordBatch> {
        Ok(state.into_batch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CheckpointId;
    use serde_json::json;

    fn record(size: u64) -> DestinationRecord {
        DestinationRecord::new(StreamDescriptor::new("s"), json!({}), CheckpointId(0)).with_size(size)
    }

    #[tokio::test]
    async fn test_completes_at_byte_limit() {
        let acc = RecordBufferAccumulator::new(100);
        let key = StreamKey(StreamDescriptor::new("s"));

        let state = acc.start(&key, 2).await.unwrap();
        let AccumulatorResult::Incomplete(state) = acc.accept(record(60), state).await.unwrap() else {
            panic!("expected an open buffer");
        };
        let AccumulatorResult::Complete(batch) = acc.accept(record(40), state).await.unwrap() else {
            panic!("expected completion at the byte limit");
        };

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.size_bytes, 100);
        assert_eq!(batch.partition, 2);
        assert_eq!(batch.batch_state(), BatchState::Staged);
    }

    #[tokio::test]
    async fn test_finish_returns_buffer() {
        let acc = RecordBufferAccumulator::unbounded();
        let key = StreamKey(StreamDescriptor::new("s"));

        let state = acc.start(&key, 0).await.unwrap();
        let AccumulatorResult::Incomplete(state) = acc.accept(record(10), state).await.unwrap() else {
            panic!("unbounded buffer completed");
        };
        let batch = acc.finish(state).await.unwrap();

        assert_eq!(batch.len(), 1);
        assert!(!batch.is_empty());
    }
}
