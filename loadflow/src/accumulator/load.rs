//! Buffered loading through a [`DestinationSink`].

use super::{AccumulatorResult, BatchAccumulator, RecordBatch, WithBatchState};
use crate::core::{BatchState, DestinationRecord, PipelineKey, StreamDescriptor};
use crate::errors::{LoadflowError, Result};
use crate::sink::DestinationSink;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Inputs that can be flattened into records for loading.
pub trait IntoRecords: Send + 'static {
    /// Appends the records to `into`.
    fn extend_records(self, into: &mut Vec<DestinationRecord>);
}

impl IntoRecords for DestinationRecord {
    fn extend_records(self, into: &mut Vec<DestinationRecord>) {
        into.push(self);
    }
}

impl IntoRecords for RecordBatch {
    fn extend_records(self, into: &mut Vec<DestinationRecord>) {
        into.extend(self.records);
    }
}

/// Records waiting to be loaded for one key.
#[derive(Debug)]
pub struct LoadBuffer {
    stream: StreamDescriptor,
    partition: usize,
    records: Vec<DestinationRecord>,
    inputs: usize,
}

/// The result of a load: records are durable at the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedBatch {
    /// The stream that was loaded.
    pub stream: StreamDescriptor,
    /// The worker that loaded it.
    pub partition: usize,
    /// How many records were written.
    pub record_count: usize,
}

impl WithBatchState for LoadedBatch {
    fn batch_state(&self) -> BatchState {
        BatchState::Complete
    }
}

/// Buffers inputs and hands them to the sink when the batch completes.
///
/// With `max_inputs` set, the batch completes as soon as that many inputs
/// were accepted, which makes a load step write every staged batch as it
/// arrives.
pub struct LoadBatchAccumulator<D, K, I> {
    sink: Arc<D>,
    max_inputs: Option<usize>,
    _marker: PhantomData<fn() -> (K, I)>,
}

impl<D, K, I> LoadBatchAccumulator<D, K, I> {
    /// Creates an accumulator that loads only when the task flushes.
    pub fn new(sink: Arc<D>) -> Self {
        Self {
            sink,
            max_inputs: None,
            _marker: PhantomData,
        }
    }

    /// Completes each batch after `max_inputs` inputs.
    #[must_use]
    pub fn with_max_inputs(mut self, max_inputs: usize) -> Self {
        self.max_inputs = Some(max_inputs.max(1));
        self
    }
}

impl<D, K, I> std::fmt::Debug for LoadBatchAccumulator<D, K, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBatchAccumulator")
            .field("max_inputs", &self.max_inputs)
            .finish_non_exhaustive()
    }
}

impl<D, K, I> LoadBatchAccumulator<D, K, I>
where
    D: DestinationSink + 'static,
{
    async fn load(&self, buffer: LoadBuffer) -> Result<LoadedBatch> {
        let record_count = buffer.records.len();
        if record_count > 0 {
            self.sink
                .load_batch(&buffer.stream, buffer.partition, &buffer.records)
                .await
                .map_err(|e| LoadflowError::sink(&buffer.stream, e))?;
            debug!(
                stream = %buffer.stream,
                partition = buffer.partition,
                records = record_count,
                "Loaded batch"
            );
        }

        Ok(LoadedBatch {
            stream: buffer.stream,
            partition: buffer.partition,
            record_count,
        })
    }
}

#[async_trait]
impl<D, K, I> BatchAccumulator for LoadBatchAccumulator<D, K, I>
where
    D: DestinationSink + 'static,
    K: PipelineKey,
    I: IntoRecords,
{
    type State = LoadBuffer;
    type Key = K;
    type Input = I;
    type Output = LoadedBatch;

    async fn start(&self, key: &K, partition: usize) -> Result<LoadBuffer> {
        Ok(LoadBuffer {
            stream: key.stream().clone(),
            partition,
            records: Vec::new(),
            inputs: 0,
        })
    }

    async fn accept(
        &self,
        input: I,
        mut state: LoadBuffer,
    ) -> Result<AccumulatorResult<LoadBuffer, LoadedBatch>> {
        input.extend_records(&mut state.records);
        state.inputs += 1;

        match self.max_inputs {
            Some(max) if state.inputs >= max => Ok(AccumulatorResult::Complete(self.load(state).await?)),
            _ => Ok(AccumulatorResult::Incomplete(state)),
        }
    }

    async fn finish(&self, state: LoadBuffer) -> Result<LoadedBatch> {
        self.load(state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CheckpointId, PartitionedStreamKey, StreamKey};
    use crate::testing::{FailingSink, RecordingSink};
    use serde_json::json;

    fn record(i: u64) -> DestinationRecord {
        DestinationRecord::new(StreamDescriptor::new("s"), json!({"i": i}), CheckpointId(0))
    }

    #[tokio::test]
    async fn test_loads_on_finish() {
        let sink = Arc::new(RecordingSink::new());
        let acc: LoadBatchAccumulator<_, StreamKey, DestinationRecord> =
            LoadBatchAccumulator::new(Arc::clone(&sink));
        let key = StreamKey(StreamDescriptor::new("s"));

        let mut state = acc.start(&key, 1).await.unwrap();
        for i in 0..3 {
            state = match acc.accept(record(i), state).await.unwrap() {
                AccumulatorResult::Incomplete(state) => state,
                AccumulatorResult::Complete(_) => panic!("unexpected completion"),
            };
        }
        assert_eq!(sink.load_count(), 0);

        let loaded = acc.finish(state).await.unwrap();
        assert_eq!(loaded.record_count, 3);
        assert_eq!(loaded.batch_state(), BatchState::Complete);
        assert_eq!(sink.load_count(), 1);
        assert_eq!(sink.loads()[0].partition, 1);
    }

    #[tokio::test]
    async fn test_staged_batch_loaded_on_accept() {
        let sink = Arc::new(RecordingSink::new());
        let acc: LoadBatchAccumulator<_, PartitionedStreamKey, RecordBatch> =
            LoadBatchAccumulator::new(Arc::clone(&sink)).with_max_inputs(1);
        let key = PartitionedStreamKey {
            stream: StreamDescriptor::new("s"),
            part: 0,
        };

        let batch = RecordBatch {
            stream: StreamDescriptor::new("s"),
            partition: 0,
            records: vec![record(1), record(2)],
            size_bytes: 0,
        };
        let state = acc.start(&key, 0).await.unwrap();
        let result = acc.accept(batch, state).await.unwrap();

        assert!(result.is_complete());
        assert_eq!(sink.record_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_finish_skips_sink() {
        let sink = Arc::new(FailingSink::new("unreachable"));
        let acc: LoadBatchAccumulator<_, StreamKey, DestinationRecord> = LoadBatchAccumulator::new(sink);
        let key = StreamKey(StreamDescriptor::new("s"));

        let state = acc.start(&key, 0).await.unwrap();
        let loaded = acc.finish(state).await.unwrap();
        assert_eq!(loaded.record_count, 0);
    }

    #[tokio::test]
    async fn test_sink_failure_propagates() {
        let sink = Arc::new(FailingSink::new("warehouse unavailable"));
        let acc: LoadBatchAccumulator<_, StreamKey, DestinationRecord> = LoadBatchAccumulator::new(sink);
        let key = StreamKey(StreamDescriptor::new("s"));

        let state = acc.start(&key, 0).await.unwrap();
        let AccumulatorResult::Incomplete(state) = acc.accept(record(1), state).await.unwrap() else {
            panic!("unexpected completion");
        };
        let err = acc.finish(state).await.unwrap_err();
        assert!(err.to_string().contains("warehouse unavailable"));
    }
}
