//! The host-facing entry point of a pipeline.

use super::QueueWriter;
use crate::core::{DestinationRecord, MemoryBudget, PipelineEvent, PipelineMessage, StreamDescriptor, StreamKey};
use crate::errors::Result;
use crate::partition::InputPartitioner;
use std::sync::Arc;
use tracing::info;

/// Routes source records into the first step's partitions.
///
/// Every record becomes a message keyed by its stream, counted once against
/// its checkpoint, and carrying the memory reservation it holds while
/// buffered.
pub struct PipelineInput {
    writer: QueueWriter<PipelineEvent<StreamKey, DestinationRecord>>,
    partitioner: Arc<dyn InputPartitioner>,
    budget: Option<Arc<MemoryBudget>>,
}

impl PipelineInput {
    /// Creates an input publishing through `writer`.
    pub fn new(
        writer: QueueWriter<PipelineEvent<StreamKey, DestinationRecord>>,
        partitioner: Arc<dyn InputPartitioner>,
    ) -> Self {
        Self {
            writer,
            partitioner,
            budget: None,
        }
    }

    /// Reserves each record's size from `budget` unless it already holds a reservation.
    #[must_use]
    pub fn with_memory_budget(mut self, budget: Arc<MemoryBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Publishes one record, waiting on a full partition or an exhausted budget.
    pub async fn publish_record(&self, mut record: DestinationRecord) -> Result<()> {
        let part = self
            .partitioner
            .get_partition(&record, self.writer.num_partitions());

        let reservation = match (record.take_reservation(), &self.budget) {
            (Some(reservation), _) => Some(reservation),
            (None, Some(budget)) => Some(budget.reserve(record.serialized_size_bytes).await?),
            (None, None) => None,
        };

        let key = StreamKey(record.stream.clone());
        let checkpoint_id = record.checkpoint_id;
        let size = record.serialized_size_bytes;
        let mut message = PipelineMessage::new(key, record)
            .with_checkpoint(checkpoint_id, 1)
            .with_size(size);
        message.reservation = reservation;

        self.writer.publish(PipelineEvent::message(message), part).await
    }

    /// Tells every partition that `stream` has no more records.
    pub async fn end_of_stream(&self, stream: &StreamDescriptor) -> Result<()> {
        info!(stream = %stream, "Input end of stream");
        self.writer
            .broadcast(|| PipelineEvent::end_of_stream(stream.clone()))
            .await
    }

    /// Sends one heartbeat to every partition.
    pub async fn heartbeat(&self) -> Result<()> {
        self.writer.broadcast(|| PipelineEvent::Heartbeat).await
    }

    /// A producer handle on the input queue, e.g. for a [`super::HeartbeatTicker`].
    #[must_use]
    pub fn writer(&self) -> QueueWriter<PipelineEvent<StreamKey, DestinationRecord>> {
        self.writer.clone()
    }

    /// Closes the input. Tasks of the first step exit once they drain it.
    pub fn close(&self) {
        self.writer.close();
    }
}

impl std::fmt::Debug for PipelineInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineInput")
            .field("writer", &self.writer)
            .field("partitioner", &self.partitioner)
            .finish_non_exhaustive()
    }
}
