//! Messages every accumulation task publishes to the update queue.

use crate::core::{total_checkpoint_count, BatchState, CheckpointCounts, StreamDescriptor};
use serde::{Deserialize, Serialize};

/// The records of a flushed batch reached `state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStateUpdate {
    /// The stream the batch belongs to.
    pub stream: StreamDescriptor,
    /// Source records per checkpoint contained in the batch.
    pub checkpoint_counts: CheckpointCounts,
    /// The state the records reached.
    pub state: BatchState,
    /// The step that flushed the batch.
    pub task_name: String,
    /// The worker that flushed the batch.
    pub partition: usize,
    /// How many inputs the batch folded in this step. The first step counts
    /// records; a load step fed staged batches counts batches, so only
    /// `checkpoint_counts` is comparable across steps.
    pub input_count: u64,
}

impl BatchStateUpdate {
    /// Total source records the update accounts for.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        total_checkpoint_count(&self.checkpoint_counts)
    }
}

/// A worker finished a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEndOfStream {
    /// The finished stream.
    pub stream: StreamDescriptor,
    /// The step reporting.
    pub task_name: String,
    /// The worker reporting.
    pub partition: usize,
    /// Inputs the worker accepted for the stream over its lifetime.
    pub total_input_count: u64,
}

/// A message on the update queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchUpdate {
    /// A batch was flushed.
    State(BatchStateUpdate),
    /// A worker finished a stream.
    EndOfStream(BatchEndOfStream),
}

impl BatchUpdate {
    /// The stream this update is about.
    #[must_use]
    pub fn stream(&self) -> &StreamDescriptor {
        match self {
            Self::State(update) => &update.stream,
            Self::EndOfStream(eos) => &eos.stream,
        }
    }

    /// The step that published the update.
    #[must_use]
    pub fn task_name(&self) -> &str {
        match self {
            Self::State(update) => &update.task_name,
            Self::EndOfStream(eos) => &eos.task_name,
        }
    }
}

impl From<BatchStateUpdate> for BatchUpdate {
    fn from(update: BatchStateUpdate) -> Self {
        Self::State(update)
    }
}

impl From<BatchEndOfStream> for BatchUpdate {
    fn from(eos: BatchEndOfStream) -> Self {
        Self::EndOfStream(eos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CheckpointId;
    use serde_json::json;

    #[test]
    fn test_update_serializes_tagged() {
        let update = BatchUpdate::from(BatchEndOfStream {
            stream: StreamDescriptor::new("users"),
            task_name: "load".to_string(),
            partition: 1,
            total_input_count: 9,
        });

        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["type"], json!("end_of_stream"));
        assert_eq!(value["total_input_count"], json!(9));
        assert_eq!(update.task_name(), "load");
    }

    #[test]
    fn test_record_count_sums_checkpoints() {
        let update = BatchStateUpdate {
            stream: StreamDescriptor::new("users"),
            checkpoint_counts: CheckpointCounts::from([(CheckpointId(1), 3), (CheckpointId(2), 4)]),
            state: BatchState::Persisted,
            task_name: "load".to_string(),
            partition: 0,
            input_count: 7,
        };
        assert_eq!(update.record_count(), 7);
    }
}
