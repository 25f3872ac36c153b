//! Partitioning by stream.

use super::hashing::{bucket, stream_hash};
use super::InputPartitioner;
use crate::core::DestinationRecord;

/// Sends every record of a stream to the same partition.
///
/// This gives up intra-stream parallelism in exchange for simple per-stream
/// completion tracking.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByStreamInputPartitioner;

impl ByStreamInputPartitioner {
    /// Creates the partitioner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl InputPartitioner for ByStreamInputPartitioner {
    fn get_partition(&self, record: &DestinationRecord, num_parts: usize) -> usize {
        bucket(stream_hash(&record.stream), num_parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CheckpointId, StreamDescriptor};
    use serde_json::json;

    #[test]
    fn test_same_stream_same_partition() {
        let partitioner = ByStreamInputPartitioner::new();
        let stream = StreamDescriptor::new("events").with_namespace("app");

        let parts: Vec<usize> = (0..20)
            .map(|i| {
                let record = DestinationRecord::new(stream.clone(), json!({"i": i}), CheckpointId(i));
                partitioner.get_partition(&record, 8)
            })
            .collect();

        assert!(parts.iter().all(|p| *p == parts[0]));
        assert!(parts[0] < 8);
    }
}
