//! Re-keying and re-routing of step outputs.

use super::hashing::{bucket, stream_hash};
use crate::accumulator::RecordBatch;
use crate::core::{PartitionedStreamKey, StreamKey, WithStream};

/// Re-keys a step's output and picks its partition in the next step.
///
/// `K1` and `T` are the upstream key and input types, `K2` and `U` the
/// downstream key and the output being routed.
pub trait OutputPartitioner<K1, T, K2, U>: Send + Sync {
    /// Derives the downstream key.
    fn get_output_key(&self, input_key: &K1, output: &U) -> K2;

    /// Returns a partition in `0..num_parts` for the downstream key.
    fn get_part(&self, output_key: &K2, num_parts: usize) -> usize;
}

/// Keys outputs by stream and routes each stream to one downstream worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByStreamOutputPartitioner;

impl<K1, T, U> OutputPartitioner<K1, T, StreamKey, U> for ByStreamOutputPartitioner
where
    K1: WithStream,
{
    fn get_output_key(&self, input_key: &K1, _output: &U) -> StreamKey {
        StreamKey(input_key.stream().clone())
    }

    fn get_part(&self, output_key: &StreamKey, num_parts: usize) -> usize {
        bucket(stream_hash(&output_key.0), num_parts)
    }
}

/// Keeps a staged batch on the partition that built it.
///
/// With as many downstream workers as upstream ones this is a one-to-one
/// hand-off; otherwise upstream partitions are folded modulo the worker count.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamePartOutputPartitioner;

impl<K1, T> OutputPartitioner<K1, T, PartitionedStreamKey, RecordBatch> for SamePartOutputPartitioner
where
    K1: WithStream,
{
    fn get_output_key(&self, input_key: &K1, output: &RecordBatch) -> PartitionedStreamKey {
        PartitionedStreamKey {
            stream: input_key.stream().clone(),
            part: output.partition,
        }
    }

    fn get_part(&self, output_key: &PartitionedStreamKey, num_parts: usize) -> usize {
        if num_parts == 0 {
            return 0;
        }
        output_key.part % num_parts
    }
}
