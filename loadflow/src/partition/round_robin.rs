//! Round-robin partitioning with configurable rotation.

use super::InputPartitioner;
use crate::core::DestinationRecord;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Records per partition before rotating to the next one.
pub const DEFAULT_ROTATE_EVERY_N: u64 = 10_000;

/// Upper bound for the random starting offset, far from overflow.
const MAX_RANDOM_OFFSET: u64 = u64::MAX / 2;

/// Sends runs of `rotate_every_n` records to each partition in turn.
///
/// The shared counter starts at a random offset so that concurrent syncs do
/// not all begin on partition 0.
#[derive(Debug)]
pub struct RoundRobinInputPartitioner {
    rotate_every_n: u64,
    counter: AtomicU64,
}

impl RoundRobinInputPartitioner {
    /// Creates a partitioner seeded with a random offset.
    #[must_use]
    pub fn new(rotate_every_n: u64) -> Self {
        let offset = rand::thread_rng().gen_range(0..MAX_RANDOM_OFFSET);
        Self::with_offset(rotate_every_n, offset)
    }

    /// Creates a partitioner starting at `offset`.
    #[must_use]
    pub fn with_offset(rotate_every_n: u64, offset: u64) -> Self {
        Self {
            rotate_every_n: rotate_every_n.max(1),
            counter: AtomicU64::new(offset),
        }
    }

    /// Records per partition before rotating.
    #[must_use]
    pub fn rotate_every_n(&self) -> u64 {
        self.rotate_every_n
    }
}

impl Default for RoundRobinInputPartitioner {
    fn default() -> Self {
        Self::new(DEFAULT_ROTATE_EVERY_N)
    }
}

impl InputPartitioner for RoundRobinInputPartitioner {
    fn get_partition(&self, _record: &DestinationRecord, num_parts: usize) -> usize {
        if num_parts <= 1 {
            return 0;
        }
        let position = self.counter.fetch_add(1, Ordering::Relaxed);
        ((position / self.rotate_every_n) % num_parts as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CheckpointId, StreamDescriptor};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record() -> DestinationRecord {
        DestinationRecord::new(StreamDescriptor::new("s"), json!({}), CheckpointId(0))
    }

    #[test]
    fn test_rotation_sequence() {
        let partitioner = RoundRobinInputPartitioner::with_offset(3, 0);
        let parts: Vec<usize> = (0..7).map(|_| partitioner.get_partition(&record(), 2)).collect();

        assert_eq!(parts, vec![0, 0, 0, 1, 1, 1, 0]);
    }

    #[test]
    fn test_single_partition_always_zero() {
        let partitioner = RoundRobinInputPartitioner::new(1);
        for _ in 0..10 {
            assert_eq!(partitioner.get_partition(&record(), 1), 0);
        }
    }

    #[test]
    fn test_random_offset_stays_in_range() {
        let partitioner = RoundRobinInputPartitioner::default();
        assert_eq!(partitioner.rotate_every_n(), DEFAULT_ROTATE_EVERY_N);
        for _ in 0..100 {
            assert!(partitioner.get_partition(&record(), 7) < 7);
        }
    }
}
