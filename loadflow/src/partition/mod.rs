//! Routing of records and step outputs to partitions.
//!
//! Input partitioners pick the partition a record is enqueued on; output
//! partitioners re-key and re-route a step's output before it enters the
//! next step's queue. Both must be deterministic for the life of a sync for
//! any record that has to be co-located with others.

mod by_stream;
mod hashing;
mod output;
mod primary_key;
mod round_robin;

pub use by_stream::ByStreamInputPartitioner;
pub use output::{ByStreamOutputPartitioner, OutputPartitioner, SamePartOutputPartitioner};
pub use primary_key::ByPrimaryKeyInputPartitioner;
pub use round_robin::{RoundRobinInputPartitioner, DEFAULT_ROTATE_EVERY_N};

use crate::core::DestinationRecord;
use std::fmt::Debug;

/// Chooses the partition a record is enqueued on.
pub trait InputPartitioner: Send + Sync + Debug {
    /// Returns a partition in `0..num_parts`.
    fn get_partition(&self, record: &DestinationRecord, num_parts: usize) -> usize;
}
