//! Core domain model types for loadflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stream descriptors, import modes and the destination catalog
//! - Records, checkpoint ids and per-checkpoint counts
//! - Accumulation keys and pipeline events
//! - Memory reservations and batch durability states

mod event;
mod key;
mod record;
mod reservation;
mod status;
mod stream;

pub use event::{PipelineEvent, PipelineMessage};
pub use key::{PartitionedStreamKey, PipelineKey, StreamKey, WithStream};
pub use record::{
    merge_checkpoint_counts, total_checkpoint_count, CheckpointCounts, CheckpointId,
    DestinationRecord,
};
pub use reservation::{MemoryBudget, Reservation};
pub use status::BatchState;
pub use stream::{DestinationCatalog, DestinationStream, FieldPath, ImportMode, StreamDescriptor};
