//! Batch state updates and the checkpoint tracker that consumes them.

mod tracker;
mod update;

pub use tracker::CheckpointTracker;
pub use update::{BatchEndOfStream, BatchStateUpdate, BatchUpdate};
