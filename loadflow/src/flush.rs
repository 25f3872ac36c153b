//! Flush policies for open batches.
//!
//! A strategy is consulted on every heartbeat for every open batch. It is
//! independent of the hard byte-size bound, which the accumulation task
//! enforces unconditionally.

use std::fmt::Debug;

/// Decides from count and age whether an open batch must flush.
pub trait PipelineFlushStrategy: Send + Sync + Debug {
    /// Returns true if a batch with `input_count` inputs, whose first input
    /// arrived `data_age_ms` ago, should flush now.
    fn should_flush(&self, input_count: u64, data_age_ms: u64) -> bool;
}

/// Flushes once a batch holds `threshold` inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordCountFlushStrategy {
    threshold: u64,
}

impl RecordCountFlushStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }
}

impl PipelineFlushStrategy for RecordCountFlushStrategy {
    fn should_flush(&self, input_count: u64, _data_age_ms: u64) -> bool {
        input_count >= self.threshold
    }
}

/// Time-based flushing with an optional micro-batch override.
///
/// Empty batches never flush. With the override every non-empty batch
/// flushes on the next heartbeat, which lets integration tests await
/// checkpoint acknowledgement deterministically. Otherwise a batch flushes
/// once its data is `max_time_without_flush_ms` old, bounding how long a
/// checkpoint can wait under low traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultPipelineFlushStrategy {
    micro_batch_override: bool,
    max_time_without_flush_ms: u64,
}

impl DefaultPipelineFlushStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new(micro_batch_override: bool, max_time_without_flush_ms: u64) -> Self {
        Self {
            micro_batch_override,
            max_time_without_flush_ms,
        }
    }

    /// Returns the age limit.
    #[must_use]
    pub fn max_time_without_flush_ms(&self) -> u64 {
        self.max_time_without_flush_ms
    }
}

impl PipelineFlushStrategy for DefaultPipelineFlushStrategy {
    fn should_flush(&self, input_count: u64, data_age_ms: u64) -> bool {
        if input_count == 0 {
            return false;
        }
        if self.micro_batch_override {
            return true;
        }
        data_age_ms >= self.max_time_without_flush_ms
    }
}
