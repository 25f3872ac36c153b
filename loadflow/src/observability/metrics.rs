//! Atomic counters shared by the tasks of a pipeline.

use crate::task::FlushTrigger;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for one pipeline step, summed over its workers.
#[derive(Debug, Default)]
pub struct StepMetrics {
    inputs_accepted: AtomicU64,
    bytes_accepted: AtomicU64,
    flushed_by_policy: AtomicU64,
    flushed_by_size: AtomicU64,
    flushed_by_end_of_stream: AtomicU64,
    flushed_by_accumulator: AtomicU64,
    bytes_flushed: AtomicU64,
    streams_finished: AtomicU64,
    sink_failures: AtomicU64,
}

impl StepMetrics {
    /// Records an accepted input.
    pub fn record_input(&self, size_bytes: u64) {
        self.inputs_accepted.fetch_add(1, Ordering::Relaxed);
        self.bytes_accepted.fetch_add(size_bytes, Ordering::Relaxed);
    }

    /// Records a flushed batch.
    pub fn record_flush(&self, trigger: FlushTrigger, size_bytes: u64) {
        let counter = match trigger {
            FlushTrigger::Policy => &self.flushed_by_policy,
            FlushTrigger::Size => &self.flushed_by_size,
            FlushTrigger::EndOfStream => &self.flushed_by_end_of_stream,
            FlushTrigger::Accumulator => &self.flushed_by_accumulator,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.bytes_flushed.fetch_add(size_bytes, Ordering::Relaxed);
    }

    /// Records a worker finishing a stream.
    pub fn record_stream_finished(&self) {
        self.streams_finished.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a sink failure.
    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Inputs accepted.
    #[must_use]
    pub fn inputs_accepted(&self) -> u64 {
        self.inputs_accepted.load(Ordering::Relaxed)
    }

    /// Batches flushed for any reason.
    #[must_use]
    pub fn batches_flushed(&self) -> u64 {
        self.flushed(FlushTrigger::Policy)
            + self.flushed(FlushTrigger::Size)
            + self.flushed(FlushTrigger::EndOfStream)
            + self.flushed(FlushTrigger::Accumulator)
    }

    /// Batches flushed by `trigger`.
    #[must_use]
    pub fn flushed(&self, trigger: FlushTrigger) -> u64 {
        match trigger {
            FlushTrigger::Policy => &self.flushed_by_policy,
            FlushTrigger::Size => &self.flushed_by_size,
            FlushTrigger::EndOfStream => &self.flushed_by_end_of_stream,
            FlushTrigger::Accumulator => &self.flushed_by_accumulator,
        }
        .load(Ordering::Relaxed)
    }

    /// Sink failures.
    #[must_use]
    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }

    /// Exports the counters.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "inputs_accepted": self.inputs_accepted(),
            "bytes_accepted": self.bytes_accepted.load(Ordering::Relaxed),
            "batches_flushed": self.batches_flushed(),
            "flushed_by": {
                "policy": self.flushed(FlushTrigger::Policy),
                "size": self.flushed(FlushTrigger::Size),
                "end_of_stream": self.flushed(FlushTrigger::EndOfStream),
                "accumulator": self.flushed(FlushTrigger::Accumulator),
            },
            "bytes_flushed": self.bytes_flushed.load(Ordering::Relaxed),
            "streams_finished": self.streams_finished.load(Ordering::Relaxed),
            "sink_failures": self.sink_failures(),
        })
    }
}

/// Per-step metrics for a whole pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    steps: RwLock<BTreeMap<String, Arc<StepMetrics>>>,
}

impl PipelineMetrics {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the metrics of `step`, creating them on first use.
    pub fn step(&self, step: &str) -> Arc<StepMetrics> {
        if let Some(metrics) = self.steps.read().get(step) {
            return Arc::clone(metrics);
        }
        Arc::clone(self.steps.write().entry(step.to_string()).or_default())
    }

    /// Exports every step's counters.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let steps: serde_json::Map<String, serde_json::Value> = self
            .steps
            .read()
            .iter()
            .map(|(name, metrics)| (name.clone(), metrics.to_json()))
            .collect();
        serde_json::Value::Object(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_counters_by_trigger() {
        let metrics = StepMetrics::default();
        metrics.record_input(10);
        metrics.record_flush(FlushTrigger::Size, 10);
        metrics.record_flush(FlushTrigger::EndOfStream, 0);

        assert_eq!(metrics.inputs_accepted(), 1);
        assert_eq!(metrics.batches_flushed(), 2);
        assert_eq!(metrics.flushed(FlushTrigger::Size), 1);
        assert_eq!(metrics.to_json()["bytes_flushed"], 10);
    }

    #[test]
    fn test_step_registry_shares_counters() {
        let pipeline = PipelineMetrics::new();
        pipeline.step("load").record_sink_failure();
        pipeline.step("load").record_sink_failure();

        assert_eq!(pipeline.step("load").sink_failures(), 2);
        assert_eq!(pipeline.to_json()["load"]["sink_failures"], 2);
    }
}
