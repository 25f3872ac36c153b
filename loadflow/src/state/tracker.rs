//! Per-stream checkpoint bookkeeping fed by the update queue.
//!
//! The tracker is how a host decides whether a checkpoint may be
//! acknowledged: once every record counted against it has reached a
//! persisted state at the destination, the checkpoint is safe.

use super::{BatchEndOfStream, BatchStateUpdate, BatchUpdate};
use crate::core::{BatchState, CheckpointId, StreamDescriptor};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct StreamProgress {
    counts: HashMap<CheckpointId, BTreeMap<BatchState, u64>>,
    finished_workers: BTreeSet<usize>,
}

/// Aggregates [`BatchUpdate`]s into per-checkpoint durability counts.
#[derive(Debug)]
pub struct CheckpointTracker {
    final_step_name: String,
    streams: DashMap<StreamDescriptor, StreamProgress>,
    last_update_at: RwLock<Option<DateTime<Utc>>>,
}

impl CheckpointTracker {
    /// Creates a tracker. End-of-stream reports only count when they come
    /// from `final_step_name`.
    #[must_use]
    pub fn new(final_step_name: impl Into<String>) -> Self {
        Self {
            final_step_name: final_step_name.into(),
            streams: DashMap::new(),
            last_update_at: RwLock::new(None),
        }
    }

    /// Applies one update.
    pub fn record(&self, update: &BatchUpdate) {
        match update {
            BatchUpdate::State(update) => self.record_state(update),
            BatchUpdate::EndOfStream(eos) => self.record_end_of_stream(eos),
        }
        *self.last_update_at.write() = Some(Utc::now());
    }

    fn record_state(&self, update: &BatchStateUpdate) {
        let mut progress = self.streams.entry(update.stream.clone()).or_default();
        for (checkpoint, count) in &update.checkpoint_counts {
            *progress
                .counts
                .entry(*checkpoint)
                .or_default()
                .entry(update.state)
                .or_default() += count;
        }
        debug!(
            stream = %update.stream,
            state = %update.state,
            task = %update.task_name,
            records = update.record_count(),
            "Recorded batch state"
        );
    }

    fn record_end_of_stream(&self, eos: &BatchEndOfStream) {
        if eos.task_name != self.final_step_name {
            return;
        }
        self.streams
            .entry(eos.stream.clone())
            .or_default()
            .finished_workers
            .insert(eos.partition);
        info!(
            stream = %eos.stream,
            partition = eos.partition,
            total_input_count = eos.total_input_count,
            "Worker finished stream"
        );
    }

    /// Drains `rx` until every sender is gone.
    pub async fn run(&self, mut rx: mpsc::Receiver<BatchUpdate>) {
        while let Some(update) = rx.recv().await {
            self.record(&update);
        }
    }

    /// Records of `checkpoint` that reached a persisted state.
    #[must_use]
    pub fn persisted_count(&self, stream: &StreamDescriptor, checkpoint: CheckpointId) -> u64 {
        self.count_where(stream, checkpoint, BatchState::is_persisted)
    }

    /// Records of `checkpoint` that reached exactly `state`.
    #[must_use]
    pub fn count_in_state(
        &self,
        stream: &StreamDescriptor,
        checkpoint: CheckpointId,
        state: BatchState,
    ) -> u64 {
        self.count_where(stream, checkpoint, |s| *s == state)
    }

    fn count_where(
        &self,
        stream: &StreamDescriptor,
        checkpoint: CheckpointId,
        pred: impl Fn(&BatchState) -> bool,
    ) -> u64 {
        self.streams
            .get(stream)
            .and_then(|progress| {
                progress
                    .counts
                    .get(&checkpoint)
                    .map(|by_state| by_state.iter().filter(|(s, _)| pred(s)).map(|(_, c)| c).sum())
            })
            .unwrap_or(0)
    }

    /// Returns true once all `expected` records of `checkpoint` are persisted.
    #[must_use]
    pub fn is_checkpoint_persisted(
        &self,
        stream: &StreamDescriptor,
        checkpoint: CheckpointId,
        expected: u64,
    ) -> bool {
        self.persisted_count(stream, checkpoint) >= expected
    }

    /// Returns true once `expected_eos_signals` final-step workers reported
    /// end-of-stream for `stream`.
    #[must_use]
    pub fn is_stream_complete(&self, stream: &StreamDescriptor, expected_eos_signals: usize) -> bool {
        self.streams
            .get(stream)
            .is_some_and(|progress| progress.finished_workers.len() >= expected_eos_signals)
    }

    /// When the last update arrived.
    #[must_use]
    pub fn last_update_at(&self) -> Option<DateTime<Utc>> {
        *self.last_update_at.read()
    }

    /// Exports the counts for inspection.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let streams: serde_json::Map<String, serde_json::Value> = self
            .streams
            .iter()
            .map(|entry| {
                let checkpoints: serde_json::Map<String, serde_json::Value> = entry
                    .counts
                    .iter()
                    .map(|(id, by_state)| {
                        let states: serde_json::Map<String, serde_json::Value> = by_state
                            .iter()
                            .map(|(state, count)| (state.to_string(), (*count).into()))
                            .collect();
                        (id.to_string(), states.into())
                    })
                    .collect();
                (
                    entry.key().to_string(),
                    serde_json::json!({
                        "checkpoints": checkpoints,
                        "finished_workers": entry.finished_workers.len(),
                    }),
                )
            })
            .collect();
        serde_json::json!({
            "final_step": self.final_step_name,
            "streams": streams,
            "last_update_at": self.last_update_at().map(|t| t.to_rfc3339()),
        })
    }
}
