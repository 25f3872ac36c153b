//! Records and checkpoint accounting primitives.

use super::{Reservation, StreamDescriptor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies a contiguous range of source records bounded by a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(pub u64);

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-checkpoint record counts.
pub type CheckpointCounts = BTreeMap<CheckpointId, u64>;

/// Adds every count in `from` into `into`.
pub fn merge_checkpoint_counts(into: &mut CheckpointCounts, from: &CheckpointCounts) {
    for (id, count) in from {
        *into.entry(*id).or_default() += count;
    }
}

/// Sums all counts.
#[must_use]
pub fn total_checkpoint_count(counts: &CheckpointCounts) -> u64 {
    counts.values().sum()
}

/// A record headed for a destination stream.
///
/// The payload is opaque to the pipeline; only the partitioners look inside
/// it (for primary key values).
#[derive(Debug)]
pub struct DestinationRecord {
    /// The target stream.
    pub stream: StreamDescriptor,
    /// The record payload.
    pub data: serde_json::Value,
    /// Size of the record as serialized on the wire.
    pub serialized_size_bytes: u64,
    /// The checkpoint this record contributes to.
    pub checkpoint_id: CheckpointId,
    /// When the source emitted the record.
    pub emitted_at: DateTime<Utc>,
    reservation: Option<Reservation>,
}

impl DestinationRecord {
    /// Creates a record, sizing it by its JSON encoding.
    #[must_use]
    pub fn new(stream: StreamDescriptor, data: serde_json::Value, checkpoint_id: CheckpointId) -> Self {
        let serialized_size_bytes = serde_json::to_vec(&data).map_or(0, |v| v.len() as u64);
        Self {
            stream,
            data,
            serialized_size_bytes,
            checkpoint_id,
            emitted_at: Utc::now(),
            reservation: None,
        }
    }

    /// Overrides the serialized size.
    #[must_use]
    pub fn with_size(mut self, bytes: u64) -> Self {
        self.serialized_size_bytes = bytes;
        self
    }

    /// Attaches the memory reservation held while this record is buffered.
    #[must_use]
    pub fn with_reservation(mut self, reservation: Reservation) -> Self {
        self.reservation = Some(reservation);
        self
    }

    /// Moves the reservation out of the record.
    pub fn take_reservation(&mut self) -> Option<Reservation> {
        self.reservation.take()
    }

    /// Looks up a (possibly nested) field, returning `None` when any segment is absent.
    #[must_use]
    pub fn field(&self, path: &[String]) -> Option<&serde_json::Value> {
        path.iter()
            .try_fold(&self.data, |value, segment| value.get(segment.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_counts_sums() {
        let mut into = CheckpointCounts::from([(CheckpointId(1), 2)]);
        let from = CheckpointCounts::from([(CheckpointId(1), 3), (CheckpointId(2), 1)]);

        merge_checkpoint_counts(&mut into, &from);

        assert_eq!(into[&CheckpointId(1)], 5);
        assert_eq!(into[&CheckpointId(2)], 1);
        assert_eq!(total_checkpoint_count(&into), 6);
    }

    #[test]
    fn test_record_sized_by_json() {
        let record = DestinationRecord::new(StreamDescriptor::new("s"), json!({"a": 1}), CheckpointId(0));
        assert_eq!(record.serialized_size_bytes, r#"{"a":1}"#.len() as u64);
        assert_eq!(record.with_size(42).serialized_size_bytes, 42);
    }

    #[test]
    fn test_nested_field_lookup() {
        let record = DestinationRecord::new(
            StreamDescriptor::new("s"),
            json!({"user": {"id": 7}}),
            CheckpointId(0),
        );
        let path = vec!["user".to_string(), "id".to_string()];
        assert_eq!(record.field(&path), Some(&json!(7)));

        let missing = vec!["user".to_string(), "email".to_string()];
        assert_eq!(record.field(&missing), None);
    }
}
