//! Error types for the loadflow pipeline.
//!
//! Failures fall into a small taxonomy: destination sink failures (fatal to
//! the owning task), configuration and policy errors (surfaced when a
//! pipeline is assembled), reservation errors from the memory budget, and
//! queue errors raised when a stage publishes into a closed queue.

use crate::core::StreamDescriptor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = LoadflowError> = std::result::Result<T, E>;

/// The main error type for loadflow operations.
#[derive(Debug, Error)]
pub enum LoadflowError {
    /// The destination sink rejected a batch. No retry happens at this layer.
    #[error("Destination sink failed for stream '{stream}': {source}")]
    Sink {
        /// The stream whose batch failed.
        stream: StreamDescriptor,
        /// The sink's error.
        #[source]
        source: anyhow::Error,
    },

    /// A configuration or policy error.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A memory reservation could not be made or merged.
    #[error("{0}")]
    Reservation(#[from] ReservationError),

    /// A producer published into a queue whose consumers are gone.
    #[error("Queue '{0}' is closed")]
    QueueClosed(String),

    /// A partition index outside of the queue's range.
    #[error("Partition {partition} out of range for queue '{queue}' ({num_partitions} partitions)")]
    InvalidPartition {
        /// The queue name.
        queue: String,
        /// The requested partition.
        partition: usize,
        /// How many partitions the queue has.
        num_partitions: usize,
    },

    /// A task panicked or was aborted before completing.
    #[error("Task aborted: {0}")]
    TaskAborted(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LoadflowError {
    /// Wraps a destination failure for `stream`.
    #[must_use]
    pub fn sink(stream: &StreamDescriptor, source: anyhow::Error) -> Self {
        Self::Sink {
            stream: stream.clone(),
            source,
        }
    }

    /// Returns true if this error came from the destination sink.
    #[must_use]
    pub fn is_sink_failure(&self) -> bool {
        matches!(self, Self::Sink { .. })
    }

    /// Returns a short, stable type name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sink { .. } => "sink",
            Self::Config(_) => "config",
            Self::Reservation(_) => "reservation",
            Self::QueueClosed(_) => "queue_closed",
            Self::InvalidPartition { .. } => "invalid_partition",
            Self::TaskAborted(_) => "task_aborted",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// A configuration or policy error, with a stable code and an optional hint.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ConfigError {
    /// Error code (e.g., "CONFIG-DEDUPE-NO-PK").
    pub code: String,
    /// Human readable message.
    pub message: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// A setting that must be strictly positive was zero.
    #[must_use]
    pub fn must_be_positive(setting: &str) -> Self {
        Self::new(
            "CONFIG-ZERO",
            format!("'{setting}' must be greater than zero"),
        )
    }

    /// A dedupe stream was declared without a primary key.
    #[must_use]
    pub fn dedupe_without_primary_key(stream: &StreamDescriptor) -> Self {
        Self::new(
            "CONFIG-DEDUPE-NO-PK",
            format!("Stream '{stream}' uses dedupe but declares no primary key"),
        )
        .with_fix_hint("Declare at least one primary key field or switch the stream to append.")
    }

    /// A primary key field path has no segments, so it would select the whole record.
    #[must_use]
    pub fn empty_primary_key_path(stream: &StreamDescriptor) -> Self {
        Self::new(
            "CONFIG-DEDUPE-EMPTY-PATH",
            format!("Stream '{stream}' declares an empty primary key field path"),
        )
        .with_fix_hint("Name at least one field in every primary key path.")
    }

    /// The memory budget cannot hold one full batch.
    #[must_use]
    pub fn budget_below_batch_size(budget_bytes: u64, target_batch_size_bytes: u64) -> Self {
        Self::new(
            "CONFIG-BUDGET-TOO-SMALL",
            format!(
                "'memory_budget_bytes' ({budget_bytes}) is smaller than 'target_batch_size_bytes' ({target_batch_size_bytes})"
            ),
        )
        .with_fix_hint("Raise the memory budget or lower the target batch size so a batch can fill before the budget runs out.")
    }
}

/// Errors raised by the memory budget.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReservationError {
    /// Not enough budget is free right now.
    #[error("Memory budget exhausted: requested {requested} bytes, {available} available")]
    Exhausted {
        /// Bytes requested.
        requested: u64,
        /// Bytes currently free.
        available: u64,
    },

    /// The request can never be satisfied by this budget.
    #[error("Reservation of {requested} bytes exceeds budget capacity of {capacity} bytes")]
    ExceedsCapacity {
        /// Bytes requested.
        requested: u64,
        /// Total budget capacity.
        capacity: u64,
    },

    /// Two reservations drawn from different budgets cannot be merged.
    #[error("Cannot merge reservations drawn from different memory budgets")]
    MismatchedBudget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_error_display() {
        let stream = StreamDescriptor::new("users").with_namespace("public");
        let err = LoadflowError::sink(&stream, anyhow::anyhow!("connection reset"));

        assert!(err.is_sink_failure());
        assert_eq!(err.kind(), "sink");
        assert_eq!(
            err.to_string(),
            "Destination sink failed for stream 'public.users': connection reset"
        );
    }

    #[test]
    fn test_config_error_hint() {
        let err = ConfigError::dedupe_without_primary_key(&StreamDescriptor::new("orders"));
        assert_eq!(err.code, "CONFIG-DEDUPE-NO-PK");
        assert!(err.fix_hint.is_some());
        assert!(err.to_string().contains("orders"));

        let wrapped: LoadflowError = err.into();
        assert_eq!(wrapped.kind(), "config");
    }

    #[test]
    fn test_reservation_error_conversion() {
        let err: LoadflowError = ReservationError::Exhausted {
            requested: 10,
            available: 4,
        }
        .into();
        assert!(err.to_string().contains("requested 10 bytes"));
    }
}
