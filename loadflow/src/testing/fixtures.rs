//! Record and catalog fixtures.

use serde_json::json;
use std::sync::Arc;

use crate::core::{
    CheckpointId, DestinationCatalog, DestinationRecord, DestinationStream, ImportMode,
    StreamDescriptor,
};

/// A stream descriptor without namespace.
#[must_use]
pub fn stream(name: &str) -> StreamDescriptor {
    StreamDescriptor::new(name)
}

/// A small record for `stream_name` at `checkpoint`.
#[must_use]
pub fn record(stream_name: &str, checkpoint: u64) -> DestinationRecord {
    DestinationRecord::new(stream(stream_name), json!({"checkpoint": checkpoint}), CheckpointId(checkpoint))
}

/// A record with an explicit serialized size.
#[must_use]
pub fn record_with_size(stream_name: &str, checkpoint: u64, size_bytes: u64) -> DestinationRecord {
    record(stream_name, checkpoint).with_size(size_bytes)
}

/// `count` records carrying `{"id": i}`, all at `checkpoint`.
#[must_use]
pub fn records(stream_name: &str, checkpoint: u64, count: usize) -> Vec<DestinationRecord> {
    (0..count)
        .map(|i| DestinationRecord::new(stream(stream_name), json!({"id": i}), CheckpointId(checkpoint)))
        .collect()
}

/// A dedupe stream keyed on the given top-level fields.
#[must_use]
pub fn dedupe_stream(name: &str, primary_key: &[&str]) -> DestinationStream {
    DestinationStream::new(stream(name)).with_import_mode(ImportMode::dedupe(primary_key.iter().copied()))
}

/// A catalog builder.
#[derive(Debug, Default)]
pub struct TestCatalog {
    streams: Vec<DestinationStream>,
}

impl TestCatalog {
    /// Creates an empty catalog builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an append stream.
    #[must_use]
    pub fn with_append(mut self, name: &str) -> Self {
        self.streams.push(DestinationStream::new(stream(name)));
        self
    }

    /// Adds a dedupe stream.
    #[must_use]
    pub fn with_dedupe(mut self, name: &str, primary_key: &[&str]) -> Self {
        self.streams.push(dedupe_stream(name, primary_key));
        self
    }

    /// Builds the catalog.
    #[must_use]
    pub fn build(self) -> Arc<DestinationCatalog> {
        Arc::new(DestinationCatalog::new(self.streams))
    }
}
