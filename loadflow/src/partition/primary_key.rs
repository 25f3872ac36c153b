//! Partitioning by primary key for dedupe streams.

use super::hashing::{bucket, stable_hash};
use super::InputPartitioner;
use crate::core::{DestinationCatalog, DestinationRecord};
use crate::errors::ConfigError;
use rand::Rng;
use std::sync::Arc;

/// Co-locates records sharing a primary key on dedupe streams.
///
/// Last-write-wins merging downstream requires every version of a key to
/// land on one worker. Streams that are not deduped need no ordering, so
/// their records are spread randomly.
#[derive(Debug, Clone)]
pub struct ByPrimaryKeyInputPartitioner {
    catalog: Arc<DestinationCatalog>,
}

impl ByPrimaryKeyInputPartitioner {
    /// Creates the partitioner, rejecting dedupe streams without a primary key.
    pub fn new(catalog: Arc<DestinationCatalog>) -> Result<Self, ConfigError> {
        catalog.validate()?;
        Ok(Self { catalog })
    }
}

impl InputPartitioner for ByPrimaryKeyInputPartitioner {
    fn get_partition(&self, record: &DestinationRecord, num_parts: usize) -> usize {
        if num_parts <= 1 {
            return 0;
        }

        let primary_key = match self.catalog.get(&record.stream) {
            Some(stream) if stream.import_mode.is_dedupe() => stream.import_mode.primary_key(),
            _ => return rand::thread_rng().gen_range(0..num_parts),
        };

        // Absent fields hash as null.
        let values = primary_key.iter().map(|path| {
            record
                .field(path)
                .map_or_else(|| "null".to_string(), serde_json::Value::to_string)
        });

        bucket(stable_hash(values), num_parts)
    }
}
