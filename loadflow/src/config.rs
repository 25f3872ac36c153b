//! Pipeline configuration with defaults for every setting.
//!
//! ```
//! use loadflow::config::LoadPipelineConfig;
//!
//! let config = LoadPipelineConfig::from_json_str(r#"{"num_partitions": 4}"#).unwrap();
//! assert_eq!(config.num_partitions, 4);
//! assert_eq!(config.num_load_workers, 1);
//! ```

use crate::errors::{ConfigError, LoadflowError, Result};
use crate::flush::DefaultPipelineFlushStrategy;
use crate::observability::LogConfig;
use crate::partition::DEFAULT_ROTATE_EVERY_N;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bytes at which a heartbeat flushes a batch regardless of its age.
pub const DEFAULT_TARGET_BATCH_SIZE_BYTES: u64 = 200 * 1024 * 1024;

/// Longest a non-empty batch waits for a flush.
pub const DEFAULT_MAX_TIME_WITHOUT_FLUSH_MS: u64 = 15 * 60 * 1000;

/// Interval between heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 60 * 1000;

/// Settings for assembling and running a load pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadPipelineConfig {
    /// Workers of the first step.
    pub num_partitions: usize,
    /// Workers of the load step in a two-step pipeline.
    pub num_load_workers: usize,
    /// Capacity of each input partition.
    pub input_queue_capacity: usize,
    /// Capacity of each partition between steps.
    pub stage_queue_capacity: usize,
    /// Capacity of the update queue.
    pub update_queue_capacity: usize,
    /// Byte size at which a heartbeat flushes a batch.
    pub target_batch_size_bytes: u64,
    /// Age at which a heartbeat flushes a non-empty batch.
    pub max_time_without_flush_ms: u64,
    /// Flush every non-empty batch on each heartbeat.
    pub micro_batch_override: bool,
    /// Records per partition before the round-robin partitioner rotates.
    pub round_robin_rotate_every_n: u64,
    /// Interval between heartbeats.
    pub heartbeat_interval_ms: u64,
    /// Bytes of records that may be buffered at once. Unbounded if unset.
    pub memory_budget_bytes: Option<u64>,
    /// Logging.
    pub log: LogConfig,
}

impl Default for LoadPipelineConfig {
    fn default() -> Self {
        Self {
            num_partitions: 1,
            num_load_workers: 1,
            input_queue_capacity: 1024,
            stage_queue_capacity: 16,
            update_queue_capacity: 1024,
            target_batch_size_bytes: DEFAULT_TARGET_BATCH_SIZE_BYTES,
            max_time_without_flush_ms: DEFAULT_MAX_TIME_WITHOUT_FLUSH_MS,
            micro_batch_override: false,
            round_robin_rotate_every_n: DEFAULT_ROTATE_EVERY_N,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            memory_budget_bytes: None,
            log: LogConfig::default(),
        }
    }
}

impl LoadPipelineConfig {
    /// Parses a JSON document; absent settings take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects zero counts, capacities and intervals, and a memory budget
    /// too small to hold one full batch.
    ///
    /// Open batches keep their records' reservations until they flush, so a
    /// budget below the target batch size would block the input until the
    /// age limit flushes something.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("num_partitions", self.num_partitions as u64),
            ("num_load_workers", self.num_load_workers as u64),
            ("input_queue_capacity", self.input_queue_capacity as u64),
            ("stage_queue_capacity", self.stage_queue_capacity as u64),
            ("update_queue_capacity", self.update_queue_capacity as u64),
            ("target_batch_size_bytes", self.target_batch_size_bytes),
            ("round_robin_rotate_every_n", self.round_robin_rotate_every_n),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
        ];
        if let Some((setting, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::must_be_positive(setting));
        }
        match self.memory_budget_bytes {
            Some(0) => Err(ConfigError::must_be_positive("memory_budget_bytes")),
            Some(budget) if budget < self.target_batch_size_bytes => Err(
                ConfigError::budget_below_batch_size(budget, self.target_batch_size_bytes),
            ),
            _ => Ok(()),
        }
    }

    /// The heartbeat flush strategy these settings describe.
    #[must_use]
    pub fn flush_strategy(&self) -> DefaultPipelineFlushStrategy {
        DefaultPipelineFlushStrategy::new(self.micro_batch_override, self.max_time_without_flush_ms)
    }

    /// The heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Sets the first step's worker count.
    #[must_use]
    pub fn with_num_partitions(mut self, num_partitions: usize) -> Self {
        self.num_partitions = num_partitions;
        self
    }

    /// Sets the load step's worker count.
    #[must_use]
    pub fn with_num_load_workers(mut self, num_load_workers: usize) -> Self {
        self.num_load_workers = num_load_workers;
        self
    }

    /// Sets the capacity of each input partition.
    #[must_use]
    pub fn with_input_queue_capacity(mut self, capacity: usize) -> Self {
        self.input_queue_capacity = capacity;
        self
    }

    /// Sets the capacity of each partition between steps.
    #[must_use]
    pub fn with_stage_queue_capacity(mut self, capacity: usize) -> Self {
        self.stage_queue_capacity = capacity;
        self
    }

    /// Sets the target batch size.
    #[must_use]
    pub fn with_target_batch_size_bytes(mut self, bytes: u64) -> Self {
        self.target_batch_size_bytes = bytes;
        self
    }

    /// Sets the flush age.
    #[must_use]
    pub fn with_max_time_without_flush_ms(mut self, ms: u64) -> Self {
        self.max_time_without_flush_ms = ms;
        self
    }

    /// Enables micro-batching.
    #[must_use]
    pub fn with_micro_batch_override(mut self, enabled: bool) -> Self {
        self.micro_batch_override = enabled;
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    /// Bounds buffered bytes.
    #[must_use]
    pub fn with_memory_budget_bytes(mut self, bytes: u64) -> Self {
        self.memory_budget_bytes = Some(bytes);
        self
    }
}

impl std::str::FromStr for LoadPipelineConfig {
    type Err = LoadflowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flush::PipelineFlushStrategy;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = LoadPipelineConfig::default();
        assert_eq!(config.target_batch_size_bytes, 209_715_200);
        assert_eq!(config.max_time_without_flush_ms, 900_000);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = LoadPipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, LoadPipelineConfig::default());
    }

    #[test]
    fn test_zero_rejected() {
        let err = LoadPipelineConfig::from_json_str(r#"{"stage_queue_capacity": 0}"#).unwrap_err();
        assert!(err.to_string().contains("stage_queue_capacity"));

        let err = LoadPipelineConfig::default()
            .with_memory_budget_bytes(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.code, "CONFIG-ZERO");
    }

    #[test]
    fn test_budget_must_hold_a_full_batch() {
        let err = LoadPipelineConfig::default()
            .with_memory_budget_bytes(100)
            .validate()
            .unwrap_err();
        assert_eq!(err.code, "CONFIG-BUDGET-TOO-SMALL");

        let err = LoadPipelineConfig::from_json_str(
            r#"{"memory_budget_bytes": 4096, "target_batch_size_bytes": 8192}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "config");

        let config = LoadPipelineConfig::default()
            .with_target_batch_size_bytes(1024)
            .with_memory_budget_bytes(1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flush_strategy_follows_override() {
        let config = LoadPipelineConfig::default().with_micro_batch_override(true);
        assert!(config.flush_strategy().should_flush(1, 0));
        assert!(!LoadPipelineConfig::default().flush_strategy().should_flush(1, 0));
    }

    #[test]
    fn test_unknown_json_is_error() {
        let result: Result<LoadPipelineConfig> = "not json".parse();
        assert!(matches!(result, Err(LoadflowError::Serialization(_))));
    }
}
