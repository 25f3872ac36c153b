//! # Loadflow
//!
//! Record batching, partitioning and checkpoint propagation for
//! destination connectors.
//!
//! A load pipeline takes records read from a source, routes them to a fixed
//! number of worker partitions, and accumulates them into batches per key.
//! Batches flush on size, age, end-of-stream or at the accumulator's request,
//! and every flushed batch reports how many records of each source
//! checkpoint it carried. Those reports let the host acknowledge a
//! checkpoint only once all of its records are durable.
//!
//! - **Partitioning**: round-robin, by stream, or by primary key for dedupe
//!   streams
//! - **Accumulators**: direct loaders, in-memory buffers and sink loads
//! - **Steps**: one worker per partition, chained through bounded queues
//! - **State**: batch state updates and end-of-stream reports, aggregated
//!   by a [`state::CheckpointTracker`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use loadflow::prelude::*;
//!
//! let mut built = LoadPipelineBuilder::new(LoadPipelineConfig::default())?
//!     .buffered_load(Arc::new(MySink::new()))?;
//!
//! let tracker = Arc::new(built.checkpoint_tracker());
//! let mut launcher = TaskLauncher::new();
//! built.pipeline.start(&mut launcher)?;
//!
//! built.input.publish_record(record).await?;
//! built.input.end_of_stream(&stream).await?;
//! built.input.close();
//! launcher.join().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod accumulator;
pub mod config;
pub mod core;
pub mod errors;
pub mod flush;
pub mod observability;
pub mod partition;
pub mod pipeline;
pub mod queue;
pub mod sink;
pub mod state;
pub mod task;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::accumulator::{
        AccumulatorResult, BatchAccumulator, DirectLoader, DirectLoaderFactory,
        LoadBatchAccumulator, RecordBufferAccumulator,
    };
    pub use crate::config::LoadPipelineConfig;
    pub use crate::core::{
        BatchState, CheckpointId, DestinationCatalog, DestinationRecord, DestinationStream,
        ImportMode, MemoryBudget, PipelineEvent, PipelineMessage, StreamDescriptor, StreamKey,
    };
    pub use crate::errors::{ConfigError, LoadflowError, Result};
    pub use crate::flush::{
        DefaultPipelineFlushStrategy, PipelineFlushStrategy, RecordCountFlushStrategy,
    };
    pub use crate::observability::{init_logging, LogConfig, PipelineMetrics};
    pub use crate::partition::{
        ByPrimaryKeyInputPartitioner, ByStreamInputPartitioner, InputPartitioner,
        OutputPartitioner, RoundRobinInputPartitioner,
    };
    pub use crate::pipeline::{BuiltPipeline, LoadPipeline, LoadPipelineBuilder, LoadPipelineStep};
    pub use crate::queue::{HeartbeatTicker, PipelineInput};
    pub use crate::sink::{DestinationSink, RetryingSink};
    pub use crate::state::{BatchUpdate, CheckpointTracker};
    pub use crate::task::{CancellationToken, TaskLauncher};
}
