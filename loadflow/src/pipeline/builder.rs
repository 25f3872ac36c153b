//! Assembly of the provided pipeline shapes.
//!
//! - **direct load**: one step feeding each stream to a [`DirectLoader`].
//! - **buffered load**: one step buffering records and loading them through
//!   a [`DestinationSink`] when a batch flushes.
//! - **accumulate then load**: a buffering step whose staged batches are
//!   handed, on the same partition, to a load step through a bounded queue.
//!
//! [`DirectLoader`]: crate::accumulator::DirectLoader

use super::{AccumulateStep, LoadPipeline, LoadPipelineStep};
use crate::accumulator::{
    DirectLoadRecordAccumulator, DirectLoaderFactory, LoadBatchAccumulator, RecordBatch,
    RecordBufferAccumulator,
};
use crate::config::LoadPipelineConfig;
use crate::core::{
    DestinationCatalog, DestinationRecord, MemoryBudget, PartitionedStreamKey, PipelineEvent,
    StreamKey,
};
use crate::errors::Result;
use crate::flush::PipelineFlushStrategy;
use crate::observability::PipelineMetrics;
use crate::partition::{
    ByPrimaryKeyInputPartitioner, InputPartitioner, RoundRobinInputPartitioner,
    SamePartOutputPartitioner,
};
use crate::queue::{CloseableQueue, HeartbeatTicker, PartitionedQueue, PipelineInput};
use crate::sink::DestinationSink;
use crate::state::{BatchUpdate, CheckpointTracker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Name of the single step of a direct-load pipeline.
pub const STEP_DIRECT_LOAD: &str = "direct-load";
/// Name of the buffering step.
pub const STEP_ACCUMULATE: &str = "accumulate";
/// Name of the step that writes to the destination.
pub const STEP_LOAD: &str = "load";

/// Builds a [`LoadPipeline`] together with its input and update queues.
pub struct LoadPipelineBuilder {
    config: LoadPipelineConfig,
    partitioner: Option<Arc<dyn InputPartitioner>>,
    metrics: Arc<PipelineMetrics>,
}

impl LoadPipelineBuilder {
    /// Creates a builder, rejecting invalid settings.
    pub fn new(config: LoadPipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            partitioner: None,
            metrics: PipelineMetrics::new(),
        })
    }

    /// Routes input records with `partitioner` instead of round-robin.
    #[must_use]
    pub fn with_input_partitioner(mut self, partitioner: Arc<dyn InputPartitioner>) -> Self {
        self.partitioner = Some(partitioner);
        self
    }

    /// Routes dedupe streams by primary key so duplicates meet on one worker.
    pub fn with_catalog(self, catalog: Arc<DestinationCatalog>) -> Result<Self> {
        let partitioner = ByPrimaryKeyInputPartitioner::new(catalog)?;
        Ok(self.with_input_partitioner(Arc::new(partitioner)))
    }

    /// Reports into an existing metrics registry.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// One step handing records to loaders created by `factory`.
    pub fn direct_load<F: DirectLoaderFactory>(self, factory: F) -> Result<BuiltPipeline> {
        let parts = self.parts();
        let step = AccumulateStep::new(
            STEP_DIRECT_LOAD,
            Arc::new(DirectLoadRecordAccumulator::new(factory)),
            Arc::clone(&parts.input),
            Arc::clone(&parts.updates),
            Arc::clone(&parts.flush_strategy),
        )
        .with_target_batch_size_bytes(self.config.target_batch_size_bytes)
        .with_metrics(self.metrics.step(STEP_DIRECT_LOAD));

        let steps: Vec<Box<dyn LoadPipelineStep>> = vec![Box::new(step)];
        self.finish(parts, steps, Vec::new(), STEP_DIRECT_LOAD, self.config.num_partitions)
    }

    /// One step buffering records per stream and loading them through `sink`.
    pub fn buffered_load<D: DestinationSink + 'static>(self, sink: Arc<D>) -> Result<BuiltPipeline> {
        let parts = self.parts();
        let accumulator: LoadBatchAccumulator<D, StreamKey, DestinationRecord> = LoadBatchAccumulator::new(sink);
        let step = AccumulateStep::new(
            STEP_LOAD,
            Arc::new(accumulator),
            Arc::clone(&parts.input),
            Arc::clone(&parts.updates),
            Arc::clone(&parts.flush_strategy),
        )
        .with_target_batch_size_bytes(self.config.target_batch_size_bytes)
        .with_metrics(self.metrics.step(STEP_LOAD));

        let steps: Vec<Box<dyn LoadPipelineStep>> = vec![Box::new(step)];
        self.finish(parts, steps, Vec::new(), STEP_LOAD, self.config.num_partitions)
    }

    /// Buffers records into staged batches, then loads each batch through
    /// `sink` on the load worker matching the partition that built it.
    pub fn accumulate_then_load<D: DestinationSink + 'static>(
        self,
        sink: Arc<D>,
    ) -> Result<BuiltPipeline> {
        let parts = self.parts();
        let num_load_workers = self.config.num_load_workers;
        let staged = PartitionedQueue::<PipelineEvent<PartitionedStreamKey, RecordBatch>>::new(
            "staged",
            num_load_workers,
            self.config.stage_queue_capacity,
        );

        let accumulate = AccumulateStep::new(
            STEP_ACCUMULATE,
            Arc::new(RecordBufferAccumulator::new(self.config.target_batch_size_bytes)),
            Arc::clone(&parts.input),
            Arc::clone(&parts.updates),
            Arc::clone(&parts.flush_strategy),
        )
        .with_output::<PartitionedStreamKey>(Arc::new(SamePartOutputPartitioner), Arc::clone(&staged))
        .with_target_batch_size_bytes(self.config.target_batch_size_bytes)
        .with_metrics(self.metrics.step(STEP_ACCUMULATE));

        let loader: LoadBatchAccumulator<D, PartitionedStreamKey, RecordBatch> =
            LoadBatchAccumulator::new(sink).with_max_inputs(1);
        let load = AccumulateStep::new(
            STEP_LOAD,
            Arc::new(loader),
            Arc::clone(&staged),
            Arc::clone(&parts.updates),
            Arc::clone(&parts.flush_strategy),
        )
        .with_target_batch_size_bytes(self.config.target_batch_size_bytes)
        .with_expected_eos_signals(self.config.num_partitions)
        .with_metrics(self.metrics.step(STEP_LOAD));

        let steps: Vec<Box<dyn LoadPipelineStep>> = vec![Box::new(accumulate), Box::new(load)];
        let queues: Vec<Arc<dyn CloseableQueue>> = vec![staged];
        self.finish(parts, steps, queues, STEP_LOAD, num_load_workers)
    }

    fn parts(&self) -> Parts {
        Parts {
            input: PartitionedQueue::new(
                "input",
                self.config.num_partitions,
                self.config.input_queue_capacity,
            ),
            updates: PartitionedQueue::new("updates", 1, self.config.update_queue_capacity),
            flush_strategy: Arc::new(self.config.flush_strategy()),
        }
    }

    fn finish(
        &self,
        parts: Parts,
        steps: Vec<Box<dyn LoadPipelineStep>>,
        queues: Vec<Arc<dyn CloseableQueue>>,
        final_step: &str,
        final_step_workers: usize,
    ) -> Result<BuiltPipeline> {
        let sync_id = Uuid::new_v4();
        let partitioner: Arc<dyn InputPartitioner> = match &self.partitioner {
            Some(partitioner) => Arc::clone(partitioner),
            None => Arc::new(RoundRobinInputPartitioner::new(self.config.round_robin_rotate_every_n)),
        };
        let memory_budget = self.config.memory_budget_bytes.map(MemoryBudget::new);

        let mut input = PipelineInput::new(parts.input.writer(), partitioner);
        if let Some(budget) = &memory_budget {
            input = input.with_memory_budget(Arc::clone(budget));
        }

        let updates = parts.updates.consume(0)?;

        info!(
            %sync_id,
            steps = steps.len(),
            final_step,
            num_partitions = self.config.num_partitions,
            "Built load pipeline"
        );

        Ok(BuiltPipeline {
            sync_id,
            pipeline: LoadPipeline::new(steps, queues),
            input,
            updates,
            metrics: Arc::clone(&self.metrics),
            memory_budget,
            final_step: final_step.to_string(),
            final_step_workers,
            heartbeat_interval: self.config.heartbeat_interval(),
        })
    }
}

struct Parts {
    input: Arc<PartitionedQueue<PipelineEvent<StreamKey, DestinationRecord>>>,
    updates: Arc<PartitionedQueue<BatchUpdate>>,
    flush_strategy: Arc<dyn PipelineFlushStrategy>,
}

impl std::fmt::Debug for LoadPipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadPipelineBuilder")
            .field("config", &self.config)
            .field("partitioner", &self.partitioner)
            .finish_non_exhaustive()
    }
}

/// A pipeline ready to start, with the handles a host needs to drive it.
#[derive(Debug)]
pub struct BuiltPipeline {
    /// Identifies this run in logs.
    pub sync_id: Uuid,
    /// The steps to launch.
    pub pipeline: LoadPipeline,
    /// Where source records go in.
    pub input: PipelineInput,
    /// Every batch state update and end-of-stream report, in publish order.
    pub updates: mpsc::Receiver<BatchUpdate>,
    /// Per-step counters.
    pub metrics: Arc<PipelineMetrics>,
    /// The budget input records reserve from, if bounded.
    pub memory_budget: Option<Arc<MemoryBudget>>,
    /// Name of the step whose updates mark records durable.
    pub final_step: String,
    /// Workers of the final step; a stream is complete once each reported it.
    pub final_step_workers: usize,
    heartbeat_interval: Duration,
}

impl BuiltPipeline {
    /// A tracker that counts end-of-stream reports from the final step.
    #[must_use]
    pub fn checkpoint_tracker(&self) -> CheckpointTracker {
        CheckpointTracker::new(self.final_step.clone())
    }

    /// Starts sending heartbeats into the input at the configured interval.
    #[must_use]
    pub fn start_heartbeat(&self) -> HeartbeatTicker {
        HeartbeatTicker::spawn(self.input.writer(), self.heartbeat_interval)
    }
}
