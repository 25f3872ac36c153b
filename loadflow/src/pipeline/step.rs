//! A pipeline step: a named group of partition workers.

use crate::accumulator::BatchAccumulator;
use crate::config::DEFAULT_TARGET_BATCH_SIZE_BYTES;
use crate::core::{PipelineEvent, PipelineKey, StreamKey};
use crate::errors::Result;
use crate::flush::PipelineFlushStrategy;
use crate::observability::StepMetrics;
use crate::partition::OutputPartitioner;
use crate::queue::PartitionedQueue;
use crate::state::BatchUpdate;
use crate::task::{AccumulationTask, BoxedTask, StepOutput};
use std::sync::Arc;

/// One stage of a load pipeline.
pub trait LoadPipelineStep: Send + Sync {
    /// The step name, reported in updates and logs.
    fn name(&self) -> &str;

    /// How many partition workers the step runs.
    fn num_workers(&self) -> usize;

    /// Creates the worker for `partition`. Each partition is created once.
    fn task_for_partition(&self, partition: usize) -> Result<BoxedTask>;
}

type InputQueue<A> = PartitionedQueue<
    PipelineEvent<<A as BatchAccumulator>::Key, <A as BatchAccumulator>::Input>,
>;

struct StepRoute<A: BatchAccumulator, K2: PipelineKey> {
    partitioner: Arc<dyn OutputPartitioner<A::Key, A::Input, K2, A::Output>>,
    queue: Arc<PartitionedQueue<PipelineEvent<K2, A::Output>>>,
}

/// A step running one [`AccumulationTask`] per partition of its input queue.
pub struct AccumulateStep<A: BatchAccumulator, K2: PipelineKey = StreamKey> {
    name: String,
    accumulator: Arc<A>,
    input: Arc<InputQueue<A>>,
    output: Option<StepRoute<A, K2>>,
    updates: Arc<PartitionedQueue<BatchUpdate>>,
    flush_strategy: Arc<dyn PipelineFlushStrategy>,
    target_batch_size_bytes: u64,
    expected_eos_signals: usize,
    metrics: Arc<StepMetrics>,
}

impl<A: BatchAccumulator> AccumulateStep<A> {
    /// Creates a final step consuming `input`.
    pub fn new(
        name: impl Into<String>,
        accumulator: Arc<A>,
        input: Arc<InputQueue<A>>,
        updates: Arc<PartitionedQueue<BatchUpdate>>,
        flush_strategy: Arc<dyn PipelineFlushStrategy>,
    ) -> Self {
        Self {
            name: name.into(),
            accumulator,
            input,
            output: None,
            updates,
            flush_strategy,
            target_batch_size_bytes: DEFAULT_TARGET_BATCH_SIZE_BYTES,
            expected_eos_signals: 1,
            metrics: Arc::new(StepMetrics::default()),
        }
    }
}

impl<A: BatchAccumulator, K2: PipelineKey> AccumulateStep<A, K2> {
    /// Routes outputs into `queue`, the next step's input.
    #[must_use]
    pub fn with_output<K3: PipelineKey>(
        self,
        partitioner: Arc<dyn OutputPartitioner<A::Key, A::Input, K3, A::Output>>,
        queue: Arc<PartitionedQueue<PipelineEvent<K3, A::Output>>>,
    ) -> AccumulateStep<A, K3> {
        AccumulateStep {
            name: self.name,
            accumulator: self.accumulator,
            input: self.input,
            output: Some(StepRoute { partitioner, queue }),
            updates: self.updates,
            flush_strategy: self.flush_strategy,
            target_batch_size_bytes: self.target_batch_size_bytes,
            expected_eos_signals: self.expected_eos_signals,
            metrics: self.metrics,
        }
    }

    /// Sets the byte size at which a heartbeat flushes a batch.
    #[must_use]
    pub fn with_target_batch_size_bytes(mut self, bytes: u64) -> Self {
        self.target_batch_size_bytes = bytes;
        self
    }

    /// Sets the end-of-stream signals each worker waits for per stream.
    #[must_use]
    pub fn with_expected_eos_signals(mut self, signals: usize) -> Self {
        self.expected_eos_signals = signals;
        self
    }

    /// Shares `metrics` among the step's workers.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<StepMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl<A: BatchAccumulator, K2: PipelineKey> LoadPipelineStep for AccumulateStep<A, K2> {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_workers(&self) -> usize {
        self.input.num_partitions()
    }

    fn task_for_partition(&self, partition: usize) -> Result<BoxedTask> {
        let task = AccumulationTask::new(
            self.name.clone(),
            partition,
            Arc::clone(&self.accumulator),
            self.input.consume(partition)?,
            self.updates.writer(),
        )
        .with_flush_strategy(Arc::clone(&self.flush_strategy))
        .with_target_batch_size_bytes(self.target_batch_size_bytes)
        .with_expected_eos_signals(self.expected_eos_signals)
        .with_metrics(Arc::clone(&self.metrics));

        let task: BoxedTask = match &self.output {
            Some(route) => Box::new(task.with_output(StepOutput::new(
                Arc::clone(&route.partitioner),
                route.queue.writer(),
            ))),
            None => Box::new(task),
        };
        Ok(task)
    }
}

impl<A: BatchAccumulator, K2: PipelineKey> std::fmt::Debug for AccumulateStep<A, K2> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccumulateStep")
            .field("name", &self.name)
            .field("num_workers", &self.num_workers())
            .field("has_output", &self.output.is_some())
            .field("expected_eos_signals", &self.expected_eos_signals)
            .finish_non_exhaustive()
    }
}
