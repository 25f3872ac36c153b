//! The accumulation task: one per partition of a pipeline step.
//!
//! The task folds the events of its input channel into per-key open batches.
//! Each batch is flushed when the accumulator completes it, when a heartbeat
//! finds it due (by flush strategy or byte size), or when its stream ends.
//! A flushed batch is forwarded to the next step, if there is one, and
//! reported on the update queue with the checkpoint counts it carries.

use super::Task;
use crate::accumulator::{AccumulatorResult, BatchAccumulator, WithBatchState};
use crate::config::{DEFAULT_MAX_TIME_WITHOUT_FLUSH_MS, DEFAULT_TARGET_BATCH_SIZE_BYTES};
use crate::core::{
    merge_checkpoint_counts, CheckpointCounts, PipelineEvent, PipelineKey, PipelineMessage,
    Reservation, StreamDescriptor, StreamKey, WithStream,
};
use crate::errors::Result;
use crate::flush::{DefaultPipelineFlushStrategy, PipelineFlushStrategy};
use crate::observability::StepMetrics;
use crate::partition::OutputPartitioner;
use crate::queue::QueueWriter;
use crate::state::{BatchEndOfStream, BatchStateUpdate, BatchUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Why a batch was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushTrigger {
    /// The flush strategy found the batch due on a heartbeat.
    Policy,
    /// The batch reached the target byte size.
    Size,
    /// The batch's stream ended.
    EndOfStream,
    /// The accumulator completed the batch while accepting an input.
    Accumulator,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Policy => write!(f, "policy"),
            Self::Size => write!(f, "size"),
            Self::EndOfStream => write!(f, "end_of_stream"),
            Self::Accumulator => write!(f, "accumulator"),
        }
    }
}

/// Where a step sends its outputs.
pub struct StepOutput<A: BatchAccumulator, K2: PipelineKey> {
    partitioner: Arc<dyn OutputPartitioner<A::Key, A::Input, K2, A::Output>>,
    writer: QueueWriter<PipelineEvent<K2, A::Output>>,
}

impl<A: BatchAccumulator, K2: PipelineKey> StepOutput<A, K2> {
    /// Routes outputs through `partitioner` into the queue behind `writer`.
    pub fn new(
        partitioner: Arc<dyn OutputPartitioner<A::Key, A::Input, K2, A::Output>>,
        writer: QueueWriter<PipelineEvent<K2, A::Output>>,
    ) -> Self {
        Self { partitioner, writer }
    }
}

struct BatchTally {
    input_count: u64,
    input_size_bytes: u64,
    started_at: Instant,
    checkpoint_counts: CheckpointCounts,
    reservation: Reservation,
}

impl BatchTally {
    fn new() -> Self {
        Self {
            input_count: 0,
            input_size_bytes: 0,
            started_at: Instant::now(),
            checkpoint_counts: CheckpointCounts::new(),
            reservation: Reservation::empty(),
        }
    }

    fn age_ms(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.started_at).as_millis()).unwrap_or(u64::MAX)
    }
}

struct OpenBatch<S> {
    state: S,
    tally: BatchTally,
}

/// Runs one partition of a step.
pub struct AccumulationTask<A: BatchAccumulator, K2: PipelineKey = StreamKey> {
    name: String,
    partition: usize,
    accumulator: Arc<A>,
    flush_strategy: Arc<dyn PipelineFlushStrategy>,
    target_batch_size_bytes: u64,
    expected_eos_signals: usize,
    input: mpsc::Receiver<PipelineEvent<A::Key, A::Input>>,
    output: Option<StepOutput<A, K2>>,
    updates: QueueWriter<BatchUpdate>,
    metrics: Arc<StepMetrics>,
    open: HashMap<A::Key, OpenBatch<A::State>>,
    eos_seen: HashMap<StreamDescriptor, usize>,
    stream_counts: HashMap<StreamDescriptor, u64>,
}

impl<A: BatchAccumulator> AccumulationTask<A> {
    /// Creates a task of the final step (no output queue).
    pub fn new(
        name: impl Into<String>,
        partition: usize,
        accumulator: Arc<A>,
        input: mpsc::Receiver<PipelineEvent<A::Key, A::Input>>,
        updates: QueueWriter<BatchUpdate>,
    ) -> Self {
        Self {
            name: name.into(),
            partition,
            accumulator,
            flush_strategy: Arc::new(DefaultPipelineFlushStrategy::new(
                false,
                DEFAULT_MAX_TIME_WITHOUT_FLUSH_MS,
            )),
            target_batch_size_bytes: DEFAULT_TARGET_BATCH_SIZE_BYTES,
            expected_eos_signals: 1,
            input,
            output: None,
            updates,
            metrics: Arc::new(StepMetrics::default()),
            open: HashMap::new(),
            eos_seen: HashMap::new(),
            stream_counts: HashMap::new(),
        }
    }
}

impl<A: BatchAccumulator, K2: PipelineKey> AccumulationTask<A, K2> {
    /// Forwards flushed outputs to the next step.
    #[must_use]
    pub fn with_output<K3: PipelineKey>(self, output: StepOutput<A, K3>) -> AccumulationTask<A, K3> {
        AccumulationTask {
            name: self.name,
            partition: self.partition,
            accumulator: self.accumulator,
            flush_strategy: self.flush_strategy,
            target_batch_size_bytes: self.target_batch_size_bytes,
            expected_eos_signals: self.expected_eos_signals,
            input: self.input,
            output: Some(output),
            updates: self.updates,
            metrics: self.metrics,
            open: self.open,
            eos_seen: self.eos_seen,
            stream_counts: self.stream_counts,
        }
    }

    /// Sets the heartbeat flush strategy.
    #[must_use]
    pub fn with_flush_strategy(mut self, strategy: Arc<dyn PipelineFlushStrategy>) -> Self {
        self.flush_strategy = strategy;
        self
    }

    /// Sets the byte size at which a heartbeat flushes a batch regardless of strategy.
    #[must_use]
    pub fn with_target_batch_size_bytes(mut self, bytes: u64) -> Self {
        self.target_batch_size_bytes = bytes;
        self
    }

    /// Sets how many end-of-stream signals finish a stream (the upstream worker count).
    #[must_use]
    pub fn with_expected_eos_signals(mut self, signals: usize) -> Self {
        self.expected_eos_signals = signals.max(1);
        self
    }

    /// Shares the step's metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<StepMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    async fn run(&mut self) -> Result<()> {
        info!(task = %self.name, partition = self.partition, "Accumulation task started");

        while let Some(event) = self.input.recv().await {
            match event {
                PipelineEvent::Message(message) => self.on_message(message).await?,
                PipelineEvent::Heartbeat => self.on_heartbeat().await?,
                PipelineEvent::EndOfStream { stream } => self.on_end_of_stream(stream).await?,
            }
        }

        let abandoned = self.open.len();
        for (_, batch) in self.open.drain() {
            batch.tally.reservation.release();
        }
        info!(
            task = %self.name,
            partition = self.partition,
            abandoned_batches = abandoned,
            "Input closed, accumulation task finished"
        );
        Ok(())
    }

    async fn on_message(&mut self, message: PipelineMessage<A::Key, A::Input>) -> Result<()> {
        let PipelineMessage {
            key,
            value,
            checkpoint_counts,
            size_bytes,
            reservation,
        } = message;

        let (state, mut tally) = match self.open.remove(&key) {
            Some(batch) => (batch.state, batch.tally),
            None => (self.accumulator.start(&key, self.partition).await?, BatchTally::new()),
        };

        merge_checkpoint_counts(&mut tally.checkpoint_counts, &checkpoint_counts);
        tally.input_count += 1;
        tally.input_size_bytes += size_bytes;
        if let Some(reservation) = reservation {
            tally.reservation = std::mem::take(&mut tally.reservation).merge(reservation)?;
        }
        *self.stream_counts.entry(key.stream().clone()).or_default() += 1;
        self.metrics.record_input(size_bytes);

        match self.accumulator.accept(value, state).await? {
            AccumulatorResult::Incomplete(state) => {
                self.open.insert(key, OpenBatch { state, tally });
                Ok(())
            }
            AccumulatorResult::Complete(output) => {
                self.complete(&key, output, tally, FlushTrigger::Accumulator).await
            }
        }
    }

    async fn on_heartbeat(&mut self) -> Result<()> {
        let now = Instant::now();
        let due: Vec<(A::Key, FlushTrigger)> = self
            .open
            .iter()
            .filter_map(|(key, batch)| {
                let tally = &batch.tally;
                if tally.input_size_bytes >= self.target_batch_size_bytes {
                    Some((key.clone(), FlushTrigger::Size))
                } else if self
                    .flush_strategy
                    .should_flush(tally.input_count, tally.age_ms(now))
                {
                    Some((key.clone(), FlushTrigger::Policy))
                } else {
                    None
                }
            })
            .collect();

        for (key, trigger) in due {
            self.flush(&key, trigger).await?;
        }
        Ok(())
    }

    async fn on_end_of_stream(&mut self, stream: StreamDescriptor) -> Result<()> {
        let seen = self.eos_seen.entry(stream.clone()).or_default();
        *seen += 1;
        let seen = *seen;

        if seen < self.expected_eos_signals {
            debug!(
                task = %self.name,
                partition = self.partition,
                stream = %stream,
                seen,
                expected = self.expected_eos_signals,
                "Waiting for remaining end-of-stream signals"
            );
            return Ok(());
        }
        if seen > self.expected_eos_signals {
            warn!(task = %self.name, partition = self.partition, stream = %stream, "Duplicate end of stream ignored");
            return Ok(());
        }

        let keys: Vec<A::Key> = self
            .open
            .keys()
            .filter(|key| key.stream() == &stream)
            .cloned()
            .collect();
        for key in keys {
            self.flush(&key, FlushTrigger::EndOfStream).await?;
        }

        let total_input_count = self.stream_counts.get(&stream).copied().unwrap_or(0);
        info!(
            task = %self.name,
            partition = self.partition,
            stream = %stream,
            total_input_count,
            "Stream finished"
        );
        self.metrics.record_stream_finished();
        self.updates
            .publish(
                BatchUpdate::EndOfStream(BatchEndOfStream {
                    stream: stream.clone(),
                    task_name: self.name.clone(),
                    partition: self.partition,
                    total_input_count,
                }),
                0,
            )
            .await?;

        if let Some(next) = &self.output {
            next.writer
                .broadcast(|| PipelineEvent::end_of_stream(stream.clone()))
                .await?;
        }
        Ok(())
    }

    async fn flush(&mut self, key: &A::Key, trigger: FlushTrigger) -> Result<()> {
        let Some(batch) = self.open.remove(key) else {
            return Ok(());
        };
        let output = self.accumulator.finish(batch.state).await?;
        self.complete(key, output, batch.tally, trigger).await
    }

    async fn complete(
        &mut self,
        key: &A::Key,
        output: A::Output,
        tally: BatchTally,
        trigger: FlushTrigger,
    ) -> Result<()> {
        let state = output.batch_state();
        let BatchTally {
            input_count,
            input_size_bytes,
            checkpoint_counts,
            reservation,
            ..
        } = tally;

        debug!(
            task = %self.name,
            partition = self.partition,
            stream = %key.stream(),
            %trigger,
            %state,
            input_count,
            input_size_bytes,
            "Flushed batch"
        );
        self.metrics.record_flush(trigger, input_size_bytes);

        let update = BatchStateUpdate {
            stream: key.stream().clone(),
            checkpoint_counts: checkpoint_counts.clone(),
            state,
            task_name: self.name.clone(),
            partition: self.partition,
            input_count,
        };

        match &self.output {
            Some(next) => {
                let output_key = next.partitioner.get_output_key(key, &output);
                let part = next
                    .partitioner
                    .get_part(&output_key, next.writer.num_partitions());
                let message = PipelineMessage {
                    key: output_key,
                    value: output,
                    checkpoint_counts,
                    size_bytes: input_size_bytes,
                    reservation: Some(reservation),
                };
                next.writer.publish(PipelineEvent::message(message), part).await?;
            }
            None => {
                reservation.release();
            }
        }

        self.updates.publish(BatchUpdate::State(update), 0).await
    }
}

#[async_trait]
impl<A: BatchAccumulator, K2: PipelineKey> Task for AccumulationTask<A, K2> {
    fn name(&self) -> &str {
        &self.name
    }

    fn partition(&self) -> usize {
        self.partition
    }

    async fn execute(self: Box<Self>) -> Result<()> {
        let mut task = *self;
        let result = task.run().await;
        if let Err(e) = &result {
            if e.is_sink_failure() {
                task.metrics.record_sink_failure();
            }
            error!(
                task = %task.name,
                partition = task.partition,
                open_batches = task.open.len(),
                error = %e,
                "Accumulation task failed"
            );
        }
        result
    }
}

impl<A: BatchAccumulator, K2: PipelineKey> fmt::Debug for AccumulationTask<A, K2> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumulationTask")
            .field("name", &self.name)
            .field("partition", &self.partition)
            .field("target_batch_size_bytes", &self.target_batch_size_bytes)
            .field("expected_eos_signals", &self.expected_eos_signals)
            .field("has_output", &self.output.is_some())
            .field("open_batches", &self.open.len())
            .finish_non_exhaustive()
    }
}
