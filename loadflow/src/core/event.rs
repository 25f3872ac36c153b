//! Events flowing through each partition of a pipeline step.

use super::{CheckpointCounts, CheckpointId, Reservation, StreamDescriptor};

/// A value routed to an accumulation key, with its checkpoint accounting.
#[derive(Debug)]
pub struct PipelineMessage<K, T> {
    /// The accumulation key.
    pub key: K,
    /// The value handed to the accumulator.
    pub value: T,
    /// How many source records per checkpoint this value stands for.
    pub checkpoint_counts: CheckpointCounts,
    /// Serialized size of the value.
    pub size_bytes: u64,
    /// Memory held while the value is buffered.
    pub reservation: Option<Reservation>,
}

impl<K, T> PipelineMessage<K, T> {
    /// Creates a message with no checkpoint counts.
    pub fn new(key: K, value: T) -> Self {
        Self {
            key,
            value,
            checkpoint_counts: CheckpointCounts::new(),
            size_bytes: 0,
            reservation: None,
        }
    }

    /// Adds `count` records for checkpoint `id`.
    #[must_use]
    pub fn with_checkpoint(mut self, id: CheckpointId, count: u64) -> Self {
        *self.checkpoint_counts.entry(id).or_default() += count;
        self
    }

    /// Sets the serialized size.
    #[must_use]
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Attaches a reservation.
    #[must_use]
    pub fn with_reservation(mut self, reservation: Reservation) -> Self {
        self.reservation = Some(reservation);
        self
    }
}

/// One event of a partition's input stream.
#[derive(Debug)]
pub enum PipelineEvent<K, T> {
    /// A value to accumulate.
    Message(PipelineMessage<K, T>),
    /// Periodic, payload-less tick that re-evaluates time-based flush conditions.
    Heartbeat,
    /// No more values will arrive for this stream from the sender.
    EndOfStream {
        /// The finished stream.
        stream: StreamDescriptor,
    },
}

impl<K, T> PipelineEvent<K, T> {
    /// Wraps a message.
    pub fn message(message: PipelineMessage<K, T>) -> Self {
        Self::Message(message)
    }

    /// Creates an end-of-stream signal.
    pub fn end_of_stream(stream: StreamDescriptor) -> Self {
        Self::EndOfStream { stream }
    }

    /// Returns true for heartbeats.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }
}
