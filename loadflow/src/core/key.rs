//! Accumulation keys.

use super::StreamDescriptor;
use std::fmt::Debug;
use std::hash::Hash;

/// Anything that belongs to exactly one stream.
pub trait WithStream {
    /// Returns the stream.
    fn stream(&self) -> &StreamDescriptor;
}

impl WithStream for StreamDescriptor {
    fn stream(&self) -> &StreamDescriptor {
        self
    }
}

/// Bounds every accumulation key satisfies.
pub trait PipelineKey: WithStream + Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> PipelineKey for T where T: WithStream + Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Groups by stream only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey(pub StreamDescriptor);

impl WithStream for StreamKey {
    fn stream(&self) -> &StreamDescriptor {
        &self.0
    }
}

impl From<StreamDescriptor> for StreamKey {
    fn from(stream: StreamDescriptor) -> Self {
        Self(stream)
    }
}

/// Groups by stream and the partition that produced the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionedStreamKey {
    /// The stream.
    pub stream: StreamDescriptor,
    /// The upstream partition.
    pub part: usize,
}

impl WithStream for PartitionedStreamKey {
    fn stream(&self) -> &StreamDescriptor {
        &self.stream
    }
}
