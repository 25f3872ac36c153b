//! The destination sink contract.
//!
//! Destination-specific writers implement [`DestinationSink`]. The pipeline
//! calls it once per completed batch and treats an error as fatal to the
//! calling task; any retrying is the sink's own business (see
//! [`RetryingSink`]).

mod retry;

pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, RetryingSink};

use crate::core::{DestinationRecord, StreamDescriptor};
use async_trait::async_trait;
use std::sync::Arc;

/// Writes batches of records to a destination.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DestinationSink: Send + Sync {
    /// Loads one batch for `stream`, built by worker `partition`.
    ///
    /// Returns normally once the records are durable.
    async fn load_batch(
        &self,
        stream: &StreamDescriptor,
        partition: usize,
        records: &[DestinationRecord],
    ) -> anyhow::Result<()>;
}

#[async_trait]
impl<S> DestinationSink for Arc<S>
where
    S: DestinationSink + ?Sized,
{
    async fn load_batch(
        &self,
        stream: &StreamDescriptor,
        partition: usize,
        records: &[DestinationRecord],
    ) -> anyhow::Result<()> {
        (**self).load_batch(stream, partition, records).await
    }
}
