//! Bounded-attempt retries around a destination sink.

use super::DestinationSink;
use crate::core::{DestinationRecord, StreamDescriptor};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for sink retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Delay before retry number `retry` (0 for the first retry).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_ms;
        let delay = match self.backoff {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(retry)),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry) + 1),
            BackoffStrategy::Constant => base,
        }
        .min(self.max_delay_ms);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full if delay == 0 => 0,
            JitterStrategy::Full => rand::thread_rng().gen_range(0..=delay),
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Wraps a sink with a bounded number of attempts per batch.
///
/// After the last attempt the final error is returned and the pipeline task
/// fails.
#[derive(Debug)]
pub struct RetryingSink<S> {
    inner: S,
    config: RetryConfig,
}

impl<S> RetryingSink<S> {
    /// Wraps `inner`.
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Returns the wrapped sink.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S> DestinationSink for RetryingSink<S>
where
    S: DestinationSink,
{
    async fn load_batch(
        &self,
        stream: &StreamDescriptor,
        partition: usize,
        records: &[DestinationRecord],
    ) -> anyhow::Result<()> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.load_batch(stream, partition, records).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= max_attempts => {
                    return Err(e.context(format!(
                        "load of {} records failed after {attempt} attempts",
                        records.len()
                    )));
                }
                Err(e) => {
                    let delay = self.config.delay_for(u32::try_from(attempt - 1).unwrap_or(u32::MAX));
                    warn!(
                        stream = %stream,
                        partition,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Batch load failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockDestinationSink;

    fn fast() -> RetryConfig {
        RetryConfig::new()
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None)
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30_000);
    }

    #[test]
    fn test_delay_backoff_without_jitter() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_max_delay_ms(350)
            .with_jitter(JitterStrategy::None);

        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(350));

        let linear = config.clone().with_backoff(BackoffStrategy::Linear);
        assert_eq!(linear.delay_for(1), Duration::from_millis(200));

        let constant = config.with_backoff(BackoffStrategy::Constant);
        assert_eq!(constant.delay_for(5), Duration::from_millis(100));
    }

    #[test]
    fn test_full_jitter_bounded() {
        let config = RetryConfig::new().with_base_delay_ms(100);
        for _ in 0..50 {
            assert!(config.delay_for(0) <= Duration::from_millis(100));
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let mut mock = MockDestinationSink::new();
        let mut calls = 0;
        mock.expect_load_batch().times(2).returning(move |_, _, _| {
            calls += 1;
            if calls == 1 {
                Err(anyhow::anyhow!("throttled"))
            } else {
                Ok(())
            }
        });

        let sink = RetryingSink::new(mock, fast());
        let result = sink.load_batch(&StreamDescriptor::new("s"), 0, &[]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut mock = MockDestinationSink::new();
        mock.expect_load_batch()
            .times(3)
            .returning(|_, _, _| Err(anyhow::anyhow!("disk full")));

        let sink = RetryingSink::new(mock, fast().with_max_attempts(3));
        let err = sink
            .load_batch(&StreamDescriptor::new("s"), 0, &[])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("after 3 attempts"));
        assert!(format!("{err:#}").contains("disk full"));
    }
}
