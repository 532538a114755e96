//! Retry wrapper for embedding providers.
//!
//! Only failures marked transient (see [`vismatch_core::Error::is_retryable`])
//! are retried. A provider that rejects an image is not asked again.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use log::warn;
use std::sync::Arc;
use std::time::Duration;
use vismatch_core::{Error, Result};

use crate::config::EmbeddingConfig;
use crate::embedding::{EmbeddingProvider, QueryInput};

/// Wraps an embedding provider with exponential backoff.
pub struct RetryingEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryingEmbeddingProvider {
    /// Creates a new retry wrapper with default settings.
    ///
    /// Default settings:
    /// - Max attempts: 3
    /// - Initial delay: 500 milliseconds
    /// - Max delay: 5 seconds
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            inner: provider,
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }

    /// Wraps `provider` using `embedding.retry_attempts`.
    pub fn from_config(config: &EmbeddingConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::new(provider).with_max_attempts(config.retry_attempts)
    }

    /// Sets the maximum number of attempts, including the first.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the initial delay between retries.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retries.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    fn should_retry(error: &Error) -> bool {
        error.is_retryable()
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingEmbeddingProvider {
    async fn embed(&self, input: &QueryInput) -> Result<Vec<f32>> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize);

        let inner = &self.inner;
        (|| async move { inner.embed(input).await })
            .retry(backoff)
            .when(Self::should_retry)
            .notify(|err: &Error, delay: Duration| {
                warn!("Embedding attempt failed, retrying in {delay:?}: {err}");
            })
            .await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
