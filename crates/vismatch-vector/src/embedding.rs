//! Embedding provider trait and mock implementation.
//!
//! This module defines the `EmbeddingProvider` trait that abstracts over
//! the image feature extractor. The ranking core never assumes how an
//! embedding is produced: a subprocess, a network service, or an in-process
//! model all fit behind the same trait.
//!
//! # Providers
//!
//! - `MockEmbeddingProvider`: Deterministic unit vectors for testing
//! - `CommandEmbeddingProvider`: External model process (see [`crate::command`])
//! - `FastEmbedImageProvider`: In-process model (requires `vector-fastembed` feature)
//!
//! # Precondition
//!
//! Providers are expected to return unit-L2-norm vectors. The ranker scores
//! with a raw inner product and relies on this to report cosine similarity.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vismatch_core::{Error, Result};

/// An image to be embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryInput {
    /// Raw uploaded image bytes.
    FileBytes(Vec<u8>),

    /// An image file on local disk.
    FilePath(PathBuf),

    /// A remote image location.
    ImageUrl(String),
}

impl QueryInput {
    /// Short label for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileBytes(_) => "bytes",
            Self::FilePath(_) => "path",
            Self::ImageUrl(_) => "url",
        }
    }
}

/// Trait for generating image embeddings.
///
/// The trait requires `Send + Sync` to allow safe sharing across async tasks.
///
/// # Thread Safety
///
/// Implementations should handle internal synchronization (e.g., `Arc<Mutex<>>`)
/// for thread-unsafe underlying libraries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single image.
    async fn embed(&self, input: &QueryInput) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of images.
    ///
    /// Default implementation calls `embed` for each input sequentially.
    async fn embed_batch(&self, inputs: &[QueryInput]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            results.push(self.embed(input).await?);
        }
        Ok(results)
    }

    /// The embedding dimension.
    fn dimension(&self) -> usize;

    /// The provider name for diagnostics.
    fn name(&self) -> &str;
}

enum MockMode {
    Derived,
    Fixed(Vec<f32>),
    Fail { message: String, transient: bool },
}

/// A mock embedding provider for testing.
///
/// By default it derives a deterministic unit vector from the input bytes
/// (file contents for `FilePath`, the string itself for `ImageUrl`).
pub struct MockEmbeddingProvider {
    dimension: usize,
    mode: MockMode,
    transient_failures: AtomicUsize,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            mode: MockMode::Derived,
            transient_failures: AtomicUsize::new(0),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider that returns the same vector for every input.
    pub fn with_fixed(vector: Vec<f32>) -> Self {
        Self {
            dimension: vector.len(),
            mode: MockMode::Fixed(vector),
            ..Self::new(0)
        }
    }

    /// A provider that always fails.
    pub fn failing(dimension: usize, message: impl Into<String>, transient: bool) -> Self {
        Self {
            mode: MockMode::Fail {
                message: message.into(),
                transient,
            },
            ..Self::new(dimension)
        }
    }

    /// Fail the first `n` calls with a transient error.
    pub fn with_transient_failures(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `embed` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Generate a deterministic unit vector from bytes.
    fn deterministic_embedding(&self, bytes: &[u8]) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        for (i, val) in embedding.iter_mut().enumerate() {
            let byte_val = if bytes.is_empty() {
                0u8
            } else {
                bytes[i % bytes.len()]
            };
            *val = ((byte_val as f32 + i as f32) % 256.0) / 256.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }

        embedding
    }

    async fn input_bytes(input: &QueryInput) -> Result<Vec<u8>> {
        match input {
            QueryInput::FileBytes(bytes) => Ok(bytes.clone()),
            QueryInput::FilePath(path) => tokio::fs::read(path)
                .await
                .map_err(|e| Error::embed(format!("image_load_failed: {}: {e}", path.display()))),
            QueryInput::ImageUrl(url) => Ok(url.as_bytes().to_vec()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, input: &QueryInput) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let pending = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(Error::embed_transient("mock transient failure"));
        }

        match &self.mode {
            MockMode::Derived => {
                let bytes = Self::input_bytes(input).await?;
                Ok(self.deterministic_embedding(&bytes))
            }
            MockMode::Fixed(vector) => Ok(vector.clone()),
            MockMode::Fail { message, transient } => Err(Error::Embed {
                message: message.clone(),
                transient: *transient,
            }),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_mock_provider_creation() {
        let provider = MockEmbeddingProvider::new(2048);
        assert_eq!(provider.dimension(), 2048);
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn test_query_input_kind() {
        assert_eq!(QueryInput::FileBytes(vec![1]).kind(), "bytes");
        assert_eq!(QueryInput::FilePath("a.jpg".into()).kind(), "path");
        assert_eq!(QueryInput::ImageUrl("http://x".into()).kind(), "url");
    }

    #[tokio::test]
    async fn test_mock_embed_unit_norm() {
        let provider = MockEmbeddingProvider::new(16);
        let embedding = provider
            .embed(&QueryInput::FileBytes(b"jpeg bytes".to_vec()))
            .await
            .unwrap();

        assert_eq!(embedding.len(), 16);
        assert!((norm(&embedding) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embed_deterministic() {
        let provider = MockEmbeddingProvider::new(16);
        let input = QueryInput::ImageUrl("https://example.com/a.jpg".into());
        let e1 = provider.embed(&input).await.unwrap();
        let e2 = provider.embed(&input).await.unwrap();
        assert_eq!(e1, e2);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_embed_different_inputs() {
        let provider = MockEmbeddingProvider::new(16);
        let e1 = provider
            .embed(&QueryInput::FileBytes(b"one".to_vec()))
            .await
            .unwrap();
        let e2 = provider
            .embed(&QueryInput::FileBytes(b"two".to_vec()))
            .await
            .unwrap();
        assert_ne!(e1, e2);
    }

    #[tokio::test]
    async fn test_mock_embed_file_path_reads_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i2.jpg");
        std::fs::write(&path, b"pixels").unwrap();

        let provider = MockEmbeddingProvider::new(8);
        let from_path = provider
            .embed(&QueryInput::FilePath(path))
            .await
            .unwrap();
        let from_bytes = provider
            .embed(&QueryInput::FileBytes(b"pixels".to_vec()))
            .await
            .unwrap();
        assert_eq!(from_path, from_bytes);
    }

    #[tokio::test]
    async fn test_mock_embed_missing_file_is_permanent() {
        let provider = MockEmbeddingProvider::new(8);
        let err = provider
            .embed(&QueryInput::FilePath("/nonexistent/i9.jpg".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embed { transient: false, .. }));
    }

    #[tokio::test]
    async fn test_mock_fixed() {
        let provider = MockEmbeddingProvider::with_fixed(vec![1.0, 0.0, 0.0]);
        assert_eq!(provider.dimension(), 3);
        let v = provider
            .embed(&QueryInput::FileBytes(vec![]))
            .await
            .unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let provider = MockEmbeddingProvider::failing(4, "embed_failed", false);
        let err = provider
            .embed(&QueryInput::FileBytes(vec![1]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("embed_failed"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_mock_transient_failures_then_success() {
        let provider = MockEmbeddingProvider::new(4).with_transient_failures(2);
        let input = QueryInput::FileBytes(vec![7]);
        assert!(provider.embed(&input).await.unwrap_err().is_retryable());
        assert!(provider.embed(&input).await.unwrap_err().is_retryable());
        assert!(provider.embed(&input).await.is_ok());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_embed_batch() {
        let provider = MockEmbeddingProvider::new(8);
        let inputs = vec![
            QueryInput::FileBytes(b"a".to_vec()),
            QueryInput::FileBytes(b"b".to_vec()),
        ];
        let embeddings = provider.embed_batch(&inputs).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        assert!(embeddings.iter().all(|e| e.len() == 8));
    }

    #[test]
    fn test_trait_object_safety() {
        fn _assert_object_safe(_: &dyn EmbeddingProvider) {}
    }
}
