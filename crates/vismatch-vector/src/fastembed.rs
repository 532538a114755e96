//! FastEmbed image embedding provider.
//!
//! Wraps `fastembed::ImageEmbedding` to run the feature extractor in
//! process instead of shelling out to a model script.
//!
//! # Thread Safety
//!
//! The model needs `&mut` access for inference, so it lives behind
//! `Arc<Mutex<>>` and every call runs on `tokio::task::spawn_blocking`.
//!
//! # Feature Gate
//!
//! This module requires the `vector-fastembed` feature.

use crate::embedding::{EmbeddingProvider, QueryInput};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use vismatch_core::{Error, Result};

/// Map a model name to a fastembed image model and its output dimension.
fn resolve_model(name: &str) -> Result<(fastembed::ImageEmbeddingModel, usize)> {
    match name {
        "resnet50" | "Resnet50" => Ok((fastembed::ImageEmbeddingModel::Resnet50, 2048)),
        "clip-vit-b-32" | "ClipVitB32" => Ok((fastembed::ImageEmbeddingModel::ClipVitB32, 512)),
        other => Err(Error::config(format!(
            "Unknown image embedding model: '{other}'. Supported: resnet50, clip-vit-b-32"
        ))),
    }
}

/// Scale `vector` to unit L2 norm. Zero vectors are left unchanged.
pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// In-process image embedding provider.
///
/// | Name | Dimension |
/// |------|-----------|
/// | `resnet50` | 2048 |
/// | `clip-vit-b-32` | 512 |
pub struct FastEmbedImageProvider {
    model: Arc<Mutex<fastembed::ImageEmbedding>>,
    http: reqwest::Client,
    dimension: usize,
    model_name: String,
}

impl FastEmbedImageProvider {
    /// Load `model_name`, downloading it into `cache_path` if needed.
    pub fn new(model_name: &str, cache_path: Option<&str>) -> Result<Self> {
        let (model_enum, dimension) = resolve_model(model_name)?;

        let mut init = fastembed::ImageInitOptions::new(model_enum);
        if let Some(path) = cache_path {
            init = init.with_cache_dir(std::path::PathBuf::from(path));
        }

        let model = fastembed::ImageEmbedding::try_new(init)
            .map_err(|e| Error::operation(format!("Failed to initialize image model: {e}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            http: reqwest::Client::new(),
            dimension,
            model_name: model_name.to_string(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::embed_transient(format!("image_fetch_failed: {e}")))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(Error::embed(format!("image_load_failed: {url} returned {status}")));
        }
        if !status.is_success() {
            return Err(Error::embed_transient(format!(
                "image_fetch_failed: {url} returned {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::embed_transient(format!("image_fetch_failed: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn input_bytes(&self, input: &QueryInput) -> Result<Vec<u8>> {
        match input {
            QueryInput::FileBytes(bytes) => Ok(bytes.clone()),
            QueryInput::FilePath(path) => tokio::fs::read(path)
                .await
                .map_err(|e| Error::embed(format!("image_load_failed: {}: {e}", path.display()))),
            QueryInput::ImageUrl(url) => self.fetch(url).await,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedImageProvider {
    async fn embed(&self, input: &QueryInput) -> Result<Vec<f32>> {
        let bytes = self.input_bytes(input).await?;
        let model = self.model.clone();

        let mut vector = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::operation(format!("Mutex poisoned: {e}")))?;
            let results = model
                .embed_bytes(&[bytes.as_slice()], None)
                .map_err(|e| Error::embed(format!("embed_failed: {e}")))?;
            results
                .into_iter()
                .next()
                .ok_or_else(|| Error::operation("No embedding returned"))
        })
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))??;

        if vector.len() != self.dimension {
            return Err(Error::dimension(self.dimension, vector.len()));
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for FastEmbedImageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedImageProvider")
            .field("model", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
