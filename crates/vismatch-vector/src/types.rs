//! Common types for catalog matching.
//!
//! These types cross the boundary between the ranking core and whatever
//! surface (HTTP, CLI, batch job) drives it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Catalog
// ============================================================================

/// Immutable metadata for one catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Unique product identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Product category.
    pub category: String,

    /// Where the product image can be fetched by a client.
    pub image_url: String,
}

impl CatalogItem {
    /// Create a new catalog item.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            image_url: image_url.into(),
        }
    }
}

// ============================================================================
// Ranking
// ============================================================================

/// A ranked catalog id and its inner-product score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredId {
    /// Catalog item id.
    pub id: String,

    /// Inner product of the query and the item's embedding.
    pub score: f32,
}

/// Validated ranking parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankParams {
    /// Maximum number of results, already clamped to the ceiling.
    pub top_k: usize,

    /// Inclusive lower bound on returned scores.
    pub min_score: f32,
}

impl RankParams {
    /// Create ranking parameters.
    pub fn new(top_k: usize, min_score: f32) -> Self {
        Self { top_k, min_score }
    }
}

/// Raw, caller-supplied match parameters.
///
/// Both fields are optional; missing values fall back to configured defaults.
/// `top_k` is signed because it arrives unvalidated from the request boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchParams {
    /// Requested result count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,

    /// Requested minimum score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

impl MatchParams {
    /// Set the requested result count.
    pub fn with_top_k(mut self, top_k: i64) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Set the requested minimum score.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Resolve against defaults, clamping `top_k` into `[0, max_top_k]`.
    pub fn resolve(
        &self,
        default_top_k: usize,
        max_top_k: usize,
        default_min_score: f32,
    ) -> RankParams {
        let top_k = match self.top_k {
            None => default_top_k.min(max_top_k),
            Some(k) if k <= 0 => 0,
            Some(k) => usize::try_from(k).unwrap_or(usize::MAX).min(max_top_k),
        };
        RankParams {
            top_k,
            min_score: self.min_score.unwrap_or(default_min_score),
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// A matched product joined with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Catalog item id.
    pub product_id: String,

    /// Display name.
    pub name: String,

    /// Product category.
    pub category: String,

    /// Product image location.
    pub image_url: String,

    /// Inner-product score (cosine similarity for unit-norm embeddings).
    pub similarity: f32,
}

impl MatchResult {
    /// Join a catalog item with its score.
    pub fn from_item(item: &CatalogItem, similarity: f32) -> Self {
        Self {
            product_id: item.id.clone(),
            name: item.name.clone(),
            category: item.category.clone(),
            image_url: item.image_url.clone(),
            similarity,
        }
    }
}

/// The full answer to a match request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResponse {
    /// Number of results.
    pub count: usize,

    /// Results ordered by similarity, highest first.
    pub results: Vec<MatchResult>,
}

impl MatchResponse {
    /// Wrap a result list.
    pub fn new(results: Vec<MatchResult>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

/// Catalog health summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogHealth {
    /// Always "ok" when the store could be read.
    pub status: String,

    /// Number of catalog items.
    pub products: usize,

    /// Number of stored embeddings.
    pub embeddings: usize,
}

// ============================================================================
// Ingestion
// ============================================================================

/// One catalog entry to be seeded from an image on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEntry {
    /// Unique product identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Product category.
    pub category: String,

    /// Local image file to embed.
    pub image_path: PathBuf,

    /// Public image location stored with the item.
    pub image_url: String,
}

impl SeedEntry {
    /// The catalog item this entry produces.
    pub fn to_item(&self) -> CatalogItem {
        CatalogItem::new(&self.id, &self.name, &self.category, &self.image_url)
    }
}

/// A seed entry that could not be ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestError {
    /// Id of the failed entry.
    pub id: String,
    /// Error message.
    pub message: String,
}

/// Statistics from a catalog ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    /// Entries embedded and stored.
    pub items_ingested: usize,

    /// Entries skipped (missing image or failed embedding).
    pub items_skipped: usize,

    /// Embedding dimension used.
    pub dimension: usize,

    /// Run duration in milliseconds.
    pub duration_ms: u64,

    /// Per-entry failures (when not fail-fast).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<IngestError>,
}

// ============================================================================
// Tests
// ============================================================================
