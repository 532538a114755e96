//! Image similarity matching for vismatch.
//!
//! This crate stores one fixed-dimension embedding per catalog product and
//! ranks products by exact (brute-force) inner-product similarity against a
//! query embedding. Embeddings are produced by a pluggable provider; the
//! ranking core never assumes how.
//!
//! # Features
//!
//! - `vector-fastembed`: Enable in-process image embedding via fastembed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     vismatch-vector                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VectorCodec (little-endian f32 <-> bytes)                  │
//! │  VectorStore (id -> metadata + embedding, snapshots)        │
//! │  SimilarityRanker (inner product, top-k, min-score)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider trait                                    │
//! │  ├── MockEmbeddingProvider (always available)               │
//! │  ├── CommandEmbeddingProvider (external model process)      │
//! │  ├── RetryingEmbeddingProvider (backoff wrapper)            │
//! │  └── FastEmbedImageProvider (feature: vector-fastembed)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Matcher (request orchestration)                            │
//! │  CatalogIngester (bulk seeding)                             │
//! │  CatalogDb (durable catalog, redb)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use vismatch_vector::{
//!     CatalogItem, MatchParams, Matcher, MockEmbeddingProvider, QueryInput, VectorStore,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(VectorStore::new(2048));
//! store.put(CatalogItem::new("p1", "Tote", "bags", "/static/p1.jpg"), embedding)?;
//!
//! let matcher = Matcher::new(store, Arc::new(MockEmbeddingProvider::new(2048)));
//! let response = matcher
//!     .match_query(&QueryInput::FileBytes(upload), MatchParams::default().with_top_k(5))
//!     .await?;
//! for result in response.results {
//!     println!("{}: {:.3}", result.product_id, result.similarity);
//! }
//! ```

// Core modules (always available)
pub mod codec;
pub mod ranker;
pub mod store;
pub mod types;

// Configuration
pub mod config;

// Embedding providers
pub mod command;
pub mod embedding;
pub mod retry;

// Orchestration and storage
pub mod ingest;
pub mod matcher;
pub mod persistence;

// Feature-gated provider modules
#[cfg(feature = "vector-fastembed")]
pub mod fastembed;

// Re-exports: core types
pub use types::{
    CatalogHealth, CatalogItem, IngestError, IngestStats, MatchParams, MatchResponse,
    MatchResult, RankParams, ScoredId, SeedEntry,
};

// Re-exports: ranking core
pub use codec::{decode_f32_le, encode_f32_le, VectorCodec};
pub use ranker::{inner_product, SimilarityRanker, MAX_TOP_K};
pub use store::{CatalogSnapshot, VectorStore};

// Re-exports: configuration
pub use config::MatcherConfig;

// Re-exports: providers
pub use command::CommandEmbeddingProvider;
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider, QueryInput};
pub use retry::RetryingEmbeddingProvider;

// Re-exports: orchestration
pub use ingest::CatalogIngester;
pub use matcher::Matcher;
pub use persistence::CatalogDb;

// Feature-gated re-exports
#[cfg(feature = "vector-fastembed")]
pub use fastembed::FastEmbedImageProvider;

pub use vismatch_core::{Error, Result};
