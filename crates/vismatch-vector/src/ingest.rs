//! Bulk catalog seeding.
//!
//! [`CatalogIngester`] embeds product images from disk and writes each
//! result into the [`VectorStore`] and, when configured, a [`CatalogDb`].
//! Embeddings run with bounded concurrency; results are applied one at a
//! time in input order, so the resulting catalog order matches the seed list.

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;
use vismatch_core::{Error, Result};

use crate::config::IngestConfig;
use crate::embedding::{EmbeddingProvider, QueryInput};
use crate::persistence::CatalogDb;
use crate::store::VectorStore;
use crate::types::{IngestError, IngestStats, SeedEntry};

/// Seeds a catalog from image files.
pub struct CatalogIngester {
    store: Arc<VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    db: Option<Arc<CatalogDb>>,
    concurrency: usize,
    fail_fast: bool,
}

impl CatalogIngester {
    /// Create an ingester writing to `store` only.
    pub fn new(store: Arc<VectorStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let defaults = IngestConfig::default();
        Self {
            store,
            provider,
            db: None,
            concurrency: defaults.concurrency,
            fail_fast: defaults.fail_fast,
        }
    }

    /// Also persist every ingested item to `db`.
    ///
    /// Fails with a `Dimension` error if `db` and the store disagree.
    pub fn with_database(mut self, db: Arc<CatalogDb>) -> Result<Self> {
        if db.dimension() != self.store.dimension() {
            return Err(Error::dimension(self.store.dimension(), db.dimension()));
        }
        self.db = Some(db);
        Ok(self)
    }

    /// Number of embeddings computed in parallel (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Abort on the first failed entry instead of recording it.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Apply `[ingest]` settings.
    pub fn with_config(self, config: &IngestConfig) -> Self {
        self.with_concurrency(config.concurrency)
            .with_fail_fast(config.fail_fast)
    }

    /// Embed and store every entry.
    ///
    /// Entries whose image file does not exist are skipped. Other failures
    /// are recorded in [`IngestStats::errors`], or returned immediately when
    /// fail-fast is set.
    pub async fn ingest(&self, entries: Vec<SeedEntry>) -> Result<IngestStats> {
        let started = Instant::now();
        let mut stats = IngestStats {
            dimension: self.store.dimension(),
            ..Default::default()
        };

        let mut present = Vec::with_capacity(entries.len());
        for entry in entries {
            if tokio::fs::try_exists(&entry.image_path)
                .await
                .unwrap_or(false)
            {
                present.push(entry);
            } else {
                warn!(
                    "Image for {} not found at {}, skipping",
                    entry.id,
                    entry.image_path.display()
                );
                stats.items_skipped += 1;
            }
        }

        let provider = &self.provider;
        let mut embedded = stream::iter(present)
            .map(|entry| async move {
                let input = QueryInput::FilePath(entry.image_path.clone());
                let result = provider.embed(&input).await;
                (entry, result)
            })
            .buffered(self.concurrency);

        while let Some((entry, result)) = embedded.next().await {
            match result.and_then(|vector| self.apply(&entry, vector)) {
                Ok(()) => {
                    info!("Seeded {}", entry.id);
                    stats.items_ingested += 1;
                }
                Err(e) if self.fail_fast => return Err(e),
                Err(e) => {
                    warn!("Failed to seed {}: {e}", entry.id);
                    stats.items_skipped += 1;
                    stats.errors.push(IngestError {
                        id: entry.id,
                        message: e.to_string(),
                    });
                }
            }
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            "Ingestion finished: {} ingested, {} skipped in {}ms",
            stats.items_ingested, stats.items_skipped, stats.duration_ms
        );
        Ok(stats)
    }

    fn apply(&self, entry: &SeedEntry, vector: Vec<f32>) -> Result<()> {
        let item = entry.to_item();
        if let Some(db) = &self.db {
            db.put(&item, &vector)?;
        }
        self.store.put(item, vector)
    }
}

impl std::fmt::Debug for CatalogIngester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogIngester")
            .field("provider", &self.provider.name())
            .field("persistent", &self.db.is_some())
            .field("concurrency", &self.concurrency)
            .field("fail_fast", &self.fail_fast)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
