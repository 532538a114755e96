//! Match request orchestration.
//!
//! [`Matcher`] is the layer between a request surface and the ranking core.
//! It owns no catalog state: the store handle is injected, so tests and
//! concurrent requests each work on their own snapshot.
//!
//! A request runs in this order:
//!
//! 1. resolve `top_k` / `min_score` against configured defaults;
//! 2. snapshot the store and fail with `EmptyCatalog` if it holds no
//!    embeddings (before paying for the model call);
//! 3. embed the query under a timeout;
//! 4. rank, then join each ranked id back to its metadata.

use log::{info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use vismatch_core::{Error, Result};

use crate::config::MatcherConfig;
use crate::embedding::{EmbeddingProvider, QueryInput};
use crate::ranker::SimilarityRanker;
use crate::store::{CatalogSnapshot, VectorStore};
use crate::types::{CatalogHealth, MatchParams, MatchResponse, MatchResult, RankParams};

/// Default result count when the caller supplies none.
pub const DEFAULT_TOP_K: usize = 12;

/// Default bound on one embedding call.
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(60);

/// Matches query images against the catalog held in a [`VectorStore`].
pub struct Matcher {
    store: Arc<VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    ranker: SimilarityRanker,
    default_top_k: usize,
    default_min_score: f32,
    embed_timeout: Duration,
}

impl Matcher {
    /// Create a matcher with default ranking settings.
    pub fn new(store: Arc<VectorStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let ranker = SimilarityRanker::new(store.dimension());
        Self {
            store,
            provider,
            ranker,
            default_top_k: DEFAULT_TOP_K.min(ranker.max_top_k()),
            default_min_score: 0.0,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
        }
    }

    /// Create a matcher from configuration.
    ///
    /// Fails if the store or provider dimension disagrees with the config.
    pub fn from_config(
        config: &MatcherConfig,
        store: Arc<VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let dimension = config.ranking.dimension;
        if store.dimension() != dimension {
            return Err(Error::config(format!(
                "store dimension {} does not match configured {dimension}",
                store.dimension()
            )));
        }
        if provider.dimension() != dimension {
            return Err(Error::config(format!(
                "provider '{}' produces {} elements, configured {dimension}",
                provider.name(),
                provider.dimension()
            )));
        }

        Ok(Self {
            store,
            provider,
            ranker: SimilarityRanker::new(dimension).with_max_top_k(config.ranking.max_top_k),
            default_top_k: config.ranking.default_top_k,
            default_min_score: config.ranking.min_score,
            embed_timeout: config.embedding.timeout(),
        })
    }

    /// Override the embedding timeout.
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    /// The injected store handle.
    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Resolve raw parameters against this matcher's defaults and ceiling.
    pub fn resolve_params(&self, params: MatchParams) -> RankParams {
        params.resolve(
            self.default_top_k,
            self.ranker.max_top_k(),
            self.default_min_score,
        )
    }

    /// Embed `input` and return the best-matching catalog items.
    pub async fn match_query(
        &self,
        input: &QueryInput,
        params: MatchParams,
    ) -> Result<MatchResponse> {
        let params = self.resolve_params(params);

        let snapshot = self.store.snapshot()?;
        if snapshot.embedding_count() == 0 {
            warn!("Match requested against an empty catalog");
            return Err(Error::EmptyCatalog);
        }

        let started = Instant::now();
        let query = tokio::time::timeout(self.embed_timeout, self.provider.embed(input))
            .await
            .map_err(|_| {
                Error::embed_transient(format!(
                    "'{}' did not answer within {:?}",
                    self.provider.name(),
                    self.embed_timeout
                ))
            })??;
        let embed_elapsed = started.elapsed();

        let results = self.rank_snapshot(&query, &snapshot, params)?;
        info!(
            "Matched {} input: {} results (embed {:?}, {} candidates)",
            input.kind(),
            results.len(),
            embed_elapsed,
            snapshot.embedding_count()
        );
        Ok(MatchResponse::new(results))
    }

    /// Rank a precomputed query vector against a snapshot and attach metadata.
    ///
    /// Ranked ids with no metadata in the snapshot are dropped.
    pub fn rank_snapshot(
        &self,
        query: &[f32],
        snapshot: &CatalogSnapshot,
        params: RankParams,
    ) -> Result<Vec<MatchResult>> {
        let candidates = snapshot.candidates();
        let ranked = self.ranker.rank(query, &candidates, params)?;
        Ok(ranked
            .into_iter()
            .filter_map(|scored| {
                snapshot
                    .item(&scored.id)
                    .map(|item| MatchResult::from_item(item, scored.score))
            })
            .collect())
    }

    /// Summarize catalog contents.
    pub fn health(&self) -> Result<CatalogHealth> {
        let snapshot = self.store.snapshot()?;
        Ok(CatalogHealth {
            status: "ok".to_string(),
            products: snapshot.product_count(),
            embeddings: snapshot.embedding_count(),
        })
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("store", &self.store)
            .field("provider", &self.provider.name())
            .field("ranker", &self.ranker)
            .field("embed_timeout", &self.embed_timeout)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::types::CatalogItem;
    use std::collections::HashMap;

    const D: usize = 4;

    fn item(id: &str) -> CatalogItem {
        CatalogItem::new(id, format!("Product {id}"), "test", format!("/static/{id}.jpg"))
    }

    fn seeded_store() -> Arc<VectorStore> {
        let store = Arc::new(VectorStore::new(D));
        store.put(item("v1"), vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        store.put(item("v2"), vec![0.0, 1.0, 0.0, 0.0]).unwrap();
        store.put(item("v3"), vec![0.6, 0.8, 0.0, 0.0]).unwrap();
        store
    }

    fn query_provider() -> Arc<MockEmbeddingProvider> {
        Arc::new(MockEmbeddingProvider::with_fixed(vec![1.0, 0.0, 0.0, 0.0]))
    }

    #[tokio::test]
    async fn test_match_query_scenario() {
        let matcher = Matcher::new(seeded_store(), query_provider());
        let response = matcher
            .match_query(
                &QueryInput::FileBytes(vec![0xff]),
                MatchParams::default().with_top_k(2).with_min_score(0.5),
            )
            .await
            .unwrap();

        assert_eq!(response.count, 2);
        assert_eq!(response.results[0].product_id, "v1");
        assert_eq!(response.results[0].similarity, 1.0);
        assert_eq!(response.results[0].name, "Product v1");
        assert_eq!(response.results[1].product_id, "v3");
        assert_eq!(response.results[1].similarity, 0.6);
    }

    #[tokio::test]
    async fn test_match_query_default_params() {
        let matcher = Matcher::new(seeded_store(), query_provider());
        let response = matcher
            .match_query(&QueryInput::ImageUrl("u".into()), MatchParams::default())
            .await
            .unwrap();

        // min_score defaults to 0.0, which v2 meets exactly.
        let ids: Vec<&str> = response
            .results
            .iter()
            .map(|r| r.product_id.as_str())
            .collect();
        assert_eq!(ids, vec!["v1", "v3", "v2"]);
    }

    #[tokio::test]
    async fn test_match_query_empty_catalog_skips_embedding() {
        let provider = query_provider();
        let matcher = Matcher::new(Arc::new(VectorStore::new(D)), provider.clone());
        let err = matcher
            .match_query(&QueryInput::FileBytes(vec![1]), MatchParams::default())
            .await
            .unwrap_err();

        assert!(err.is_unavailable());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_match_query_propagates_embed_error() {
        let provider = Arc::new(MockEmbeddingProvider::failing(D, "image_load_failed", false));
        let matcher = Matcher::new(seeded_store(), provider);
        let err = matcher
            .match_query(&QueryInput::ImageUrl("u".into()), MatchParams::default())
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_match_query_wrong_provider_dimension() {
        let provider = Arc::new(MockEmbeddingProvider::with_fixed(vec![1.0, 0.0]));
        let matcher = Matcher::new(seeded_store(), provider);
        let err = matcher
            .match_query(&QueryInput::ImageUrl("u".into()), MatchParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { expected: D, actual: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_query_embed_timeout() {
        let provider = Arc::new(
            MockEmbeddingProvider::with_fixed(vec![1.0, 0.0, 0.0, 0.0])
                .with_delay(Duration::from_secs(30)),
        );
        let matcher =
            Matcher::new(seeded_store(), provider).with_embed_timeout(Duration::from_secs(1));
        let err = matcher
            .match_query(&QueryInput::ImageUrl("u".into()), MatchParams::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("did not answer"));
    }

    #[tokio::test]
    async fn test_match_query_top_k_zero() {
        let matcher = Matcher::new(seeded_store(), query_provider());
        let response = matcher
            .match_query(
                &QueryInput::FileBytes(vec![1]),
                MatchParams::default().with_top_k(0),
            )
            .await
            .unwrap();
        assert_eq!(response.count, 0);
    }

    #[test]
    fn test_rank_snapshot_drops_ids_without_metadata() {
        let matcher = Matcher::new(Arc::new(VectorStore::new(D)), query_provider());
        // "ghost" has an embedding but no metadata row.
        let vectors: HashMap<String, Arc<[f32]>> = HashMap::from([
            ("a".to_string(), Arc::from(vec![1.0f32, 0.0, 0.0, 0.0])),
            ("ghost".to_string(), Arc::from(vec![1.0f32, 0.0, 0.0, 0.0])),
        ]);
        let snapshot = CatalogSnapshot::new(vec![item("a"), item("b")], vectors);

        let results = matcher
            .rank_snapshot(&[1.0, 0.0, 0.0, 0.0], &snapshot, RankParams::new(10, 0.0))
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_health() {
        let matcher = Matcher::new(seeded_store(), query_provider());
        let health = matcher.health().unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.products, 3);
        assert_eq!(health.embeddings, 3);
    }

    #[test]
    fn test_from_config_dimension_checks() {
        let mut config = MatcherConfig::default();
        config.ranking.dimension = D;

        let ok = Matcher::from_config(&config, seeded_store(), query_provider());
        assert!(ok.is_ok());

        let bad_store = Matcher::from_config(&config, Arc::new(VectorStore::new(8)), query_provider());
        assert!(matches!(bad_store.unwrap_err(), Error::Config(_)));

        let bad_provider = Matcher::from_config(
            &config,
            seeded_store(),
            Arc::new(MockEmbeddingProvider::new(8)),
        );
        assert!(matches!(bad_provider.unwrap_err(), Error::Config(_)));
    }

    #[test]
    fn test_resolve_params_uses_config() {
        let mut config = MatcherConfig::default();
        config.ranking.dimension = D;
        config.ranking.max_top_k = 5;
        config.ranking.default_top_k = 2;
        config.ranking.min_score = 0.3;
        let matcher = Matcher::from_config(&config, seeded_store(), query_provider()).unwrap();

        assert_eq!(
            matcher.resolve_params(MatchParams::default()),
            RankParams::new(2, 0.3)
        );
        assert_eq!(
            matcher.resolve_params(MatchParams::default().with_top_k(50)).top_k,
            5
        );
    }
}
