//! Matcher configuration.
//!
//! Provides [`MatcherConfig`], loaded from TOML files, environment
//! variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit path passed to [`MatcherConfig::load`]
//! 2. `VISMATCH_CONFIG` environment variable
//! 3. XDG default: `~/.config/vismatch/config.toml`
//! 4. Built-in defaults
//!
//! Environment overrides use the `VISMATCH_<SECTION>_<KEY>` form, e.g.
//! `VISMATCH_EMBEDDING_COMMAND=python3`.

use confyg::{env, Confygery};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use vismatch_core::{Error, Result};

use crate::matcher::DEFAULT_TOP_K;
use crate::ranker::MAX_TOP_K;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "VISMATCH_CONFIG";

/// Embedding dimension of the default ResNet-50 feature extractor.
pub const DEFAULT_DIMENSION: usize = 2048;

// ============================================================================
// Environment-tolerant scalars
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum ValueOrText<T> {
    Value(T),
    Text(String),
}

/// Accept a scalar either natively or as a string.
///
/// Environment overrides reach the merged TOML as strings
/// (`dimension = "4"`), so numeric and boolean fields parse both forms.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match ValueOrText::<T>::deserialize(deserializer)? {
        ValueOrText::Value(value) => Ok(value),
        ValueOrText::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

// ============================================================================
// Configuration structs
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Ranking behaviour.
    pub ranking: RankingConfig,

    /// Embedding provider settings.
    pub embedding: EmbeddingConfig,

    /// Catalog storage settings.
    pub storage: StorageConfig,

    /// Catalog ingestion settings.
    pub ingest: IngestConfig,
}

/// Ranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Embedding dimension `D`.
    #[serde(deserialize_with = "lenient")]
    pub dimension: usize,

    /// Hard ceiling on results per query.
    #[serde(deserialize_with = "lenient")]
    pub max_top_k: usize,

    /// Result count when the caller gives none.
    #[serde(deserialize_with = "lenient")]
    pub default_top_k: usize,

    /// Minimum score when the caller gives none.
    #[serde(deserialize_with = "lenient")]
    pub min_score: f32,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Program run by the subprocess provider.
    pub command: String,

    /// Script passed as the program's first argument.
    pub script: Option<String>,

    /// Upper bound on one `embed()` call, in seconds.
    #[serde(deserialize_with = "lenient")]
    pub timeout_secs: u64,

    /// Attempts made by the retrying provider.
    #[serde(deserialize_with = "lenient")]
    pub retry_attempts: u32,
}

/// Catalog storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Catalog database file.
    pub db_path: Option<String>,
}

/// Ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Embeddings computed in parallel.
    #[serde(deserialize_with = "lenient")]
    pub concurrency: usize,

    /// Abort the run on the first failed embedding.
    #[serde(deserialize_with = "lenient")]
    pub fail_fast: bool,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            max_top_k: MAX_TOP_K,
            default_top_k: DEFAULT_TOP_K,
            min_score: 0.0,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            command: "python".to_string(),
            script: None,
            timeout_secs: 60,
            retry_attempts: 3,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fail_fast: false,
        }
    }
}

impl EmbeddingConfig {
    /// Timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl MatcherConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path) {
            if path.exists() {
                builder
                    .add_file(&path.to_string_lossy())
                    .map_err(|e| Error::config(format!("config file: {e}")))?;
            }
        }

        let mut env_opts = env::Options::with_top_level("VISMATCH");
        env_opts.add_section("ranking");
        env_opts.add_section("embedding");
        env_opts.add_section("storage");
        env_opts.add_section("ingest");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        Self::resolve_config_path_from(explicit, std::env::var(CONFIG_ENV).ok())
    }

    fn resolve_config_path_from(explicit: Option<&str>, env: Option<String>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }
        if let Some(path) = env {
            return Some(PathBuf::from(path));
        }
        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("vismatch").join("config.toml"))
    }

    /// Reject settings no request could succeed with.
    pub fn validate(&self) -> Result<()> {
        let ranking = &self.ranking;
        if ranking.dimension == 0 {
            return Err(Error::config("ranking.dimension must be positive"));
        }
        if ranking.default_top_k > ranking.max_top_k {
            return Err(Error::config(format!(
                "ranking.default_top_k ({}) exceeds ranking.max_top_k ({})",
                ranking.default_top_k, ranking.max_top_k
            )));
        }
        if self.embedding.timeout_secs == 0 {
            return Err(Error::config("embedding.timeout_secs must be positive"));
        }
        if self.ingest.concurrency == 0 {
            return Err(Error::config("ingest.concurrency must be positive"));
        }
        Ok(())
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
