//! Durable catalog storage.
//!
//! [`CatalogDb`] keeps the catalog in a single `redb` file with two data
//! tables that always change together:
//!
//! - `products`: id -> JSON `CatalogItem` (plus its insertion sequence)
//! - `embeddings`: id -> little-endian `f32` bytes (see [`crate::codec`])
//!
//! A third `meta` table records the dimension the file was created with and
//! the next insertion sequence. Snapshots come back in first-insertion
//! order, the same order [`VectorStore`] uses, so ties rank identically
//! after a reload.

use log::{debug, warn};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vismatch_core::{Error, Result};

use crate::codec::VectorCodec;
use crate::config::MatcherConfig;
use crate::store::{CatalogSnapshot, VectorStore};
use crate::types::CatalogItem;

const PRODUCTS: TableDefinition<&str, &[u8]> = TableDefinition::new("products");
const EMBEDDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("embeddings");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const META_DIMENSION: &str = "dimension";
const META_NEXT_SEQ: &str = "next_seq";

#[derive(Serialize, Deserialize)]
struct StoredProduct {
    seq: u64,
    #[serde(flatten)]
    item: CatalogItem,
}

fn storage<E: Into<redb::Error>>(err: E) -> Error {
    Error::storage(err.into().to_string())
}

fn decode_product(id: &str, bytes: &[u8]) -> Result<StoredProduct> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::format(format!("product row '{id}' is not valid JSON: {e}")))
}

/// A catalog persisted in an embedded database file.
pub struct CatalogDb {
    db: Database,
    codec: VectorCodec,
    path: PathBuf,
}

impl CatalogDb {
    /// Open (or create) the catalog file at `path` for `dimension`-element
    /// embeddings.
    ///
    /// Fails with a `Dimension` error if the file was created for a
    /// different dimension.
    pub fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
        }

        let db = Database::create(path).map_err(storage)?;
        let txn = db.begin_write().map_err(storage)?;
        {
            txn.open_table(PRODUCTS).map_err(storage)?;
            txn.open_table(EMBEDDINGS).map_err(storage)?;
            let mut meta = txn.open_table(META).map_err(storage)?;
            let stored = meta
                .get(META_DIMENSION)
                .map_err(storage)?
                .map(|guard| guard.value());
            match stored {
                Some(stored) if stored != dimension as u64 => {
                    return Err(Error::dimension(stored as usize, dimension));
                }
                Some(_) => {}
                None => {
                    meta.insert(META_DIMENSION, dimension as u64)
                        .map_err(storage)?;
                }
            }
        }
        txn.commit().map_err(storage)?;

        debug!("Opened catalog database {} (D={dimension})", path.display());
        Ok(Self {
            db,
            codec: VectorCodec::new(dimension),
            path: path.to_path_buf(),
        })
    }

    /// Open the catalog at `storage.db_path` for `ranking.dimension`.
    ///
    /// Fails with a `Config` error if no database path is configured.
    pub fn from_config(config: &MatcherConfig) -> Result<Self> {
        let path = config
            .storage
            .db_path
            .as_deref()
            .ok_or_else(|| Error::config("storage.db_path is not set"))?;
        Self::open(path, config.ranking.dimension)
    }

    /// The embedding dimension of this catalog.
    pub fn dimension(&self) -> usize {
        self.codec.dimension()
    }

    /// The database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace an item and its embedding in one transaction.
    ///
    /// A replaced item keeps its original position.
    pub fn put(&self, item: &CatalogItem, vector: &[f32]) -> Result<()> {
        let bytes = self.codec.encode(vector)?;

        let txn = self.db.begin_write().map_err(storage)?;
        {
            let mut products = txn.open_table(PRODUCTS).map_err(storage)?;
            let mut embeddings = txn.open_table(EMBEDDINGS).map_err(storage)?;
            let mut meta = txn.open_table(META).map_err(storage)?;

            let existing = products
                .get(item.id.as_str())
                .map_err(storage)?
                .map(|guard| decode_product(&item.id, guard.value()))
                .transpose()?;
            let seq = match existing {
                Some(stored) => stored.seq,
                None => {
                    let next = meta
                        .get(META_NEXT_SEQ)
                        .map_err(storage)?
                        .map(|guard| guard.value())
                        .unwrap_or(0);
                    meta.insert(META_NEXT_SEQ, next + 1).map_err(storage)?;
                    next
                }
            };

            let row = serde_json::to_vec(&StoredProduct {
                seq,
                item: item.clone(),
            })?;
            products
                .insert(item.id.as_str(), row.as_slice())
                .map_err(storage)?;
            embeddings
                .insert(item.id.as_str(), bytes.as_slice())
                .map_err(storage)?;
        }
        txn.commit().map_err(storage)?;

        debug!("Persisted catalog item {}", item.id);
        Ok(())
    }

    /// Delete an item and its embedding in one transaction.
    ///
    /// Returns `true` if either row existed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let txn = self.db.begin_write().map_err(storage)?;
        let removed = {
            let mut products = txn.open_table(PRODUCTS).map_err(storage)?;
            let mut embeddings = txn.open_table(EMBEDDINGS).map_err(storage)?;
            let had_product = products.remove(id).map_err(storage)?.is_some();
            let had_embedding = embeddings.remove(id).map_err(storage)?.is_some();
            had_product || had_embedding
        };
        txn.commit().map_err(storage)?;

        if removed {
            debug!("Removed catalog item {id} from database");
        }
        Ok(removed)
    }

    /// Read the whole catalog in one read transaction.
    ///
    /// Items are returned in first-insertion order. An embedding row whose
    /// bytes do not decode to exactly `D` elements is a `Format` error.
    pub fn snapshot(&self) -> Result<CatalogSnapshot> {
        let txn = self.db.begin_read().map_err(storage)?;
        let products = txn.open_table(PRODUCTS).map_err(storage)?;
        let embeddings = txn.open_table(EMBEDDINGS).map_err(storage)?;

        let mut stored = Vec::new();
        for entry in products.iter().map_err(storage)? {
            let (key, value) = entry.map_err(storage)?;
            stored.push(decode_product(key.value(), value.value())?);
        }
        stored.sort_by_key(|p| p.seq);

        let mut vectors: HashMap<String, Arc<[f32]>> = HashMap::new();
        for entry in embeddings.iter().map_err(storage)? {
            let (key, value) = entry.map_err(storage)?;
            let id = key.value();
            let vector = self
                .codec
                .decode(value.value())
                .map_err(|e| Error::format(format!("embedding row '{id}': {e}")))?;
            vectors.insert(id.to_string(), Arc::from(vector));
        }

        let items = stored.into_iter().map(|p| p.item).collect();
        Ok(CatalogSnapshot::new(items, vectors))
    }

    /// Populate `store` from the database.
    ///
    /// Metadata rows without an embedding are skipped. Returns the number of
    /// items loaded.
    pub fn load_into(&self, store: &VectorStore) -> Result<usize> {
        if store.dimension() != self.dimension() {
            return Err(Error::dimension(self.dimension(), store.dimension()));
        }

        let snapshot = self.snapshot()?;
        let mut loaded = 0;
        for item in snapshot.items() {
            match snapshot.vector(&item.id) {
                Some(vector) => {
                    store.put(item.clone(), vector.to_vec())?;
                    loaded += 1;
                }
                None => warn!("Catalog item {} has no embedding, skipping", item.id),
            }
        }

        debug!(
            "Loaded {loaded} of {} catalog items from {}",
            snapshot.product_count(),
            self.path.display()
        );
        Ok(loaded)
    }

    /// Row counts as `(products, embeddings)`.
    pub fn counts(&self) -> Result<(usize, usize)> {
        let txn = self.db.begin_read().map_err(storage)?;
        let products = txn.open_table(PRODUCTS).map_err(storage)?;
        let embeddings = txn.open_table(EMBEDDINGS).map_err(storage)?;
        Ok((
            products.len().map_err(storage)? as usize,
            embeddings.len().map_err(storage)? as usize,
        ))
    }
}

impl std::fmt::Debug for CatalogDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogDb")
            .field("path", &self.path)
            .field("dimension", &self.dimension())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
