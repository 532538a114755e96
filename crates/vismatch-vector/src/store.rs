//! In-memory catalog store.
//!
//! [`VectorStore`] owns the authoritative `id -> (CatalogItem, embedding)`
//! mapping. Metadata and embedding are always written and removed as a pair.
//!
//! # Snapshots
//!
//! Embeddings are stored as `Arc<[f32]>` and never mutated in place; an
//! upsert swaps in a new allocation. [`VectorStore::snapshot`] therefore only
//! clones `Arc`s under a short read lock, and a concurrent writer can never
//! expose a half-written vector to a reader holding a snapshot.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;
use vismatch_core::{Error, Result};

use crate::types::CatalogItem;

struct Slot {
    seq: u64,
    item: CatalogItem,
    vector: Arc<[f32]>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    slots: HashMap<String, Slot>,
}

/// Thread-safe `id -> (metadata, embedding)` store with a fixed dimension.
pub struct VectorStore {
    dimension: usize,
    inner: RwLock<Inner>,
}

impl VectorStore {
    /// Create an empty store for vectors of `dimension` elements.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// The configured dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert or replace an item together with its embedding.
    ///
    /// A replaced item keeps its original position in snapshot order.
    pub fn put(&self, item: CatalogItem, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::dimension(self.dimension, vector.len()));
        }
        let vector: Arc<[f32]> = vector.into();

        let mut guard = self
            .inner
            .write()
            .map_err(|e| Error::operation(format!("store lock poisoned: {e}")))?;
        let inner = &mut *guard;
        let id = item.id.clone();
        let seq = match inner.slots.get(&id) {
            Some(existing) => existing.seq,
            None => {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                seq
            }
        };
        inner.slots.insert(id.clone(), Slot { seq, item, vector });
        debug!("Stored embedding for '{id}'");
        Ok(())
    }

    /// Remove an item and its embedding. Returns whether the id existed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| Error::operation(format!("store lock poisoned: {e}")))?;
        let removed = inner.slots.remove(id).is_some();
        if removed {
            debug!("Removed '{id}' from catalog");
        }
        Ok(removed)
    }

    /// Look up one item and its embedding.
    pub fn get(&self, id: &str) -> Result<Option<(CatalogItem, Arc<[f32]>)>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| Error::operation(format!("store lock poisoned: {e}")))?;
        Ok(inner
            .slots
            .get(id)
            .map(|slot| (slot.item.clone(), Arc::clone(&slot.vector))))
    }

    /// Number of stored items.
    pub fn len(&self) -> Result<usize> {
        let inner = self
            .inner
            .read()
            .map_err(|e| Error::operation(format!("store lock poisoned: {e}")))?;
        Ok(inner.slots.len())
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Take a point-in-time view of the whole catalog.
    ///
    /// Items are listed in first-insertion order.
    pub fn snapshot(&self) -> Result<CatalogSnapshot> {
        let inner = self
            .inner
            .read()
            .map_err(|e| Error::operation(format!("store lock poisoned: {e}")))?;

        let mut slots: Vec<&Slot> = inner.slots.values().collect();
        slots.sort_by_key(|slot| slot.seq);

        let items = slots.iter().map(|slot| slot.item.clone()).collect();
        let vectors = slots
            .iter()
            .map(|slot| (slot.item.id.clone(), Arc::clone(&slot.vector)))
            .collect();
        Ok(CatalogSnapshot::new(items, vectors))
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.inner.read().map(|i| i.slots.len()).unwrap_or(0);
        f.debug_struct("VectorStore")
            .field("dimension", &self.dimension)
            .field("items", &len)
            .finish()
    }
}

// ============================================================================
// CatalogSnapshot
// ============================================================================

/// A read-only view of the catalog for a single request.
///
/// Metadata and embeddings are held separately. An item without an embedding
/// is listed in `items` but never becomes a ranking candidate.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    items: Vec<CatalogItem>,
    index: HashMap<String, usize>,
    vectors: HashMap<String, Arc<[f32]>>,
}

impl CatalogSnapshot {
    /// Build a snapshot from metadata (in candidate order) and embeddings.
    pub fn new(items: Vec<CatalogItem>, vectors: HashMap<String, Arc<[f32]>>) -> Self {
        let index = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();
        Self {
            items,
            index,
            vectors,
        }
    }

    /// All catalog metadata, in candidate order.
    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    /// Metadata for one id.
    pub fn item(&self, id: &str) -> Option<&CatalogItem> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    /// Embedding for one id.
    pub fn vector(&self, id: &str) -> Option<&[f32]> {
        self.vectors.get(id).map(|v| &v[..])
    }

    /// Number of catalog items.
    pub fn product_count(&self) -> usize {
        self.items.len()
    }

    /// Number of stored embeddings.
    pub fn embedding_count(&self) -> usize {
        self.vectors.len()
    }

    /// Ranking candidates: items that have an embedding, in metadata order.
    pub fn candidates(&self) -> Vec<(&str, &[f32])> {
        self.items
            .iter()
            .filter_map(|item| {
                self.vectors
                    .get(&item.id)
                    .map(|v| (item.id.as_str(), &v[..]))
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
