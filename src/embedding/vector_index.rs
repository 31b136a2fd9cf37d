/// HNSW vector collections for similarity search
use super::CollectionKind;
use crate::config::IndexingConfig;
use crate::storage::Database;
use ahash::AHashMap;
use hnsw_rs::prelude::*;
use rusqlite::params;
use serde_json::{Map, Value};
use std::ops::RangeInclusive;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Index lock poisoned")]
    LockPoisoned,
}

/// A document ready to be written to a collection
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    pub embedding: Vec<f32>,
}

/// One nearest-neighbour answer
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedItem {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    /// Cosine distance, lower is more similar
    pub distance: f32,
}

/// Integer epoch-seconds `timestamp` from document metadata.
/// Numeric strings are accepted since older records stored them that way.
pub fn metadata_timestamp(metadata: &Map<String, Value>) -> Option<i64> {
    match metadata.get("timestamp")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Nearest-neighbour store for one collection
pub trait VectorCollection: Send + Sync {
    fn kind(&self) -> CollectionKind;

    /// Up to `k` nearest items, optionally restricted to items whose
    /// metadata timestamp lies in `time_range` (inclusive)
    fn query(
        &self,
        vector: &[f32],
        k: usize,
        time_range: Option<&RangeInclusive<i64>>,
    ) -> Result<Vec<IndexedItem>, VectorIndexError>;

    /// Insert or replace documents by id; returns the number written
    fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<usize, VectorIndexError>;

    /// Remove documents by id; returns the number removed
    fn delete(&self, ids: &[String]) -> Result<usize, VectorIndexError>;

    /// Drop every document; returns the number removed
    fn reset(&self) -> Result<usize, VectorIndexError>;

    fn count(&self) -> usize;
}

struct Slot {
    id: String,
    text: String,
    metadata: Map<String, Value>,
    timestamp: Option<i64>,
    /// Kept so the graph can be rebuilt without the store
    embedding: Vec<f32>,
}

impl Slot {
    fn into_document(self) -> IndexedDocument {
        IndexedDocument {
            id: self.id,
            text: self.text,
            metadata: self.metadata,
            embedding: self.embedding,
        }
    }
}

/// HNSW data ids are slot positions; replaced or deleted slots stay in the
/// graph as tombstones and are filtered out at query time. Once tombstones
/// outnumber live slots the graph is rebuilt from the live ones.
struct CollectionState {
    index: Hnsw<'static, f32, DistCosine>,
    slots: Vec<Option<Slot>>,
    by_id: AHashMap<String, usize>,
}

impl CollectionState {
    fn new(config: &IndexingConfig) -> Self {
        Self {
            index: Hnsw::<f32, DistCosine>::new(
                config.hnsw_m,
                config.max_elements,
                16,
                config.hnsw_ef_construction,
                DistCosine,
            ),
            slots: Vec::new(),
            by_id: AHashMap::new(),
        }
    }

    fn insert(&mut self, doc: IndexedDocument) {
        if let Some(old) = self.by_id.remove(&doc.id) {
            self.slots[old] = None;
        }

        let slot = self.slots.len();
        self.index.insert((doc.embedding.as_slice(), slot));
        self.by_id.insert(doc.id.clone(), slot);
        self.slots.push(Some(Slot {
            timestamp: metadata_timestamp(&doc.metadata),
            id: doc.id,
            text: doc.text,
            metadata: doc.metadata,
            embedding: doc.embedding,
        }));
    }

    fn remove(&mut self, id: &str) -> bool {
        match self.by_id.remove(id) {
            Some(slot) => {
                self.slots[slot] = None;
                true
            }
            None => false,
        }
    }

    fn live(&self) -> usize {
        self.by_id.len()
    }

    fn tombstones(&self) -> usize {
        self.slots.len() - self.live()
    }

    /// Rebuild the graph from the live slots, in slot order
    fn compact(&mut self, config: &IndexingConfig) {
        let slots = std::mem::take(&mut self.slots);
        *self = Self::new(config);
        for slot in slots.into_iter().flatten() {
            self.insert(slot.into_document());
        }
    }
}

/// In-memory HNSW collection (cosine distance) with optional write-through
/// persistence to the `vector_documents` table.
pub struct HnswCollection {
    kind: CollectionKind,
    dimension: usize,
    ef_search: usize,
    config: IndexingConfig,
    state: RwLock<CollectionState>,
    db: Option<Database>,
}

impl HnswCollection {
    /// Empty, memory-only collection
    pub fn new(kind: CollectionKind, config: &IndexingConfig) -> Self {
        Self {
            kind,
            dimension: config.vector_dim,
            ef_search: config.hnsw_ef_search,
            config: config.clone(),
            state: RwLock::new(CollectionState::new(config)),
            db: None,
        }
    }

    /// Collection backed by the database; previously stored documents are
    /// re-inserted into a fresh graph.
    pub fn open(
        kind: CollectionKind,
        config: &IndexingConfig,
        db: Database,
    ) -> Result<Self, VectorIndexError> {
        let mut collection = Self::new(kind, config);
        let documents = Self::load_documents(kind, &db)?;
        let loaded = documents.len();

        {
            let mut state = collection.write()?;
            for doc in documents {
                if doc.embedding.len() != collection.dimension {
                    tracing::warn!(
                        collection = %kind,
                        id = %doc.id,
                        "Skipping stored document with {}-dim embedding",
                        doc.embedding.len()
                    );
                    continue;
                }
                state.insert(doc);
            }
        }

        collection.db = Some(db);
        tracing::info!(collection = %kind, documents = loaded, "Vector collection opened");
        Ok(collection)
    }

    fn load_documents(
        kind: CollectionKind,
        db: &Database,
    ) -> Result<Vec<IndexedDocument>, VectorIndexError> {
        let conn = db
            .get_conn()
            .map_err(|e| VectorIndexError::Connection(e.to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT doc_id, text, metadata, embedding FROM vector_documents
             WHERE collection = ?1 ORDER BY updated_at, doc_id",
        )?;
        let rows = stmt
            .query_map(params![kind.name()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, text, metadata, blob)| {
                Ok(IndexedDocument {
                    id,
                    text,
                    metadata: serde_json::from_str(&metadata)?,
                    embedding: decode_embedding(&blob),
                })
            })
            .collect()
    }

    fn persist(&self, documents: &[IndexedDocument]) -> Result<(), VectorIndexError> {
        let Some(db) = &self.db else {
            return Ok(());
        };
        let mut conn = db
            .get_conn()
            .map_err(|e| VectorIndexError::Connection(e.to_string()))?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO vector_documents
                 (collection, doc_id, text, metadata, embedding, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let now = chrono::Utc::now().timestamp_millis();
            for doc in documents {
                stmt.execute(params![
                    self.kind.name(),
                    doc.id,
                    doc.text,
                    serde_json::to_string(&doc.metadata)?,
                    encode_embedding(&doc.embedding),
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn unpersist(&self, ids: &[String]) -> Result<(), VectorIndexError> {
        let Some(db) = &self.db else {
            return Ok(());
        };
        let conn = db
            .get_conn()
            .map_err(|e| VectorIndexError::Connection(e.to_string()))?;
        let mut stmt =
            conn.prepare("DELETE FROM vector_documents WHERE collection = ?1 AND doc_id = ?2")?;
        for id in ids {
            stmt.execute(params![self.kind.name(), id])?;
        }
        Ok(())
    }

    fn unpersist_all(&self) -> Result<(), VectorIndexError> {
        let Some(db) = &self.db else {
            return Ok(());
        };
        let conn = db
            .get_conn()
            .map_err(|e| VectorIndexError::Connection(e.to_string()))?;
        conn.execute(
            "DELETE FROM vector_documents WHERE collection = ?1",
            params![self.kind.name()],
        )?;
        Ok(())
    }

    fn compact_if_needed(&self, state: &mut CollectionState) {
        if state.tombstones() <= state.live() {
            return;
        }
        let before = state.slots.len();
        state.compact(&self.config);
        tracing::debug!(
            collection = %self.kind,
            before,
            after = state.slots.len(),
            "compacted index"
        );
    }

    /// Slots held by the graph, including tombstones
    pub fn slot_count(&self) -> usize {
        self.read().map(|s| s.slots.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CollectionState>, VectorIndexError> {
        self.state.read().map_err(|_| VectorIndexError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CollectionState>, VectorIndexError> {
        self.state.write().map_err(|_| VectorIndexError::LockPoisoned)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl VectorCollection for HnswCollection {
    fn kind(&self) -> CollectionKind {
        self.kind
    }

    fn query(
        &self,
        vector: &[f32],
        k: usize,
        time_range: Option<&RangeInclusive<i64>>,
    ) -> Result<Vec<IndexedItem>, VectorIndexError> {
        self.check_dimension(vector)?;
        let state = self.read()?;
        if k == 0 || state.live() == 0 {
            return Ok(Vec::new());
        }

        let has_tombstones = state.live() < state.slots.len();
        // Sorted slot ids that may be returned; FilterT for Vec<usize> binary-searches it
        let allowed: Option<Vec<usize>> = if time_range.is_some() || has_tombstones {
            Some(
                state
                    .slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, slot)| {
                        let slot = slot.as_ref()?;
                        match time_range {
                            Some(range) => slot.timestamp.filter(|ts| range.contains(ts)).map(|_| i),
                            None => Some(i),
                        }
                    })
                    .collect(),
            )
        } else {
            None
        };

        if allowed.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }

        let ef = self.ef_search.max(k);
        let neighbours = match &allowed {
            Some(ids) => state
                .index
                .search_filter(vector, k, ef, Some(ids as &dyn FilterT)),
            None => state.index.search(vector, k, ef),
        };

        let mut items: Vec<IndexedItem> = neighbours
            .into_iter()
            .filter_map(|n| {
                let slot = state.slots.get(n.d_id)?.as_ref()?;
                Some(IndexedItem {
                    id: slot.id.clone(),
                    text: slot.text.clone(),
                    metadata: slot.metadata.clone(),
                    distance: n.distance,
                })
            })
            .collect();
        items.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        items.truncate(k);
        Ok(items)
    }

    fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<usize, VectorIndexError> {
        for doc in &documents {
            self.check_dimension(&doc.embedding)?;
        }
        self.persist(&documents)?;

        let count = documents.len();
        let mut state = self.write()?;
        for doc in documents {
            state.insert(doc);
        }
        self.compact_if_needed(&mut state);
        tracing::debug!(collection = %self.kind, count, "upserted documents");
        Ok(count)
    }

    fn delete(&self, ids: &[String]) -> Result<usize, VectorIndexError> {
        self.unpersist(ids)?;
        let mut state = self.write()?;
        let removed = ids.iter().filter(|id| state.remove(id)).count();
        self.compact_if_needed(&mut state);
        Ok(removed)
    }

    fn reset(&self) -> Result<usize, VectorIndexError> {
        self.unpersist_all()?;
        let mut state = self.write()?;
        let removed = state.live();
        *state = CollectionState::new(&self.config);
        tracing::info!(collection = %self.kind, removed, "Collection reset");
        Ok(removed)
    }

    fn count(&self) -> usize {
        self.read().map(|s| s.live()).unwrap_or(0)
    }
}

fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
