//! Embedding & indexing
//!
//! - [`EmbeddingProvider`]: text to normalised vectors, with query/document modes
//! - [`VectorCollection`]: nearest-neighbour store per [`CollectionKind`]
//! - [`CollectionSet`]: the enabled collections, built once from config

mod collection;
mod provider;
mod vector_index;

pub use collection::{CollectionKind, CollectionSet};
pub use provider::{
    normalize, EmbeddingError, EmbeddingProvider, EncodeMode, FastEmbedProvider, SUPPORTED_MODELS,
};
pub use vector_index::{
    metadata_timestamp, HnswCollection, IndexedDocument, IndexedItem, VectorCollection,
    VectorIndexError,
};

use crate::config::IndexingConfig;
use crate::storage::Database;
use std::sync::Arc;

/// Open a persisted HNSW collection for every enabled kind
pub fn open_collections(
    config: &IndexingConfig,
    db: &Database,
) -> Result<CollectionSet, VectorIndexError> {
    let mut set = CollectionSet::new();
    for kind in &config.enabled_collections {
        let collection = HnswCollection::open(*kind, config, db.clone())?;
        set.insert(Arc::new(collection));
    }
    Ok(set)
}
