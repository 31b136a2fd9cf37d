//! Result deduplication by collection and document id

use crate::retrieval::RetrievalHit;
use ahash::AHashSet;

/// Keep the first occurrence of every (collection, id) pair, preserving order
pub fn deduplicate_hits(hits: Vec<RetrievalHit>) -> Vec<RetrievalHit> {
    let mut seen = AHashSet::new();

    hits.into_iter()
        .filter(|hit| seen.insert((hit.collection, hit.id.clone())))
        .collect()
}
