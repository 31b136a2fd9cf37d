//! Multi-collection semantic search with reranking

use crate::config::RetrievalConfig;
use crate::embedding::{CollectionKind, CollectionSet, EmbeddingProvider};
use crate::retrieval::{deduplicate_hits, Reranker, RetrievalHit, SearchQuery};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingError(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Searches several collections concurrently and reranks the merged pool
pub struct HybridSearcher {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    collections: CollectionSet,
    reranker: Reranker,
    config: RetrievalConfig,
}

impl HybridSearcher {
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        collections: CollectionSet,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedding_provider,
            collections,
            reranker: Reranker::new(&config),
            config,
        }
    }

    pub fn collections(&self) -> &CollectionSet {
        &self.collections
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Embed once, query every requested collection, merge by distance,
    /// rerank the best `top_k × candidate_multiplier` and return `top_k`.
    ///
    /// A collection that fails or times out is logged and skipped.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<RetrievalHit>, SearchError> {
        if query.text.trim().is_empty() {
            return Err(SearchError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }
        if query.top_k == 0 {
            return Ok(Vec::new());
        }

        // Step 1: embed the query; every collection query depends on it
        let provider = Arc::clone(&self.embedding_provider);
        let text = query.text.clone();
        let vector = tokio::task::spawn_blocking(move || provider.embed_query(&text))
            .await
            .map_err(|e| SearchError::EmbeddingError(e.to_string()))?
            .map_err(|e| SearchError::EmbeddingError(e.to_string()))?;

        // Step 2: one query per collection, concurrently
        let kinds = self.requested_kinds(query);
        let mut candidates = self.query_collections(&kinds, Arc::new(vector), query).await;

        // Step 3: merge by distance and keep the reranking pool
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        let mut pool = deduplicate_hits(candidates);
        pool.truncate(
            query
                .top_k
                .saturating_mul(self.config.candidate_multiplier.max(1)),
        );

        // Step 4: composite score
        let results =
            self.reranker
                .rerank(&query.text, pool, query.time_window.as_ref(), query.top_k);

        tracing::debug!(
            query = %query.text,
            collections = kinds.len(),
            results = results.len(),
            "hybrid search complete"
        );
        Ok(results)
    }

    /// Requested collections without duplicates, falling back to the defaults
    fn requested_kinds(&self, query: &SearchQuery) -> Vec<CollectionKind> {
        let requested = if query.collections.is_empty() {
            &self.config.default_collections
        } else {
            &query.collections
        };

        let mut kinds = Vec::with_capacity(requested.len());
        for kind in requested {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }

    async fn query_collections(
        &self,
        kinds: &[CollectionKind],
        vector: Arc<Vec<f32>>,
        query: &SearchQuery,
    ) -> Vec<RetrievalHit> {
        let timeout = Duration::from_millis(self.config.collection_timeout_ms);
        let mut tasks = JoinSet::new();

        for (position, kind) in kinds.iter().copied().enumerate() {
            let Some(collection) = self.collections.get(kind).cloned() else {
                tracing::warn!(collection = %kind, "Collection not enabled, skipping");
                continue;
            };
            let range = query
                .time_window
                .filter(|_| kind.supports_time_filter())
                .map(|w| w.epoch_range());
            let vector = Arc::clone(&vector);
            let k = query.top_k;

            tasks.spawn(async move {
                let lookup = tokio::task::spawn_blocking(move || {
                    collection.query(&vector, k, range.as_ref())
                });
                (position, kind, tokio::time::timeout(timeout, lookup).await)
            });
        }

        let mut per_collection = Vec::with_capacity(kinds.len());
        while let Some(joined) = tasks.join_next().await {
            let (position, kind, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("Collection task failed: {}", e);
                    continue;
                }
            };

            match outcome {
                Ok(Ok(Ok(items))) => {
                    tracing::debug!(collection = %kind, hits = items.len(), "collection searched");
                    let hits: Vec<RetrievalHit> = items
                        .into_iter()
                        .map(|item| RetrievalHit::from_item(kind, item))
                        .collect();
                    per_collection.push((position, hits));
                }
                Ok(Ok(Err(e))) => tracing::warn!(collection = %kind, "Search failed: {}", e),
                Ok(Err(e)) => tracing::warn!(collection = %kind, "Search task failed: {}", e),
                Err(_) => tracing::warn!(
                    collection = %kind,
                    "Search timed out after {}ms",
                    timeout.as_millis()
                ),
            }
        }

        // Completion order is arbitrary; restore request order so ties are stable
        per_collection.sort_by_key(|(position, _)| *position);
        per_collection
            .into_iter()
            .flat_map(|(_, hits)| hits)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{
        EmbeddingError, EncodeMode, IndexedDocument, IndexedItem, VectorCollection,
        VectorIndexError,
    };
    use std::ops::RangeInclusive;

    struct ConstantEmbedder;

    impl EmbeddingProvider for ConstantEmbedder {
        fn encode(
            &self,
            texts: &[String],
            _mode: EncodeMode,
        ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "constant"
        }
    }

    /// Returns fixed items, or fails
    struct FixedCollection {
        kind: CollectionKind,
        items: Vec<(&'static str, f32)>,
        fail: bool,
    }

    impl VectorCollection for FixedCollection {
        fn kind(&self) -> CollectionKind {
            self.kind
        }

        fn query(
            &self,
            _vector: &[f32],
            k: usize,
            _time_range: Option<&RangeInclusive<i64>>,
        ) -> Result<Vec<IndexedItem>, VectorIndexError> {
            if self.fail {
                return Err(VectorIndexError::LockPoisoned);
            }
            Ok(self
                .items
                .iter()
                .take(k)
                .map(|(id, distance)| IndexedItem {
                    id: id.to_string(),
                    text: id.to_string(),
                    metadata: Default::default(),
                    distance: *distance,
                })
                .collect())
        }

        fn upsert(&self, _documents: Vec<IndexedDocument>) -> Result<usize, VectorIndexError> {
            Ok(0)
        }

        fn delete(&self, _ids: &[String]) -> Result<usize, VectorIndexError> {
            Ok(0)
        }

        fn reset(&self) -> Result<usize, VectorIndexError> {
            Ok(0)
        }

        fn count(&self) -> usize {
            self.items.len()
        }
    }

    fn searcher(collections: Vec<FixedCollection>) -> HybridSearcher {
        let mut set = CollectionSet::new();
        for c in collections {
            set.insert(Arc::new(c));
        }
        HybridSearcher::new(Arc::new(ConstantEmbedder), set, RetrievalConfig::default())
    }

    #[tokio::test]
    async fn test_failing_collection_is_skipped() {
        let s = searcher(vec![
            FixedCollection {
                kind: CollectionKind::News,
                items: vec![("n1", 0.2), ("n2", 0.4)],
                fail: false,
            },
            FixedCollection {
                kind: CollectionKind::Analysis,
                items: vec![],
                fail: true,
            },
        ]);
        let query = SearchQuery::new(
            "anything",
            vec![CollectionKind::News, CollectionKind::Analysis],
            5,
        );

        let hits = s.search(&query).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2"]);
        assert!(hits.iter().all(|h| h.final_score.is_some()));
    }

    #[tokio::test]
    async fn test_all_collections_failing_is_empty() {
        let s = searcher(vec![FixedCollection {
            kind: CollectionKind::News,
            items: vec![],
            fail: true,
        }]);
        let query = SearchQuery::new("anything", vec![CollectionKind::News], 5);
        assert!(s.search(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_defaults_when_no_collection_named() {
        let s = searcher(vec![
            FixedCollection {
                kind: CollectionKind::Kline,
                items: vec![("k1", 0.0)],
                fail: false,
            },
            FixedCollection {
                kind: CollectionKind::Analysis,
                items: vec![("a1", 0.3)],
                fail: false,
            },
        ]);
        // Defaults are news + analysis; news is not enabled here
        let hits = s
            .search(&SearchQuery::new("rsi", Vec::new(), 5))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a1");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let s = searcher(Vec::new());
        let result = s.search(&SearchQuery::new("  ", Vec::new(), 5)).await;
        assert!(matches!(result, Err(SearchError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_pool_limited_before_rerank() {
        let s = searcher(vec![FixedCollection {
            kind: CollectionKind::News,
            items: vec![("a", 0.1), ("b", 0.2), ("c", 0.3), ("d", 0.4), ("e", 0.5)],
            fail: false,
        }]);
        let hits = s
            .search(&SearchQuery::new("q", vec![CollectionKind::News], 2))
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_huge_top_k_returns_everything() {
        let s = searcher(vec![FixedCollection {
            kind: CollectionKind::News,
            items: vec![("a", 0.1), ("b", 0.2)],
            fail: false,
        }]);
        let hits = s
            .search(&SearchQuery::new("q", vec![CollectionKind::News], usize::MAX))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }
}
