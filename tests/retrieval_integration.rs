//! End-to-end retrieval: documents built from records, indexed into
//! persisted HNSW collections and searched through the hybrid searcher

use chrono::NaiveDate;
use cryptorag::config::{IndexingConfig, RetrievalConfig};
use cryptorag::embedding::{
    normalize, open_collections, CollectionKind, CollectionSet, EmbeddingError, EmbeddingProvider,
    EncodeMode,
};
use cryptorag::ingest::{analysis_document, news_documents, AnalysisNote, Indexer, NewsRecord};
use cryptorag::retrieval::{HybridSearcher, SearchQuery, TimeWindow};
use cryptorag::storage::Database;
use std::sync::Arc;
use tempfile::TempDir;

/// Four axes: "etf", "hack", "price", and a constant so no vector is zero
struct TopicEmbedder;

impl EmbeddingProvider for TopicEmbedder {
    fn encode(&self, texts: &[String], _mode: EncodeMode) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let mut v = vec![
                    lower.matches("etf").count() as f32,
                    lower.matches("hack").count() as f32,
                    lower.matches("price").count() as f32,
                    0.1,
                ];
                normalize(&mut v);
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        4
    }

    fn model_name(&self) -> &str {
        "topic"
    }
}

struct Fixture {
    _temp: TempDir,
    db: Database,
    collections: CollectionSet,
    news_ids: Vec<String>,
}

fn indexing_config() -> IndexingConfig {
    IndexingConfig {
        vector_dim: 4,
        max_elements: 1_000,
        enabled_collections: vec![CollectionKind::News, CollectionKind::Analysis],
        ..IndexingConfig::default()
    }
}

fn news(title: &str, published_on: i64) -> NewsRecord {
    NewsRecord {
        title: title.to_string(),
        published_on: Some(published_on),
        source_name: "wire".to_string(),
        sentiment: "POSITIVE".to_string(),
        ..NewsRecord::default()
    }
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let db = Database::new(&temp.path().join("vectors.sqlite")).unwrap();
    let collections = open_collections(&indexing_config(), &db).unwrap();
    let indexer = Indexer::new(Arc::new(TopicEmbedder), 2);

    let drafts = news_documents(&[
        // 2024-01-15 10:00 UTC
        news("Bitcoin ETF inflows hit record", 1_705_312_800),
        // 2024-01-10 10:00 UTC, in milliseconds
        news("Exchange hack drains wallets", 1_704_880_800_000),
        // 2023-12-01 10:00 UTC
        news("ETF approval rumours", 1_701_424_800),
    ]);
    let news_ids = drafts.iter().map(|d| d.id.clone()).collect();
    let news_collection = collections.get(CollectionKind::News).unwrap();
    indexer.index(news_collection.as_ref(), drafts).unwrap();

    let note = analysis_document(&AnalysisNote {
        id: "etf_outlook".to_string(),
        text: "ETF flows drive long term demand".to_string(),
        metadata: Default::default(),
    });
    let analysis_collection = collections.get(CollectionKind::Analysis).unwrap();
    indexer.index(analysis_collection.as_ref(), vec![note]).unwrap();

    Fixture {
        _temp: temp,
        db,
        collections,
        news_ids,
    }
}

fn searcher(collections: CollectionSet) -> HybridSearcher {
    HybridSearcher::new(Arc::new(TopicEmbedder), collections, RetrievalConfig::default())
}

fn window(start: (i32, u32, u32), end: (i32, u32, u32)) -> TimeWindow {
    TimeWindow::new(
        NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
        NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
    )
}

#[tokio::test]
async fn test_time_window_filters_dated_collections_only() {
    let fx = fixture();
    let searcher = searcher(fx.collections.clone());

    let query = SearchQuery::new(
        "etf news",
        vec![CollectionKind::News, CollectionKind::Analysis],
        5,
    )
    .with_time_window(Some(window((2024, 1, 14), (2024, 1, 16))));
    let results = searcher.search(&query).await.unwrap();

    let ids: Vec<&str> = results.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(results.len(), 2, "{:?}", ids);
    assert!(ids.contains(&fx.news_ids[0].as_str()));
    assert!(ids.contains(&"etf_outlook"));

    // Same similarity, but the news hit is recent and the query mentions news
    assert_eq!(results[0].id, fx.news_ids[0]);
    assert_eq!(results[0].collection, CollectionKind::News);
    let boosts = results[0].boosts.unwrap();
    assert_eq!(boosts.recency, 1.3);
    assert_eq!(boosts.collection, 1.2);
    assert!(results[0].score() > results[1].score());
}

#[tokio::test]
async fn test_unfiltered_search_prefers_nearest_topic() {
    let fx = fixture();
    let searcher = searcher(fx.collections.clone());

    let query = SearchQuery::new("exchange hack", vec![CollectionKind::News], 1);
    let results = searcher.search(&query).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, fx.news_ids[1]);
    // Millisecond publish times are stored as seconds
    assert_eq!(results[0].timestamp(), Some(1_704_880_800));
    assert_eq!(results[0].date().as_deref(), Some("2024-01-10"));
}

#[tokio::test]
async fn test_unknown_collection_yields_nothing() {
    let fx = fixture();
    let searcher = searcher(fx.collections.clone());

    let query = SearchQuery::new("btc price", vec![CollectionKind::Kline], 3);
    let results = searcher.search(&query).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_collections_reload_from_database() {
    let fx = fixture();
    let reopened = open_collections(&indexing_config(), &fx.db).unwrap();

    let counts: Vec<(CollectionKind, usize)> = reopened.stats();
    assert!(counts.contains(&(CollectionKind::News, 3)));
    assert!(counts.contains(&(CollectionKind::Analysis, 1)));

    let query = SearchQuery::new("etf outlook", vec![CollectionKind::Analysis], 1);
    let results = searcher(reopened).search(&query).await.unwrap();
    assert_eq!(results[0].id, "etf_outlook");
    assert_eq!(results[0].metadata["type"], "analysis");
}
