//! Ingestion: raw market records to candles and indexed documents

mod documents;

pub use documents::{
    analysis_document, kline_documents, news_documents, open_interest_documents, resample,
    AnalysisNote, DocumentDraft, NewsRecord, OpenInterestRecord,
};

use crate::embedding::{
    EmbeddingError, EmbeddingProvider, EncodeMode, IndexedDocument, VectorCollection,
    VectorIndexError,
};
use crate::market::Candle;
use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Epoch values above this are milliseconds
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index write failed: {0}")]
    Index(#[from] VectorIndexError),

    #[error("Embedder returned {actual} vectors for {expected} documents")]
    VectorCountMismatch { expected: usize, actual: usize },
}

/// Epoch seconds from a value that may be in milliseconds
pub fn normalize_epoch(raw: i64) -> i64 {
    if raw > MILLIS_THRESHOLD {
        raw / 1000
    } else {
        raw
    }
}

/// Exchange kline row (`openTime` may be seconds or milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleRecord {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl CandleRecord {
    pub fn to_candle(&self) -> Option<Candle> {
        Some(Candle {
            open_time: DateTime::from_timestamp(normalize_epoch(self.open_time), 0)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

/// Read a JSON array of records
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, IngestError> {
    let content = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| IngestError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Candles from a JSON array of [`CandleRecord`]s; rows with an
/// unrepresentable time are dropped
pub fn load_candles(path: &Path) -> Result<Vec<Candle>, IngestError> {
    let records: Vec<CandleRecord> = load_json(path)?;
    let total = records.len();
    let candles: Vec<Candle> = records.iter().filter_map(CandleRecord::to_candle).collect();
    if candles.len() < total {
        tracing::warn!("Dropped {} candles with invalid open time", total - candles.len());
    }
    Ok(candles)
}

/// Counts from one indexing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub documents: usize,
    pub batches: usize,
    pub written: usize,
}

/// Embeds drafts in document mode and upserts them, one batch at a time
pub struct Indexer {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl Indexer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn index(
        &self,
        collection: &dyn VectorCollection,
        drafts: Vec<DocumentDraft>,
    ) -> Result<IndexReport, IngestError> {
        let mut report = IndexReport {
            documents: drafts.len(),
            ..Default::default()
        };

        for batch in drafts.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let vectors = self.provider.encode(&texts, EncodeMode::Document)?;
            if vectors.len() != batch.len() {
                return Err(IngestError::VectorCountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }

            let documents = batch
                .iter()
                .zip(vectors)
                .map(|(draft, embedding)| IndexedDocument {
                    id: draft.id.clone(),
                    text: draft.text.clone(),
                    metadata: draft.metadata.clone(),
                    embedding,
                })
                .collect();

            report.written += collection.upsert(documents)?;
            report.batches += 1;
            tracing::debug!(
                collection = %collection.kind(),
                batch = report.batches,
                written = report.written,
                "Indexed batch"
            );
        }

        tracing::info!(
            collection = %collection.kind(),
            documents = report.documents,
            "Indexing complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use crate::embedding::{CollectionKind, HnswCollection};
    use std::io::Write;
    use std::sync::Mutex;

    /// Records the modes it was called with
    struct AxisEmbedder {
        modes: Mutex<Vec<EncodeMode>>,
    }

    impl EmbeddingProvider for AxisEmbedder {
        fn encode(
            &self,
            texts: &[String],
            mode: EncodeMode,
        ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.modes.lock().unwrap().push(mode);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; 4];
                    v[t.len() % 4] = 1.0;
                    v
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "axis"
        }
    }

    #[test]
    fn test_normalize_epoch() {
        assert_eq!(normalize_epoch(1_717_200_000_000), 1_717_200_000);
        assert_eq!(normalize_epoch(1_717_200_000), 1_717_200_000);
    }

    #[test]
    fn test_indexer_batches_in_document_mode() {
        let provider = Arc::new(AxisEmbedder {
            modes: Mutex::new(Vec::new()),
        });
        let config = IndexingConfig {
            vector_dim: 4,
            ..IndexingConfig::default()
        };
        let collection = HnswCollection::new(CollectionKind::Analysis, &config);
        let drafts: Vec<DocumentDraft> = (0..5)
            .map(|i| {
                analysis_document(&AnalysisNote {
                    id: format!("a{}", i),
                    text: "x".repeat(i + 1),
                    metadata: Default::default(),
                })
            })
            .collect();

        let indexer = Indexer::new(provider.clone(), 2);
        let report = indexer.index(&collection, drafts).unwrap();

        assert_eq!(report.documents, 5);
        assert_eq!(report.batches, 3);
        assert_eq!(report.written, 5);
        assert_eq!(collection.count(), 5);
        assert!(provider
            .modes
            .lock()
            .unwrap()
            .iter()
            .all(|m| *m == EncodeMode::Document));
    }

    #[test]
    fn test_load_candles_from_millis() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"openTime":1717200000000,"open":1,"high":2,"low":0.5,"close":1.5,"volume":3}}]"#
        )
        .unwrap();

        let candles = load_candles(file.path()).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open_time.timestamp(), 1_717_200_000);
    }

    #[test]
    fn test_load_json_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let result: Result<Vec<NewsRecord>, _> = load_json(file.path());
        assert!(matches!(result, Err(IngestError::Parse { .. })));
    }
}
