//! Hybrid retrieval & reranking
//!
//! One nearest-neighbour query per collection, merged by distance, then
//! reordered by a composite score (similarity × keyword × recency × collection).

mod deduplication;
mod hybrid;
mod rerank;

pub use deduplication::deduplicate_hits;
pub use hybrid::{HybridSearcher, SearchError};
pub use rerank::{Reranker, ScoreBreakdown};

use crate::embedding::{metadata_timestamp, CollectionKind, IndexedItem};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::RangeInclusive;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Calendar-day window used to filter and boost retrieval results (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Midnight at the start of `start`
    pub fn start_epoch(&self) -> i64 {
        self.start.and_time(NaiveTime::MIN).and_utc().timestamp()
    }

    /// Last second of `end`
    pub fn end_epoch(&self) -> i64 {
        self.reference_epoch() + SECONDS_PER_DAY - 1
    }

    /// Midnight at the start of `end`; recency is measured from here
    pub fn reference_epoch(&self) -> i64 {
        self.end.and_time(NaiveTime::MIN).and_utc().timestamp()
    }

    /// Inclusive metadata filter
    pub fn epoch_range(&self) -> RangeInclusive<i64> {
        self.start_epoch()..=self.end_epoch()
    }
}

/// One candidate from a single collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub id: String,
    pub text: String,
    pub collection: CollectionKind,
    pub metadata: Map<String, Value>,
    pub distance: f32,
    /// `1 - distance`
    pub similarity: f32,
    /// Set by reranking
    pub final_score: Option<f32>,
    pub boosts: Option<ScoreBreakdown>,
}

impl RetrievalHit {
    pub fn from_item(collection: CollectionKind, item: IndexedItem) -> Self {
        Self {
            id: item.id,
            text: item.text,
            collection,
            metadata: item.metadata,
            distance: item.distance,
            similarity: 1.0 - item.distance,
            final_score: None,
            boosts: None,
        }
    }

    pub fn timestamp(&self) -> Option<i64> {
        metadata_timestamp(&self.metadata)
    }

    /// `date` metadata, or the calendar day of `timestamp`
    pub fn date(&self) -> Option<String> {
        if let Some(Value::String(date)) = self.metadata.get("date") {
            return Some(date.clone());
        }
        let ts = self.timestamp()?;
        chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.format("%Y-%m-%d").to_string())
    }

    /// Score used for ordering: reranked when available
    pub fn score(&self) -> f32 {
        self.final_score.unwrap_or(self.similarity)
    }
}

/// Search request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    /// Collections to query, in order
    pub collections: Vec<CollectionKind>,
    pub top_k: usize,
    pub time_window: Option<TimeWindow>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, collections: Vec<CollectionKind>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            collections,
            top_k,
            time_window: None,
        }
    }

    pub fn with_time_window(mut self, window: Option<TimeWindow>) -> Self {
        self.time_window = window;
        self
    }
}
