//! Composite relevance scoring

use super::{RetrievalHit, TimeWindow, SECONDS_PER_DAY};
use crate::config::RetrievalConfig;
use crate::embedding::CollectionKind;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// The factors multiplied into a hit's final score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base: f32,
    pub keyword: f32,
    pub recency: f32,
    pub collection: f32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f32 {
        self.base * self.keyword * self.recency * self.collection
    }
}

/// Reorders a candidate pool by
/// `(1 - distance) × keyword_boost × recency_boost × collection_boost`
#[derive(Debug, Clone)]
pub struct Reranker {
    keyword_weight: f32,
    news_boost: f32,
    price_boost: f32,
    news_keywords: Vec<String>,
    price_keywords: Vec<String>,
}

impl Default for Reranker {
    fn default() -> Self {
        Self::new(&RetrievalConfig::default())
    }
}

impl Reranker {
    pub fn new(config: &RetrievalConfig) -> Self {
        let lower = |words: &[String]| -> Vec<String> {
            words.iter().map(|w| w.to_lowercase()).collect()
        };
        Self {
            keyword_weight: config.keyword_weight,
            news_boost: config.news_boost,
            price_boost: config.price_boost,
            news_keywords: lower(&config.news_boost_keywords),
            price_keywords: lower(&config.price_boost_keywords),
        }
    }

    /// `1 + weight × |query ∩ text| / max(|query|, 1)` over lowercase
    /// whitespace tokens
    pub fn keyword_boost(&self, query_tokens: &AHashSet<String>, text: &str) -> f32 {
        let lower = text.to_lowercase();
        let text_tokens: AHashSet<&str> = lower.split_whitespace().collect();
        let overlap = query_tokens
            .iter()
            .filter(|t| text_tokens.contains(t.as_str()))
            .count();
        1.0 + self.keyword_weight * overlap as f32 / query_tokens.len().max(1) as f32
    }

    /// Step function of the distance in days between the hit and the end of
    /// the window; 1.0 when either side is missing
    pub fn recency_boost(timestamp: Option<i64>, window: Option<&TimeWindow>) -> f32 {
        let (Some(ts), Some(window)) = (timestamp, window) else {
            return 1.0;
        };
        let days = ts.abs_diff(window.reference_epoch()) as f64 / SECONDS_PER_DAY as f64;
        if days < 1.0 {
            1.3
        } else if days < 7.0 {
            1.15
        } else if days < 30.0 {
            1.05
        } else {
            1.0
        }
    }

    /// News and price keywords are checked independently
    pub fn collection_boost(&self, query_lower: &str, collection: CollectionKind) -> f32 {
        let mentions = |words: &[String]| words.iter().any(|w| query_lower.contains(w.as_str()));

        let mut boost = 1.0;
        if collection == CollectionKind::News && mentions(&self.news_keywords) {
            boost *= self.news_boost;
        }
        if collection == CollectionKind::Kline && mentions(&self.price_keywords) {
            boost *= self.price_boost;
        }
        boost
    }

    pub fn score(
        &self,
        query_lower: &str,
        query_tokens: &AHashSet<String>,
        hit: &RetrievalHit,
        window: Option<&TimeWindow>,
    ) -> ScoreBreakdown {
        ScoreBreakdown {
            base: 1.0 - hit.distance,
            keyword: self.keyword_boost(query_tokens, &hit.text),
            recency: Self::recency_boost(hit.timestamp(), window),
            collection: self.collection_boost(query_lower, hit.collection),
        }
    }

    /// Score every hit, sort descending (stable, so ties keep input order)
    /// and keep `top_k`
    pub fn rerank(
        &self,
        query: &str,
        mut hits: Vec<RetrievalHit>,
        window: Option<&TimeWindow>,
        top_k: usize,
    ) -> Vec<RetrievalHit> {
        let query_lower = query.to_lowercase();
        let query_tokens: AHashSet<String> =
            query_lower.split_whitespace().map(str::to_string).collect();

        for hit in &mut hits {
            let breakdown = self.score(&query_lower, &query_tokens, hit, window);
            hit.final_score = Some(breakdown.total());
            hit.boosts = Some(breakdown);
        }

        hits.sort_by(|a, b| b.score().total_cmp(&a.score()));
        hits.truncate(top_k);
        hits
    }
}
