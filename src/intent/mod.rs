//! Temporal and intent resolution
//!
//! Turns a free-text question into an [`Intent`]: which ticker it is about,
//! what kind of question it is, and which point or span of time it refers to.
//! Resolution never fails; anything unrecognised falls back to
//! [`QueryCategory::General`] with no time reference and the default ticker.

mod calendar;
mod rules;

use crate::config::ResolverConfig;
use crate::error::{RagError, Result};
use crate::retrieval::TimeWindow;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use rules::{RuleContext, TimePatterns, RULES};
use serde::{Deserialize, Serialize};

/// What kind of question was asked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryCategory {
    PriceQuery,
    TrendAnalysis,
    NewsSummary,
    General,
}

impl QueryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceQuery => "price_query",
            Self::TrendAnalysis => "trend_analysis",
            Self::NewsSummary => "news_summary",
            Self::General => "general",
        }
    }

    /// Price and trend questions need numbers from the candle store
    pub fn needs_structured_lookup(&self) -> bool {
        matches!(self, Self::PriceQuery | Self::TrendAnalysis)
    }
}

impl std::fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The time a query refers to. `ExactInstant` has minute precision, the other
/// variants day precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TimeReference {
    ExactInstant(NaiveDateTime),
    ExactDate(NaiveDate),
    Range { start: NaiveDate, end: NaiveDate },
}

/// Resolved descriptor of one user query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub ticker: String,
    pub category: QueryCategory,
    pub time_reference: Option<TimeReference>,
    pub needs_structured_lookup: bool,
    pub needs_semantic_search: bool,
}

impl Intent {
    /// Retrieval filter window; only ranges constrain semantic search
    pub fn time_window(&self) -> Option<TimeWindow> {
        match self.time_reference {
            Some(TimeReference::Range { start, end }) => Some(TimeWindow::new(start, end)),
            _ => None,
        }
    }
}

struct CategoryMatcher {
    category: QueryCategory,
    regex: Regex,
}

/// Rule-based resolver, compiled once from [`ResolverConfig`]
pub struct IntentResolver {
    default_ticker: String,
    quote_currency: String,
    ticker_pattern: Regex,
    categories: Vec<CategoryMatcher>,
    time_patterns: TimePatterns,
    trend_default_days: u64,
}

impl IntentResolver {
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let quote_currency = config.quote_currency.to_uppercase();
        let symbols = alternation(&config.known_symbols);
        let ticker_pattern = Regex::new(&format!(
            r"(?i)\b({})(?:{})?\b",
            symbols,
            regex::escape(&quote_currency)
        ))
        .map_err(|source| RagError::Pattern {
            name: "ticker".to_string(),
            source,
        })?;

        // Fixed priority: price > trend > news
        let categories = [
            (QueryCategory::PriceQuery, &config.price_keywords),
            (QueryCategory::TrendAnalysis, &config.trend_keywords),
            (QueryCategory::NewsSummary, &config.news_keywords),
        ]
        .into_iter()
        .map(|(category, keywords)| {
            Regex::new(&format!("(?i){}", alternation(keywords)))
                .map(|regex| CategoryMatcher { category, regex })
                .map_err(|source| RagError::Pattern {
                    name: format!("{}_keywords", category),
                    source,
                })
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            default_ticker: config.default_ticker.to_uppercase(),
            quote_currency,
            ticker_pattern,
            categories,
            time_patterns: TimePatterns::compile()?,
            trend_default_days: config.trend_default_days,
        })
    }

    /// Resolve against the current UTC clock
    pub fn resolve(&self, text: &str) -> Intent {
        self.resolve_at(text, Utc::now().naive_utc())
    }

    /// Resolve with an explicit "now"
    pub fn resolve_at(&self, text: &str, now: NaiveDateTime) -> Intent {
        let category = self.detect_category(text);
        let mut intent = Intent {
            ticker: self.extract_ticker(text),
            category,
            time_reference: None,
            needs_structured_lookup: category.needs_structured_lookup(),
            needs_semantic_search: true,
        };

        let lower = text.to_lowercase();
        let ctx = RuleContext {
            raw: text,
            lower: &lower,
            now,
            category,
            trend_default_days: self.trend_default_days,
        };

        for (name, rule) in RULES {
            if let Some(hit) = rule(&self.time_patterns, &ctx) {
                tracing::debug!(rule = name, reference = ?hit.time_reference, "time rule matched");
                intent.time_reference = Some(hit.time_reference);
                intent.needs_structured_lookup |= hit.requires_structured;
                break;
            }
        }

        intent
    }

    fn extract_ticker(&self, text: &str) -> String {
        match self.ticker_pattern.captures(text).and_then(|c| c.get(1)) {
            Some(symbol) => format!("{}{}", symbol.as_str().to_uppercase(), self.quote_currency),
            None => self.default_ticker.clone(),
        }
    }

    fn detect_category(&self, text: &str) -> QueryCategory {
        self.categories
            .iter()
            .find(|m| m.regex.is_match(text))
            .map(|m| m.category)
            .unwrap_or(QueryCategory::General)
    }
}

fn alternation(items: &[String]) -> String {
    let escaped: Vec<String> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(regex::escape)
        .collect();
    format!("(?:{})", escaped.join("|"))
}
