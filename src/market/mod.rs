//! Market data model and structured lookups
//!
//! Candles come from a [`CandleStore`]; the [`LookupDispatcher`] turns a
//! resolved time reference into one of four summaries and normalises the
//! store's answer into a [`LookupOutcome`].

mod dispatcher;
mod summary;

pub use dispatcher::LookupDispatcher;
pub use summary::{
    percent_change, DaySummary, MarketSummary, MomentSummary, OverviewSummary, RangeSummary,
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Candle granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Self::FiveMinutes => 5,
            Self::FifteenMinutes => 15,
            Self::OneHour => 60,
            Self::FourHours => 240,
            Self::OneDay => 1440,
        }
    }

    pub fn duration(&self) -> TimeDelta {
        TimeDelta::minutes(self.minutes())
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "1h" => Ok(Self::OneHour),
            "4h" => Ok(Self::FourHours),
            "1d" => Ok(Self::OneDay),
            other => Err(format!("unknown interval '{}'", other)),
        }
    }
}

/// One OHLCV bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Error, Debug)]
pub enum CandleStoreError {
    #[error("Candle store query failed: {0}")]
    Query(String),

    #[error("Candle store unavailable: {0}")]
    Unavailable(String),
}

/// Time-series source of candles.
///
/// An empty answer for a valid ticker/window is `Ok(vec![])`, never an error.
pub trait CandleStore: Send + Sync {
    /// Candles with `start <= open_time <= end`, ascending
    fn query(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<Candle>, CandleStoreError>;

    /// The most recent `count` candles, ascending
    fn latest(
        &self,
        ticker: &str,
        count: usize,
        interval: Interval,
    ) -> Result<Vec<Candle>, CandleStoreError>;

    /// Most recent candle whose open time is at or before `instant`
    fn last_at_or_before(
        &self,
        ticker: &str,
        instant: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Option<Candle>, CandleStoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupStatus {
    Success,
    NoData,
    Error,
}

/// Result of a structured lookup: a summary, or a message explaining its absence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupOutcome {
    Success { summary: MarketSummary },
    NoData { message: String, suggestion: String },
    Error { message: String },
}

impl LookupOutcome {
    pub fn status(&self) -> LookupStatus {
        match self {
            Self::Success { .. } => LookupStatus::Success,
            Self::NoData { .. } => LookupStatus::NoData,
            Self::Error { .. } => LookupStatus::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn summary(&self) -> Option<&MarketSummary> {
        match self {
            Self::Success { summary } => Some(summary),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::NoData { message, .. } | Self::Error { message } => Some(message),
        }
    }

    /// Markdown block for the structured section of a prompt
    pub fn render(&self) -> String {
        match self {
            Self::Success { summary } => summary.render(),
            Self::NoData {
                message,
                suggestion,
            } => format!("{}\n{}", message, suggestion),
            Self::Error { message } => format!("Lỗi truy vấn dữ liệu: {}", message),
        }
    }

    /// One line for logs and CLI output
    pub fn headline(&self) -> String {
        match self {
            Self::Success { summary } => summary.headline(),
            Self::NoData { message, .. } => format!("no data: {}", message),
            Self::Error { message } => format!("error: {}", message),
        }
    }
}
