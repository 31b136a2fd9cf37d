use super::normalize_epoch;
use crate::market::{Candle, Interval};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Document text and metadata before embedding
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDraft {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// A news article as exported by the news feed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewsRecord {
    pub id: Option<Value>,
    pub title: String,
    pub subtitle: String,
    /// Epoch seconds or milliseconds
    pub published_on: Option<i64>,
    pub source_name: String,
    pub sentiment: String,
    pub categories: Value,
    pub keywords: Value,
    pub raw_body: String,
    pub url: String,
}

/// Aggregated futures open interest at one point in time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenInterestRecord {
    pub symbol: String,
    /// Epoch seconds or milliseconds
    pub timestamp: i64,
    pub sum_open_interest: f64,
    pub sum_open_interest_value: f64,
    #[serde(rename = "CMCCirculatingSupply")]
    pub circulating_supply: f64,
}

/// Free-form analysis text with caller-chosen id and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisNote {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

const NEWS_BODY_CHARS: usize = 500;

/// Aggregate candles into `interval` buckets aligned to the epoch:
/// first open, max high, min low, last close, summed volume.
pub fn resample(candles: &[Candle], interval: Interval) -> Vec<Candle> {
    let bucket_secs = interval.minutes() * 60;
    let mut sorted: Vec<&Candle> = candles.iter().collect();
    sorted.sort_by_key(|c| c.open_time);

    let mut out: Vec<Candle> = Vec::new();
    let mut current_bucket = None;
    for candle in sorted {
        let ts = candle.open_time.timestamp();
        let bucket = ts - ts.rem_euclid(bucket_secs);

        match out.last_mut() {
            Some(agg) if current_bucket == Some(bucket) => {
                agg.high = agg.high.max(candle.high);
                agg.low = agg.low.min(candle.low);
                agg.close = candle.close;
                agg.volume += candle.volume;
            }
            _ => {
                let Some(open_time) = DateTime::from_timestamp(bucket, 0) else {
                    continue;
                };
                current_bucket = Some(bucket);
                out.push(Candle {
                    open_time,
                    ..candle.clone()
                });
            }
        }
    }
    out
}

fn date_of(epoch: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(epoch, 0).map(|dt| dt.format("%Y-%m-%d").to_string())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

/// One document per candle, already at the interval being indexed
pub fn kline_documents(ticker: &str, candles: &[Candle], interval: Interval) -> Vec<DocumentDraft> {
    candles
        .iter()
        .map(|c| {
            let ts = c.open_time.timestamp();
            let text = format!(
                "Ticker: {}\nTime: {}\nInterval: {}\nOpen: {:.2}\nHigh: {:.2}\nLow: {:.2}\nClose: {:.2}\nVolume: {:.2}",
                ticker,
                c.open_time.format("%Y-%m-%d %H:%M"),
                interval,
                c.open,
                c.high,
                c.low,
                c.close,
                c.volume,
            );

            let mut metadata = Map::new();
            metadata.insert("type".to_string(), json!("kline"));
            metadata.insert("ticker".to_string(), json!(ticker));
            metadata.insert("timestamp".to_string(), json!(ts));
            metadata.insert("interval".to_string(), json!(interval.as_str()));
            metadata.insert(
                "date".to_string(),
                json!(c.open_time.format("%Y-%m-%d").to_string()),
            );

            DocumentDraft {
                id: format!("kline_{}_{}_{}", ticker, ts, interval),
                text,
                metadata,
            }
        })
        .collect()
}

pub fn news_documents(records: &[NewsRecord]) -> Vec<DocumentDraft> {
    records
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let published = item.published_on.map(normalize_epoch);
            let published_text = published
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            let body: String = item.raw_body.chars().take(NEWS_BODY_CHARS).collect();
            let or_default = |s: &str, fallback: &str| {
                if s.is_empty() {
                    fallback.to_string()
                } else {
                    s.to_string()
                }
            };

            let text = format!(
                "Title: {}\nSubtitle: {}\nPublished: {}\nSource: {}\nSentiment: {}\nCategories: {}\nKeywords: {}\nBody: {}",
                or_default(&item.title, "No title"),
                item.subtitle,
                published_text,
                or_default(&item.source_name, "Unknown"),
                or_default(&item.sentiment, "NEUTRAL"),
                value_text(&item.categories),
                value_text(&item.keywords),
                body,
            );

            let mut metadata = Map::new();
            metadata.insert("type".to_string(), json!("news"));
            metadata.insert("title".to_string(), json!(item.title));
            metadata.insert("sentiment".to_string(), json!(item.sentiment));
            metadata.insert("source".to_string(), json!(item.source_name));
            metadata.insert("url".to_string(), json!(item.url));
            if let Some(ts) = published {
                metadata.insert("timestamp".to_string(), json!(ts));
                if let Some(date) = date_of(ts) {
                    metadata.insert("date".to_string(), json!(date));
                }
            }

            let source_id = item
                .id
                .as_ref()
                .map(value_text)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| idx.to_string());

            DocumentDraft {
                id: format!("news_{}_{}", source_id, idx),
                text,
                metadata,
            }
        })
        .collect()
}

pub fn open_interest_documents(records: &[OpenInterestRecord]) -> Vec<DocumentDraft> {
    records
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let ts = normalize_epoch(item.timestamp);
            let time_text = DateTime::<Utc>::from_timestamp(ts, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "Unknown".to_string());

            let text = format!(
                "Symbol: {}\nTime: {}\nOpen Interest: {:.2}\nOpen Interest Value: {:.2}\nCirculating Supply: {:.2}",
                item.symbol,
                time_text,
                item.sum_open_interest,
                item.sum_open_interest_value,
                item.circulating_supply,
            );

            let mut metadata = Map::new();
            metadata.insert("type".to_string(), json!("open_interest"));
            metadata.insert("symbol".to_string(), json!(item.symbol));
            metadata.insert("timestamp".to_string(), json!(ts));
            if let Some(date) = date_of(ts) {
                metadata.insert("date".to_string(), json!(date));
            }

            DocumentDraft {
                id: format!("oi_{}_{}_{}", item.symbol, ts, idx),
                text,
                metadata,
            }
        })
        .collect()
}

pub fn analysis_document(note: &AnalysisNote) -> DocumentDraft {
    let mut metadata = note.metadata.clone();
    metadata.insert("type".to_string(), json!("analysis"));
    DocumentDraft {
        id: note.id.clone(),
        text: note.text.clone(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(minute: u32, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: Utc.with_ymd_and_hms(2024, 6, 1, 10, minute, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn test_resample_to_hour() {
        let mut candles = vec![
            candle(0, 100.0, 105.0, 99.0, 104.0),
            candle(5, 104.0, 110.0, 103.0, 108.0),
            candle(55, 108.0, 109.0, 95.0, 97.0),
        ];
        let mut next_hour = candle(0, 97.0, 98.0, 96.0, 97.5);
        next_hour.open_time = Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap();
        candles.push(next_hour);

        let hourly = resample(&candles, Interval::OneHour);
        assert_eq!(hourly.len(), 2);
        let first = &hourly[0];
        assert_eq!(first.open_time, Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());
        assert_eq!(first.open, 100.0);
        assert_eq!(first.high, 110.0);
        assert_eq!(first.low, 95.0);
        assert_eq!(first.close, 97.0);
        assert_eq!(first.volume, 30.0);
        assert_eq!(hourly[1].close, 97.5);
    }

    #[test]
    fn test_resample_sorts_input() {
        let candles = vec![
            candle(10, 2.0, 2.0, 2.0, 2.0),
            candle(0, 1.0, 1.0, 1.0, 1.0),
        ];
        let hourly = resample(&candles, Interval::OneHour);
        assert_eq!(hourly[0].open, 1.0);
        assert_eq!(hourly[0].close, 2.0);
    }

    #[test]
    fn test_kline_document_shape() {
        let docs = kline_documents("BTCUSDT", &[candle(0, 1.0, 2.0, 0.5, 1.5)], Interval::OneHour);
        let doc = &docs[0];
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap().timestamp();
        assert_eq!(doc.id, format!("kline_BTCUSDT_{}_1h", ts));
        assert!(doc.text.starts_with("Ticker: BTCUSDT\nTime: 2024-06-01 10:00"));
        assert_eq!(doc.metadata["timestamp"], json!(ts));
        assert_eq!(doc.metadata["date"], json!("2024-06-01"));
    }

    #[test]
    fn test_news_document_millis_and_truncation() {
        let record = NewsRecord {
            id: Some(json!(42)),
            title: "ETF approved".to_string(),
            published_on: Some(1_717_200_000_000),
            raw_body: "x".repeat(800),
            ..Default::default()
        };
        let docs = news_documents(&[record]);
        let doc = &docs[0];
        assert_eq!(doc.id, "news_42_0");
        assert_eq!(doc.metadata["timestamp"], json!(1_717_200_000));
        assert_eq!(doc.metadata["date"], json!("2024-06-01"));
        assert!(doc.text.contains("Sentiment: NEUTRAL"));
        let body = doc.text.rsplit("Body: ").next().unwrap();
        assert_eq!(body.len(), NEWS_BODY_CHARS);
    }

    #[test]
    fn test_news_without_timestamp_has_no_time_metadata() {
        let docs = news_documents(&[NewsRecord::default()]);
        assert!(!docs[0].metadata.contains_key("timestamp"));
        assert_eq!(docs[0].id, "news_0_0");
    }

    #[test]
    fn test_open_interest_document() {
        let record: OpenInterestRecord = serde_json::from_value(json!({
            "symbol": "BTCUSDT",
            "timestamp": 1_717_200_000_000i64,
            "sumOpenInterest": 81234.5,
            "sumOpenInterestValue": 5.5e9,
            "CMCCirculatingSupply": 19.7e6
        }))
        .unwrap();
        let docs = open_interest_documents(&[record]);
        assert_eq!(docs[0].id, "oi_BTCUSDT_1717200000_0");
        assert!(docs[0].text.contains("Open Interest: 81234.50"));
    }

    #[test]
    fn test_analysis_document_keeps_metadata() {
        let mut metadata = Map::new();
        metadata.insert("ticker".to_string(), json!("ETHUSDT"));
        let doc = analysis_document(&AnalysisNote {
            id: "rsi-eth".to_string(),
            text: "RSI above 70".to_string(),
            metadata,
        });
        assert_eq!(doc.metadata["type"], json!("analysis"));
        assert_eq!(doc.metadata["ticker"], json!("ETHUSDT"));
    }
}
