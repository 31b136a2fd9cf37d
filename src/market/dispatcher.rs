use super::summary::{DaySummary, MarketSummary, MomentSummary, OverviewSummary, RangeSummary};
use super::{CandleStore, CandleStoreError, Interval, LookupOutcome};
use crate::config::MarketConfig;
use crate::intent::TimeReference;
use ahash::AHashMap;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::sync::{Arc, Mutex};

/// Routes a time reference to the matching candle query and summarises it
pub struct LookupDispatcher {
    store: Arc<dyn CandleStore>,
    interval: Interval,
    overview_window: usize,
    cache_closed_days: bool,
    /// Closed days never change, so their summaries live for the process
    day_cache: Mutex<AHashMap<(String, NaiveDate), LookupOutcome>>,
}

impl LookupDispatcher {
    pub fn new(store: Arc<dyn CandleStore>, config: &MarketConfig) -> Self {
        Self {
            store,
            interval: config.lookup_interval,
            overview_window: config.overview_window,
            cache_closed_days: config.cache_closed_days,
            day_cache: Mutex::new(AHashMap::new()),
        }
    }

    pub fn lookup(&self, ticker: &str, reference: Option<&TimeReference>) -> LookupOutcome {
        let outcome = match reference {
            Some(TimeReference::ExactInstant(instant)) => self.price_at_moment(ticker, *instant),
            Some(TimeReference::ExactDate(date)) => self.day_price(ticker, *date),
            Some(TimeReference::Range { start, end }) => self.price_range(ticker, *start, *end),
            None => self.market_overview(ticker),
        };
        tracing::debug!(ticker, outcome = %outcome.headline(), "structured lookup");
        outcome
    }

    /// Most recent candle at or before `instant`
    pub fn price_at_moment(&self, ticker: &str, instant: NaiveDateTime) -> LookupOutcome {
        match self
            .store
            .last_at_or_before(ticker, instant.and_utc(), self.interval)
        {
            Ok(Some(candle)) => LookupOutcome::Success {
                summary: MarketSummary::Moment(MomentSummary::new(ticker, instant, &candle)),
            },
            Ok(None) => LookupOutcome::NoData {
                message: format!(
                    "Không có dữ liệu cho {} tại thời điểm {}",
                    ticker,
                    instant.format("%Y-%m-%d %H:%M")
                ),
                suggestion: "Thử chọn thời điểm gần hơn hoặc ticker khác".to_string(),
            },
            Err(e) => store_error(e),
        }
    }

    /// Full calendar day, `00:00:00` through `23:59:59` UTC
    pub fn day_price(&self, ticker: &str, date: NaiveDate) -> LookupOutcome {
        let key = (ticker.to_string(), date);
        if let Some(hit) = self.cached(&key) {
            tracing::debug!(ticker, %date, "day cache hit");
            return hit;
        }

        let outcome = match self.store.query(
            ticker,
            start_of_day(date),
            end_of_day(date),
            self.interval,
        ) {
            Ok(candles) => match DaySummary::from_candles(ticker, date, &candles) {
                Some(summary) => LookupOutcome::Success {
                    summary: MarketSummary::Day(summary),
                },
                None => LookupOutcome::NoData {
                    message: format!("Không có dữ liệu cho {} vào {}", ticker, date),
                    suggestion: "Thử chọn ngày gần hơn hoặc ticker khác".to_string(),
                },
            },
            Err(e) => store_error(e),
        };

        if outcome.is_success() && self.cache_closed_days && date < Utc::now().date_naive() {
            if let Ok(mut cache) = self.day_cache.lock() {
                cache.insert(key, outcome.clone());
            }
        }
        outcome
    }

    /// Whole days from `start` through `end`
    pub fn price_range(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> LookupOutcome {
        let no_data = || LookupOutcome::NoData {
            message: format!("Không có dữ liệu cho {} từ {} đến {}", ticker, start, end),
            suggestion: "Thử chọn khoảng thời gian gần hơn hoặc ticker khác".to_string(),
        };

        if end < start {
            return no_data();
        }

        match self
            .store
            .query(ticker, start_of_day(start), end_of_day(end), self.interval)
        {
            Ok(candles) => match RangeSummary::from_candles(ticker, start, end, &candles) {
                Some(summary) => LookupOutcome::Success {
                    summary: MarketSummary::Range(summary),
                },
                None => no_data(),
            },
            Err(e) => store_error(e),
        }
    }

    /// Latest fixed-size window of candles
    pub fn market_overview(&self, ticker: &str) -> LookupOutcome {
        match self
            .store
            .latest(ticker, self.overview_window, self.interval)
        {
            Ok(candles) => match OverviewSummary::from_candles(ticker, &candles) {
                Some(summary) => LookupOutcome::Success {
                    summary: MarketSummary::Overview(summary),
                },
                None => LookupOutcome::NoData {
                    message: format!("Không có dữ liệu gần đây cho {}", ticker),
                    suggestion: "Thử ticker khác hoặc kiểm tra kết nối cơ sở dữ liệu".to_string(),
                },
            },
            Err(e) => store_error(e),
        }
    }

    fn cached(&self, key: &(String, NaiveDate)) -> Option<LookupOutcome> {
        self.day_cache.lock().ok()?.get(key).cloned()
    }
}

fn store_error(e: CandleStoreError) -> LookupOutcome {
    tracing::warn!("Candle store failed: {}", e);
    LookupOutcome::Error {
        message: e.to_string(),
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let end = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    date.and_time(end).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Candle, LookupStatus};
    use chrono::{TimeDelta, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store that also counts range queries
    #[derive(Default)]
    struct MemoryStore {
        candles: Vec<Candle>,
        queries: AtomicUsize,
        fail: bool,
    }

    impl MemoryStore {
        fn check(&self) -> Result<(), CandleStoreError> {
            if self.fail {
                Err(CandleStoreError::Unavailable("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl CandleStore for MemoryStore {
        fn query(
            &self,
            _ticker: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            _interval: Interval,
        ) -> Result<Vec<Candle>, CandleStoreError> {
            self.check()?;
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .candles
                .iter()
                .filter(|c| c.open_time >= start && c.open_time <= end)
                .cloned()
                .collect())
        }

        fn latest(
            &self,
            _ticker: &str,
            count: usize,
            _interval: Interval,
        ) -> Result<Vec<Candle>, CandleStoreError> {
            self.check()?;
            let skip = self.candles.len().saturating_sub(count);
            Ok(self.candles[skip..].to_vec())
        }

        fn last_at_or_before(
            &self,
            _ticker: &str,
            instant: DateTime<Utc>,
            _interval: Interval,
        ) -> Result<Option<Candle>, CandleStoreError> {
            self.check()?;
            Ok(self
                .candles
                .iter()
                .filter(|c| c.open_time <= instant)
                .last()
                .cloned())
        }
    }

    fn candles() -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        (0..4)
            .map(|i| {
                let price = 100.0 + i as f64;
                Candle {
                    open_time: start + TimeDelta::hours(12 * i),
                    open: price,
                    high: price + 1.0,
                    low: price - 1.0,
                    close: price + 0.5,
                    volume: 10.0,
                }
            })
            .collect()
    }

    fn dispatcher(store: MemoryStore) -> (Arc<MemoryStore>, LookupDispatcher) {
        let store = Arc::new(store);
        let dispatcher = LookupDispatcher::new(store.clone(), &MarketConfig::default());
        (store, dispatcher)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_exact_date_uses_single_day() {
        let (_, d) = dispatcher(MemoryStore {
            candles: candles(),
            ..Default::default()
        });
        let outcome = d.lookup("BTCUSDT", Some(&TimeReference::ExactDate(date(2024, 1, 15))));
        match outcome.summary() {
            Some(MarketSummary::Day(day)) => {
                assert_eq!(day.candles_count, 2);
                assert_eq!(day.open, 100.0);
                assert_eq!(day.close, 101.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_closed_day_is_cached() {
        let (store, d) = dispatcher(MemoryStore {
            candles: candles(),
            ..Default::default()
        });
        let first = d.day_price("BTCUSDT", date(2024, 1, 15));
        let second = d.day_price("BTCUSDT", date(2024, 1, 15));
        assert_eq!(first, second);
        assert_eq!(store.queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_day_is_no_data_and_not_cached() {
        let (store, d) = dispatcher(MemoryStore::default());
        let outcome = d.day_price("BTCUSDT", date(2024, 1, 15));
        assert_eq!(outcome.status(), LookupStatus::NoData);
        d.day_price("BTCUSDT", date(2024, 1, 15));
        assert_eq!(store.queries.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_range_days_inclusive() {
        let (_, d) = dispatcher(MemoryStore {
            candles: candles(),
            ..Default::default()
        });
        let reference = TimeReference::Range {
            start: date(2024, 1, 15),
            end: date(2024, 1, 16),
        };
        match d.lookup("BTCUSDT", Some(&reference)).summary() {
            Some(MarketSummary::Range(range)) => {
                assert_eq!(range.days_count, 2);
                assert_eq!(range.candles_count, 4);
                assert_eq!(range.end_price, 103.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_inverted_range_is_no_data() {
        let (store, d) = dispatcher(MemoryStore {
            candles: candles(),
            ..Default::default()
        });
        let outcome = d.price_range("BTCUSDT", date(2024, 1, 16), date(2024, 1, 15));
        assert_eq!(outcome.status(), LookupStatus::NoData);
        assert_eq!(store.queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_moment_picks_previous_candle() {
        let (_, d) = dispatcher(MemoryStore {
            candles: candles(),
            ..Default::default()
        });
        let instant = date(2024, 1, 15).and_hms_opt(13, 30, 0).unwrap();
        match d.lookup("BTCUSDT", Some(&TimeReference::ExactInstant(instant))).summary() {
            Some(MarketSummary::Moment(m)) => {
                assert_eq!(m.gap_minutes, 90);
                assert_eq!(m.open, 101.0);
            }
            other => panic!("unexpected {:?}", other),
        }

        let before_data = date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap();
        let outcome = d.price_at_moment("BTCUSDT", before_data);
        assert_eq!(outcome.status(), LookupStatus::NoData);
    }

    #[test]
    fn test_overview_without_reference() {
        let (_, d) = dispatcher(MemoryStore {
            candles: candles(),
            ..Default::default()
        });
        match d.lookup("BTCUSDT", None).summary() {
            Some(MarketSummary::Overview(o)) => {
                assert_eq!(o.candles_count, 4);
                assert_eq!(o.current_price, 103.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_store_failure_keeps_message() {
        let (_, d) = dispatcher(MemoryStore {
            fail: true,
            ..Default::default()
        });
        let outcome = d.lookup("BTCUSDT", Some(&TimeReference::ExactDate(date(2024, 1, 15))));
        assert_eq!(outcome.status(), LookupStatus::Error);
        assert!(outcome.message().unwrap().contains("connection refused"));
    }
}
