//! SQLite-backed candle store

use super::Database;
use crate::error::Result;
use crate::market::{Candle, CandleStore, CandleStoreError, Interval};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

pub struct SqliteCandleStore {
    db: Database,
}

impl SqliteCandleStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or replace candles; returns the number written
    pub fn insert_candles(&self, ticker: &str, interval: Interval, candles: &[Candle]) -> Result<usize> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO klines (ticker, interval, open_time, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for c in candles {
                stmt.execute(params![
                    ticker,
                    interval.as_str(),
                    c.open_time.timestamp_millis(),
                    c.open,
                    c.high,
                    c.low,
                    c.close,
                    c.volume
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(ticker, interval = %interval, count = candles.len(), "candles stored");
        Ok(candles.len())
    }

    pub fn count(&self, ticker: &str, interval: Interval) -> Result<usize> {
        let conn = self.db.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM klines WHERE ticker = ?1 AND interval = ?2",
            params![ticker, interval.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn conn(
        &self,
    ) -> std::result::Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, CandleStoreError>
    {
        self.db
            .get_conn()
            .map_err(|e| CandleStoreError::Unavailable(e.to_string()))
    }
}

fn row_to_candle(row: &Row<'_>) -> rusqlite::Result<Candle> {
    let millis: i64 = row.get(0)?;
    let open_time = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(0, millis)
    })?;
    Ok(Candle {
        open_time,
        open: row.get(1)?,
        high: row.get(2)?,
        low: row.get(3)?,
        close: row.get(4)?,
        volume: row.get(5)?,
    })
}

fn query_error(e: rusqlite::Error) -> CandleStoreError {
    CandleStoreError::Query(e.to_string())
}

impl CandleStore for SqliteCandleStore {
    fn query(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> std::result::Result<Vec<Candle>, CandleStoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT open_time, open, high, low, close, volume FROM klines
                 WHERE ticker = ?1 AND interval = ?2 AND open_time >= ?3 AND open_time <= ?4
                 ORDER BY open_time ASC",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(
                params![
                    ticker,
                    interval.as_str(),
                    start.timestamp_millis(),
                    end.timestamp_millis()
                ],
                row_to_candle,
            )
            .map_err(query_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_error)
    }

    fn latest(
        &self,
        ticker: &str,
        count: usize,
        interval: Interval,
    ) -> std::result::Result<Vec<Candle>, CandleStoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT open_time, open, high, low, close, volume FROM klines
                 WHERE ticker = ?1 AND interval = ?2
                 ORDER BY open_time DESC LIMIT ?3",
            )
            .map_err(query_error)?;
        let mut candles = stmt
            .query_map(
                params![ticker, interval.as_str(), count as i64],
                row_to_candle,
            )
            .map_err(query_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_error)?;
        candles.reverse();
        Ok(candles)
    }

    fn last_at_or_before(
        &self,
        ticker: &str,
        instant: DateTime<Utc>,
        interval: Interval,
    ) -> std::result::Result<Option<Candle>, CandleStoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT open_time, open, high, low, close, volume FROM klines
                 WHERE ticker = ?1 AND interval = ?2 AND open_time <= ?3
                 ORDER BY open_time DESC LIMIT 1",
            )
            .map_err(query_error)?;
        let mut rows = stmt
            .query_map(
                params![ticker, interval.as_str(), instant.timestamp_millis()],
                row_to_candle,
            )
            .map_err(query_error)?;
        rows.next().transpose().map_err(query_error)
    }
}
