//! SQLite database management with migrations
//!
//! Holds the candle table and the persisted side of every vector collection.

use crate::error::{RagError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database file and bring its schema up to date
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RagError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| RagError::Config(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let candle_count: i64 = conn.query_row("SELECT COUNT(*) FROM klines", [], |row| row.get(0))?;
        let ticker_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT ticker) FROM klines",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT collection, COUNT(*) FROM vector_documents GROUP BY collection ORDER BY collection",
        )?;
        let documents = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(DbStats {
            candle_count: candle_count as usize,
            ticker_count: ticker_count as usize,
            documents,
        })
    }
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub candle_count: usize,
    pub ticker_count: usize,
    /// (collection name, document count)
    pub documents: Vec<(String, usize)>,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: candles and vector documents
    r#"
    CREATE TABLE klines (
        ticker TEXT NOT NULL,
        interval TEXT NOT NULL,
        open_time INTEGER NOT NULL,  -- epoch milliseconds
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        volume REAL NOT NULL,
        PRIMARY KEY (ticker, interval, open_time)
    );

    CREATE TABLE vector_documents (
        collection TEXT NOT NULL,
        doc_id TEXT NOT NULL,
        text TEXT NOT NULL,
        metadata TEXT NOT NULL,      -- JSON object
        embedding BLOB NOT NULL,     -- little-endian f32
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (collection, doc_id)
    );

    CREATE INDEX idx_vector_documents_collection ON vector_documents(collection);
    "#,
];
