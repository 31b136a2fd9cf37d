//! Storage layer for cryptorag
//!
//! One SQLite database under the data directory holds candles and the
//! persisted vector documents; chat sessions are JSON files beside it.

pub mod candles;
pub mod database;

use crate::error::{RagError, Result};
use std::path::{Path, PathBuf};

pub use candles::SqliteCandleStore;
pub use database::{Database, DbPool, DbStats};

/// Owns the data directory layout and the shared database handle
pub struct StorageManager {
    pub database: Database,
    base_path: PathBuf,
}

impl StorageManager {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        for dir in [base_path.clone(), base_path.join("sessions")] {
            std::fs::create_dir_all(&dir).map_err(|e| RagError::Io {
                source: e,
                context: format!("Failed to create directory: {}", dir.display()),
            })?;
        }

        let database = Database::new(&base_path.join("cryptorag.sqlite"))?;

        Ok(Self {
            database,
            base_path,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory holding one sub-directory per chat session
    pub fn sessions_dir(&self) -> PathBuf {
        self.base_path.join("sessions")
    }

    pub fn candle_store(&self) -> SqliteCandleStore {
        SqliteCandleStore::new(self.database.clone())
    }

    pub fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            db: self.database.stats()?,
            size_bytes: Self::dir_size(&self.base_path)?,
        })
    }

    fn dir_size(path: &Path) -> Result<u64> {
        let mut size = 0u64;

        if path.is_dir() {
            for entry in std::fs::read_dir(path).map_err(|e| RagError::Io {
                source: e,
                context: format!("Failed to read directory: {}", path.display()),
            })? {
                let entry = entry.map_err(|e| RagError::Io {
                    source: e,
                    context: "Failed to read directory entry".to_string(),
                })?;
                let path = entry.path();

                if path.is_dir() {
                    size += Self::dir_size(&path)?;
                } else {
                    size += entry
                        .metadata()
                        .map_err(|e| RagError::Io {
                            source: e,
                            context: format!("Failed to get file metadata: {}", path.display()),
                        })?
                        .len();
                }
            }
        }

        Ok(size)
    }
}

/// Combined storage statistics
#[derive(Debug)]
pub struct StorageStats {
    pub db: DbStats,
    pub size_bytes: u64,
}

impl StorageStats {
    /// Format size as human-readable string
    pub fn format_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_created() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("data");
        let storage = StorageManager::new(base.clone()).unwrap();

        assert!(storage.sessions_dir().exists());
        assert!(base.join("cryptorag.sqlite").exists());
    }

    #[test]
    fn test_stats_size_is_non_zero() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageManager::new(temp_dir.path().to_path_buf()).unwrap();
        let stats = storage.stats().unwrap();
        assert!(stats.size_bytes > 0);
        assert_eq!(stats.db.candle_count, 0);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(StorageStats::format_size(0), "0.00 B");
        assert_eq!(StorageStats::format_size(1024), "1.00 KB");
        assert_eq!(StorageStats::format_size(1536 * 1024), "1.50 MB");
    }
}
