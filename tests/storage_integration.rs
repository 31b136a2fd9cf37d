use chrono::{TimeDelta, TimeZone, Utc};
use cryptorag::market::{Candle, Interval};
use cryptorag::session::SessionManager;
use cryptorag::storage::StorageManager;
use tempfile::TempDir;

fn candles(count: i64) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| Candle {
            open_time: start + TimeDelta::minutes(5 * i),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 3.0,
        })
        .collect()
}

#[test]
fn test_real_storage_creation() {
    let temp = TempDir::new().unwrap();
    let base = temp.path().join("cryptorag");

    let storage = StorageManager::new(base.clone()).expect("Failed to create storage");

    assert!(base.join("cryptorag.sqlite").exists(), "Database file should exist");
    assert!(base.join("sessions").is_dir(), "Sessions directory should exist");
    assert_eq!(storage.base_path(), base.as_path());

    // Reopening keeps existing rows
    let store = storage.candle_store();
    store
        .insert_candles("BTCUSDT", Interval::FiveMinutes, &candles(3))
        .unwrap();
    drop(storage);

    let reopened = StorageManager::new(base).expect("Failed to reopen storage");
    let stats = reopened.stats().unwrap();
    assert_eq!(stats.db.candle_count, 3);
    assert_eq!(stats.db.ticker_count, 1);
    assert!(stats.size_bytes > 0);
}

#[test]
fn test_candle_rows_are_keyed_by_open_time() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::new(temp.path().to_path_buf()).unwrap();
    let store = storage.candle_store();

    assert_eq!(
        store
            .insert_candles("BTCUSDT", Interval::FiveMinutes, &candles(10))
            .unwrap(),
        10
    );
    // Same open times replace rather than duplicate
    store
        .insert_candles("BTCUSDT", Interval::FiveMinutes, &candles(10))
        .unwrap();
    store
        .insert_candles("BTCUSDT", Interval::OneHour, &candles(2))
        .unwrap();
    store
        .insert_candles("ETHUSDT", Interval::FiveMinutes, &candles(4))
        .unwrap();

    assert_eq!(store.count("BTCUSDT", Interval::FiveMinutes).unwrap(), 10);
    assert_eq!(store.count("BTCUSDT", Interval::OneHour).unwrap(), 2);
    assert_eq!(store.count("ETHUSDT", Interval::FiveMinutes).unwrap(), 4);

    let stats = storage.stats().unwrap();
    assert_eq!(stats.db.candle_count, 16);
    assert_eq!(stats.db.ticker_count, 2);
    assert!(stats.db.documents.is_empty());
}

#[test]
fn test_sessions_live_under_data_dir() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::new(temp.path().to_path_buf()).unwrap();
    let manager = SessionManager::new(storage.sessions_dir());

    let mut session = manager.open_or_create("research").unwrap();
    session.record_turn("giá BTC hôm nay", "BTC đang ở mức 42,000 USD");
    manager.save(&session).unwrap();

    assert!(storage
        .sessions_dir()
        .join(session.id.to_string())
        .join("state.json")
        .exists());

    let resumed = manager.open_or_create("research").unwrap();
    assert_eq!(resumed.id, session.id);
    assert_eq!(resumed.history.len(), 2);

    manager.delete(&session.id).unwrap();
    assert!(manager.find_by_name("research").unwrap().is_none());
    assert!(manager.delete(&session.id).is_err());
}
