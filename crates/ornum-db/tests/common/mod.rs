//! Shared setup for the integration tests.

#![allow(dead_code)]

use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use ornum_core::{NewSeries, Series};
use ornum_db::{Database, DbConfig};

pub const BAND: i64 = 100_000;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn new_series(end_number: Option<i64>) -> NewSeries {
    NewSeries {
        name: "OR 2025".to_string(),
        prefix: Some("OR".to_string()),
        start_number: 1,
        end_number,
        format_template: "{PREFIX}-{YEAR}{MONTH}-{NUMBER:6}".to_string(),
        band_size: BAND,
        effective_from: date(2025, 1, 1),
        effective_to: Some(date(2025, 12, 31)),
        notes: None,
        created_by: "admin".to_string(),
    }
}

pub async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub async fn memory_db_with_series(end_number: Option<i64>) -> (Database, Series) {
    let db = memory_db().await;
    let series = db.series().create(new_series(end_number)).await.unwrap();
    (db, series)
}

/// A file-backed database in the temp dir, removed on drop.
pub struct TempDb {
    pub db: Database,
    path: PathBuf,
}

impl TempDb {
    pub async fn new(max_connections: u32) -> Self {
        let path = std::env::temp_dir().join(format!("ornum-test-{}.db", Uuid::new_v4()));
        let config = DbConfig::new(path.clone())
            .max_connections(max_connections)
            .busy_timeout(Duration::from_secs(10));
        let db = Database::new(config).await.unwrap();
        TempDb { db, path }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}
