//! # Connection Pool
//!
//! Opens the SQLite database the allocator writes to and hands out the
//! repositories that share it.
//!
//! ## Writers and Readers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One Database, Many Cashiers                          │
//! │                                                                         │
//! │  time ───────────────────────────────────────────────────────────►     │
//! │                                                                         │
//! │  cashier A   BEGIN ─ UPDATE series ━━━━━━━━━━━━━━━ COMMIT              │
//! │                       (write lock held)                                 │
//! │  cashier B        BEGIN ─ UPDATE series ┄┄ waits ┄┄┄┄┄ ━━━━━━ COMMIT   │
//! │                            (busy_timeout)                               │
//! │  dashboard      SELECT ... SELECT ... SELECT   (WAL: never waits)      │
//! │                                                                         │
//! │  A wait longer than busy_timeout fails with SQLITE_BUSY, which the     │
//! │  allocator retries with backoff.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! In-memory databases exist for tests. Each lives inside one connection,
//! so their pool is pinned to that connection.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::allocator::Allocator;
use crate::config::AllocatorConfig;
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::counter::CounterRepository;
use crate::repository::issued::IssuedNumberRepository;
use crate::repository::series::SeriesRepository;

/// Where the data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    /// A database file, created on first open.
    File(PathBuf),
    /// A private database that disappears with its connection.
    Memory,
}

/// How to open the database.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/ornum/ornum.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub storage: Storage,
    pub max_connections: u32,
    /// How long a caller waits for a free pooled connection.
    pub acquire_timeout: Duration,
    /// How long a statement waits for another connection's write lock.
    pub busy_timeout: Duration,
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            storage: Storage::File(path.into()),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Fresh, migrated, single-connection database for tests.
    pub fn in_memory() -> Self {
        DbConfig {
            storage: Storage::Memory,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.storage == Storage::Memory
    }

    /// The database file, `None` for in-memory storage.
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::File(path) => Some(path),
            Storage::Memory => None,
        }
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = match &self.storage {
            Storage::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
            Storage::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?,
        };

        Ok(options.foreign_keys(true).busy_timeout(self.busy_timeout))
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        let options = SqlitePoolOptions::new().acquire_timeout(self.acquire_timeout);

        match self.storage {
            // Closing the only connection would drop every table
            Storage::Memory => options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
            Storage::File(_) => options.max_connections(self.max_connections),
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the allocator database. Clones share one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and, unless disabled, brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = ?config.path(),
            max_connections = config.max_connections,
            "Opening allocator database"
        );

        let pool = config
            .pool_options()
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!(busy_timeout = ?config.busy_timeout, "Pool ready");

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn series(&self) -> SeriesRepository {
        SeriesRepository::new(self.pool.clone())
    }

    pub fn counters(&self) -> CounterRepository {
        CounterRepository::new(self.pool.clone())
    }

    pub fn issued_numbers(&self) -> IssuedNumberRepository {
        IssuedNumberRepository::new(self.pool.clone())
    }

    pub fn allocator(&self, config: AllocatorConfig) -> Allocator {
        Allocator::new(self.pool.clone(), config)
    }

    /// Waits for checked-out connections, then closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Allocator database closed");
    }

    /// True when a trivial query succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let status = migrations::migration_status(db.pool()).await.unwrap();
        assert!(status.is_current());
    }

    #[tokio::test]
    async fn test_skipping_migrations_leaves_schema_empty() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();

        assert!(db.series().list(true).await.is_err());
        db.run_migrations().await.unwrap();
        assert!(db.series().list(true).await.unwrap().is_empty());
    }

    #[test]
    fn test_storage_selection() {
        let file = DbConfig::new("/tmp/ornum.db").max_connections(8);
        assert_eq!(file.path(), Some(Path::new("/tmp/ornum.db")));
        assert_eq!(file.pool_options().get_max_connections(), 8);

        let memory = DbConfig::in_memory().max_connections(8);
        assert!(memory.is_in_memory());
        assert_eq!(memory.path(), None);
        assert_eq!(memory.pool_options().get_max_connections(), 1);
    }
}
