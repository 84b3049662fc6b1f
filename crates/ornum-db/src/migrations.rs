//! # Schema Migrations
//!
//! The allocator schema ships inside the binary. `migrations/sqlite/` at the
//! workspace root holds one file per schema version:
//!
//! | File                       | Creates                                          |
//! |----------------------------|--------------------------------------------------|
//! | `001_initial_schema.sql`   | `series`, `per_user_counters`, `issued_numbers` |
//! | `002_series_band_size.sql` | `series.band_size`                               |
//!
//! Applied versions are recorded by sqlx in `_sqlx_migrations`; a file that
//! changed after being applied fails the checksum test on the next start.
//! Schema changes always go in a new, higher-numbered file.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Embedded versus applied migration counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    pub embedded: usize,
    pub applied: usize,
}

impl MigrationStatus {
    pub fn pending(&self) -> usize {
        self.embedded.saturating_sub(self.applied)
    }

    pub fn is_current(&self) -> bool {
        self.pending() == 0
    }
}

/// Applies every embedded migration the database has not seen yet.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(versions = MIGRATOR.migrations.len(), "Allocator schema up to date");
    Ok(())
}

/// Fails if the migrations table does not exist yet.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let applied: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;

    Ok(MigrationStatus {
        embedded: MIGRATOR.migrations.len(),
        applied: usize::try_from(applied).unwrap_or_default(),
    })
}
