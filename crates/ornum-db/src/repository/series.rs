//! # Series Repository
//!
//! The series registry: opening, looking up and retiring numbering series.
//!
//! ## Series Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Series Lifecycle                                  │
//! │                                                                         │
//! │  1. CREATE                                                             │
//! │     └── create() → Series { current_number: start - 1, active }        │
//! │                                                                         │
//! │  2. ISSUE (allocator)                                                  │
//! │     └── current_number climbs towards end_number                       │
//! │     └── update_end_number() may extend the bound, never below current  │
//! │                                                                         │
//! │  3. SUPERSEDE                                                          │
//! │     └── deactivate() → is_active = false                               │
//! │                                                                         │
//! │  4. (RARE) RETIRE                                                      │
//! │     └── soft_delete() → deleted_at set, hidden from every lookup       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use ornum_core::series::select_active;
use ornum_core::validation::{validate_end_number_change, validate_new_series};
use ornum_core::{CoreError, NewSeries, Series, UsageSnapshot};

use crate::error::{DbError, DbResult};

pub(crate) const SERIES_COLUMNS: &str = r#"
    id, name, prefix, start_number, end_number, current_number,
    format_template, band_size, is_active, effective_from, effective_to, notes,
    created_by, created_at, updated_at, deleted_at
"#;

/// Repository for the series registry.
#[derive(Debug, Clone)]
pub struct SeriesRepository {
    pool: SqlitePool,
}

impl SeriesRepository {
    /// Creates a new SeriesRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SeriesRepository { pool }
    }

    /// Opens a new series.
    ///
    /// ## Validation
    /// - Name, prefix, creator
    /// - `start_number >= 1`, `end_number >= start_number`
    /// - `band_size >= 1` (fixed for the life of the series)
    /// - `effective_to >= effective_from`
    /// - Format template parses
    pub async fn create(&self, new: NewSeries) -> DbResult<Series> {
        validate_new_series(&new)?;

        let now = Utc::now();
        let series = Series {
            id: Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            prefix: new.prefix,
            start_number: new.start_number,
            end_number: new.end_number,
            current_number: new.start_number - 1,
            format_template: new.format_template,
            band_size: new.band_size,
            is_active: true,
            effective_from: new.effective_from,
            effective_to: new.effective_to,
            notes: new.notes,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        debug!(id = %series.id, name = %series.name, "Creating series");

        sqlx::query(
            r#"
            INSERT INTO series (
                id, name, prefix, start_number, end_number, current_number,
                format_template, band_size, is_active, effective_from, effective_to, notes,
                created_by, created_at, updated_at, deleted_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16
            )
            "#,
        )
        .bind(&series.id)
        .bind(&series.name)
        .bind(&series.prefix)
        .bind(series.start_number)
        .bind(series.end_number)
        .bind(series.current_number)
        .bind(&series.format_template)
        .bind(series.band_size)
        .bind(series.is_active)
        .bind(series.effective_from)
        .bind(series.effective_to)
        .bind(&series.notes)
        .bind(&series.created_by)
        .bind(series.created_at)
        .bind(series.updated_at)
        .bind(series.deleted_at)
        .execute(&self.pool)
        .await?;

        info!(
            id = %series.id,
            start_number = series.start_number,
            end_number = ?series.end_number,
            band_size = series.band_size,
            "Series created"
        );

        Ok(series)
    }

    /// Gets a series by ID. Soft-deleted series are not returned.
    pub async fn get(&self, id: &str) -> DbResult<Option<Series>> {
        let mut conn = self.pool.acquire().await?;
        fetch_in(&mut *conn, id).await
    }

    /// Gets a series by ID or fails with `SeriesNotFound`.
    pub async fn require(&self, id: &str) -> DbResult<Series> {
        self.get(id)
            .await?
            .ok_or_else(|| CoreError::SeriesNotFound(id.to_string()).into())
    }

    /// Lists series, newest window first. Soft-deleted series are never listed.
    pub async fn list(&self, include_inactive: bool) -> DbResult<Vec<Series>> {
        let sql = format!(
            "SELECT {} FROM series
             WHERE deleted_at IS NULL AND (?1 OR is_active = 1)
             ORDER BY effective_from DESC, created_at DESC",
            SERIES_COLUMNS
        );

        let series = sqlx::query_as::<_, Series>(&sql)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;

        Ok(series)
    }

    /// The unique series that can issue numbers on `as_of`.
    ///
    /// ## Errors
    /// `NoActiveSeries { matches }` when zero or several series qualify.
    /// Overlapping windows are an administrator's mistake to fix, so this
    /// never picks one of them.
    pub async fn get_active(&self, as_of: NaiveDate) -> DbResult<Series> {
        let candidates = self.list(false).await?;

        match select_active(&candidates, as_of) {
            Ok(series) => Ok(series.clone()),
            Err(err) => {
                if let CoreError::NoActiveSeries { matches, .. } = &err {
                    if *matches > 1 {
                        warn!(%as_of, matches, "Overlapping active series");
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Changes the bound of a series.
    ///
    /// ## Errors
    /// `Validation` if `new_end` is below `start_number` or below the
    /// numbers already issued.
    pub async fn update_end_number(&self, id: &str, new_end: Option<i64>) -> DbResult<Series> {
        let series = self.require(id).await?;
        validate_end_number_change(&series, new_end)?;

        debug!(id = %id, old_end = ?series.end_number, new_end = ?new_end, "Updating end number");

        let result = sqlx::query(
            r#"
            UPDATE series
            SET end_number = ?2, updated_at = ?3
            WHERE id = ?1
              AND deleted_at IS NULL
              AND (?2 IS NULL OR current_number <= ?2)
            "#,
        )
        .bind(id)
        .bind(new_end)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Allocations moved past the new bound since the check above
            let fresh = self.require(id).await?;
            validate_end_number_change(&fresh, new_end)?;
            return Err(DbError::conflict("Series", id));
        }

        self.require(id).await
    }

    /// Marks a series as superseded. Issued numbers stay untouched.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deactivating series");

        let result = sqlx::query(
            "UPDATE series SET is_active = 0, updated_at = ?2
             WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::SeriesNotFound(id.to_string()).into());
        }

        info!(id = %id, "Series deactivated");
        Ok(())
    }

    /// Soft-deletes a series.
    ///
    /// The row stays for audit retention; counters and issued numbers keep
    /// referencing it.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting series");

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE series SET is_active = 0, deleted_at = ?2, updated_at = ?2
             WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::SeriesNotFound(id.to_string()).into());
        }

        Ok(())
    }

    /// Dashboard usage figures of a series.
    pub async fn usage_snapshot(&self, id: &str) -> DbResult<UsageSnapshot> {
        Ok(self.require(id).await?.usage_snapshot())
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Loads a non-deleted series on an existing connection.
pub(crate) async fn fetch_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Series>> {
    let sql = format!(
        "SELECT {} FROM series WHERE id = ?1 AND deleted_at IS NULL",
        SERIES_COLUMNS
    );

    let series = sqlx::query_as::<_, Series>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(series)
}

/// Bumps `current_number` unless the series is missing, soft-deleted or at
/// its bound. Returns whether a row was bumped.
///
/// As the first statement of a transaction this takes the SQLite write lock
/// before anything is read.
pub(crate) async fn bump_current_in(
    conn: &mut SqliteConnection,
    id: &str,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE series
        SET current_number = current_number + 1, updated_at = ?2
        WHERE id = ?1
          AND deleted_at IS NULL
          AND (end_number IS NULL OR current_number < end_number)
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Touches `updated_at` of a live series, taking the write lock.
///
/// Fails with `SeriesNotFound` for missing or soft-deleted series.
pub(crate) async fn lock_in(
    conn: &mut SqliteConnection,
    id: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE series SET updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::SeriesNotFound(id.to_string()).into());
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use ornum_core::ValidationError;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_series(name: &str, end: Option<i64>) -> NewSeries {
        NewSeries {
            name: name.to_string(),
            prefix: Some("OR".to_string()),
            start_number: 1,
            end_number: end,
            format_template: "{PREFIX}-{NUMBER:6}".to_string(),
            band_size: 1_000,
            effective_from: date(2025, 1, 1),
            effective_to: None,
            notes: None,
            created_by: "admin".to_string(),
        }
    }

    async fn repo() -> SeriesRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().series()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = repo().await;
        let created = repo.create(new_series("OR 2025", Some(100))).await.unwrap();

        assert_eq!(created.current_number, 0);
        let loaded = repo.get(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.prefix.as_deref(), Some("OR"));
        assert_eq!(loaded.end_number, Some(100));
        assert_eq!(loaded.effective_from, date(2025, 1, 1));
        assert_eq!(loaded.band_size, 1_000);
        assert!(loaded.is_active);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_band() {
        let repo = repo().await;
        let mut bad = new_series("OR 2025", None);
        bad.band_size = 0;

        assert!(matches!(
            repo.create(bad).await,
            Err(DbError::Domain(CoreError::Validation(ValidationError::OutOfRange { .. })))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_template() {
        let repo = repo().await;
        let mut bad = new_series("OR 2025", None);
        bad.format_template = "OR-{NUMBER".to_string();

        assert!(matches!(
            repo.create(bad).await,
            Err(DbError::Domain(CoreError::Template(_)))
        ));
        assert!(repo.list(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_active_requires_exactly_one() {
        let repo = repo().await;
        let d = date(2025, 6, 1);

        assert!(matches!(
            repo.get_active(d).await,
            Err(DbError::Domain(CoreError::NoActiveSeries { matches: 0, .. }))
        ));

        let first = repo.create(new_series("A", None)).await.unwrap();
        assert_eq!(repo.get_active(d).await.unwrap().id, first.id);

        let second = repo.create(new_series("B", None)).await.unwrap();
        assert!(matches!(
            repo.get_active(d).await,
            Err(DbError::Domain(CoreError::NoActiveSeries { matches: 2, .. }))
        ));

        repo.deactivate(&first.id).await.unwrap();
        assert_eq!(repo.get_active(d).await.unwrap().id, second.id);
        assert_eq!(repo.list(false).await.unwrap().len(), 1);
        assert_eq!(repo.list(true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_end_number() {
        let repo = repo().await;
        let series = repo.create(new_series("OR", Some(10))).await.unwrap();

        let updated = repo.update_end_number(&series.id, Some(20)).await.unwrap();
        assert_eq!(updated.end_number, Some(20));

        assert!(matches!(
            repo.update_end_number(&series.id, Some(0)).await,
            Err(DbError::Domain(CoreError::Validation(ValidationError::OutOfRange { .. })))
        ));
    }

    #[tokio::test]
    async fn test_soft_deleted_series_disappears() {
        let repo = repo().await;
        let series = repo.create(new_series("OR", None)).await.unwrap();

        repo.soft_delete(&series.id).await.unwrap();

        assert!(repo.get(&series.id).await.unwrap().is_none());
        assert!(repo.list(true).await.unwrap().is_empty());
        assert!(matches!(
            repo.soft_delete(&series.id).await,
            Err(DbError::Domain(CoreError::SeriesNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_usage_snapshot() {
        let repo = repo().await;
        let series = repo.create(new_series("OR", Some(10))).await.unwrap();

        let snapshot = repo.usage_snapshot(&series.id).await.unwrap();
        assert_eq!(snapshot.issued, 0);
        assert_eq!(snapshot.remaining, Some(10));
        assert!(!snapshot.has_reached_limit);
    }
}
