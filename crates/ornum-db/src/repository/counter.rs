//! # Counter Repository
//!
//! Per-user counters and their offset bands.
//!
//! ## Band Assignment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    How a Cashier Gets a Band                            │
//! │                                                                         │
//! │  First allocation by cashier C in series S                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  get_or_create_in() ── counter exists? ──► use it                      │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  Lowest free offset (start_number - 1) + k * series.band_size          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT counter { current_number: 0, is_auto_assigned: true }          │
//! │                                                                         │
//! │  Administrators may instead provision() a counter with an explicit     │
//! │  offset, or reassign_offset() an existing one. Both refuse bands that  │
//! │  overlap another cashier's band or start below start_number.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every write here runs while the series row is locked (see
//! [`crate::repository::series`]), so two band assignments in the same
//! database never interleave. Bands are always measured with the width
//! stored on the series row.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use ornum_core::counter::{ensure_no_collision, next_free_offset};
use ornum_core::validation::{validate_band_anchor, validate_offset, validate_user_id};
use ornum_core::{CoreError, OffsetBand, PerUserCounter, Series, ValidationError};

use crate::error::{DbError, DbResult};
use crate::repository::series::{fetch_in as fetch_series_in, lock_in as lock_series_in};

const COUNTER_COLUMNS: &str = r#"
    id, series_id, user_id, start_offset, current_number, last_generated_number,
    is_auto_assigned, offset_changed_at, generations_at_current_offset,
    created_at, updated_at
"#;

/// Repository for per-user counters.
#[derive(Debug, Clone)]
pub struct CounterRepository {
    pool: SqlitePool,
}

impl CounterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CounterRepository { pool }
    }

    /// Gets a user's counter in a series.
    pub async fn get(&self, series_id: &str, user_id: &str) -> DbResult<Option<PerUserCounter>> {
        let mut conn = self.pool.acquire().await?;
        fetch_in(&mut *conn, series_id, user_id).await
    }

    /// Lists every counter of a series, lowest band first.
    pub async fn list(&self, series_id: &str) -> DbResult<Vec<PerUserCounter>> {
        let mut conn = self.pool.acquire().await?;
        list_in(&mut *conn, series_id).await
    }

    /// Returns the user's counter, creating it with an auto-assigned band if
    /// needed.
    pub async fn get_or_create(&self, series_id: &str, user_id: &str) -> DbResult<PerUserCounter> {
        validate_user_id(user_id)?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        lock_series_in(&mut *tx, series_id, now).await?;
        let series = require_series_in(&mut *tx, series_id).await?;
        let counter = get_or_create_in(&mut *tx, &series, user_id, now).await?;

        tx.commit().await?;
        Ok(counter)
    }

    /// Pre-provisions a counter with an explicit offset.
    ///
    /// ## Errors
    /// - `Validation(Duplicate)` if the user already has a counter
    /// - `Validation(OutOfRange)` if the band starts below `start_number`
    /// - `OffsetCollision` if the band overlaps another user's band
    pub async fn provision(
        &self,
        series_id: &str,
        user_id: &str,
        start_offset: i64,
    ) -> DbResult<PerUserCounter> {
        validate_user_id(user_id)?;
        validate_offset(start_offset)?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        lock_series_in(&mut *tx, series_id, now).await?;
        let series = require_series_in(&mut *tx, series_id).await?;
        validate_band_anchor(&series, start_offset)?;

        if fetch_in(&mut *tx, series_id, user_id).await?.is_some() {
            return Err(ValidationError::Duplicate {
                field: "user_id".to_string(),
                value: user_id.to_string(),
            }
            .into());
        }

        let others = list_in(&mut *tx, series_id).await?;
        ensure_no_collision(series_id, user_id, start_offset, series.band_size, &others)?;
        let band = OffsetBand::new(start_offset, series.band_size);
        ensure_band_unissued_in(&mut *tx, series_id, band).await?;

        let counter = new_counter(series_id, user_id, start_offset, false, now);
        insert_in(&mut *tx, &counter).await?;
        tx.commit().await?;

        info!(
            series_id = %series_id,
            user_id = %user_id,
            start_offset,
            "Counter provisioned"
        );

        Ok(counter)
    }

    /// Moves a counter to a new offset.
    ///
    /// Keeps the running count, so the next raw number becomes
    /// `new_offset + current_number + 1`. Resets
    /// `generations_at_current_offset` and marks the band as manually
    /// assigned.
    pub async fn reassign_offset(
        &self,
        series_id: &str,
        user_id: &str,
        new_offset: i64,
    ) -> DbResult<PerUserCounter> {
        validate_offset(new_offset)?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        lock_series_in(&mut *tx, series_id, now).await?;
        let series = require_series_in(&mut *tx, series_id).await?;
        let counter = require_in(&mut *tx, series_id, user_id).await?;
        let anchor = counter.anchor_after_reassign(new_offset);
        validate_band_anchor(&series, anchor)?;

        let others = list_in(&mut *tx, series_id).await?;
        ensure_no_collision(series_id, user_id, anchor, series.band_size, &others)?;
        let band = OffsetBand::new(anchor, series.band_size);
        ensure_band_unissued_in(&mut *tx, series_id, band).await?;

        let updated = reassign_in(&mut *tx, &counter, new_offset, now).await?;
        tx.commit().await?;

        info!(
            series_id = %series_id,
            user_id = %user_id,
            old_offset = counter.start_offset,
            new_offset,
            "Counter offset reassigned"
        );

        Ok(updated)
    }

    /// Reassigns a counter so that its next raw number opens the lowest band
    /// no other counter occupies.
    pub async fn move_to_free_band(&self, series_id: &str, user_id: &str) -> DbResult<PerUserCounter> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        lock_series_in(&mut *tx, series_id, now).await?;
        let series = require_series_in(&mut *tx, series_id).await?;
        let counter = require_in(&mut *tx, series_id, user_id).await?;

        // The counter's own band counts as taken: it is the one being left
        let anchor = free_band_in(&mut *tx, &series).await?;
        validate_band_anchor(&series, anchor)?;
        let new_offset = anchor - counter.current_number;
        validate_offset(new_offset)?;

        let updated = reassign_in(&mut *tx, &counter, new_offset, now).await?;
        tx.commit().await?;

        info!(
            series_id = %series_id,
            user_id = %user_id,
            band_start = anchor,
            new_offset,
            "Counter moved to a free band"
        );

        Ok(updated)
    }

    /// Administrative skip: burns the counter's next raw number without
    /// issuing it.
    ///
    /// Neither `series.current_number` nor `issued_numbers` changes, so the
    /// skipped raw stays a permanent gap in the user's sequence and is not
    /// counted in usage. Use [`crate::Allocator`] to issue numbers.
    ///
    /// Compare-and-swap on `counter.current_number`; `Conflict` when the row
    /// moved since `counter` was read.
    pub async fn advance(&self, counter: &PerUserCounter) -> DbResult<PerUserCounter> {
        let mut tx = self.pool.begin().await?;
        let updated = advance_in(&mut *tx, counter, Utc::now()).await?;
        tx.commit().await?;

        warn!(
            series_id = %counter.series_id,
            user_id = %counter.user_id,
            skipped = counter.next_number(),
            "Counter advanced without issuing a number"
        );

        Ok(updated)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

fn new_counter(
    series_id: &str,
    user_id: &str,
    start_offset: i64,
    is_auto_assigned: bool,
    now: DateTime<Utc>,
) -> PerUserCounter {
    PerUserCounter {
        id: Uuid::new_v4().to_string(),
        series_id: series_id.to_string(),
        user_id: user_id.to_string(),
        start_offset,
        current_number: 0,
        last_generated_number: None,
        is_auto_assigned,
        offset_changed_at: None,
        generations_at_current_offset: 0,
        created_at: now,
        updated_at: now,
    }
}

async fn require_series_in(conn: &mut SqliteConnection, series_id: &str) -> DbResult<Series> {
    fetch_series_in(conn, series_id)
        .await?
        .ok_or_else(|| CoreError::SeriesNotFound(series_id.to_string()).into())
}

pub(crate) async fn fetch_in(
    conn: &mut SqliteConnection,
    series_id: &str,
    user_id: &str,
) -> DbResult<Option<PerUserCounter>> {
    let sql = format!(
        "SELECT {} FROM per_user_counters WHERE series_id = ?1 AND user_id = ?2",
        COUNTER_COLUMNS
    );

    let counter = sqlx::query_as::<_, PerUserCounter>(&sql)
        .bind(series_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(counter)
}

async fn require_in(
    conn: &mut SqliteConnection,
    series_id: &str,
    user_id: &str,
) -> DbResult<PerUserCounter> {
    fetch_in(conn, series_id, user_id).await?.ok_or_else(|| {
        CoreError::CounterNotFound {
            series_id: series_id.to_string(),
            user_id: user_id.to_string(),
        }
        .into()
    })
}

pub(crate) async fn list_in(
    conn: &mut SqliteConnection,
    series_id: &str,
) -> DbResult<Vec<PerUserCounter>> {
    let sql = format!(
        "SELECT {} FROM per_user_counters WHERE series_id = ?1 ORDER BY start_offset, created_at",
        COUNTER_COLUMNS
    );

    let counters = sqlx::query_as::<_, PerUserCounter>(&sql)
        .bind(series_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(counters)
}

async fn insert_in(conn: &mut SqliteConnection, counter: &PerUserCounter) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO per_user_counters (
            id, series_id, user_id, start_offset, current_number, last_generated_number,
            is_auto_assigned, offset_changed_at, generations_at_current_offset,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&counter.id)
    .bind(&counter.series_id)
    .bind(&counter.user_id)
    .bind(counter.start_offset)
    .bind(counter.current_number)
    .bind(counter.last_generated_number)
    .bind(counter.is_auto_assigned)
    .bind(counter.offset_changed_at)
    .bind(counter.generations_at_current_offset)
    .bind(counter.created_at)
    .bind(counter.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Returns the user's counter in `series`, inserting one with the lowest
/// free band when missing. The caller must hold the series lock.
pub(crate) async fn get_or_create_in(
    conn: &mut SqliteConnection,
    series: &Series,
    user_id: &str,
    now: DateTime<Utc>,
) -> DbResult<PerUserCounter> {
    if let Some(counter) = fetch_in(conn, &series.id, user_id).await? {
        return Ok(counter);
    }

    let start_offset = free_band_in(conn, series).await?;

    let counter = new_counter(&series.id, user_id, start_offset, true, now);
    insert_in(conn, &counter).await?;

    info!(
        series_id = %series.id,
        user_id = %user_id,
        start_offset,
        "Auto-assigned counter band"
    );

    Ok(counter)
}

/// Lowest band of `series` that neither overlaps a counter's band nor holds
/// numbers already issued (bands left behind by a reassignment).
async fn free_band_in(conn: &mut SqliteConnection, series: &Series) -> DbResult<i64> {
    let band_size = series.band_size;
    let mut taken: Vec<i64> = list_in(conn, &series.id)
        .await?
        .iter()
        .map(PerUserCounter::band_anchor)
        .collect();

    loop {
        let candidate = next_free_offset(series.band_base(), band_size, &taken);
        let band = OffsetBand::new(candidate, band_size);
        if issued_in_band_in(conn, &series.id, band).await?.is_none() {
            return Ok(candidate);
        }
        taken.push(candidate);
    }
}

/// Who issued the first number found inside `band`, if anyone did.
async fn issued_in_band_in(
    conn: &mut SqliteConnection,
    series_id: &str,
    band: OffsetBand,
) -> DbResult<Option<String>> {
    let issuer: Option<String> = sqlx::query_scalar(
        r#"
        SELECT generated_by FROM issued_numbers
        WHERE series_id = ?1 AND actual_number BETWEEN ?2 AND ?3
        LIMIT 1
        "#,
    )
    .bind(series_id)
    .bind(band.first())
    .bind(band.last())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(issuer)
}

/// Fails with `OffsetCollision` if numbers were already issued inside `band`.
async fn ensure_band_unissued_in(
    conn: &mut SqliteConnection,
    series_id: &str,
    band: OffsetBand,
) -> DbResult<()> {
    match issued_in_band_in(conn, series_id, band).await? {
        Some(issuer) => Err(CoreError::OffsetCollision {
            series_id: series_id.to_string(),
            offset: band.start_offset,
            conflicting_user: issuer,
        }
        .into()),
        None => Ok(()),
    }
}

/// Compare-and-swap increment of a counter.
///
/// Matches only if `current_number` is still what `counter` says, so a
/// concurrent advance surfaces as `Conflict` instead of a skipped number.
pub(crate) async fn advance_in(
    conn: &mut SqliteConnection,
    counter: &PerUserCounter,
    now: DateTime<Utc>,
) -> DbResult<PerUserCounter> {
    let issued = counter.next_number();

    let result = sqlx::query(
        r#"
        UPDATE per_user_counters
        SET current_number = current_number + 1,
            last_generated_number = ?3,
            generations_at_current_offset = generations_at_current_offset + 1,
            updated_at = ?4
        WHERE id = ?1 AND current_number = ?2
        "#,
    )
    .bind(&counter.id)
    .bind(counter.current_number)
    .bind(issued)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        debug!(counter_id = %counter.id, expected = counter.current_number, "Counter CAS lost");
        return Err(DbError::conflict("PerUserCounter", &counter.id));
    }

    Ok(PerUserCounter {
        current_number: counter.current_number + 1,
        last_generated_number: Some(issued),
        generations_at_current_offset: counter.generations_at_current_offset + 1,
        updated_at: now,
        ..counter.clone()
    })
}

async fn reassign_in(
    conn: &mut SqliteConnection,
    counter: &PerUserCounter,
    new_offset: i64,
    now: DateTime<Utc>,
) -> DbResult<PerUserCounter> {
    let result = sqlx::query(
        r#"
        UPDATE per_user_counters
        SET start_offset = ?3,
            is_auto_assigned = 0,
            offset_changed_at = ?4,
            generations_at_current_offset = 0,
            updated_at = ?4
        WHERE id = ?1 AND current_number = ?2
        "#,
    )
    .bind(&counter.id)
    .bind(counter.current_number)
    .bind(new_offset)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict("PerUserCounter", &counter.id));
    }

    Ok(PerUserCounter {
        start_offset: new_offset,
        is_auto_assigned: false,
        offset_changed_at: Some(now),
        generations_at_current_offset: 0,
        updated_at: now,
        ..counter.clone()
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
