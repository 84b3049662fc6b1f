//! # Allocator
//!
//! Issues the next OR number to a cashier.
//!
//! ## Allocation Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 allocate(series, user, as_of, method)                   │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │   1. UPDATE series SET current_number + 1      ← write lock taken here │
//! │        WHERE live AND below end_number                                 │
//! │   2. SELECT series          missing?            → SeriesNotFound       │
//! │                             inactive / window?  → SeriesInactive       │
//! │                             at end_number?      → SeriesExhausted      │
//! │   3. get-or-create counter  (lowest free band on first use)            │
//! │   4. raw = next_number      outside band?       → OffsetBandExhausted  │
//! │   5. format raw with the series template                               │
//! │   6. UPDATE counter (CAS)   lost race?          → Conflict (transient) │
//! │   7. INSERT issued_numbers  status = generated                         │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  Any error drops the transaction: no bump, advance or row survives.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry
//! Transient failures (lock busy, pool timeout, lost CAS) rerun the whole
//! transaction after an exponential backoff, at most `max_retries` times.
//! Numbering rule violations are returned immediately.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ornum_core::{CoreError, GenerationMethod, IssuedNumber, IssuedNumberStatus, Series};

use crate::config::AllocatorConfig;
use crate::error::{DbError, DbResult};
use crate::repository::series::SeriesRepository;
use crate::repository::{counter, issued, series};

/// Hands out OR numbers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Allocator {
    pool: SqlitePool,
    config: AllocatorConfig,
}

impl Allocator {
    pub fn new(pool: SqlitePool, config: AllocatorConfig) -> Self {
        Allocator { pool, config }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Allocates the next number of `series_id` for `user_id`.
    ///
    /// ## Errors
    /// - `SeriesNotFound`, `SeriesInactive`, `SeriesExhausted`
    /// - `OffsetBandExhausted` when the user's band is used up
    /// - `RetriesExhausted` when lock contention outlasts the retry budget
    pub async fn allocate(
        &self,
        series_id: &str,
        user_id: &str,
        as_of: NaiveDate,
        method: GenerationMethod,
    ) -> DbResult<IssuedNumber> {
        self.allocate_with_metadata(series_id, user_id, as_of, method, None)
            .await
    }

    /// Like [`Allocator::allocate`], storing caller `metadata` on the number.
    pub async fn allocate_with_metadata(
        &self,
        series_id: &str,
        user_id: &str,
        as_of: NaiveDate,
        method: GenerationMethod,
        metadata: Option<Value>,
    ) -> DbResult<IssuedNumber> {
        ornum_core::validation::validate_user_id(user_id)?;

        let mut backoff = self.create_backoff();
        let mut retry_count = 0u32;

        loop {
            let attempt = self
                .try_allocate(series_id, user_id, as_of, method, metadata.clone())
                .await;

            let err = match attempt {
                Ok(number) => {
                    info!(
                        series_id = %series_id,
                        user_id = %user_id,
                        raw = number.actual_number,
                        or_number = %number.or_number,
                        retries = retry_count,
                        "Number allocated"
                    );
                    return Ok(number);
                }
                Err(err) if err.is_transient() => err,
                Err(err) => {
                    debug!(series_id = %series_id, user_id = %user_id, error = %err, "Allocation rejected");
                    return Err(err);
                }
            };

            if retry_count >= self.config.max_retries {
                warn!(
                    series_id = %series_id,
                    user_id = %user_id,
                    attempts = retry_count + 1,
                    error = %err,
                    "Allocation retries exhausted"
                );
                return Err(DbError::RetriesExhausted {
                    attempts: retry_count + 1,
                    source: Box::new(err),
                });
            }
            retry_count += 1;

            // The policy has no elapsed-time limit, so a delay is always given
            let delay = backoff
                .next_backoff()
                .unwrap_or_else(|| self.config.max_backoff());
            debug!(
                series_id = %series_id,
                user_id = %user_id,
                attempt = retry_count,
                ?delay,
                error = %err,
                "Transient allocation failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Resolves the unique active series for `as_of`, then allocates in it.
    pub async fn allocate_active(
        &self,
        user_id: &str,
        as_of: NaiveDate,
        method: GenerationMethod,
    ) -> DbResult<IssuedNumber> {
        let series = SeriesRepository::new(self.pool.clone())
            .get_active(as_of)
            .await?;
        self.allocate(&series.id, user_id, as_of, method).await
    }

    /// One attempt: a single write transaction.
    async fn try_allocate(
        &self,
        series_id: &str,
        user_id: &str,
        as_of: NaiveDate,
        method: GenerationMethod,
        metadata: Option<Value>,
    ) -> DbResult<IssuedNumber> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // First statement writes, so the lock is held before any read
        let bumped = series::bump_current_in(&mut *tx, series_id, now).await?;

        let mut series: Series = series::fetch_in(&mut *tx, series_id)
            .await?
            .ok_or_else(|| CoreError::SeriesNotFound(series_id.to_string()))?;
        if bumped {
            // Judge the series as it was before this allocation
            series.current_number -= 1;
        }

        series.ensure_can_issue(as_of)?;
        if !bumped {
            // Live and below the bound, yet the guarded bump matched nothing
            return Err(DbError::conflict("Series", series_id));
        }

        let user_counter = counter::get_or_create_in(&mut *tx, &series, user_id, now).await?;
        let raw = user_counter.ensure_band_capacity(series.band_size)?;

        let or_number = series.format_number(raw, as_of)?;
        counter::advance_in(&mut *tx, &user_counter, now).await?;

        let number = IssuedNumber {
            id: Uuid::new_v4().to_string(),
            series_id: series.id.clone(),
            or_number,
            actual_number: raw,
            generated_by: user_id.to_string(),
            generated_at: now,
            generation_method: method,
            status: IssuedNumberStatus::Generated,
            transaction_ref: None,
            used_at: None,
            voided_at: None,
            voided_by: None,
            void_reason: None,
            metadata,
        };
        issued::insert_in(&mut *tx, &number).await?;

        tx.commit().await?;
        Ok(number)
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff(),
            max_interval: self.config.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None, // bounded by max_retries instead
            ..Default::default()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use ornum_core::NewSeries;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn setup(end_number: Option<i64>) -> (Database, Series) {
        setup_with_band(end_number, 1_000).await
    }

    async fn setup_with_band(end_number: Option<i64>, band_size: i64) -> (Database, Series) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let series = db
            .series()
            .create(NewSeries {
                name: "OR 2025".to_string(),
                prefix: Some("OR".to_string()),
                start_number: 1,
                end_number,
                format_template: "{PREFIX}-{YEAR}{MONTH}-{NUMBER:6}".to_string(),
                band_size,
                effective_from: date(2025, 1, 1),
                effective_to: Some(date(2025, 12, 31)),
                notes: None,
                created_by: "admin".to_string(),
            })
            .await
            .unwrap();
        (db, series)
    }

    #[tokio::test]
    async fn test_sequential_allocations_step_by_one() {
        let (db, series) = setup(None).await;
        let allocator = db.allocator(AllocatorConfig::default());
        let d = date(2025, 10, 5);

        let mut raws = Vec::new();
        for _ in 0..5 {
            let n = allocator
                .allocate(&series.id, "cashier-a", d, GenerationMethod::Automatic)
                .await
                .unwrap();
            assert_eq!(n.status, IssuedNumberStatus::Generated);
            raws.push(n.actual_number);
        }

        assert_eq!(raws, vec![1, 2, 3, 4, 5]);
        let stored = db.series().require(&series.id).await.unwrap();
        assert_eq!(stored.current_number, 5);
    }

    #[tokio::test]
    async fn test_formats_with_series_template() {
        let (db, series) = setup(None).await;
        let n = db
            .allocator(AllocatorConfig::default())
            .allocate(&series.id, "cashier-a", date(2025, 10, 5), GenerationMethod::Manual)
            .await
            .unwrap();

        assert_eq!(n.or_number, "OR-202510-000001");
        assert_eq!(n.generation_method, GenerationMethod::Manual);
    }

    #[tokio::test]
    async fn test_inactive_window_leaves_no_trace() {
        let (db, series) = setup(Some(10)).await;
        let allocator = db.allocator(AllocatorConfig::default());

        let err = allocator
            .allocate(&series.id, "cashier-a", date(2026, 1, 1), GenerationMethod::Automatic)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::SeriesInactive { .. })
        ));

        // Rolled back: no bump, no counter, no issued row
        let stored = db.series().require(&series.id).await.unwrap();
        assert_eq!(stored.current_number, 0);
        assert!(db.counters().list(&series.id).await.unwrap().is_empty());
        assert!(db.issued_numbers().generated(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_bump_and_advance() {
        let (db, series) = setup(None).await;
        let counters = db.counters();
        counters.provision(&series.id, "cashier-a", 0).await.unwrap();

        // Raw 1 already taken by an imported receipt
        sqlx::query(
            r#"
            INSERT INTO issued_numbers (
                id, series_id, or_number, actual_number, generated_by, generated_at
            ) VALUES ('imported-1', ?1, 'OR-LEGACY-1', 1, 'import', ?2)
            "#,
        )
        .bind(&series.id)
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        let err = db
            .allocator(AllocatorConfig::default())
            .allocate(&series.id, "cashier-a", date(2025, 6, 1), GenerationMethod::Automatic)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        // Bump and counter advance happened before the insert; both undone
        let stored = db.series().require(&series.id).await.unwrap();
        assert_eq!(stored.current_number, 0);
        let counter = counters.get(&series.id, "cashier-a").await.unwrap().unwrap();
        assert_eq!(counter.current_number, 0);
        assert_eq!(counter.last_generated_number, None);
        let counts = db.issued_numbers().count_by_status(&series.id).await.unwrap();
        assert_eq!(counts.total(), 1);
    }

    #[tokio::test]
    async fn test_unknown_series() {
        let (db, _) = setup(None).await;
        let err = db
            .allocator(AllocatorConfig::default())
            .allocate("missing", "cashier-a", date(2025, 6, 1), GenerationMethod::Automatic)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::SeriesNotFound(_))));
    }

    #[tokio::test]
    async fn test_band_exhaustion() {
        let (db, series) = setup_with_band(None, 2).await;
        let allocator = db.allocator(AllocatorConfig::default());
        let d = date(2025, 6, 1);

        for _ in 0..2 {
            allocator
                .allocate(&series.id, "cashier-a", d, GenerationMethod::Automatic)
                .await
                .unwrap();
        }

        let err = allocator
            .allocate(&series.id, "cashier-a", d, GenerationMethod::Automatic)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::OffsetBandExhausted { .. })
        ));
        assert_eq!(
            db.series().require(&series.id).await.unwrap().current_number,
            2
        );
    }

    #[tokio::test]
    async fn test_metadata_is_stored() {
        let (db, series) = setup(None).await;
        let n = db
            .allocator(AllocatorConfig::default())
            .allocate_with_metadata(
                &series.id,
                "cashier-a",
                date(2025, 6, 1),
                GenerationMethod::Automatic,
                Some(serde_json::json!({ "terminal": "POS-2" })),
            )
            .await
            .unwrap();

        let stored = db.issued_numbers().require(&n.id).await.unwrap();
        assert_eq!(stored.metadata, Some(serde_json::json!({ "terminal": "POS-2" })));
    }

    #[tokio::test]
    async fn test_allocate_active() {
        let (db, series) = setup(None).await;
        let n = db
            .allocator(AllocatorConfig::default())
            .allocate_active("cashier-a", date(2025, 6, 1), GenerationMethod::Automatic)
            .await
            .unwrap();
        assert_eq!(n.series_id, series.id);
    }

    #[tokio::test]
    async fn test_backoff_follows_config() {
        let config = AllocatorConfig {
            initial_backoff_ms: 10,
            max_backoff_ms: 40,
            ..AllocatorConfig::default()
        };
        let pool = SqlitePool::connect_lazy("sqlite::memory:").unwrap();
        let backoff = Allocator::new(pool, config).create_backoff();

        assert_eq!(backoff.initial_interval, std::time::Duration::from_millis(10));
        assert_eq!(backoff.max_interval, std::time::Duration::from_millis(40));
        assert!(backoff.max_elapsed_time.is_none());
    }
}
