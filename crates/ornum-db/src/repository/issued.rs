//! # Issued Number Repository
//!
//! Lifecycle tracking and read-only scopes over issued numbers.
//!
//! ## Guarded Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    mark_used / mark_voided                              │
//! │                                                                         │
//! │  1. Load row, apply the transition in memory (ornum-core lifecycle)    │
//! │       │  illegal? ──► InvalidTransition, nothing written               │
//! │       ▼                                                                 │
//! │  2. UPDATE ... WHERE id = ? AND status = 'generated'                   │
//! │       │  0 rows? ──► someone else moved it first:                      │
//! │       │              re-read, InvalidTransition from the fresh status  │
//! │       ▼                                                                 │
//! │  3. Return the updated number                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use ornum_core::lifecycle::ensure_transition;
use ornum_core::{
    CoreError, GenerationMethod, IssuedNumber, IssuedNumberStatus, StatusCounts,
};

use crate::error::{DbError, DbResult};

const ISSUED_COLUMNS: &str = r#"
    id, series_id, or_number, actual_number, generated_by, generated_at,
    generation_method, status, transaction_ref, used_at, voided_at,
    voided_by, void_reason, metadata
"#;

/// Storage shape of an issued number: metadata is JSON text.
#[derive(Debug, sqlx::FromRow)]
struct IssuedNumberRow {
    id: String,
    series_id: String,
    or_number: String,
    actual_number: i64,
    generated_by: String,
    generated_at: DateTime<Utc>,
    generation_method: GenerationMethod,
    status: IssuedNumberStatus,
    transaction_ref: Option<String>,
    used_at: Option<DateTime<Utc>>,
    voided_at: Option<DateTime<Utc>>,
    voided_by: Option<String>,
    void_reason: Option<String>,
    metadata: Option<String>,
}

impl TryFrom<IssuedNumberRow> for IssuedNumber {
    type Error = DbError;

    fn try_from(row: IssuedNumberRow) -> DbResult<Self> {
        let metadata = row
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(IssuedNumber {
            id: row.id,
            series_id: row.series_id,
            or_number: row.or_number,
            actual_number: row.actual_number,
            generated_by: row.generated_by,
            generated_at: row.generated_at,
            generation_method: row.generation_method,
            status: row.status,
            transaction_ref: row.transaction_ref,
            used_at: row.used_at,
            voided_at: row.voided_at,
            voided_by: row.voided_by,
            void_reason: row.void_reason,
            metadata,
        })
    }
}

fn into_numbers(rows: Vec<IssuedNumberRow>) -> DbResult<Vec<IssuedNumber>> {
    rows.into_iter().map(IssuedNumber::try_from).collect()
}

/// Repository for issued numbers.
#[derive(Debug, Clone)]
pub struct IssuedNumberRepository {
    pool: SqlitePool,
}

impl IssuedNumberRepository {
    /// Creates a new IssuedNumberRepository.
    pub fn new(pool: SqlitePool) -> Self {
        IssuedNumberRepository { pool }
    }

    /// Gets an issued number by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<IssuedNumber>> {
        let sql = format!("SELECT {} FROM issued_numbers WHERE id = ?1", ISSUED_COLUMNS);

        sqlx::query_as::<_, IssuedNumberRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(IssuedNumber::try_from)
            .transpose()
    }

    /// Gets an issued number by ID or fails with `IssuedNumberNotFound`.
    pub async fn require(&self, id: &str) -> DbResult<IssuedNumber> {
        self.get(id)
            .await?
            .ok_or_else(|| CoreError::IssuedNumberNotFound(id.to_string()).into())
    }

    /// Looks up a number by its printed form.
    pub async fn find_by_or_number(
        &self,
        series_id: &str,
        or_number: &str,
    ) -> DbResult<Option<IssuedNumber>> {
        let sql = format!(
            "SELECT {} FROM issued_numbers WHERE series_id = ?1 AND or_number = ?2
             ORDER BY actual_number LIMIT 1",
            ISSUED_COLUMNS
        );

        sqlx::query_as::<_, IssuedNumberRow>(&sql)
            .bind(series_id)
            .bind(or_number)
            .fetch_optional(&self.pool)
            .await?
            .map(IssuedNumber::try_from)
            .transpose()
    }

    /// Lists numbers in one state, oldest first, optionally within a series.
    pub async fn list_by_status(
        &self,
        series_id: Option<&str>,
        status: IssuedNumberStatus,
    ) -> DbResult<Vec<IssuedNumber>> {
        let sql = format!(
            "SELECT {} FROM issued_numbers
             WHERE status = ?1 AND (?2 IS NULL OR series_id = ?2)
             ORDER BY generated_at, actual_number",
            ISSUED_COLUMNS
        );

        let rows = sqlx::query_as::<_, IssuedNumberRow>(&sql)
            .bind(status)
            .bind(series_id)
            .fetch_all(&self.pool)
            .await?;

        into_numbers(rows)
    }

    /// Numbers bound to a transaction.
    pub async fn used(&self, series_id: Option<&str>) -> DbResult<Vec<IssuedNumber>> {
        self.list_by_status(series_id, IssuedNumberStatus::Used).await
    }

    /// Numbers allocated but not yet used or voided.
    pub async fn generated(&self, series_id: Option<&str>) -> DbResult<Vec<IssuedNumber>> {
        self.list_by_status(series_id, IssuedNumberStatus::Generated)
            .await
    }

    /// Numbers discarded before use.
    pub async fn voided(&self, series_id: Option<&str>) -> DbResult<Vec<IssuedNumber>> {
        self.list_by_status(series_id, IssuedNumberStatus::Voided).await
    }

    /// Per-state totals of a series.
    pub async fn count_by_status(&self, series_id: &str) -> DbResult<StatusCounts> {
        let rows: Vec<(IssuedNumberStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM issued_numbers WHERE series_id = ?1 GROUP BY status",
        )
        .bind(series_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            counts.add(status, count);
        }
        Ok(counts)
    }

    /// Binds a generated number to a completed transaction.
    ///
    /// ## Errors
    /// - `IssuedNumberNotFound`
    /// - `Validation` for an empty transaction reference
    /// - `InvalidTransition` unless the number is `generated`
    pub async fn mark_used(&self, id: &str, transaction_ref: &str) -> DbResult<IssuedNumber> {
        let mut number = self.require(id).await?;
        number.mark_used(transaction_ref, Utc::now())?;

        debug!(id = %id, transaction_ref = ?number.transaction_ref, "Marking number used");

        let result = sqlx::query(
            r#"
            UPDATE issued_numbers
            SET status = 'used', transaction_ref = ?2, used_at = ?3
            WHERE id = ?1 AND status = 'generated'
            "#,
        )
        .bind(id)
        .bind(&number.transaction_ref)
        .bind(number.used_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.lost_transition(id, IssuedNumberStatus::Used).await);
        }

        info!(id = %id, or_number = %number.or_number, "Number used");
        Ok(number)
    }

    /// Discards a generated number. The number is never reissued.
    ///
    /// ## Errors
    /// - `IssuedNumberNotFound`
    /// - `Validation` for an empty voiding user or reason
    /// - `InvalidTransition` unless the number is `generated`
    pub async fn mark_voided(
        &self,
        id: &str,
        voided_by: &str,
        reason: &str,
    ) -> DbResult<IssuedNumber> {
        let mut number = self.require(id).await?;
        number.mark_voided(voided_by, reason, Utc::now())?;

        let result = sqlx::query(
            r#"
            UPDATE issued_numbers
            SET status = 'voided', voided_by = ?2, void_reason = ?3, voided_at = ?4
            WHERE id = ?1 AND status = 'generated'
            "#,
        )
        .bind(id)
        .bind(&number.voided_by)
        .bind(&number.void_reason)
        .bind(number.voided_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.lost_transition(id, IssuedNumberStatus::Voided).await);
        }

        info!(
            id = %id,
            or_number = %number.or_number,
            voided_by = %voided_by,
            "Number voided"
        );
        Ok(number)
    }

    /// Error for a guarded UPDATE that matched nothing.
    async fn lost_transition(&self, id: &str, to: IssuedNumberStatus) -> DbError {
        match self.require(id).await {
            Ok(current) => match ensure_transition(id, current.status, to) {
                Err(err) => err.into(),
                // Still generated: the row changed under us and changed back
                Ok(()) => DbError::conflict("IssuedNumber", id),
            },
            Err(err) => err,
        }
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Records a freshly allocated number.
pub(crate) async fn insert_in(conn: &mut SqliteConnection, number: &IssuedNumber) -> DbResult<()> {
    let metadata = number
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO issued_numbers (
            id, series_id, or_number, actual_number, generated_by, generated_at,
            generation_method, status, transaction_ref, used_at, voided_at,
            voided_by, void_reason, metadata
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&number.id)
    .bind(&number.series_id)
    .bind(&number.or_number)
    .bind(number.actual_number)
    .bind(&number.generated_by)
    .bind(number.generated_at)
    .bind(number.generation_method)
    .bind(number.status)
    .bind(&number.transaction_ref)
    .bind(number.used_at)
    .bind(number.voided_at)
    .bind(&number.voided_by)
    .bind(&number.void_reason)
    .bind(metadata)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
