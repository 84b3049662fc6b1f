//! # Domain Types
//!
//! Core domain types of the OR number allocator.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Series      │   │ PerUserCounter  │   │  IssuedNumber   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  series_id (FK) │   │  series_id (FK) │       │
//! │  │  start/end      │   │  user_id        │   │  or_number      │       │
//! │  │  current_number │   │  start_offset   │   │  actual_number  │       │
//! │  │  format_template│   │  current_number │   │  status         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────────┐   ┌─────────────────────┐                     │
//! │  │ IssuedNumberStatus  │   │  GenerationMethod   │                     │
//! │  │  Generated          │   │  Manual             │                     │
//! │  │  Used               │   │  Automatic          │                     │
//! │  │  Voided             │   └─────────────────────┘                     │
//! │  └─────────────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Rows are joined on their UUID v4 `id`. The natural keys the database
//! enforces are (series_id, user_id) for counters and
//! (series_id, actual_number) for issued numbers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

// =============================================================================
// Series
// =============================================================================

/// One numbering authority: a bounded or unbounded range of receipt numbers
/// with a format template, active over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Series {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name, e.g. "OR 2025 Main Office".
    pub name: String,

    /// Value substituted for `{PREFIX}`.
    pub prefix: Option<String>,

    /// First raw number of the series.
    pub start_number: i64,

    /// Last raw number of the series. `None` means unbounded.
    pub end_number: Option<i64>,

    /// Global issuance counter. Starts at `start_number - 1`.
    pub current_number: i64,

    /// Format template, e.g. `OR-{YEAR}{MONTH}-{NUMBER:6}`.
    pub format_template: String,

    /// Width of every per-user offset band. Fixed when the series opens:
    /// band collision checks are only sound if all counters of the series
    /// are measured with the same width.
    pub band_size: i64,

    /// False once superseded by a successor series.
    pub is_active: bool,

    #[ts(as = "String")]
    pub effective_from: NaiveDate,

    /// Open-ended when `None`.
    #[ts(as = "Option<String>")]
    pub effective_to: Option<NaiveDate>,

    pub notes: Option<String>,

    /// Administrator who opened the series.
    pub created_by: String,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker, kept for audit retention.
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input for opening a new series.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSeries {
    pub name: String,
    pub prefix: Option<String>,
    pub start_number: i64,
    pub end_number: Option<i64>,
    pub format_template: String,
    pub band_size: i64,
    #[ts(as = "String")]
    pub effective_from: NaiveDate,
    #[ts(as = "Option<String>")]
    pub effective_to: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_by: String,
}

// =============================================================================
// Per-User Counter
// =============================================================================

/// One cashier's private allocation window within a series.
///
/// ## Numbering Rule
/// ```text
/// next number = start_offset + current_number + 1
///
/// start_offset = 100000, current_number = 2
///   → issued so far: 100001, 100002
///   → next:          100003
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PerUserCounter {
    pub id: String,
    pub series_id: String,
    pub user_id: String,

    /// Added to the running count to keep this user's numbers apart from
    /// every other user's numbers in the same series.
    pub start_offset: i64,

    /// How many numbers this user has issued in the series.
    pub current_number: i64,

    /// Most recent raw number issued through this counter.
    pub last_generated_number: Option<i64>,

    /// True when the band was picked by the allocator rather than an
    /// administrator.
    pub is_auto_assigned: bool,

    #[ts(as = "Option<String>")]
    pub offset_changed_at: Option<DateTime<Utc>>,

    /// Numbers issued since the last offset change.
    pub generations_at_current_offset: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Issued Number Status
// =============================================================================

/// Lifecycle state of an issued receipt number.
///
/// See [`crate::lifecycle`] for the legal transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum IssuedNumberStatus {
    /// Allocated, not yet bound to a transaction.
    Generated,
    /// Bound to a completed transaction.
    Used,
    /// Discarded before use. The number is never reissued.
    Voided,
}

impl IssuedNumberStatus {
    /// Lowercase name as stored in the database.
    pub const fn as_str(&self) -> &'static str {
        match self {
            IssuedNumberStatus::Generated => "generated",
            IssuedNumberStatus::Used => "used",
            IssuedNumberStatus::Voided => "voided",
        }
    }
}

impl Default for IssuedNumberStatus {
    fn default() -> Self {
        IssuedNumberStatus::Generated
    }
}

impl fmt::Display for IssuedNumberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Generation Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    /// Requested explicitly by a cashier.
    Manual,
    /// Requested by a workflow without cashier interaction.
    Automatic,
}

impl Default for GenerationMethod {
    fn default() -> Self {
        GenerationMethod::Automatic
    }
}

// =============================================================================
// Issued Number
// =============================================================================

/// One allocated receipt number instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IssuedNumber {
    pub id: String,
    pub series_id: String,

    /// Formatted, human-facing receipt number.
    pub or_number: String,

    /// Raw number. Unique within the series.
    pub actual_number: i64,

    /// Cashier the number was issued to.
    pub generated_by: String,

    #[ts(as = "String")]
    pub generated_at: DateTime<Utc>,

    pub generation_method: GenerationMethod,
    pub status: IssuedNumberStatus,

    /// Transaction the number was consumed by.
    pub transaction_ref: Option<String>,

    #[ts(as = "Option<String>")]
    pub used_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,

    pub voided_by: Option<String>,
    pub void_reason: Option<String>,

    /// Free-form caller data (terminal id, payment channel, ...).
    #[ts(type = "unknown")]
    pub metadata: Option<serde_json::Value>,
}

// =============================================================================
// Dashboard Projection
// =============================================================================

/// Read-only usage figures of a series for administrative dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UsageSnapshot {
    pub series_id: String,
    /// Numbers issued so far (`current_number - start_number + 1`).
    pub issued: i64,
    /// Numbers left before exhaustion. `None` for unbounded series.
    pub remaining: Option<i64>,
    pub usage_percentage: f64,
    pub is_near_limit: bool,
    pub has_reached_limit: bool,
}

/// Issued numbers of a series per lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatusCounts {
    pub generated: i64,
    pub used: i64,
    pub voided: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.generated + self.used + self.voided
    }

    /// Adds `count` to the bucket of `status`.
    pub fn add(&mut self, status: IssuedNumberStatus, count: i64) {
        match status {
            IssuedNumberStatus::Generated => self.generated += count,
            IssuedNumberStatus::Used => self.used += count,
            IssuedNumberStatus::Voided => self.voided += count,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
