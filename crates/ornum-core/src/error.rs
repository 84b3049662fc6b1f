//! # Error Types
//!
//! Domain-specific error types for ornum-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ornum-core errors (this file)                                         │
//! │  ├── CoreError        - Numbering rule violations                      │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── TemplateError    - Malformed format templates                     │
//! │                                                                         │
//! │  ornum-db errors (separate crate)                                      │
//! │  └── DbError          - Database failures, wraps CoreError             │
//! │                                                                         │
//! │  Flow: ValidationError / TemplateError → CoreError → DbError → caller  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Caller Contract
//! Every variant is a distinct, matchable case. A cashiering workflow must be
//! able to tell "series exhausted" (block new transactions, alert an
//! administrator) apart from "lock contention" (retry), so nothing here is
//! ever flattened into a string or a boolean.

use thiserror::Error;

use crate::types::IssuedNumberStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Numbering rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Series id does not exist (or was soft-deleted).
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    /// Series exists but cannot issue numbers on the requested date.
    ///
    /// ## When This Occurs
    /// - `is_active` is false (superseded by a successor series)
    /// - The date is before `effective_from` or after `effective_to`
    #[error("Series {series_id} is not active on {as_of}")]
    SeriesInactive {
        series_id: String,
        as_of: chrono::NaiveDate,
    },

    /// Active-series lookup did not resolve to exactly one series.
    ///
    /// Ambiguity is surfaced, never resolved by picking the first row.
    #[error("Expected exactly one active series on {as_of}, found {matches}")]
    NoActiveSeries {
        as_of: chrono::NaiveDate,
        matches: usize,
    },

    /// The series hit its `end_number`. Hard stop: numbers never wrap.
    ///
    /// ## User Workflow
    /// ```text
    /// allocate(series) ──► current_number == end_number
    ///      │
    ///      ▼
    /// SeriesExhausted ──► cashier blocked, administrator opens a new series
    /// ```
    #[error("Series {series_id} is exhausted (end number {end_number})")]
    SeriesExhausted { series_id: String, end_number: i64 },

    /// An offset band would overlap another cashier's band in the same series.
    #[error("Offset {offset} in series {series_id} overlaps the band of user {conflicting_user}")]
    OffsetCollision {
        series_id: String,
        offset: i64,
        conflicting_user: String,
    },

    /// A counter used up every number of its band.
    #[error("User {user_id} has used the whole band starting at offset {band_start} in series {series_id}")]
    OffsetBandExhausted {
        series_id: String,
        user_id: String,
        band_start: i64,
    },

    /// Counter row not found.
    #[error("No counter for user {user_id} in series {series_id}")]
    CounterNotFound { series_id: String, user_id: String },

    /// Issued number not found.
    #[error("Issued number not found: {0}")]
    IssuedNumberNotFound(String),

    /// Illegal lifecycle transition (e.g. voiding a used number).
    #[error("Issued number {id} is {from}, cannot become {to}")]
    InvalidTransition {
        id: String,
        from: IssuedNumberStatus,
        to: IssuedNumberStatus,
    },

    /// Format template error (wraps TemplateError).
    #[error("Invalid format template: {0}")]
    Template(#[from] TemplateError),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, inverted date window).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., second counter for the same user).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Template Error
// =============================================================================

/// Format template parse errors.
///
/// Positions are byte offsets into the template source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,

    #[error("unclosed placeholder starting at {position}")]
    Unclosed { position: usize },

    #[error("unmatched '}}' at {position}")]
    UnmatchedBrace { position: usize },

    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("invalid width '{value}' for {{{placeholder}}}")]
    InvalidWidth { placeholder: String, value: String },

    #[error("width {width} exceeds maximum {max}")]
    WidthTooLarge { width: usize, max: usize },

    #[error("template must contain a {{NUMBER}} placeholder")]
    MissingNumber,
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
