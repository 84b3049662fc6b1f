//! # Validation Module
//!
//! Input validation for administrative and cashiering operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (billing workflow)                                    │
//! │  └── Basic form checks                                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Series bounds and date windows                                    │
//! │  ├── Format template syntax                                            │
//! │  └── Void reasons, user and transaction references                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints on status values                                │
//! │  └── UNIQUE (series_id, user_id), UNIQUE (series_id, actual_number)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ornum_core::validation::{validate_bounds, validate_void_reason};
//!
//! assert!(validate_bounds(1, Some(5)).is_ok());
//! assert!(validate_bounds(10, Some(5)).is_err());
//! assert_eq!(validate_void_reason("  misprint ").unwrap(), "misprint");
//! ```

use chrono::NaiveDate;

use crate::error::{CoreResult, ValidationError};
use crate::template::FormatTemplate;
use crate::types::{NewSeries, Series};
use crate::MAX_VOID_REASON_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a series name: non-empty, at most 100 characters.
pub fn validate_series_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > 100 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 100,
        });
    }

    Ok(())
}

/// Validates an optional prefix: at most 20 characters.
pub fn validate_prefix(prefix: Option<&str>) -> ValidationResult<()> {
    if let Some(prefix) = prefix {
        if prefix.chars().count() > 20 {
            return Err(ValidationError::TooLong {
                field: "prefix".to_string(),
                max: 20,
            });
        }
    }
    Ok(())
}

/// Validates a user reference (cashier or administrator).
pub fn validate_user_id(user_id: &str) -> ValidationResult<()> {
    if user_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "user_id".to_string(),
        });
    }
    Ok(())
}

/// Validates a transaction reference passed to `mark_used`.
pub fn validate_transaction_ref(transaction_ref: &str) -> ValidationResult<()> {
    if transaction_ref.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "transaction_ref".to_string(),
        });
    }
    Ok(())
}

/// Validates a void reason.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most [`MAX_VOID_REASON_LEN`] characters
///
/// ## Returns
/// The trimmed reason.
pub fn validate_void_reason(reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: "void_reason".to_string(),
        });
    }

    if reason.chars().count() > MAX_VOID_REASON_LEN {
        return Err(ValidationError::TooLong {
            field: "void_reason".to_string(),
            max: MAX_VOID_REASON_LEN,
        });
    }

    Ok(reason.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates series bounds.
///
/// ## Rules
/// - `start_number >= 1`
/// - `end_number >= start_number` when set
pub fn validate_bounds(start_number: i64, end_number: Option<i64>) -> ValidationResult<()> {
    if start_number < 1 {
        return Err(ValidationError::OutOfRange {
            field: "start_number".to_string(),
            min: 1,
            max: i64::MAX,
        });
    }

    if let Some(end) = end_number {
        if end < start_number {
            return Err(ValidationError::OutOfRange {
                field: "end_number".to_string(),
                min: start_number,
                max: i64::MAX,
            });
        }
    }

    Ok(())
}

/// Validates a new `end_number` for an existing series.
///
/// Lowering the bound below what was already issued is a configuration
/// error, rejected here rather than discovered at allocation time.
pub fn validate_end_number_change(series: &Series, new_end: Option<i64>) -> ValidationResult<()> {
    validate_bounds(series.start_number, new_end)?;

    if let Some(end) = new_end {
        if end < series.current_number {
            return Err(ValidationError::OutOfRange {
                field: "end_number".to_string(),
                min: series.current_number,
                max: i64::MAX,
            });
        }
    }

    Ok(())
}

/// Validates a counter offset (must be non-negative).
pub fn validate_offset(offset: i64) -> ValidationResult<()> {
    if offset < 0 {
        return Err(ValidationError::OutOfRange {
            field: "start_offset".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a band width (at least one number per band).
pub fn validate_band_size(band_size: i64) -> ValidationResult<()> {
    if band_size < 1 {
        return Err(ValidationError::OutOfRange {
            field: "band_size".to_string(),
            min: 1,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates that a band anchored at `anchor` starts no lower than the
/// series' `start_number`.
pub fn validate_band_anchor(series: &Series, anchor: i64) -> ValidationResult<()> {
    if anchor < series.band_base() {
        return Err(ValidationError::OutOfRange {
            field: "start_offset".to_string(),
            min: series.band_base(),
            max: i64::MAX,
        });
    }
    Ok(())
}

// =============================================================================
// Date Validators
// =============================================================================

/// Validates an effective window: `effective_to >= effective_from`.
pub fn validate_effective_window(
    effective_from: NaiveDate,
    effective_to: Option<NaiveDate>,
) -> ValidationResult<()> {
    if let Some(to) = effective_to {
        if to < effective_from {
            return Err(ValidationError::InvalidFormat {
                field: "effective_to".to_string(),
                reason: format!("must not be before effective_from ({})", effective_from),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates everything about a new series and returns its parsed template.
pub fn validate_new_series(new: &NewSeries) -> CoreResult<FormatTemplate> {
    validate_series_name(&new.name)?;
    validate_prefix(new.prefix.as_deref())?;
    validate_bounds(new.start_number, new.end_number)?;
    validate_band_size(new.band_size)?;
    validate_effective_window(new.effective_from, new.effective_to)?;
    validate_user_id(&new.created_by)?;

    Ok(FormatTemplate::parse(&new.format_template)?)
}

// =============================================================================
// Unit Tests
// =============================================================================
