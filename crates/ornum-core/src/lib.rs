//! # ornum-core: Pure Numbering Logic for the OR Number Allocator
//!
//! This crate holds every rule of Official Receipt (OR) numbering that can be
//! expressed without touching storage.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     OR Number Allocation                                │
//! │                                                                         │
//! │  Cashiering workflow (external)                                        │
//! │    allocate(series, user) ──► mark_used(tx) / mark_voided(reason)      │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ ornum-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  series   │  │  counter  │  │ template  │  │ lifecycle │  │   │
//! │  │   │  limits   │  │  bands    │  │  parser   │  │  states   │  │   │
//! │  │   │  windows  │  │  offsets  │  │  render   │  │  guards   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                ornum-db (Database Layer)                        │   │
//! │  │       SQLite repositories, migrations, the Allocator            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Series, PerUserCounter, IssuedNumber)
//! - [`series`] - Limit, usage and effective-window rules for a series
//! - [`counter`] - Per-user offset bands and next-number arithmetic
//! - [`template`] - Single-pass receipt format template parser
//! - [`lifecycle`] - generated → used / voided state machine
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use ornum_core::template::FormatTemplate;
//!
//! let template = FormatTemplate::parse("OR-{YEAR}{MONTH}-{NUMBER:6}").unwrap();
//! let date = NaiveDate::from_ymd_opt(2025, 10, 5).unwrap();
//!
//! assert_eq!(template.render(None, 42, date), "OR-202510-000042");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod counter;
pub mod error;
pub mod lifecycle;
pub mod series;
pub mod template;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use counter::OffsetBand;
pub use error::{CoreError, CoreResult, TemplateError, ValidationError};
pub use template::FormatTemplate;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default width of a per-user offset band.
///
/// ## Business Reason
/// One cashier can issue this many receipts in a series before an
/// administrator has to move them to a fresh band.
pub const DEFAULT_BAND_SIZE: i64 = 100_000;

/// Usage percentage at which a series is reported as near its limit.
pub const NEAR_LIMIT_PERCENT: f64 = 90.0;

/// Widest zero padding accepted by a `{NUMBER:w}` placeholder.
pub const MAX_NUMBER_WIDTH: usize = 32;

/// Maximum length of a void reason.
pub const MAX_VOID_REASON_LEN: usize = 500;
