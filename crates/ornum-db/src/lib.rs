//! # ornum-db: Storage and Allocation for OR Numbers
//!
//! SQLite persistence for receipt number series, per-user counters and
//! issued numbers, plus the [`Allocator`] that hands out the next number.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Allocation Data Flow                           │
//! │                                                                         │
//! │  Cashiering workflow (allocate, mark used / voided)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     ornum-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ SeriesRepo    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ CounterRepo   │    │ 001_initial  │  │   │
//! │  │   │ WAL, busy     │    │ IssuedRepo    │    │ _schema.sql  │  │   │
//! │  │   │ timeout       │    │      ▲        │    │              │  │   │
//! │  │   └───────────────┘    └──────┼────────┘    └──────────────┘  │   │
//! │  │                               │                                 │   │
//! │  │                        ┌──────┴───────┐     ┌──────────────┐  │   │
//! │  │                        │  Allocator   │◄────│ OrnumConfig  │  │   │
//! │  │                        │ one write tx │     │ TOML + env   │  │   │
//! │  │                        └──────────────┘     └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  SQLite Database (ornum.db)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`config`] - File and environment configuration
//! - [`repository`] - Series, counter and issued number repositories
//! - [`allocator`] - Transactional number allocation with retry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ornum_db::{Database, OrnumConfig};
//! use ornum_core::GenerationMethod;
//!
//! let config = OrnumConfig::load(None)?;
//! let db = Database::new(config.database.to_db_config()).await?;
//!
//! let allocator = db.allocator(config.allocator.clone());
//! let number = allocator
//!     .allocate_active("cashier-7", today, GenerationMethod::Automatic)
//!     .await?;
//!
//! db.issued_numbers().mark_used(&number.id, "TXN-0001").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocator;
pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use allocator::Allocator;
pub use config::{AllocatorConfig, ConfigError, DatabaseSettings, OrnumConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::counter::CounterRepository;
pub use repository::issued::IssuedNumberRepository;
pub use repository::series::SeriesRepository;
