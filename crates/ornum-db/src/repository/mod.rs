//! # Repository Module
//!
//! Database repositories of the allocator.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and Their Tables                        │
//! │                                                                         │
//! │  Administrator / dashboard              Cashiering workflow            │
//! │       │                                       │                         │
//! │       ▼                                       ▼                         │
//! │  SeriesRepository ─────────► series     Allocator (allocator.rs)       │
//! │  CounterRepository ────────► per_user_counters   │ uses the *_in       │
//! │  IssuedNumberRepository ───► issued_numbers      │ helpers inside one  │
//! │                                                  │ write transaction   │
//! │                                                                         │
//! │  Standalone methods run on the pool. Functions ending in `_in` take a  │
//! │  `&mut SqliteConnection` so the allocator can compose them inside its  │
//! │  own transaction.                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`series::SeriesRepository`] - Series registry
//! - [`counter::CounterRepository`] - Per-user counters and offset bands
//! - [`issued::IssuedNumberRepository`] - Issued number lifecycle and scopes

pub mod counter;
pub mod issued;
pub mod series;
