//! # Storage and Allocation Errors
//!
//! [`DbError`] is the one error type leaving this crate. Callers care about
//! three classes:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  class        variants                        caller reaction          │
//! │  ───────────  ──────────────────────────────  ──────────────────────── │
//! │  rule         Domain(CoreError)               show it, fix the input / │
//! │                                               series / band            │
//! │  transient    Busy, PoolExhausted, Conflict   already retried inside   │
//! │               → RetriesExhausted              the allocator; alert     │
//! │  storage      UniqueViolation, ForeignKey,    bug or broken database   │
//! │               Query, Connection, Migration                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ornum_core::{CoreError, TemplateError, ValidationError};
use thiserror::Error;

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and their extended codes.
const SQLITE_LOCK_CODES: &[&str] = &["5", "6", "261", "262", "517", "773"];

#[derive(Debug, Error)]
pub enum DbError {
    /// Numbering rule violation, passed through unchanged.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// The write lock stayed taken for longer than the busy timeout.
    #[error("Database busy: {0}")]
    Busy(String),

    /// No pooled connection became free within the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A compare-and-swap matched no row: someone else wrote first.
    #[error("Concurrent update conflict on {entity} {id}")]
    Conflict { entity: String, id: String },

    /// A transient failure outlived every retry.
    #[error("Gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<DbError>,
    },

    /// `columns` lists the `table.column` pairs SQLite reported.
    #[error("Unique constraint failed on {columns}")]
    UniqueViolation { columns: String },

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Stored data that cannot be decoded, such as corrupt metadata JSON.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn conflict(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::Conflict {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True if rerunning the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::Busy(_) | DbError::PoolExhausted | DbError::Conflict { .. }
        )
    }

    /// The numbering rule behind this error, looking through retries.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            DbError::Domain(err) => Some(err),
            DbError::RetriesExhausted { source, .. } => source.as_domain(),
            _ => None,
        }
    }
}

/// Sorts a SQLite failure into lock contention or constraint breakage.
fn classify(code: Option<&str>, message: &str) -> DbError {
    let locked = code.map_or(false, |code| SQLITE_LOCK_CODES.contains(&code));

    if locked || message.contains("is locked") {
        return DbError::Busy(message.to_string());
    }

    if let Some(columns) = message.strip_prefix("UNIQUE constraint failed: ") {
        return DbError::UniqueViolation {
            columns: columns.to_string(),
        };
    }

    if message.contains("FOREIGN KEY constraint failed") {
        return DbError::ForeignKeyViolation(message.to_string());
    }

    DbError::QueryFailed(message.to_string())
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                classify(db_err.code().as_deref(), db_err.message())
            }
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool closed".to_string()),
            other => DbError::QueryFailed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

impl From<TemplateError> for DbError {
    fn from(err: TemplateError) -> Self {
        DbError::Domain(CoreError::Template(err))
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Internal(format!("metadata is not valid JSON: {}", err))
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sqlite_messages() {
        assert!(matches!(
            classify(Some("5"), "database is locked"),
            DbError::Busy(_)
        ));
        assert!(matches!(
            classify(Some("517"), "anything"),
            DbError::Busy(_)
        ));
        assert!(matches!(
            classify(None, "database table is locked: series"),
            DbError::Busy(_)
        ));

        match classify(
            Some("2067"),
            "UNIQUE constraint failed: issued_numbers.series_id, issued_numbers.actual_number",
        ) {
            DbError::UniqueViolation { columns } => {
                assert_eq!(columns, "issued_numbers.series_id, issued_numbers.actual_number")
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            classify(Some("787"), "FOREIGN KEY constraint failed"),
            DbError::ForeignKeyViolation(_)
        ));
        assert!(matches!(
            classify(Some("1"), "no such table: series"),
            DbError::QueryFailed(_)
        ));
    }

    #[test]
    fn test_transient_errors() {
        assert!(DbError::Busy("database is locked".into()).is_transient());
        assert!(DbError::PoolExhausted.is_transient());
        assert!(DbError::conflict("PerUserCounter", "c-1").is_transient());

        assert!(!DbError::QueryFailed("syntax error".into()).is_transient());
        assert!(!DbError::Domain(CoreError::SeriesNotFound("s-1".into())).is_transient());

        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_retries_exhausted_keeps_source() {
        let err = DbError::RetriesExhausted {
            attempts: 4,
            source: Box::new(DbError::Busy("database is locked".into())),
        };
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "Gave up after 4 attempts: Database busy: database is locked"
        );
    }

    #[test]
    fn test_domain_errors_pass_through() {
        let err: DbError = CoreError::SeriesExhausted {
            series_id: "s-1".into(),
            end_number: 5,
        }
        .into();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::SeriesExhausted { end_number: 5, .. })
        ));

        let err: DbError = ValidationError::Required {
            field: "void_reason".into(),
        }
        .into();
        assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))));
    }
}
