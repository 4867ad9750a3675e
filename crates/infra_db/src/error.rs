//! Database error types
//!
//! SQLx errors are classified by PostgreSQL error code so callers can tell a
//! duplicate idempotency key from a dropped connection. Adapters convert
//! these into `PortError` at the port boundary.

use core_kernel::PortError;
use thiserror::Error;

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("{entity} with id '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Row changed since it was read
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped to the domain
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Unclassified SQL error
    #[error("SQL error: {0}")]
    SqlError(#[source] sqlx::Error),
}

impl DatabaseError {
    /// Creates a not found error for a specific entity type and identifier
    ///
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::not_found("Invoice", "INV-123");
    /// assert!(error.to_string().contains("Invoice"));
    /// ```
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        DatabaseError::SerializationError(message.into())
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound { .. })
    }
}

/// Maps SQLx errors to specific variants by PostgreSQL error code
///
/// https://www.postgresql.org/docs/current/errcodes-appendix.html
impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => DatabaseError::not_found("Record", "unknown"),
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DatabaseError::ConnectionFailed(error.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseError::SerializationError(error.to_string())
            }
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(message),
                    Some("23503") => DatabaseError::ForeignKeyViolation(message),
                    Some("23514") => DatabaseError::ConstraintViolation(message),
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            _ => DatabaseError::SqlError(error),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(error.to_string())
    }
}

impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound { entity, id } => PortError::not_found(entity, id),
            DatabaseError::DuplicateEntry(message) | DatabaseError::VersionConflict(message) => {
                PortError::conflict(message)
            }
            DatabaseError::ForeignKeyViolation(message)
            | DatabaseError::ConstraintViolation(message) => PortError::validation(message),
            DatabaseError::ConnectionFailed(message) => PortError::connection(message),
            DatabaseError::PoolExhausted => PortError::ServiceUnavailable {
                service: "database pool".to_string(),
            },
            DatabaseError::SerializationError(message) => PortError::transformation(message),
            other => PortError::Internal {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_is_not_found() {
        let err = DatabaseError::from(sqlx::Error::RowNotFound);
        assert!(err.is_not_found());
        assert!(PortError::from(err).is_not_found());
    }

    #[test]
    fn test_duplicate_and_version_conflict_map_to_conflict() {
        let dup = PortError::from(DatabaseError::DuplicateEntry("payments_idempotency_key_unique".into()));
        assert!(matches!(dup, PortError::Conflict { .. }));

        let stale = PortError::from(DatabaseError::VersionConflict("invoice changed".into()));
        assert!(matches!(stale, PortError::Conflict { .. }));
    }

    #[test]
    fn test_pool_exhaustion_is_transient() {
        let err = PortError::from(DatabaseError::from(sqlx::Error::PoolTimedOut));
        assert!(err.is_transient());
    }
}
