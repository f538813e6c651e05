//! Error types for the connection wrapper
//!
//! Every failure surfaced by a driver, a row accessor or a caller-supplied
//! callback is expressed as a [`DatabaseError`].

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Boxed error carried by [`DatabaseError::Callback`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Connection could not be opened or is in the wrong state
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Connection timeout
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },

    /// Query execution error
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Query timeout
    #[error("Query timeout after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    /// A column value did not have the requested type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Column not present in a row
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Transaction error
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Operation the driver does not provide
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Failure raised by a caller-supplied query callback
    #[error("Callback failed: {0}")]
    Callback(#[source] BoxError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// PostgreSQL error
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    PostgresError(#[from] tokio_postgres::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        DatabaseError::ConnectionError(msg.into())
    }

    /// Create a connection timeout error
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        DatabaseError::ConnectionTimeout { timeout_ms }
    }

    /// Create a new query error
    pub fn query<S: Into<String>>(msg: S) -> Self {
        DatabaseError::QueryError(msg.into())
    }

    /// Create a query timeout error
    pub fn query_timeout(timeout_ms: u64) -> Self {
        DatabaseError::QueryTimeout { timeout_ms }
    }

    /// Create a new type mismatch error
    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        DatabaseError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a column not found error
    pub fn column_not_found<S: Into<String>>(name: S) -> Self {
        DatabaseError::ColumnNotFound(name.into())
    }

    /// Create a new transaction error
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        DatabaseError::TransactionError(msg.into())
    }

    /// Create a new unsupported operation error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        DatabaseError::UnsupportedOperation(msg.into())
    }

    /// Wrap an application error raised inside a query callback
    pub fn callback<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        DatabaseError::Callback(err.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = DatabaseError::connection("Failed to connect");
        assert!(matches!(err, DatabaseError::ConnectionError(_)));

        let err = DatabaseError::query("Invalid SQL");
        assert!(matches!(err, DatabaseError::QueryError(_)));

        let err = DatabaseError::type_mismatch("i32", "String");
        assert!(matches!(err, DatabaseError::TypeMismatch { .. }));

        let err = DatabaseError::callback("audit hook refused the row");
        assert!(matches!(err, DatabaseError::Callback(_)));
    }

    #[test]
    fn test_error_display() {
        let err = DatabaseError::connection("Connection refused");
        assert_eq!(err.to_string(), "Connection error: Connection refused");

        let err = DatabaseError::type_mismatch("long", "double");
        assert_eq!(err.to_string(), "Type mismatch: expected long, got double");

        let err = DatabaseError::column_not_found("Email");
        assert_eq!(err.to_string(), "Column not found: Email");
    }

    #[test]
    fn test_callback_error_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = DatabaseError::callback(io);
        assert_eq!(err.source().map(|s| s.to_string()), Some("disk full".into()));
    }
}
