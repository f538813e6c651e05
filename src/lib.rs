//! # DB Connection Wrapper
//!
//! A driver-agnostic layer for running queries and transactions over
//! relational database connections. A backend supplies connections; the
//! wrapper opens and closes them, runs queries in one of three modes,
//! materializes results into rows of named columns, brackets multi-query
//! transactions, and hands each result to optional continuations.
//!
//! ## Features
//!
//! - **Three execution modes**: affected-row count, single scalar, or full
//!   row set
//! - **Owned or borrowed connections**: every operation has a variant that
//!   runs on a connection the caller already opened
//! - **Transactions**: commit on success, roll back and return the first
//!   error otherwise
//! - **Continuations**: sync and async callbacks that can chain queries on
//!   the same connection and transaction
//! - **Binding**: map rows onto structs with [`impl_bind!`]
//! - **Sync and async**: every operation in both forms, on Tokio
//!
//! ## Supported Databases
//!
//! | Database | Feature | Blocking | Async |
//! |----------|---------|----------|-------|
//! | SQLite | `sqlite` (default) | yes | yes |
//! | PostgreSQL | `postgres` | yes (not on current-thread runtimes) | yes |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use db_connection_wrapper::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl_bind!(User { id as "Id", name as "Name" });
//!
//! fn main() -> Result<()> {
//!     let db = SqliteWrapper::new(SqliteConfig::new("app.db"));
//!
//!     if let Some(err) = db.test_connection() {
//!         return Err(err);
//!     }
//!
//!     db.execute_transaction(vec![
//!         Query::new("CREATE TABLE IF NOT EXISTS Users (Id INTEGER PRIMARY KEY, Name TEXT)"),
//!         Query::new("INSERT INTO Users (Name) VALUES (?)").bind("Alice"),
//!     ])?;
//!
//!     let out = db.execute_query(
//!         Query::new("SELECT Id, Name FROM Users").with_mode(QueryMode::Reader),
//!     )?;
//!     for user in out.bind::<User>() {
//!         println!("{} {}", user.id, user.name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Chaining on the same connection
//!
//! ```rust,no_run
//! use db_connection_wrapper::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let db = SqliteWrapper::new(SqliteConfig::new("app.db"));
//!
//!     let audit = Query::new("INSERT INTO Users (Name) VALUES ('Bob')").on_complete(
//!         |out, conn, tx| {
//!             let text = format!("INSERT INTO Audit (Inserted) VALUES ({})", out.non_query_result());
//!             executor::execute(conn, tx, Query::new(text))?;
//!             Ok(())
//!         },
//!     );
//!
//!     // Both inserts commit together or not at all
//!     db.execute_transaction(vec![audit])?;
//!     Ok(())
//! }
//! ```

/// Core wrapper types and traits
pub mod core;

/// Database backend implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use db_connection_wrapper::prelude::*;
///
/// let query = Query::new("SELECT 1").with_mode(QueryMode::Scalar);
/// assert_eq!(query.mode(), QueryMode::Scalar);
/// ```
pub mod prelude {
    pub use crate::core::{
        bind_row, bind_rows, executor, Bind, Column, Command, Connection, ConnectionWrapper,
        DatabaseError, DatabaseValue, FromValue, Query, QueryMode, QueryOutput, QueryResult,
        Result, Row, Transaction,
    };
    pub use crate::impl_bind;

    #[cfg(feature = "sqlite")]
    pub use crate::backends::{SqliteConfig, SqliteConnection, SqliteWrapper};

    #[cfg(feature = "postgres")]
    pub use crate::backends::{PostgresConfig, PostgresConnection, PostgresWrapper};
}

// Re-export at root level for convenience
pub use core::{
    Bind, Column, Connection, ConnectionWrapper, DatabaseError, DatabaseValue, Query, QueryMode,
    QueryOutput, QueryResult, Result, Row, Transaction,
};

#[cfg(feature = "sqlite")]
pub use backends::{SqliteConfig, SqliteWrapper};

#[cfg(feature = "postgres")]
pub use backends::{PostgresConfig, PostgresWrapper};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use prelude::*;

        let query = Query::new("SELECT ?").bind(42i64);
        assert_eq!(query.mode(), QueryMode::NonQuery);
        assert_eq!(query.parameters(), &[DatabaseValue::Long(42)]);
    }

    #[test]
    fn test_value_conversions() {
        use prelude::*;

        let val: DatabaseValue = 42.into();
        assert_eq!(val.get::<i32>(), Some(42));

        let val: DatabaseValue = "test".into();
        assert_eq!(val.as_str(), Some("test"));

        let val: DatabaseValue = true.into();
        assert_eq!(val.get::<bool>(), Some(true));
    }
}
