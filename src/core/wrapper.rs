//! The connection wrapper trait
//!
//! A backend implements [`ConnectionWrapper::get_connection`]; every other
//! operation is a provided method that a backend may override.

use super::connection::{Connection, Transaction};
use super::error::{DatabaseError, Result};
use super::executor;
use super::guard::ConnectionGuard;
use super::query::{Query, QueryMode, QueryOutput};
use super::value::DatabaseValue;
use async_trait::async_trait;
use tracing::warn;

/// Query and transaction execution over connections from one backend
///
/// Methods without `with_open_connection` in their name acquire a fresh
/// connection, open it, and close it on every exit path. Methods with it
/// run against a connection the caller already opened and never open,
/// close, commit or roll back anything they were handed.
///
/// # Example
///
/// ```no_run
/// use db_connection_wrapper::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let db = SqliteWrapper::new(SqliteConfig::new("app.db"));
///
///     if let Some(err) = db.test_connection_async().await {
///         eprintln!("database unavailable: {err}");
///         return Err(err);
///     }
///
///     let out = db
///         .execute_query_async(Query::new("SELECT Id, Name FROM users").with_mode(QueryMode::Reader))
///         .await?;
///     for row in out.reader_result() {
///         println!("{:?}", row.value::<String>("Name"));
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ConnectionWrapper: Send + Sync {
    /// Connection type produced by this backend
    type Connection: Connection + 'static;

    /// Create a new, unopened connection
    fn get_connection(&self) -> Self::Connection;

    /// Open and release a connection; returns the failure instead of raising it
    ///
    /// Intended as a health check before issuing queries. No statement is
    /// executed. Only a failure to open is reported; a failure to close
    /// afterwards is logged.
    fn test_connection(&self) -> Option<DatabaseError> {
        ConnectionGuard::open(self.get_connection()).err()
    }

    /// Async counterpart of [`test_connection`](Self::test_connection)
    async fn test_connection_async(&self) -> Option<DatabaseError> {
        match ConnectionGuard::open_async(self.get_connection()).await {
            Ok(guard) => {
                if let Err(e) = guard.close_async().await {
                    warn!(error = %e, "failed to close connection");
                }
                None
            }
            Err(e) => Some(e),
        }
    }

    /// Execute one query on a fresh connection
    fn execute_query(&self, query: Query) -> Result<QueryOutput> {
        let mut guard = ConnectionGuard::open(self.get_connection())?;
        self.execute_query_with_open_connection(guard.connection(), None, query)
    }

    /// Execute `text` with `mode` and positional `parameters` on a fresh connection
    fn execute_sql(
        &self,
        text: &str,
        mode: QueryMode,
        parameters: Vec<DatabaseValue>,
    ) -> Result<QueryOutput> {
        self.execute_query(Query::new(text).with_mode(mode).with_parameters(parameters))
    }

    /// Execute one query on an open connection, optionally inside `transaction`
    ///
    /// The connection must already be open; otherwise the driver's error is
    /// returned. Callbacks run after the result is materialized, the async
    /// one first.
    fn execute_query_with_open_connection(
        &self,
        connection: &mut dyn Connection,
        transaction: Option<&Transaction>,
        query: Query,
    ) -> Result<QueryOutput> {
        executor::execute(connection, transaction, query)
    }

    /// Execute `queries` in one transaction on a fresh connection
    ///
    /// An empty list returns an empty result without touching the backend.
    fn execute_transaction(&self, queries: Vec<Query>) -> Result<Vec<QueryOutput>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = ConnectionGuard::open(self.get_connection())?;
        self.execute_transaction_with_open_connection(guard.connection(), queries)
    }

    /// Execute `queries` in one transaction on an open connection
    ///
    /// Commits when every query (and its callbacks) succeed. Otherwise rolls
    /// back and returns the first error unchanged.
    fn execute_transaction_with_open_connection(
        &self,
        connection: &mut dyn Connection,
        queries: Vec<Query>,
    ) -> Result<Vec<QueryOutput>> {
        executor::run_transaction(connection, queries)
    }

    /// Async counterpart of [`execute_query`](Self::execute_query)
    async fn execute_query_async(&self, query: Query) -> Result<QueryOutput> {
        let mut guard = ConnectionGuard::open_async(self.get_connection()).await?;
        let result = self
            .execute_query_with_open_connection_async(guard.connection(), None, query)
            .await;
        if let Err(e) = guard.close_async().await {
            warn!(error = %e, "failed to close connection");
        }
        result
    }

    /// Async counterpart of [`execute_sql`](Self::execute_sql)
    async fn execute_sql_async(
        &self,
        text: &str,
        mode: QueryMode,
        parameters: Vec<DatabaseValue>,
    ) -> Result<QueryOutput> {
        self.execute_query_async(Query::new(text).with_mode(mode).with_parameters(parameters))
            .await
    }

    /// Async counterpart of
    /// [`execute_query_with_open_connection`](Self::execute_query_with_open_connection)
    async fn execute_query_with_open_connection_async(
        &self,
        connection: &mut dyn Connection,
        transaction: Option<&Transaction>,
        query: Query,
    ) -> Result<QueryOutput> {
        executor::execute_async(connection, transaction, query).await
    }

    /// Async counterpart of [`execute_transaction`](Self::execute_transaction)
    async fn execute_transaction_async(&self, queries: Vec<Query>) -> Result<Vec<QueryOutput>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = ConnectionGuard::open_async(self.get_connection()).await?;
        let result = self
            .execute_transaction_with_open_connection_async(guard.connection(), queries)
            .await;
        if let Err(e) = guard.close_async().await {
            warn!(error = %e, "failed to close connection");
        }
        result
    }

    /// Async counterpart of
    /// [`execute_transaction_with_open_connection`](Self::execute_transaction_with_open_connection)
    async fn execute_transaction_with_open_connection_async(
        &self,
        connection: &mut dyn Connection,
        queries: Vec<Query>,
    ) -> Result<Vec<QueryOutput>> {
        executor::run_transaction_async(connection, queries).await
    }
}
