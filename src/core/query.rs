//! Query requests and their outputs
//!
//! A [`Query`] describes one statement: its text, how its result should be
//! read ([`QueryMode`]), the bound parameters and optional continuations
//! that run once the result is materialized. Executing it yields a
//! [`QueryOutput`] that owns the query and a [`QueryResult`].

use super::binder::{bind_rows, Bind};
use super::connection::{Connection, Transaction};
use super::error::Result;
use super::row::Row;
use super::value::DatabaseValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by asynchronous callbacks
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Continuation run after a query's result has been materialized
///
/// It receives the output, the connection the query ran on and the
/// transaction it was enlisted in, so it can chain further queries on the
/// same connection.
pub type SyncCallback = Arc<
    dyn Fn(&QueryOutput, &mut dyn Connection, Option<&Transaction>) -> Result<()> + Send + Sync,
>;

/// Asynchronous continuation; always awaited before the [`SyncCallback`]
pub type AsyncCallback = Arc<
    dyn for<'a> Fn(
            &'a QueryOutput,
            &'a mut dyn Connection,
            Option<&'a Transaction>,
        ) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync,
>;

/// How the result of a query is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QueryMode {
    /// Result is the number of affected rows
    #[default]
    NonQuery,
    /// Result is the first column of the first row, if any
    Scalar,
    /// Result is every row of the result set
    Reader,
}

impl QueryMode {
    /// Lower-case name used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::NonQuery => "non_query",
            QueryMode::Scalar => "scalar",
            QueryMode::Reader => "reader",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A statement to execute
///
/// Built with [`Query::new`] and the consuming `with_*` setters; it cannot
/// be changed once handed to the executor.
///
/// ```
/// use db_connection_wrapper::{Query, QueryMode};
///
/// let query = Query::new("SELECT Id, Name FROM users WHERE Id = ?")
///     .with_mode(QueryMode::Reader)
///     .bind(1i64);
/// assert_eq!(query.parameters().len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct Query {
    text: String,
    mode: QueryMode,
    parameters: Vec<DatabaseValue>,
    callback: Option<SyncCallback>,
    async_callback: Option<AsyncCallback>,
}

impl Query {
    /// Create a [`QueryMode::NonQuery`] query with no parameters
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Set the execution mode
    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Append one positional parameter
    pub fn bind(mut self, value: impl Into<DatabaseValue>) -> Self {
        self.parameters.push(value.into());
        self
    }

    /// Replace the parameter list
    pub fn with_parameters(mut self, parameters: Vec<DatabaseValue>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Run `callback` after the result is materialized
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&QueryOutput, &mut dyn Connection, Option<&Transaction>) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Await `callback` after the result is materialized
    ///
    /// ```
    /// use db_connection_wrapper::Query;
    ///
    /// let query = Query::new("DELETE FROM sessions").on_complete_async(|output, _conn, _tx| {
    ///     let removed = output.non_query_result();
    ///     Box::pin(async move {
    ///         tracing::info!(removed, "sessions purged");
    ///         Ok(())
    ///     })
    /// });
    /// assert!(query.async_callback().is_some());
    /// ```
    pub fn on_complete_async<F>(mut self, callback: F) -> Self
    where
        F: for<'a> Fn(
                &'a QueryOutput,
                &'a mut dyn Connection,
                Option<&'a Transaction>,
            ) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.async_callback = Some(Arc::new(callback));
        self
    }

    /// Statement text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Execution mode
    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Bound parameters, in order
    pub fn parameters(&self) -> &[DatabaseValue] {
        &self.parameters
    }

    /// Synchronous continuation, if any
    pub fn callback(&self) -> Option<&SyncCallback> {
        self.callback.as_ref()
    }

    /// Asynchronous continuation, if any
    pub fn async_callback(&self) -> Option<&AsyncCallback> {
        self.async_callback.as_ref()
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("text", &self.text)
            .field("mode", &self.mode)
            .field("parameters", &self.parameters)
            .field("callback", &self.callback.is_some())
            .field("async_callback", &self.async_callback.is_some())
            .finish()
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::new(text)
    }
}

/// Result of one execution, shaped by the query's [`QueryMode`]
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Affected row count
    NonQuery(u64),
    /// First column of the first row; `None` when there was no row or it was NULL
    Scalar(Option<DatabaseValue>),
    /// Every row, in cursor order
    Reader(Vec<Row>),
}

impl QueryResult {
    /// The mode this result was produced by
    pub fn mode(&self) -> QueryMode {
        match self {
            QueryResult::NonQuery(_) => QueryMode::NonQuery,
            QueryResult::Scalar(_) => QueryMode::Scalar,
            QueryResult::Reader(_) => QueryMode::Reader,
        }
    }
}

/// A query together with the result it produced
#[derive(Debug, Clone)]
pub struct QueryOutput {
    query: Query,
    result: QueryResult,
}

impl QueryOutput {
    /// Pair a query with its result
    pub fn new(query: Query, result: QueryResult) -> Self {
        Self { query, result }
    }

    /// The executed query
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// The typed result
    pub fn result(&self) -> &QueryResult {
        &self.result
    }

    /// Affected row count; 0 for other modes
    pub fn non_query_result(&self) -> u64 {
        match self.result {
            QueryResult::NonQuery(affected) => affected,
            _ => 0,
        }
    }

    /// Scalar value; `None` for other modes
    pub fn scalar_result(&self) -> Option<&DatabaseValue> {
        match &self.result {
            QueryResult::Scalar(value) => value.as_ref(),
            _ => None,
        }
    }

    /// Materialized rows; empty for other modes
    pub fn reader_result(&self) -> &[Row] {
        match &self.result {
            QueryResult::Reader(rows) => rows,
            _ => &[],
        }
    }

    /// Take ownership of the rows; empty for other modes
    pub fn into_rows(self) -> Vec<Row> {
        match self.result {
            QueryResult::Reader(rows) => rows,
            _ => Vec::new(),
        }
    }

    /// Lazily bind every row onto `T`
    pub fn bind<'a, T: Bind + 'a>(&'a self) -> impl Iterator<Item = T> + 'a {
        bind_rows(self.reader_result())
    }

    /// Split into query and result
    pub fn into_parts(self) -> (Query, QueryResult) {
        (self.query, self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::column::Column;

    #[test]
    fn test_query_defaults() {
        let query = Query::new("DELETE FROM t");
        assert_eq!(query.mode(), QueryMode::NonQuery);
        assert!(query.parameters().is_empty());
        assert!(query.callback().is_none());
        assert!(query.async_callback().is_none());
    }

    #[test]
    fn test_query_builder() {
        let query = Query::new("INSERT INTO t VALUES (?, ?)")
            .bind(1i64)
            .bind("a")
            .on_complete(|_, _, _| Ok(()));
        assert_eq!(
            query.parameters(),
            &[DatabaseValue::Long(1), DatabaseValue::String("a".into())]
        );
        assert!(query.callback().is_some());
        assert!(format!("{query:?}").contains("callback: true"));
    }

    #[test]
    fn test_output_accessors_by_mode() {
        let out = QueryOutput::new(Query::new("UPDATE t"), QueryResult::NonQuery(4));
        assert_eq!(out.non_query_result(), 4);
        assert!(out.reader_result().is_empty());
        assert!(out.scalar_result().is_none());

        let out = QueryOutput::new(
            Query::new("SELECT COUNT(*) FROM t").with_mode(QueryMode::Scalar),
            QueryResult::Scalar(Some(DatabaseValue::Long(9))),
        );
        assert_eq!(out.scalar_result(), Some(&DatabaseValue::Long(9)));
        assert_eq!(out.non_query_result(), 0);

        let rows = vec![Row::new(vec![Column::new("x", 1i64)])];
        let out = QueryOutput::new(
            Query::new("SELECT x FROM t").with_mode(QueryMode::Reader),
            QueryResult::Reader(rows.clone()),
        );
        assert_eq!(out.result().mode(), QueryMode::Reader);
        assert_eq!(out.reader_result(), rows.as_slice());
        assert_eq!(out.into_rows(), rows);
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(QueryMode::Reader.to_string(), "reader");
        assert_eq!(QueryMode::default(), QueryMode::NonQuery);
    }
}
