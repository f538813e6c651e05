//! SQLite backend
//!
//! [`SqliteConnection`] implements both the blocking and the async side of
//! [`Connection`]. The async side offloads each call to tokio's blocking
//! pool; the async reader streams rows back through a bounded channel so
//! every row is a suspension point for the caller.
//!
//! [`SqliteConfig::operation_timeout`] bounds async statements only. When
//! it elapses the running statement is interrupted through SQLite and the
//! call still waits for the blocking task, so a reported timeout always
//! means the statement did not complete. Opening, closing and transaction
//! control are never cut short; `busy_timeout` bounds their lock waits.

use crate::core::{
    column::Column,
    connection::{ensure_enlisted, Command, Connection, RowVisitor, Transaction},
    error::{DatabaseError, Result},
    value::DatabaseValue,
    wrapper::ConnectionWrapper,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, ErrorCode, InterruptHandle, OpenFlags, ToSql};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Rows buffered between the blocking cursor and an async reader
const READER_BUFFER: usize = 64;

/// Default time SQLite waits on a locked database before failing
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path, `:memory:`, or a `file:` URI
    pub path: PathBuf,
    /// Create the file if it does not exist
    pub create_if_missing: bool,
    /// Open read-only
    pub read_only: bool,
    /// Enforce foreign key constraints
    pub foreign_keys: bool,
    /// How long SQLite retries when the database is locked
    pub busy_timeout: Duration,
    /// Time after which a running async statement is interrupted; `None`
    /// waits indefinitely
    pub operation_timeout: Option<Duration>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            create_if_missing: true,
            read_only: false,
            foreign_keys: true,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            operation_timeout: None,
        }
    }
}

impl SqliteConfig {
    /// Settings for the database at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Settings for a private in-memory database
    ///
    /// Every connection opened from these settings sees its own empty
    /// database, so this is mostly useful with the `with_open_connection`
    /// methods.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Set whether a missing file is created
    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Open read-only
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set foreign key enforcement
    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the busy timeout
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Interrupt async statements that run longer than `timeout`
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    fn open_flags(&self) -> OpenFlags {
        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.read_only {
            flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
        } else {
            flags |= OpenFlags::SQLITE_OPEN_READ_WRITE;
            if self.create_if_missing {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
        }
        flags
    }
}

/// Connection state shared with blocking tasks
#[derive(Default)]
struct SqliteState {
    connection: Option<rusqlite::Connection>,
    active_transaction: Option<u64>,
}

impl SqliteState {
    fn connection(&self) -> Result<&rusqlite::Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Connection is not open"))
    }

    fn open(&mut self, config: &SqliteConfig) -> Result<InterruptHandle> {
        if self.connection.is_some() {
            return Err(DatabaseError::connection("Connection is already open"));
        }

        let conn = rusqlite::Connection::open_with_flags(&config.path, config.open_flags())?;
        conn.busy_timeout(config.busy_timeout)?;
        if config.foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON")?;
        }

        let interrupt = conn.get_interrupt_handle();
        self.connection = Some(conn);
        self.active_transaction = None;
        debug!(path = %config.path.display(), "sqlite connection opened");
        Ok(interrupt)
    }

    fn close(&mut self) -> Result<()> {
        // SQLite rolls back an unfinished transaction when the handle closes
        self.active_transaction = None;
        if let Some(conn) = self.connection.take() {
            conn.close().map_err(|(_, e)| e)?;
        }
        Ok(())
    }

    fn begin(&mut self, id: u64) -> Result<()> {
        let conn = self.connection()?;
        if self.active_transaction.is_some() {
            return Err(DatabaseError::transaction("Already in a transaction"));
        }

        conn.execute_batch("BEGIN")?;
        self.active_transaction = Some(id);
        Ok(())
    }

    fn finish(&mut self, id: u64, commit: bool) -> Result<()> {
        if self.active_transaction != Some(id) {
            return Err(DatabaseError::transaction(format!(
                "Transaction {id} is not active on this connection"
            )));
        }

        let conn = self.connection()?;
        let result = if commit {
            conn.execute_batch("COMMIT").map_err(|e| {
                // A failed COMMIT can leave SQLite inside the transaction
                if !conn.is_autocommit() {
                    let _ = conn.execute_batch("ROLLBACK");
                }
                e
            })
        } else {
            conn.execute_batch("ROLLBACK")
        };

        self.active_transaction = None;
        result.map_err(DatabaseError::from)
    }

    fn check_enlisted(&self, transaction: Option<u64>) -> Result<()> {
        ensure_enlisted(self.active_transaction, transaction)
    }

    fn non_query(
        &self,
        text: &str,
        parameters: &[DatabaseValue],
        transaction: Option<u64>,
    ) -> Result<u64> {
        let conn = self.connection()?;
        self.check_enlisted(transaction)?;

        let mut stmt = conn.prepare(text)?;
        let before = conn.total_changes();
        if stmt.column_count() == 0 {
            stmt.execute(params_from_iter(parameters.iter()))?;
        } else {
            // SELECT, PRAGMA and RETURNING statements are stepped to completion
            let mut rows = stmt.query(params_from_iter(parameters.iter()))?;
            while rows.next()?.is_some() {}
        }

        // changes() still holds the last INSERT/UPDATE/DELETE count after
        // statements that modify nothing
        if conn.total_changes() == before {
            Ok(0)
        } else {
            Ok(conn.changes())
        }
    }

    fn scalar(
        &self,
        text: &str,
        parameters: &[DatabaseValue],
        transaction: Option<u64>,
    ) -> Result<Option<DatabaseValue>> {
        let conn = self.connection()?;
        self.check_enlisted(transaction)?;

        let mut stmt = conn.prepare(text)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(parameters.iter()))?;

        match rows.next()? {
            Some(row) if column_count > 0 => Ok(Some(value_from_ref(row.get_ref(0)?))),
            _ => Ok(None),
        }
    }

    fn read(
        &self,
        text: &str,
        parameters: &[DatabaseValue],
        transaction: Option<u64>,
        on_row: &mut RowVisitor<'_>,
    ) -> Result<()> {
        let conn = self.connection()?;
        self.check_enlisted(transaction)?;

        let mut stmt = conn.prepare(text)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(parameters.iter()))?;

        while let Some(row) = rows.next()? {
            let mut columns = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                columns.push(Column::new(name.as_str(), value_from_ref(row.get_ref(i)?)));
            }
            on_row(columns)?;
        }

        Ok(())
    }
}

/// Convert a SQLite value to a [`DatabaseValue`]
fn value_from_ref(value: ValueRef<'_>) -> DatabaseValue {
    match value {
        ValueRef::Null => DatabaseValue::Null,
        ValueRef::Integer(v) => DatabaseValue::Long(v),
        ValueRef::Real(v) => DatabaseValue::Double(v),
        ValueRef::Text(v) => DatabaseValue::String(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
    }
}

impl ToSql for DatabaseValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            DatabaseValue::Null => ToSqlOutput::Owned(Value::Null),
            DatabaseValue::Bool(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            DatabaseValue::Int(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            DatabaseValue::Long(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            DatabaseValue::Float(v) => ToSqlOutput::Owned(Value::Real(f64::from(*v))),
            DatabaseValue::Double(v) => ToSqlOutput::Owned(Value::Real(*v)),
            DatabaseValue::String(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            DatabaseValue::Bytes(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
            DatabaseValue::Timestamp(v) => ToSqlOutput::Owned(Value::Integer(*v)),
        })
    }
}

fn join_error(e: tokio::task::JoinError) -> DatabaseError {
    DatabaseError::other(format!("Task join error: {}", e))
}

fn is_interrupted(e: &DatabaseError) -> bool {
    matches!(
        e,
        DatabaseError::SqliteError(err)
            if err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted)
    )
}

/// A SQLite connection handle
///
/// Created closed; [`Connection::open`] opens the database file described by
/// its [`SqliteConfig`].
pub struct SqliteConnection {
    config: Arc<SqliteConfig>,
    state: Arc<Mutex<SqliteState>>,
    // Reachable while a blocking task holds `state`
    interrupt: Mutex<Option<Arc<InterruptHandle>>>,
}

impl SqliteConnection {
    /// Create an unopened connection
    pub fn new(config: impl Into<Arc<SqliteConfig>>) -> Self {
        Self {
            config: config.into(),
            state: Arc::new(Mutex::new(SqliteState::default())),
            interrupt: Mutex::new(None),
        }
    }

    /// Settings this connection opens with
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run `f` against the connection state on the blocking pool
    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteState, &SqliteConfig) -> Result<T> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || {
            let mut state = state.lock();
            f(&mut state, &config)
        })
        .await
        .map_err(join_error)?
    }

    /// Await a statement, interrupting it once `operation_timeout` elapses
    ///
    /// `work` is always driven to completion. The timeout is reported only
    /// when SQLite actually stopped the statement; one that finished before
    /// the interrupt landed keeps its own result.
    async fn bounded<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        let Some(limit) = self.config.operation_timeout else {
            return work.await;
        };

        tokio::pin!(work);
        let first = tokio::time::timeout(limit, work.as_mut()).await;
        if let Ok(result) = first {
            return result;
        }

        let interrupt = self.interrupt.lock().clone();
        if let Some(interrupt) = interrupt {
            interrupt.interrupt();
        }
        match work.await {
            Err(e) if is_interrupted(&e) => {
                let timeout_ms = limit.as_millis() as u64;
                warn!(timeout_ms, "sqlite statement interrupted");
                Err(DatabaseError::query_timeout(timeout_ms))
            }
            other => other,
        }
    }

    fn opened(&self, interrupt: InterruptHandle) {
        *self.interrupt.lock() = Some(Arc::new(interrupt));
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn open(&mut self) -> Result<()> {
        let interrupt = self.state.lock().open(&self.config)?;
        self.opened(interrupt);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        *self.interrupt.lock() = None;
        self.state.lock().close()
    }

    fn is_open(&self) -> bool {
        self.state.lock().connection.is_some()
    }

    fn begin_transaction(&mut self) -> Result<Transaction> {
        let transaction = Transaction::new();
        self.state.lock().begin(transaction.id())?;
        Ok(transaction)
    }

    fn commit(&mut self, transaction: Transaction) -> Result<()> {
        self.state.lock().finish(transaction.id(), true)
    }

    fn rollback(&mut self, transaction: Transaction) -> Result<()> {
        self.state.lock().finish(transaction.id(), false)
    }

    fn execute_non_query(&mut self, command: &Command<'_>) -> Result<u64> {
        self.state.lock().non_query(
            command.text,
            command.parameters,
            command.transaction.map(Transaction::id),
        )
    }

    fn execute_scalar(&mut self, command: &Command<'_>) -> Result<Option<DatabaseValue>> {
        self.state.lock().scalar(
            command.text,
            command.parameters,
            command.transaction.map(Transaction::id),
        )
    }

    fn execute_reader(
        &mut self,
        command: &Command<'_>,
        on_row: &mut RowVisitor<'_>,
    ) -> Result<()> {
        self.state.lock().read(
            command.text,
            command.parameters,
            command.transaction.map(Transaction::id),
            on_row,
        )
    }

    async fn open_async(&mut self) -> Result<()> {
        let interrupt = self.run_blocking(|state, config| state.open(config)).await?;
        self.opened(interrupt);
        Ok(())
    }

    async fn close_async(&mut self) -> Result<()> {
        *self.interrupt.lock() = None;
        self.run_blocking(|state, _| state.close()).await
    }

    async fn begin_transaction_async(&mut self) -> Result<Transaction> {
        let transaction = Transaction::new();
        let id = transaction.id();
        self.run_blocking(move |state, _| state.begin(id)).await?;
        Ok(transaction)
    }

    async fn commit_async(&mut self, transaction: Transaction) -> Result<()> {
        let id = transaction.id();
        self.run_blocking(move |state, _| state.finish(id, true)).await
    }

    async fn rollback_async(&mut self, transaction: Transaction) -> Result<()> {
        let id = transaction.id();
        self.run_blocking(move |state, _| state.finish(id, false)).await
    }

    async fn execute_non_query_async(&mut self, command: &Command<'_>) -> Result<u64> {
        let text = command.text.to_string();
        let parameters = command.parameters.to_vec();
        let transaction = command.transaction.map(Transaction::id);
        self.bounded(self.run_blocking(move |state, _| {
            state.non_query(&text, &parameters, transaction)
        }))
        .await
    }

    async fn execute_scalar_async(
        &mut self,
        command: &Command<'_>,
    ) -> Result<Option<DatabaseValue>> {
        let text = command.text.to_string();
        let parameters = command.parameters.to_vec();
        let transaction = command.transaction.map(Transaction::id);
        self.bounded(self.run_blocking(move |state, _| {
            state.scalar(&text, &parameters, transaction)
        }))
        .await
    }

    async fn execute_reader_async(
        &mut self,
        command: &Command<'_>,
        on_row: &mut RowVisitor<'_>,
    ) -> Result<()> {
        let text = command.text.to_string();
        let parameters = command.parameters.to_vec();
        let transaction = command.transaction.map(Transaction::id);
        let state = Arc::clone(&self.state);
        let (sender, mut receiver) = tokio::sync::mpsc::channel::<Vec<Column>>(READER_BUFFER);

        let task = tokio::task::spawn_blocking(move || {
            let state = state.lock();
            state.read(&text, &parameters, transaction, &mut |columns| {
                sender
                    .blocking_send(columns)
                    .map_err(|_| DatabaseError::other("Reader consumer went away"))
            })
        });

        let streamed = async move {
            let mut consumed = Ok(());
            while let Some(columns) = receiver.recv().await {
                if let Err(e) = on_row(columns) {
                    consumed = Err(e);
                    break;
                }
            }
            // Closing the channel stops the cursor if the consumer failed
            drop(receiver);
            let produced = task.await.map_err(join_error)?;
            consumed.and(produced)
        };

        self.bounded(streamed).await
    }
}

/// [`ConnectionWrapper`] over SQLite databases
///
/// # Example
///
/// ```no_run
/// use db_connection_wrapper::prelude::*;
///
/// # fn main() -> Result<()> {
/// let db = SqliteWrapper::new(SqliteConfig::new("app.db"));
/// db.execute_sql("CREATE TABLE IF NOT EXISTS users (Id INTEGER PRIMARY KEY, Name TEXT)",
///     QueryMode::NonQuery, vec![])?;
/// let inserted = db
///     .execute_query(Query::new("INSERT INTO users (Name) VALUES (?)").bind("Alice"))?
///     .non_query_result();
/// assert_eq!(inserted, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqliteWrapper {
    config: Arc<SqliteConfig>,
}

impl SqliteWrapper {
    /// Create a wrapper opening connections with `config`
    pub fn new(config: SqliteConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Settings used for every connection
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }
}

impl ConnectionWrapper for SqliteWrapper {
    type Connection = SqliteConnection;

    fn get_connection(&self) -> SqliteConnection {
        SqliteConnection::new(Arc::clone(&self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_memory() -> SqliteConnection {
        let mut conn = SqliteConnection::new(SqliteConfig::in_memory());
        conn.open().expect("open in-memory database");
        conn.execute_non_query(&Command::new(
            "CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT, score REAL, data BLOB)",
        ))
        .expect("create table");
        conn
    }

    #[test]
    fn test_sqlite_open_close() {
        let mut conn = SqliteConnection::new(SqliteConfig::in_memory());
        assert!(!conn.is_open());
        conn.open().unwrap();
        assert!(conn.is_open());
        assert!(conn.open().is_err());
        conn.close().unwrap();
        assert!(!conn.is_open());
        conn.close().unwrap();
    }

    #[test]
    fn test_sqlite_requires_open_connection() {
        let mut conn = SqliteConnection::new(SqliteConfig::in_memory());
        let err = conn.execute_non_query(&Command::new("SELECT 1")).unwrap_err();
        assert!(matches!(err, DatabaseError::ConnectionError(_)));
    }

    #[test]
    fn test_sqlite_parameters_and_values() -> Result<()> {
        let mut conn = open_memory();
        let params = [
            DatabaseValue::Long(1),
            DatabaseValue::from("Alice"),
            DatabaseValue::Double(2.5),
            DatabaseValue::Bytes(vec![1, 2]),
        ];
        let affected = conn.execute_non_query(
            &Command::new("INSERT INTO test (id, name, score, data) VALUES (?, ?, ?, ?)")
                .with_parameters(&params),
        )?;
        assert_eq!(affected, 1);

        let mut rows = Vec::new();
        conn.execute_reader(&Command::new("SELECT id, name, score, data FROM test"), &mut |c| {
            rows.push(c);
            Ok(())
        })?;
        assert_eq!(rows.len(), 1);
        let values: Vec<_> = rows[0].iter().map(|c| c.raw_value().clone()).collect();
        assert_eq!(values, params.to_vec());
        Ok(())
    }

    #[test]
    fn test_sqlite_scalar() -> Result<()> {
        let mut conn = open_memory();
        assert_eq!(
            conn.execute_scalar(&Command::new("SELECT COUNT(*) FROM test"))?,
            Some(DatabaseValue::Long(0))
        );
        assert_eq!(conn.execute_scalar(&Command::new("SELECT id FROM test"))?, None);
        Ok(())
    }

    #[test]
    fn test_sqlite_transaction_enlistment() -> Result<()> {
        let mut conn = open_memory();
        let tx = conn.begin_transaction()?;

        let err = conn
            .execute_non_query(&Command::new("INSERT INTO test (name) VALUES ('x')"))
            .unwrap_err();
        assert!(matches!(err, DatabaseError::TransactionError(_)));

        conn.execute_non_query(
            &Command::new("INSERT INTO test (name) VALUES ('x')").with_transaction(Some(&tx)),
        )?;
        conn.rollback(tx)?;

        let count = conn.execute_scalar(&Command::new("SELECT COUNT(*) FROM test"))?;
        assert_eq!(count, Some(DatabaseValue::Long(0)));
        Ok(())
    }

    #[test]
    fn test_sqlite_foreign_transaction_rejected() {
        let mut conn = open_memory();
        let stranger = Transaction::new();
        let err = conn.commit(stranger).unwrap_err();
        assert!(matches!(err, DatabaseError::TransactionError(_)));
    }

    #[tokio::test]
    async fn test_sqlite_async_reader_streams_rows() -> Result<()> {
        let mut conn = SqliteConnection::new(SqliteConfig::in_memory());
        conn.open_async().await?;
        conn.execute_non_query_async(&Command::new(
            "CREATE TABLE nums AS WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 200) SELECT x FROM n",
        ))
        .await?;

        let mut seen = Vec::new();
        conn.execute_reader_async(&Command::new("SELECT x FROM nums ORDER BY x"), &mut |c| {
            seen.push(c[0].get::<i64>().unwrap_or_default());
            Ok(())
        })
        .await?;
        assert_eq!(seen, (1..=200).collect::<Vec<i64>>());

        conn.close_async().await
    }

    #[tokio::test]
    async fn test_sqlite_async_reader_stops_on_visitor_error() -> Result<()> {
        let mut conn = SqliteConnection::new(SqliteConfig::in_memory());
        conn.open_async().await?;
        conn.execute_non_query_async(&Command::new(
            "CREATE TABLE nums AS WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 500) SELECT x FROM n",
        ))
        .await?;

        let mut seen = 0;
        let err = conn
            .execute_reader_async(&Command::new("SELECT x FROM nums"), &mut |_| {
                seen += 1;
                if seen == 3 {
                    Err(DatabaseError::other("stop"))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "stop");
        assert_eq!(seen, 3);

        // The cursor is released: the connection is usable again
        let count = conn
            .execute_scalar_async(&Command::new("SELECT COUNT(*) FROM nums"))
            .await?;
        assert_eq!(count, Some(DatabaseValue::Long(500)));
        Ok(())
    }

    const ENDLESS: &str =
        "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) SELECT x FROM n";

    #[tokio::test]
    async fn test_sqlite_async_statement_timeout_interrupts() -> Result<()> {
        let config = SqliteConfig::in_memory().with_operation_timeout(Duration::from_millis(100));
        let mut conn = SqliteConnection::new(config);
        conn.open_async().await?;

        let count = format!("SELECT COUNT(*) FROM ({ENDLESS})");
        let err = conn
            .execute_scalar_async(&Command::new(&count))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::QueryTimeout { timeout_ms: 100 }));

        // The statement was stopped, so the connection is free again
        let one = conn.execute_scalar_async(&Command::new("SELECT 1")).await?;
        assert_eq!(one, Some(DatabaseValue::Long(1)));
        conn.close_async().await
    }

    #[tokio::test]
    async fn test_sqlite_async_reader_timeout_interrupts() -> Result<()> {
        let config = SqliteConfig::in_memory().with_operation_timeout(Duration::from_millis(100));
        let mut conn = SqliteConnection::new(config);
        conn.open_async().await?;

        let mut seen = 0u64;
        let err = conn
            .execute_reader_async(&Command::new(ENDLESS), &mut |_| {
                seen += 1;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::QueryTimeout { .. }));
        assert!(seen > 0);
        conn.close_async().await
    }

    #[test]
    fn test_sqlite_non_query_counts_only_changes() -> Result<()> {
        let mut conn = open_memory();
        assert_eq!(conn.execute_non_query(&Command::new("SELECT 1"))?, 0);
        assert_eq!(
            conn.execute_non_query(&Command::new(
                "INSERT INTO test (name) VALUES ('a'), ('b') RETURNING id"
            ))?,
            2
        );
        // A plain statement after a RETURNING one still reports its own count
        assert_eq!(conn.execute_non_query(&Command::new("PRAGMA user_version = 7"))?, 0);
        Ok(())
    }
}
