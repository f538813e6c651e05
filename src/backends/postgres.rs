//! PostgreSQL backend
//!
//! [`PostgresConnection`] is natively async: it overrides every `_async`
//! method of [`Connection`] with tokio-postgres calls. The blocking methods
//! drive those same calls to completion, on the ambient multi-thread
//! runtime when there is one and otherwise on a small runtime owned by the
//! connection. A blocking call on a current-thread runtime fails with
//! [`DatabaseError::UnsupportedOperation`].

use crate::core::{
    blocking,
    column::Column,
    connection::{ensure_enlisted, Command, Connection, RowVisitor, Transaction},
    error::{DatabaseError, Result},
    value::DatabaseValue,
    wrapper::ConnectionWrapper,
};
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures_util::{pin_mut, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, warn};

/// Default time allowed to establish a connection
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL connection settings
///
/// When `connection_string` is set it is used as-is and the individual
/// fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Server runtime options (`-c name=value ...`)
    pub options: Option<String>,
    pub connect_timeout: Duration,
    /// Raw libpq-style or URL connection string
    pub connection_string: Option<String>,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: None,
            user: None,
            password: None,
            options: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connection_string: None,
        }
    }
}

impl PostgresConfig {
    /// Settings for a server at `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Settings taken verbatim from a connection string
    pub fn from_connection_string(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: Some(connection_string.into()),
            ..Default::default()
        }
    }

    pub fn with_dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Driver configuration for these settings
    pub fn to_driver_config(&self) -> Result<tokio_postgres::Config> {
        if let Some(connection_string) = &self.connection_string {
            return Ok(connection_string.parse()?);
        }

        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .connect_timeout(self.connect_timeout);
        if let Some(dbname) = &self.dbname {
            config.dbname(dbname);
        }
        if let Some(user) = &self.user {
            config.user(user);
        }
        if let Some(password) = &self.password {
            config.password(password);
        }
        if let Some(options) = &self.options {
            config.options(options);
        }
        Ok(config)
    }
}

/// Positional parameter; `Null` binds to any column type
#[derive(Debug)]
struct Param<'a>(&'a DatabaseValue);

impl ToSql for Param<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self.0 {
            DatabaseValue::Null => Ok(IsNull::Yes),
            DatabaseValue::Bool(v) => v.to_sql_checked(ty, out),
            DatabaseValue::Int(v) => v.to_sql_checked(ty, out),
            DatabaseValue::Long(v) => v.to_sql_checked(ty, out),
            DatabaseValue::Float(v) => v.to_sql_checked(ty, out),
            DatabaseValue::Double(v) => v.to_sql_checked(ty, out),
            DatabaseValue::String(v) => v.to_sql_checked(ty, out),
            DatabaseValue::Bytes(v) => v.to_sql_checked(ty, out),
            DatabaseValue::Timestamp(v) => {
                let ts = DateTime::<Utc>::from_timestamp_micros(*v)
                    .ok_or("timestamp out of range")?;
                if *ty == Type::TIMESTAMP {
                    ts.naive_utc().to_sql_checked(ty, out)
                } else {
                    ts.to_sql_checked(ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn bind_params(values: &[DatabaseValue]) -> Vec<Param<'_>> {
    values.iter().map(Param).collect()
}

fn param_refs<'a>(
    params: &'a [Param<'a>],
) -> impl ExactSizeIterator<Item = &'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync))
}

/// Convert one column of a result row to a [`DatabaseValue`]
fn value_from_row(row: &Row, idx: usize) -> Result<DatabaseValue> {
    let column = &row.columns()[idx];
    let value = match column.type_().name() {
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(DatabaseValue::Bool),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| DatabaseValue::Int(i32::from(v))),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(DatabaseValue::Int),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(DatabaseValue::Long),
        "float4" => row.try_get::<_, Option<f32>>(idx)?.map(DatabaseValue::Float),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(DatabaseValue::Double),
        "text" | "varchar" | "bpchar" | "name" => {
            row.try_get::<_, Option<String>>(idx)?.map(DatabaseValue::String)
        }
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(DatabaseValue::Bytes),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| DatabaseValue::Timestamp(v.timestamp_micros())),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|v| DatabaseValue::Timestamp(v.and_utc().timestamp_micros())),
        other => {
            return Err(DatabaseError::unsupported(format!(
                "Column `{}` has unsupported type {}",
                column.name(),
                other
            )))
        }
    };
    Ok(value.unwrap_or(DatabaseValue::Null))
}

fn columns_from_row(row: &Row) -> Result<Vec<Column>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| Ok(Column::new(column.name(), value_from_row(row, idx)?)))
        .collect()
}

/// A PostgreSQL connection handle
pub struct PostgresConnection {
    config: Arc<PostgresConfig>,
    client: Option<Client>,
    active_transaction: Option<u64>,
    // Drives blocking calls made outside any runtime, and the driver's
    // connection task when it was opened that way
    runtime: Option<Arc<Runtime>>,
}

impl PostgresConnection {
    /// Create an unopened connection
    pub fn new(config: impl Into<Arc<PostgresConfig>>) -> Self {
        Self {
            config: config.into(),
            client: None,
            active_transaction: None,
            runtime: None,
        }
    }

    /// Settings this connection opens with
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    /// Runtime for a blocking call; `None` when one is already running
    fn fallback_runtime(&mut self) -> Result<Option<Arc<Runtime>>> {
        if Handle::try_current().is_ok() {
            return Ok(None);
        }
        if self.runtime.is_none() {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("postgres-connection")
                .enable_all()
                .build()?;
            self.runtime = Some(Arc::new(runtime));
        }
        Ok(self.runtime.clone())
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Connection is not open"))
    }

    /// Client for a command, after checking its enlistment
    fn client_for(&self, command: &Command<'_>) -> Result<&Client> {
        let client = self.client()?;
        ensure_enlisted(
            self.active_transaction,
            command.transaction.map(Transaction::id),
        )?;
        Ok(client)
    }

    async fn finish(&mut self, transaction: Transaction, statement: &str) -> Result<()> {
        if self.active_transaction != Some(transaction.id()) {
            return Err(DatabaseError::transaction(format!(
                "Transaction {} is not active on this connection",
                transaction.id()
            )));
        }

        let result = self.client()?.batch_execute(statement).await;
        // A failed COMMIT ends the server-side transaction as well
        self.active_transaction = None;
        result?;
        debug!(transaction = transaction.id(), statement, "postgres transaction finished");
        Ok(())
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn open(&mut self) -> Result<()> {
        let runtime = self.fallback_runtime()?;
        blocking::block_on(self.open_async(), runtime.as_deref())?
    }

    fn close(&mut self) -> Result<()> {
        self.active_transaction = None;
        self.client = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    fn begin_transaction(&mut self) -> Result<Transaction> {
        let runtime = self.fallback_runtime()?;
        blocking::block_on(self.begin_transaction_async(), runtime.as_deref())?
    }

    fn commit(&mut self, transaction: Transaction) -> Result<()> {
        let runtime = self.fallback_runtime()?;
        blocking::block_on(self.commit_async(transaction), runtime.as_deref())?
    }

    fn rollback(&mut self, transaction: Transaction) -> Result<()> {
        let runtime = self.fallback_runtime()?;
        blocking::block_on(self.rollback_async(transaction), runtime.as_deref())?
    }

    fn execute_non_query(&mut self, command: &Command<'_>) -> Result<u64> {
        let runtime = self.fallback_runtime()?;
        blocking::block_on(self.execute_non_query_async(command), runtime.as_deref())?
    }

    fn execute_scalar(&mut self, command: &Command<'_>) -> Result<Option<DatabaseValue>> {
        let runtime = self.fallback_runtime()?;
        blocking::block_on(self.execute_scalar_async(command), runtime.as_deref())?
    }

    fn execute_reader(
        &mut self,
        command: &Command<'_>,
        on_row: &mut RowVisitor<'_>,
    ) -> Result<()> {
        let runtime = self.fallback_runtime()?;
        blocking::block_on(self.execute_reader_async(command, on_row), runtime.as_deref())?
    }

    async fn open_async(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Err(DatabaseError::connection("Connection is already open"));
        }

        let config = self.config.to_driver_config()?;
        let (client, connection) = tokio::time::timeout(
            self.config.connect_timeout,
            config.connect(NoTls),
        )
        .await
        .map_err(|_| {
            DatabaseError::connection_timeout(self.config.connect_timeout.as_millis() as u64)
        })??;

        // Spawn the connection handler in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection task failed");
            }
        });

        self.client = Some(client);
        self.active_transaction = None;
        debug!(host = %self.config.host, "postgres connection opened");
        Ok(())
    }

    async fn begin_transaction_async(&mut self) -> Result<Transaction> {
        if self.active_transaction.is_some() {
            return Err(DatabaseError::transaction("Already in a transaction"));
        }

        self.client()?.batch_execute("BEGIN").await?;
        let transaction = Transaction::new();
        self.active_transaction = Some(transaction.id());
        Ok(transaction)
    }

    async fn commit_async(&mut self, transaction: Transaction) -> Result<()> {
        self.finish(transaction, "COMMIT").await
    }

    async fn rollback_async(&mut self, transaction: Transaction) -> Result<()> {
        self.finish(transaction, "ROLLBACK").await
    }

    async fn execute_non_query_async(&mut self, command: &Command<'_>) -> Result<u64> {
        let client = self.client_for(command)?;
        let params = bind_params(command.parameters);
        Ok(client.execute_raw(command.text, param_refs(&params)).await?)
    }

    async fn execute_scalar_async(
        &mut self,
        command: &Command<'_>,
    ) -> Result<Option<DatabaseValue>> {
        let client = self.client_for(command)?;
        let params = bind_params(command.parameters);
        let stream = client.query_raw(command.text, param_refs(&params)).await?;
        pin_mut!(stream);

        match stream.try_next().await? {
            Some(row) if !row.is_empty() => Ok(Some(value_from_row(&row, 0)?)),
            _ => Ok(None),
        }
    }

    async fn execute_reader_async(
        &mut self,
        command: &Command<'_>,
        on_row: &mut RowVisitor<'_>,
    ) -> Result<()> {
        let client = self.client_for(command)?;
        let params = bind_params(command.parameters);
        let stream = client.query_raw(command.text, param_refs(&params)).await?;
        pin_mut!(stream);

        while let Some(row) = stream.try_next().await? {
            on_row(columns_from_row(&row)?)?;
        }
        Ok(())
    }
}

/// [`ConnectionWrapper`] over a PostgreSQL server
///
/// Prefer the `_async` methods inside async code. The blocking ones work
/// outside any runtime and on multi-thread runtimes.
#[derive(Debug, Clone)]
pub struct PostgresWrapper {
    config: Arc<PostgresConfig>,
}

impl PostgresWrapper {
    pub fn new(config: PostgresConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which panics inside async code
        if let Some(runtime) = self.runtime.take().and_then(|rt| Arc::try_unwrap(rt).ok()) {
            runtime.shutdown_background();
        }
    }
}

impl ConnectionWrapper for PostgresWrapper {
    type Connection = PostgresConnection;

    fn get_connection(&self) -> PostgresConnection {
        PostgresConnection::new(Arc::clone(&self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::{Query, QueryMode};

    fn get_postgres_url() -> Option<String> {
        std::env::var("POSTGRES_URL").ok()
    }

    #[test]
    fn test_config_builds_driver_config() {
        let config = PostgresConfig::new("db.internal", 6543)
            .with_dbname("app")
            .with_user("svc")
            .with_password("secret")
            .to_driver_config()
            .unwrap();
        assert_eq!(config.get_ports(), &[6543]);
        assert_eq!(config.get_dbname(), Some("app"));
        assert_eq!(config.get_user(), Some("svc"));
    }

    #[test]
    fn test_config_from_connection_string() {
        let config = PostgresConfig::from_connection_string("host=localhost user=postgres dbname=t")
            .to_driver_config()
            .unwrap();
        assert_eq!(config.get_dbname(), Some("t"));
    }

    /// Nothing listens on port 1, so connecting fails fast
    fn unreachable() -> PostgresWrapper {
        PostgresWrapper::new(
            PostgresConfig::new("127.0.0.1", 1).with_connect_timeout(Duration::from_secs(2)),
        )
    }

    fn is_connection_failure(err: &DatabaseError) -> bool {
        matches!(
            err,
            DatabaseError::PostgresError(_) | DatabaseError::ConnectionTimeout { .. }
        )
    }

    #[test]
    fn test_blocking_test_connection_reports_connection_error() {
        let err = unreachable()
            .test_connection()
            .expect("connecting to port 1 should fail");
        assert!(is_connection_failure(&err), "unexpected error: {err:?}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocking_test_connection_on_multi_thread_runtime() {
        let err = unreachable()
            .test_connection()
            .expect("connecting to port 1 should fail");
        assert!(is_connection_failure(&err), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_blocking_open_on_current_thread_runtime_is_unsupported() {
        let mut conn = unreachable().get_connection();
        assert!(matches!(conn.open(), Err(DatabaseError::UnsupportedOperation(_))));
        assert!(!conn.is_open());
        assert!(conn.close().is_ok());
    }

    #[test]
    #[ignore] // Run with: cargo test --features postgres -- --ignored
    fn test_postgres_blocking_round_trip() -> Result<()> {
        let url = match get_postgres_url() {
            Some(url) => url,
            None => {
                eprintln!("Skipping test: POSTGRES_URL not set");
                return Ok(());
            }
        };

        let db = PostgresWrapper::new(PostgresConfig::from_connection_string(url));
        assert!(db.test_connection().is_none());

        let outputs = db.execute_transaction(vec![
            Query::new("CREATE TEMP TABLE wrapper_blocking (id INT PRIMARY KEY)"),
            Query::new("INSERT INTO wrapper_blocking (id) VALUES ($1), ($2)")
                .bind(1i32)
                .bind(2i32),
            Query::new("SELECT id FROM wrapper_blocking ORDER BY id").with_mode(QueryMode::Reader),
        ])?;
        assert_eq!(outputs[1].non_query_result(), 2);
        assert_eq!(outputs[2].reader_result().len(), 2);
        Ok(())
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test --features postgres -- --ignored
    async fn test_postgres_wrapper_round_trip() -> Result<()> {
        let url = match get_postgres_url() {
            Some(url) => url,
            None => {
                eprintln!("Skipping test: POSTGRES_URL not set");
                return Ok(());
            }
        };

        let db = PostgresWrapper::new(PostgresConfig::from_connection_string(url));
        assert!(db.test_connection_async().await.is_none());

        db.execute_sql_async("DROP TABLE IF EXISTS wrapper_users", QueryMode::NonQuery, vec![])
            .await?;
        db.execute_sql_async(
            "CREATE TABLE wrapper_users (id SERIAL PRIMARY KEY, name TEXT NOT NULL)",
            QueryMode::NonQuery,
            vec![],
        )
        .await?;

        let outputs = db
            .execute_transaction_async(vec![
                Query::new("INSERT INTO wrapper_users (name) VALUES ($1)").bind("Alice"),
                Query::new("INSERT INTO wrapper_users (name) VALUES ($1)").bind("Bob"),
            ])
            .await?;
        assert_eq!(outputs.len(), 2);

        let out = db
            .execute_query_async(
                Query::new("SELECT id, name FROM wrapper_users ORDER BY id")
                    .with_mode(QueryMode::Reader),
            )
            .await?;
        let rows = out.reader_result();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value::<i32>("id"), Some(1));
        assert_eq!(rows[1].value::<String>("name").as_deref(), Some("Bob"));

        db.execute_sql_async("DROP TABLE wrapper_users", QueryMode::NonQuery, vec![])
            .await?;
        Ok(())
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test --features postgres -- --ignored
    async fn test_postgres_transaction_rolls_back() -> Result<()> {
        let url = match get_postgres_url() {
            Some(url) => url,
            None => {
                eprintln!("Skipping test: POSTGRES_URL not set");
                return Ok(());
            }
        };

        let db = PostgresWrapper::new(PostgresConfig::from_connection_string(url));
        db.execute_sql_async("DROP TABLE IF EXISTS wrapper_tx", QueryMode::NonQuery, vec![])
            .await?;
        db.execute_sql_async(
            "CREATE TABLE wrapper_tx (id INT PRIMARY KEY)",
            QueryMode::NonQuery,
            vec![],
        )
        .await?;

        let result = db
            .execute_transaction_async(vec![
                Query::new("INSERT INTO wrapper_tx (id) VALUES (1)"),
                Query::new("INSERT INTO wrapper_tx (id) VALUES (1)"),
            ])
            .await;
        assert!(result.is_err());

        let count = db
            .execute_sql_async("SELECT COUNT(*) FROM wrapper_tx", QueryMode::Scalar, vec![])
            .await?;
        assert_eq!(count.scalar_result(), Some(&DatabaseValue::Long(0)));

        db.execute_sql_async("DROP TABLE wrapper_tx", QueryMode::NonQuery, vec![])
            .await?;
        Ok(())
    }
}
