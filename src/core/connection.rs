//! Driver boundary
//!
//! This module defines the trait every database backend implements. It is
//! the only point where the wrapper talks to a driver: opening and closing
//! the connection, bracketing transactions, and running a [`Command`] in one
//! of the three execution modes.

use super::column::Column;
use super::error::{DatabaseError, Result};
use super::value::DatabaseValue;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle for a transaction opened on a [`Connection`]
///
/// The handle is move-only: [`Connection::commit`] and
/// [`Connection::rollback`] consume it, so code that only borrows a
/// transaction can enlist commands in it but can never end it.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "a transaction must be committed or rolled back"]
pub struct Transaction {
    id: u64,
}

impl Transaction {
    /// Allocate a handle with a process-unique id
    ///
    /// Called by drivers from `begin_transaction`.
    pub fn new() -> Self {
        Self {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Unique id of this transaction
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

/// A statement ready to be handed to the driver
#[derive(Debug, Clone, Copy)]
pub struct Command<'a> {
    /// Statement text
    pub text: &'a str,
    /// Positional parameters
    pub parameters: &'a [DatabaseValue],
    /// Transaction the command is enlisted in
    pub transaction: Option<&'a Transaction>,
}

impl<'a> Command<'a> {
    /// Create a command with no parameters outside any transaction
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            parameters: &[],
            transaction: None,
        }
    }

    /// Bind positional parameters
    pub fn with_parameters(mut self, parameters: &'a [DatabaseValue]) -> Self {
        self.parameters = parameters;
        self
    }

    /// Enlist the command in `transaction`
    pub fn with_transaction(mut self, transaction: Option<&'a Transaction>) -> Self {
        self.transaction = transaction;
        self
    }
}

/// Check a command's transaction against the one active on a connection
///
/// For drivers that track the active transaction by id. While a transaction
/// is active every command must be enlisted in it; outside one, no command
/// may claim a transaction.
pub fn ensure_enlisted(active: Option<u64>, requested: Option<u64>) -> Result<()> {
    match (active, requested) {
        (None, None) => Ok(()),
        (Some(active), Some(id)) if active == id => Ok(()),
        (Some(_), None) => Err(DatabaseError::transaction(
            "Command must be enlisted in the connection's active transaction",
        )),
        (_, Some(id)) => Err(DatabaseError::transaction(format!(
            "Transaction {id} is not active on this connection"
        ))),
    }
}

/// Visitor receiving each record of a reader cursor
pub type RowVisitor<'v> = dyn FnMut(Vec<Column>) -> Result<()> + Send + 'v;

/// Connection to a database, as provided by a backend
///
/// A connection starts closed. The blocking methods are mandatory; the
/// `_async` variants default to calling the blocking ones, which suits a
/// driver without an async client. Drivers that can suspend override them.
///
/// # Reader contract
///
/// `execute_reader` walks the cursor to completion and passes every record
/// to `on_row` in cursor order. The cursor must be released before the
/// method returns, whether it finishes, the driver fails, or `on_row`
/// returns an error (which is then returned unchanged).
#[async_trait]
pub trait Connection: Send {
    /// Open the connection
    fn open(&mut self) -> Result<()>;

    /// Close the connection; closing a closed connection is a no-op
    fn close(&mut self) -> Result<()>;

    /// Whether the connection is open
    fn is_open(&self) -> bool;

    /// Begin a transaction
    fn begin_transaction(&mut self) -> Result<Transaction>;

    /// Commit a transaction
    fn commit(&mut self, transaction: Transaction) -> Result<()>;

    /// Roll a transaction back
    fn rollback(&mut self, transaction: Transaction) -> Result<()>;

    /// Execute and return the affected row count
    fn execute_non_query(&mut self, command: &Command<'_>) -> Result<u64>;

    /// Execute and return the first column of the first row
    fn execute_scalar(&mut self, command: &Command<'_>) -> Result<Option<DatabaseValue>>;

    /// Execute and stream every record to `on_row`
    fn execute_reader(&mut self, command: &Command<'_>, on_row: &mut RowVisitor<'_>)
        -> Result<()>;

    /// Open the connection
    async fn open_async(&mut self) -> Result<()> {
        self.open()
    }

    /// Close the connection
    async fn close_async(&mut self) -> Result<()> {
        self.close()
    }

    /// Begin a transaction
    async fn begin_transaction_async(&mut self) -> Result<Transaction> {
        self.begin_transaction()
    }

    /// Commit a transaction
    async fn commit_async(&mut self, transaction: Transaction) -> Result<()> {
        self.commit(transaction)
    }

    /// Roll a transaction back
    async fn rollback_async(&mut self, transaction: Transaction) -> Result<()> {
        self.rollback(transaction)
    }

    /// Execute and return the affected row count
    async fn execute_non_query_async(&mut self, command: &Command<'_>) -> Result<u64> {
        self.execute_non_query(command)
    }

    /// Execute and return the first column of the first row
    async fn execute_scalar_async(
        &mut self,
        command: &Command<'_>,
    ) -> Result<Option<DatabaseValue>> {
        self.execute_scalar(command)
    }

    /// Execute and stream every record to `on_row`
    async fn execute_reader_async(
        &mut self,
        command: &Command<'_>,
        on_row: &mut RowVisitor<'_>,
    ) -> Result<()> {
        self.execute_reader(command, on_row)
    }
}
