//! Scoped ownership of connections created by the wrapper
//!
//! A [`ConnectionGuard`] owns a connection obtained from
//! [`ConnectionWrapper::get_connection`](super::wrapper::ConnectionWrapper::get_connection)
//! and closes it when the guard goes out of scope, on every exit path.
//! Borrowed connections never pass through a guard.

use super::connection::Connection;
use super::error::Result;
use tracing::{debug, warn};

/// Owned, opened connection that is closed on drop
pub struct ConnectionGuard<C: Connection> {
    connection: C,
    closed: bool,
}

impl<C: Connection> ConnectionGuard<C> {
    /// Open `connection` and take ownership of it
    ///
    /// # Errors
    ///
    /// Returns the driver's error if opening fails; the handle is dropped.
    pub fn open(mut connection: C) -> Result<Self> {
        connection.open()?;
        debug!("connection opened");
        Ok(Self {
            connection,
            closed: false,
        })
    }

    /// Async counterpart of [`ConnectionGuard::open`]
    pub async fn open_async(mut connection: C) -> Result<Self> {
        connection.open_async().await?;
        debug!("connection opened");
        Ok(Self {
            connection,
            closed: false,
        })
    }

    /// The guarded connection
    pub fn connection(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Close the connection now and report failure to the caller
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.connection.close()?;
        debug!("connection closed");
        Ok(())
    }

    /// Close the connection through the driver's async path
    pub async fn close_async(mut self) -> Result<()> {
        self.closed = true;
        self.connection.close_async().await?;
        debug!("connection closed");
        Ok(())
    }
}

impl<C: Connection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Drop cannot await; the blocking close is the fallback for
        // early returns, panics and cancelled futures.
        match self.connection.close() {
            Ok(()) => debug!("connection closed"),
            Err(e) => warn!(error = %e, "failed to close connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::column::Column;
    use crate::core::connection::{Command, RowVisitor, Transaction};
    use crate::core::error::DatabaseError;
    use crate::core::value::DatabaseValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingConnection {
        open: bool,
        fail_open: bool,
        closes: Arc<AtomicUsize>,
    }

    impl Connection for CountingConnection {
        fn open(&mut self) -> Result<()> {
            if self.fail_open {
                return Err(DatabaseError::connection("refused"));
            }
            self.open = true;
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            if self.open {
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
            self.open = false;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn begin_transaction(&mut self) -> Result<Transaction> {
            Ok(Transaction::new())
        }

        fn commit(&mut self, _transaction: Transaction) -> Result<()> {
            Ok(())
        }

        fn rollback(&mut self, _transaction: Transaction) -> Result<()> {
            Ok(())
        }

        fn execute_non_query(&mut self, _command: &Command<'_>) -> Result<u64> {
            Ok(0)
        }

        fn execute_scalar(&mut self, _command: &Command<'_>) -> Result<Option<DatabaseValue>> {
            Ok(None)
        }

        fn execute_reader(
            &mut self,
            _command: &Command<'_>,
            on_row: &mut RowVisitor<'_>,
        ) -> Result<()> {
            on_row(vec![Column::new("x", 1i64)])
        }
    }

    fn counting(fail_open: bool) -> (CountingConnection, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let conn = CountingConnection {
            open: false,
            fail_open,
            closes: Arc::clone(&closes),
        };
        (conn, closes)
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let (conn, closes) = counting(false);
        {
            let mut guard = ConnectionGuard::open(conn).unwrap();
            assert!(guard.connection().is_open());
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_close_is_not_repeated_on_drop() {
        let (conn, closes) = counting(false);
        let guard = ConnectionGuard::open(conn).unwrap();
        guard.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_open_returns_error() {
        let (conn, closes) = counting(true);
        let err = ConnectionGuard::open(conn).err().unwrap();
        assert!(matches!(err, DatabaseError::ConnectionError(_)));
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_async_close() {
        let (conn, closes) = counting(false);
        let guard = ConnectionGuard::open_async(conn).await.unwrap();
        guard.close_async().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
