//! Core wrapper types and traits
//!
//! This module provides the driver-independent building blocks: values,
//! the row/column result model, queries and their outputs, the connection
//! seam drivers implement, the execution orchestration, and the binder.

pub mod binder;
pub mod blocking;
pub mod column;
pub mod connection;
pub mod error;
pub mod executor;
pub mod guard;
pub mod query;
pub mod row;
pub mod value;
pub mod wrapper;

// Re-export commonly used types
pub use binder::{bind_row, bind_rows, Bind};
pub use column::Column;
pub use connection::{Command, Connection, RowVisitor, Transaction};
pub use error::{DatabaseError, Result};
pub use guard::ConnectionGuard;
pub use query::{AsyncCallback, BoxFuture, Query, QueryMode, QueryOutput, QueryResult, SyncCallback};
pub use row::Row;
pub use value::{DatabaseValue, FromValue};
pub use wrapper::ConnectionWrapper;
