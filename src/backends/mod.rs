//! Database backend implementations
//!
//! Each backend provides a [`Connection`](crate::core::Connection) and a
//! [`ConnectionWrapper`](crate::core::ConnectionWrapper) over it.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConfig, SqliteConnection, SqliteWrapper};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresConnection, PostgresWrapper};
