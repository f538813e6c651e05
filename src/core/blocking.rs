//! Driving futures from blocking call sites
//!
//! Used by the executor for async callbacks reached from a blocking entry
//! point, and by natively async drivers to implement the blocking side of
//! [`Connection`](super::connection::Connection).

use super::error::{DatabaseError, Result};
use std::future::Future;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

/// Run `future` to completion on the calling thread
///
/// - On a multi-thread runtime the worker is handed off with
///   `block_in_place` and the future runs on the ambient runtime.
/// - Outside any runtime it runs on `fallback`, or on a private
///   current-thread runtime when none is given.
/// - On a current-thread runtime blocking would stall the only worker, so
///   this fails with [`DatabaseError::UnsupportedOperation`].
pub fn block_on<F: Future>(future: F, fallback: Option<&Runtime>) -> Result<F::Output> {
    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                Ok(tokio::task::block_in_place(move || handle.block_on(future)))
            }
            _ => Err(DatabaseError::unsupported(
                "blocking call made on a current-thread runtime; use the async API instead",
            )),
        },
        Err(_) => match fallback {
            Some(runtime) => Ok(runtime.block_on(future)),
            None => Ok(tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(future)),
        },
    }
}
