//! Query and transaction orchestration on an open connection
//!
//! These functions never open, close or take ownership of the connection
//! they are given. The transaction functions own only the transaction they
//! begin themselves.

use super::blocking;
use super::connection::{Command, Connection, Transaction};
use super::error::Result;
use super::query::{Query, QueryMode, QueryOutput, QueryResult};
use super::row::Row;
use tracing::{debug, warn};

/// Execute one query on an open connection
///
/// The result is fully materialized before any callback runs. The async
/// callback (if any) is driven to completion first, then the sync callback.
/// Callback errors are returned unchanged.
pub fn execute(
    connection: &mut dyn Connection,
    transaction: Option<&Transaction>,
    query: Query,
) -> Result<QueryOutput> {
    let command = Command::new(query.text())
        .with_parameters(query.parameters())
        .with_transaction(transaction);

    debug!(
        mode = %query.mode(),
        parameters = query.parameters().len(),
        in_transaction = transaction.is_some(),
        "executing query"
    );

    let result = match query.mode() {
        QueryMode::NonQuery => QueryResult::NonQuery(connection.execute_non_query(&command)?),
        QueryMode::Scalar => {
            QueryResult::Scalar(connection.execute_scalar(&command)?.filter(|v| !v.is_null()))
        }
        QueryMode::Reader => {
            let mut rows = Vec::new();
            connection.execute_reader(&command, &mut |columns| {
                rows.push(Row::new(columns));
                Ok(())
            })?;
            debug!(rows = rows.len(), "reader materialized");
            QueryResult::Reader(rows)
        }
    };

    let output = QueryOutput::new(query, result);

    if let Some(callback) = output.query().async_callback() {
        // Awaited on the ambient multi-thread runtime or a private one
        blocking::block_on(callback(&output, &mut *connection, transaction), None)??;
    }

    if let Some(callback) = output.query().callback() {
        callback(&output, &mut *connection, transaction)?;
    }

    Ok(output)
}

/// Execute one query on an open connection without blocking the caller
///
/// Same contract as [`execute`]; every driver call and the async callback
/// are suspension points.
pub async fn execute_async(
    connection: &mut dyn Connection,
    transaction: Option<&Transaction>,
    query: Query,
) -> Result<QueryOutput> {
    let result = {
        let command = Command::new(query.text())
            .with_parameters(query.parameters())
            .with_transaction(transaction);

        debug!(
            mode = %query.mode(),
            parameters = query.parameters().len(),
            in_transaction = transaction.is_some(),
            "executing query"
        );

        match query.mode() {
            QueryMode::NonQuery => {
                QueryResult::NonQuery(connection.execute_non_query_async(&command).await?)
            }
            QueryMode::Scalar => QueryResult::Scalar(
                connection
                    .execute_scalar_async(&command)
                    .await?
                    .filter(|v| !v.is_null()),
            ),
            QueryMode::Reader => {
                let mut rows = Vec::new();
                connection
                    .execute_reader_async(&command, &mut |columns| {
                        rows.push(Row::new(columns));
                        Ok(())
                    })
                    .await?;
                debug!(rows = rows.len(), "reader materialized");
                QueryResult::Reader(rows)
            }
        }
    };

    let output = QueryOutput::new(query, result);

    if let Some(callback) = output.query().async_callback() {
        callback(&output, &mut *connection, transaction).await?;
    }

    if let Some(callback) = output.query().callback() {
        callback(&output, &mut *connection, transaction)?;
    }

    Ok(output)
}

/// Run `queries` in order inside one transaction on an open connection
///
/// An empty list returns immediately without beginning a transaction. On
/// failure the transaction is rolled back and the original error returned.
pub fn run_transaction(
    connection: &mut dyn Connection,
    queries: Vec<Query>,
) -> Result<Vec<QueryOutput>> {
    if queries.is_empty() {
        return Ok(Vec::new());
    }

    let transaction = connection.begin_transaction()?;
    debug!(transaction = transaction.id(), queries = queries.len(), "transaction started");

    let mut outputs = Vec::with_capacity(queries.len());
    let mut failure = None;
    for query in queries {
        match execute(connection, Some(&transaction), query) {
            Ok(output) => outputs.push(output),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    let id = transaction.id();
    match failure {
        None => {
            connection.commit(transaction)?;
            debug!(transaction = id, "transaction committed");
            Ok(outputs)
        }
        Some(e) => {
            match connection.rollback(transaction) {
                Ok(()) => debug!(transaction = id, error = %e, "transaction rolled back"),
                Err(rollback_error) => warn!(
                    transaction = id,
                    error = %e,
                    %rollback_error,
                    "rollback failed after transaction error"
                ),
            }
            Err(e)
        }
    }
}

/// Async counterpart of [`run_transaction`]
pub async fn run_transaction_async(
    connection: &mut dyn Connection,
    queries: Vec<Query>,
) -> Result<Vec<QueryOutput>> {
    if queries.is_empty() {
        return Ok(Vec::new());
    }

    let transaction = connection.begin_transaction_async().await?;
    debug!(transaction = transaction.id(), queries = queries.len(), "transaction started");

    let mut outputs = Vec::with_capacity(queries.len());
    let mut failure = None;
    for query in queries {
        match execute_async(&mut *connection, Some(&transaction), query).await {
            Ok(output) => outputs.push(output),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    let id = transaction.id();
    match failure {
        None => {
            connection.commit_async(transaction).await?;
            debug!(transaction = id, "transaction committed");
            Ok(outputs)
        }
        Some(e) => {
            match connection.rollback_async(transaction).await {
                Ok(()) => debug!(transaction = id, error = %e, "transaction rolled back"),
                Err(rollback_error) => warn!(
                    transaction = id,
                    error = %e,
                    %rollback_error,
                    "rollback failed after transaction error"
                ),
            }
            Err(e)
        }
    }
}
