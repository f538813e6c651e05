//! Transaction handling example
//!
//! This example demonstrates:
//! - Committing several queries atomically
//! - Automatic rollback when a query fails
//! - Chaining follow-up queries from callbacks
//! - Running on a connection the caller opened and owns
//!
//! Run with: RUST_LOG=debug cargo run --example transactions

use db_connection_wrapper::prelude::*;
use tracing_subscriber::EnvFilter;

fn balances(db: &SqliteWrapper) -> Result<Vec<(String, f64)>> {
    let out = db.execute_query(
        Query::new("SELECT owner, balance FROM accounts ORDER BY id").with_mode(QueryMode::Reader),
    )?;
    Ok(out
        .reader_result()
        .iter()
        .map(|row| {
            (
                row.value::<String>("owner").unwrap_or_default(),
                row.value::<f64>("balance").unwrap_or_default(),
            )
        })
        .collect())
}

fn transfer(from: i64, to: i64, amount: f64) -> Vec<Query> {
    vec![
        Query::new("UPDATE accounts SET balance = balance - ? WHERE id = ?")
            .bind(amount)
            .bind(from),
        Query::new("UPDATE accounts SET balance = balance + ? WHERE id = ?")
            .bind(amount)
            .bind(to),
    ]
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== DB Connection Wrapper - Transactions Example ===\n");

    let dir = tempfile::tempdir()?;
    let db = SqliteWrapper::new(SqliteConfig::new(dir.path().join("bank.db")));

    println!("1. Setting up accounts...");
    db.execute_transaction(vec![
        Query::new(
            "CREATE TABLE accounts (
                id INTEGER PRIMARY KEY,
                owner TEXT NOT NULL,
                balance REAL NOT NULL CHECK (balance >= 0)
            )",
        ),
        Query::new("CREATE TABLE transfers (id INTEGER PRIMARY KEY, affected INTEGER NOT NULL)"),
        Query::new("INSERT INTO accounts (id, owner, balance) VALUES (1, 'Alice', 1000.0)"),
        Query::new("INSERT INTO accounts (id, owner, balance) VALUES (2, 'Bob', 500.0)"),
    ])?;
    println!("   ✓ {:?}\n", balances(&db)?);

    println!("2. Successful transfer (Alice -> Bob: 200)...");
    db.execute_transaction(transfer(1, 2, 200.0))?;
    println!("   ✓ Committed: {:?}\n", balances(&db)?);

    println!("3. Failed transfer (Bob -> Alice: 5000)...");
    match db.execute_transaction(transfer(2, 1, 5000.0)) {
        Ok(_) => println!("   ✗ Unexpected success"),
        Err(e) => println!("   ✓ Rolled back: {e}"),
    }
    println!("   Balances unchanged: {:?}\n", balances(&db)?);

    println!("4. Transfer with an audit callback...");
    let mut queries = transfer(1, 2, 50.0);
    if let Some(last) = queries.pop() {
        queries.push(last.on_complete(|out, conn, tx| {
            executor::execute(
                conn,
                tx,
                Query::new("INSERT INTO transfers (affected) VALUES (?)")
                    .bind(out.non_query_result() as i64),
            )?;
            Ok(())
        }));
    }
    db.execute_transaction(queries)?;
    let audited = db.execute_sql("SELECT COUNT(*) FROM transfers", QueryMode::Scalar, vec![])?;
    println!(
        "   ✓ Audit rows: {}\n",
        audited.scalar_result().map(ToString::to_string).unwrap_or_default()
    );

    println!("5. Using a caller-owned connection...");
    let mut conn = db.get_connection();
    conn.open()?;
    let tx = conn.begin_transaction()?;
    db.execute_query_with_open_connection(
        &mut conn,
        Some(&tx),
        Query::new("UPDATE accounts SET balance = 0"),
    )?;
    conn.rollback(tx)?;
    println!("   ✓ Caller rolled back: {:?}", balances(&db)?);
    conn.close()?;

    println!("\n=== Example completed successfully ===");
    Ok(())
}
