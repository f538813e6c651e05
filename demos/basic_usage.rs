//! Basic wrapper usage example
//!
//! This example demonstrates:
//! - Checking that the database is reachable
//! - Running NonQuery, Scalar and Reader queries on fresh connections
//! - Binding rows onto a struct
//!
//! Run with: RUST_LOG=debug cargo run --example basic_usage

use db_connection_wrapper::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct User {
    id: i64,
    username: String,
    email: Option<String>,
    balance: f64,
}

impl_bind!(User {
    id,
    username,
    email,
    balance,
});

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== DB Connection Wrapper - Basic Usage Example ===\n");

    let dir = tempfile::tempdir()?;
    let db = SqliteWrapper::new(SqliteConfig::new(dir.path().join("basic.db")));

    println!("1. Testing connection...");
    if let Some(err) = db.test_connection_async().await {
        println!("   ✗ Database unavailable: {err}");
        return Err(err);
    }
    println!("   ✓ Reachable\n");

    println!("2. Creating table...");
    db.execute_sql_async(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            email TEXT,
            balance REAL NOT NULL DEFAULT 0
        )",
        QueryMode::NonQuery,
        vec![],
    )
    .await?;
    println!("   ✓ Table created\n");

    println!("3. Inserting users...");
    for (username, email, balance) in [
        ("alice", Some("alice@example.com"), 1500.5),
        ("bob", None, 250.0),
        ("carol", Some("carol@example.com"), 0.0),
    ] {
        let out = db
            .execute_query_async(
                Query::new("INSERT INTO users (username, email, balance) VALUES (?, ?, ?)")
                    .bind(username)
                    .bind(email)
                    .bind(balance),
            )
            .await?;
        println!("   ✓ {username}: {} row(s) affected", out.non_query_result());
    }
    println!();

    println!("4. Counting users...");
    let count = db
        .execute_sql_async("SELECT COUNT(*) FROM users", QueryMode::Scalar, vec![])
        .await?;
    if let Some(value) = count.scalar_result() {
        println!("   ✓ {value} users\n");
    }

    println!("5. Reading rows...");
    let out = db
        .execute_query_async(
            Query::new("SELECT id, username, email, balance FROM users ORDER BY id")
                .with_mode(QueryMode::Reader),
        )
        .await?;
    for row in out.reader_result() {
        let username = row.value::<String>("username").unwrap_or_default();
        let email = row.get("email").and_then(|c| c.value().map(ToString::to_string));
        println!("   - {username} <{}>", email.as_deref().unwrap_or("no email"));
    }
    println!();

    println!("6. Binding rows...");
    for user in out.bind::<User>() {
        println!("   {user:?}");
    }

    println!("\n=== Example completed successfully ===");
    Ok(())
}
