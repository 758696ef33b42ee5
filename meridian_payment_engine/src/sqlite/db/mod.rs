//! # SQLite database methods
//!
//! "Low-level" SQLite interactions, kept as simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection`. Callers obtain a connection from a pool, or open a transaction and call through to
//! these functions without any other changes.

use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod accounts;
pub mod contracts;
pub mod flows;
pub mod routers;
pub mod settles;
pub mod strategies;
pub mod tasks;
pub mod transactions;

const SQLITE_DB_URL: &str = "sqlite://data/mpg_store.db";

pub fn db_url() -> String {
    let result = env::var("MPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("MPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

/// Opens a pool in WAL mode with a 5s busy timeout. The busy timeout stands in for row locks: concurrent
/// writers queue on SQLite's single-writer lock instead of failing.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
