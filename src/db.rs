// src/db.rs

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Sqlite, SqlitePool, Transaction};

/// How long a writer waits for another writer before SQLite gives up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings shared by the server and the tests.
pub fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT))
}

/// Opens a transaction that holds the write lock from its first statement.
///
/// A deferred `BEGIN` that reads and then writes fails with SQLITE_BUSY when
/// another connection wrote in between. `BEGIN IMMEDIATE` queues on the busy
/// timeout instead, so read-then-write sequences run one after another.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}
