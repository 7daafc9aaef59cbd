// SQLite persistence for captures, candidates, verification and keyword state.
//
// Every logical write is a single statement (or one short transaction), so a
// crash mid-run leaves completed work intact. Write paths are idempotent:
// captures are content-addressed, and every child table is keyed UNIQUE on
// its parent so a retry finds the row already present and does nothing.

mod candidates;
mod captures;
mod keywords;
mod query_log;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::Result;

pub use candidates::{CandidateWithSource, NewCandidate, VerifiedSignalRow};
pub use captures::NewCapture;
pub use query_log::NewQueryLog;

#[derive(Clone)]
pub struct SignalStore {
    pool: SqlitePool,
}

impl SignalStore {
    /// Open (creating if missing) the database at `database_url` and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(database_url, "Signal store ready");
        Ok(store)
    }

    /// Private in-memory database. A single connection that never expires,
    /// so every query sees the same schema and rows.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}
