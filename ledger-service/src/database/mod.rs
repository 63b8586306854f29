pub mod constants;
pub mod migrator;
pub mod models;
pub mod operations;
pub mod path;
pub mod sql;

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use constants::BUSY_TIMEOUT_SECS;
pub use migrator::run_migrations;
use path::validate_db_path;

/// Connection pool for the ledger database
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database, then run migrations
    pub async fn connect(db_path: &str, max_connections: u32) -> Result<Self> {
        validate_db_path(db_path)?;
        info!("Initializing database at {:?}", db_path);

        let pool = if db_path == ":memory:" {
            // Every connection to :memory: is a separate database, so the
            // pool must hold exactly one connection and never recycle it.
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            let options = SqliteConnectOptions::new()
                .filename(db_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .foreign_keys(true)
                .busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS));
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(options)
                .await?
        };

        run_migrations(&pool).await?;

        info!("Database initialized successfully");

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
