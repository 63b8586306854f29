//! Database migration constants and metadata

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Migration descriptions, indexed by version - 1
pub const MIGRATION_DESCRIPTIONS: &[&str] =
    &["Elections, registered voters and the append-only vote ledger"];

/// Default database file
pub const DEFAULT_DB_PATH: &str = "votechain.db";

/// Seconds a connection waits on a locked database before failing
pub const BUSY_TIMEOUT_SECS: u64 = 5;
