//! SQL statement constants for database operations

pub const CREATE_MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL,
    description TEXT NOT NULL
)
"#;

pub const CREATE_ELECTIONS_TABLE_SQL: &str = r#"
CREATE TABLE elections (
    election_id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    is_active INTEGER NOT NULL DEFAULT 0,
    positions_json TEXT NOT NULL, -- ordered object: position -> [candidates]
    created_at TEXT NOT NULL
)
"#;

pub const CREATE_REGISTERED_VOTERS_TABLE_SQL: &str = r#"
CREATE TABLE registered_voters (
    election_id TEXT NOT NULL REFERENCES elections(election_id),
    voter_hash TEXT NOT NULL,
    has_voted INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (election_id, voter_hash)
)
"#;

pub const CREATE_VOTE_LEDGER_TABLE_SQL: &str = r#"
CREATE TABLE vote_ledger (
    vote_id INTEGER PRIMARY KEY AUTOINCREMENT,
    election_id TEXT NOT NULL REFERENCES elections(election_id),
    ballot_data TEXT NOT NULL, -- canonical JSON object
    timestamp TEXT NOT NULL,
    previous_hash TEXT NOT NULL,
    current_hash TEXT NOT NULL UNIQUE
)
"#;

pub const CREATE_DB_INDEXES: &[&str] = &[
    // One successor per link: a second child of the same tail is a fork
    "CREATE UNIQUE INDEX idx_ledger_chain_link ON vote_ledger(election_id, previous_hash)",
    "CREATE INDEX idx_ledger_order ON vote_ledger(election_id, timestamp, vote_id)",
    "CREATE INDEX idx_voters_hash ON registered_voters(voter_hash)",
];

pub const CREATE_LEDGER_GUARDS: &[&str] = &[
    r#"
CREATE TRIGGER vote_ledger_no_update BEFORE UPDATE ON vote_ledger
BEGIN
    SELECT RAISE(ABORT, 'vote_ledger is append-only');
END
"#,
    r#"
CREATE TRIGGER vote_ledger_no_delete BEFORE DELETE ON vote_ledger
BEGIN
    SELECT RAISE(ABORT, 'vote_ledger is append-only');
END
"#,
];

pub const SELECT_LEDGER_COLUMNS: &str =
    "SELECT vote_id, election_id, ballot_data, timestamp, previous_hash, current_hash FROM vote_ledger";
