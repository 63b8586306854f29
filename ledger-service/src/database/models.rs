use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Election row; `positions_json` holds the ballot schema in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ElectionRecord {
    pub election_id: String,
    pub name: String,
    pub is_active: bool,
    pub positions_json: String,
}

/// Registered voter row. Only the credential hash is stored.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RegisteredVoterRecord {
    pub election_id: String,
    pub voter_hash: String,
    pub has_voted: bool,
}

/// Raw ledger row as persisted
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LedgerRow {
    pub vote_id: i64,
    pub election_id: String,
    pub ballot_data: String, // canonical JSON object
    pub timestamp: String,   // RFC 3339, microseconds, +00:00
    pub previous_hash: String,
    pub current_hash: String,
}
