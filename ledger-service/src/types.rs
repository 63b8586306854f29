//! Types for HTTP requests and responses

use serde::{Deserialize, Serialize};
use votechain_cli::{BallotData, BallotSchema, ChainReport};

#[derive(Debug, Deserialize)]
pub struct CastRequest {
    pub election_id: String,
    pub voter_credential: String,
    pub votes: BallotData,
}

#[derive(Debug, Deserialize)]
pub struct CheckStatusRequest {
    pub election_id: String,
    pub voter_credential: String,
}

#[derive(Debug, Serialize)]
pub struct CastResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub vote_id: i64,
    pub current_hash: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// Public election detail; `positions_json` keeps declaration order.
#[derive(Debug, Serialize)]
pub struct ElectionDetail {
    pub name: String,
    pub election_id: String,
    pub positions_json: BallotSchema,
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub election_id: String,
    #[serde(flatten)]
    pub report: ChainReport,
}
