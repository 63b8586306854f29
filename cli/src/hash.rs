//! Deterministic digest of a single ledger entry

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::consts::HASH_HEX_LEN;

/// Position name -> selected candidate. Keys are always held sorted.
pub type BallotData = BTreeMap<String, String>;

/// Current time at the precision the chain stores and hashes.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// ISO-8601 with microseconds and an explicit `+00:00` offset.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parses any RFC 3339 rendering back into UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

/// Compact JSON object with lexicographically sorted keys.
pub fn canonical_ballot(ballot: &BallotData) -> String {
    let map: Map<String, Value> = ballot
        .iter()
        .map(|(position, candidate)| (position.clone(), Value::String(candidate.clone())))
        .collect();
    Value::Object(map).to_string()
}

/// SHA-256 over `election_id || canonical ballot || timestamp || previous_hash`,
/// rendered as lowercase hex.
pub fn compute_hash(
    election_id: &str,
    ballot: &BallotData,
    timestamp: &DateTime<Utc>,
    previous_hash: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(election_id.as_bytes());
    hasher.update(canonical_ballot(ballot).as_bytes());
    hasher.update(format_timestamp(timestamp).as_bytes());
    hasher.update(previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// True for exactly 64 lowercase hex characters.
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == HASH_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
