//! Ledger entry value types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consts::GENESIS_HASH;
use crate::hash::{compute_hash, BallotData};

/// One recorded ballot. Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    vote_id: i64,
    election_id: String,
    ballot_data: BallotData,
    timestamp: DateTime<Utc>,
    previous_hash: String,
    current_hash: String,
}

impl LedgerEntry {
    /// Rehydrate a stored entry exactly as persisted. No hashing happens here,
    /// so tampered rows stay detectable by verification.
    pub fn from_stored(
        vote_id: i64,
        election_id: String,
        ballot_data: BallotData,
        timestamp: DateTime<Utc>,
        previous_hash: String,
        current_hash: String,
    ) -> Self {
        Self {
            vote_id,
            election_id,
            ballot_data,
            timestamp,
            previous_hash,
            current_hash,
        }
    }

    pub fn vote_id(&self) -> i64 {
        self.vote_id
    }

    pub fn election_id(&self) -> &str {
        &self.election_id
    }

    pub fn ballot_data(&self) -> &BallotData {
        &self.ballot_data
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn current_hash(&self) -> &str {
        &self.current_hash
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash == GENESIS_HASH
    }

    /// Digest recomputed from the stored fields.
    pub fn recompute_hash(&self) -> String {
        compute_hash(
            &self.election_id,
            &self.ballot_data,
            &self.timestamp,
            &self.previous_hash,
        )
    }
}

/// A sealed entry that has not been assigned a `vote_id` yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    election_id: String,
    ballot_data: BallotData,
    timestamp: DateTime<Utc>,
    previous_hash: String,
    current_hash: String,
}

impl ChainLink {
    /// Link a ballot onto `previous_hash` (or genesis when `None`).
    pub fn seal(
        election_id: &str,
        ballot_data: BallotData,
        timestamp: DateTime<Utc>,
        previous_hash: Option<&str>,
    ) -> Self {
        let previous_hash = previous_hash.unwrap_or(GENESIS_HASH).to_string();
        let current_hash = compute_hash(election_id, &ballot_data, &timestamp, &previous_hash);
        Self {
            election_id: election_id.to_string(),
            ballot_data,
            timestamp,
            previous_hash,
            current_hash,
        }
    }

    pub fn election_id(&self) -> &str {
        &self.election_id
    }

    pub fn ballot_data(&self) -> &BallotData {
        &self.ballot_data
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn current_hash(&self) -> &str {
        &self.current_hash
    }

    /// Attach the id the store assigned on insert.
    pub fn recorded(self, vote_id: i64) -> LedgerEntry {
        LedgerEntry {
            vote_id,
            election_id: self.election_id,
            ballot_data: self.ballot_data,
            timestamp: self.timestamp,
            previous_hash: self.previous_hash,
            current_hash: self.current_hash,
        }
    }
}

/// Public view of an entry as it appears in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerView {
    pub vote_id: i64,
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub current_hash: String,
    pub ballot_data: BallotData,
}

impl LedgerView {
    /// Views carry no election id; the caller supplies the chain they came from.
    pub fn into_entry(self, election_id: &str) -> LedgerEntry {
        LedgerEntry::from_stored(
            self.vote_id,
            election_id.to_string(),
            self.ballot_data,
            self.timestamp,
            self.previous_hash,
            self.current_hash,
        )
    }
}

impl From<&LedgerEntry> for LedgerView {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            vote_id: entry.vote_id,
            timestamp: entry.timestamp,
            previous_hash: entry.previous_hash.clone(),
            current_hash: entry.current_hash.clone(),
            ballot_data: entry.ballot_data.clone(),
        }
    }
}

mod timestamp_format {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::hash::{format_timestamp, parse_timestamp};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_timestamp(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{is_hex_digest, parse_timestamp};

    fn ballot(candidate: &str) -> BallotData {
        BallotData::from([("President".to_string(), candidate.to_string())])
    }

    #[test]
    fn test_seal_genesis_and_link() {
        let t0 = parse_timestamp("2025-03-01T09:30:00.000001+00:00").unwrap();
        let t1 = parse_timestamp("2025-03-01T09:30:00.000002+00:00").unwrap();

        let first = ChainLink::seal("e1", ballot("Alice"), t0, None).recorded(1);
        assert!(first.is_genesis());
        assert_eq!(first.previous_hash(), GENESIS_HASH);
        assert!(is_hex_digest(first.current_hash()));
        assert_eq!(first.recompute_hash(), first.current_hash());

        let second =
            ChainLink::seal("e1", ballot("Bob"), t1, Some(first.current_hash())).recorded(2);
        assert!(!second.is_genesis());
        assert_eq!(second.previous_hash(), first.current_hash());
        assert_eq!(second.recompute_hash(), second.current_hash());
    }

    #[test]
    fn test_view_json_shape() {
        let t0 = parse_timestamp("2025-03-01T09:30:00.5Z").unwrap();
        let entry = ChainLink::seal("e1", ballot("Alice"), t0, None).recorded(7);
        let json = serde_json::to_value(LedgerView::from(&entry)).unwrap();

        assert_eq!(json["vote_id"], 7);
        assert_eq!(json["timestamp"], "2025-03-01T09:30:00.500000+00:00");
        assert_eq!(json["previous_hash"], GENESIS_HASH);
        assert_eq!(json["current_hash"], entry.current_hash());
        assert_eq!(json["ballot_data"]["President"], "Alice");

        let view: LedgerView = serde_json::from_value(json).unwrap();
        assert_eq!(view.into_entry("e1"), entry);
    }
}
