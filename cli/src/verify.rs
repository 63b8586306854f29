//! Hash-chain verification over one election's ordered entries

use std::collections::HashSet;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::entry::LedgerEntry;
use crate::hash::is_hex_digest;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainFault {
    #[error("hash field is not a 64-character lowercase hex digest")]
    MalformedHash,
    #[error("stored hash {stored} does not match recomputed {recomputed}")]
    HashMismatch { stored: String, recomputed: String },
    #[error("entry belongs to election '{0}'")]
    ForeignEntry(String),
    #[error("first entry is not a genesis entry")]
    MissingGenesis,
    #[error("second genesis entry")]
    DuplicateGenesis,
    #[error("previous_hash {0} is shared with an earlier entry (fork)")]
    Fork(String),
    #[error("previous_hash does not match the preceding entry's current_hash")]
    BrokenLink,
    #[error("timestamp does not strictly follow the preceding entry")]
    TimestampOrder,
    #[error("current_hash {0} appears more than once")]
    DuplicateHash(String),
}

/// Outcome of replaying a chain.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChainReport {
    /// Total number of entries inspected.
    pub total_entries: usize,
    /// Whether every invariant held.
    pub valid: bool,
    /// `vote_id` of the first failing entry, if any.
    pub first_invalid_entry: Option<i64>,
    #[serde(rename = "reason", serialize_with = "fault_message")]
    pub fault: Option<ChainFault>,
}

impl ChainReport {
    fn ok(total_entries: usize) -> Self {
        Self {
            total_entries,
            valid: true,
            first_invalid_entry: None,
            fault: None,
        }
    }

    fn failed(total_entries: usize, entry: &LedgerEntry, fault: ChainFault) -> Self {
        Self {
            total_entries,
            valid: false,
            first_invalid_entry: Some(entry.vote_id()),
            fault: Some(fault),
        }
    }
}

fn fault_message<S: Serializer>(fault: &Option<ChainFault>, s: S) -> Result<S::Ok, S::Error> {
    match fault {
        Some(fault) => s.serialize_some(&fault.to_string()),
        None => s.serialize_none(),
    }
}

/// Replays every hash of `entries` (listing order: timestamp ascending) and
/// checks the chain invariants. Stops at the first failing entry.
pub fn verify_chain(election_id: &str, entries: &[LedgerEntry]) -> ChainReport {
    let total = entries.len();
    let mut previous_hashes: HashSet<&str> = HashSet::with_capacity(total);
    let mut current_hashes: HashSet<&str> = HashSet::with_capacity(total);
    let mut predecessor: Option<&LedgerEntry> = None;

    for entry in entries {
        let checked = check_entry(
            election_id,
            entry,
            predecessor,
            &previous_hashes,
            &current_hashes,
        );
        if let Err(fault) = checked {
            return ChainReport::failed(total, entry, fault);
        }
        previous_hashes.insert(entry.previous_hash());
        current_hashes.insert(entry.current_hash());
        predecessor = Some(entry);
    }

    ChainReport::ok(total)
}

fn check_entry(
    election_id: &str,
    entry: &LedgerEntry,
    predecessor: Option<&LedgerEntry>,
    previous_hashes: &HashSet<&str>,
    current_hashes: &HashSet<&str>,
) -> Result<(), ChainFault> {
    if !is_hex_digest(entry.current_hash()) || !is_hex_digest(entry.previous_hash()) {
        return Err(ChainFault::MalformedHash);
    }

    let recomputed = entry.recompute_hash();
    if recomputed != entry.current_hash() {
        return Err(ChainFault::HashMismatch {
            stored: entry.current_hash().to_string(),
            recomputed,
        });
    }

    if entry.election_id() != election_id {
        return Err(ChainFault::ForeignEntry(entry.election_id().to_string()));
    }

    match predecessor {
        None if !entry.is_genesis() => return Err(ChainFault::MissingGenesis),
        Some(_) if entry.is_genesis() => return Err(ChainFault::DuplicateGenesis),
        _ => {}
    }

    if previous_hashes.contains(entry.previous_hash()) {
        return Err(ChainFault::Fork(entry.previous_hash().to_string()));
    }

    if let Some(prev) = predecessor {
        if entry.previous_hash() != prev.current_hash() {
            return Err(ChainFault::BrokenLink);
        }
        if entry.timestamp() <= prev.timestamp() {
            return Err(ChainFault::TimestampOrder);
        }
    }

    if current_hashes.contains(entry.current_hash()) {
        return Err(ChainFault::DuplicateHash(entry.current_hash().to_string()));
    }

    Ok(())
}
