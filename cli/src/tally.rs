//! Tally projection from a ledger snapshot

use serde::{Deserialize, Serialize};

use crate::entry::LedgerEntry;
use crate::schema::BallotSchema;

/// Count for one declared (position, candidate) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyRow {
    pub position: String,
    pub candidate: String,
    pub votes: u64,
}

/// Recounts `entries` from scratch against `schema`.
///
/// Every declared pair is present (zero if unvoted), in schema declaration
/// order. Selections naming an undeclared position or candidate are skipped.
pub fn project<'a, I>(schema: &BallotSchema, entries: I) -> Vec<TallyRow>
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut counts: Vec<Vec<u64>> = schema
        .positions()
        .iter()
        .map(|p| vec![0; p.candidates.len()])
        .collect();

    for entry in entries {
        for (position, candidate) in entry.ballot_data() {
            let Some(p_idx) = schema.positions().iter().position(|p| &p.name == position) else {
                continue;
            };
            let declared = &schema.positions()[p_idx];
            if let Some(c_idx) = declared.candidates.iter().position(|c| c == candidate) {
                counts[p_idx][c_idx] += 1;
            }
        }
    }

    schema
        .positions()
        .iter()
        .zip(counts)
        .flat_map(|(position, counts)| {
            position
                .candidates
                .iter()
                .zip(counts)
                .map(|(candidate, votes)| TallyRow {
                    position: position.name.clone(),
                    candidate: candidate.clone(),
                    votes,
                })
        })
        .collect()
}
