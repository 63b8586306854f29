use flate2::{write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::entry::{LedgerEntry, LedgerView};
use crate::schema::BallotSchema;
use crate::tally::{project, TallyRow};
use crate::utils::{max_snapshot_bytes, read_bounded, read_gzip_bounded};
use crate::verify::{verify_chain, ChainReport};

/// Dashboard payload: tally plus the full ledger of one election.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Per-candidate counts in schema declaration order
    pub tally: Vec<TallyRow>,
    /// Every entry, timestamp ascending
    pub ledger: Vec<LedgerView>,
}

/// Result of auditing an exported snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SnapshotAudit {
    pub chain: ChainReport,
    /// `None` when no schema was supplied to recount against.
    pub tally_matches: Option<bool>,
}

impl SnapshotAudit {
    pub fn is_valid(&self) -> bool {
        self.chain.valid && self.tally_matches.unwrap_or(true)
    }
}

impl Snapshot {
    pub fn build(schema: &BallotSchema, entries: &[LedgerEntry]) -> Self {
        Self {
            tally: project(schema, entries),
            ledger: entries.iter().map(LedgerView::from).collect(),
        }
    }

    /// Number of ballots this snapshot reflects.
    pub fn ballot_count(&self) -> u64 {
        self.ledger.len() as u64
    }

    pub fn entries(&self, election_id: &str) -> Vec<LedgerEntry> {
        self.ledger
            .iter()
            .cloned()
            .map(|view| view.into_entry(election_id))
            .collect()
    }

    /// Replays the chain and, given the schema, recounts the tally.
    pub fn audit(&self, election_id: &str, schema: Option<&BallotSchema>) -> SnapshotAudit {
        let entries = self.entries(election_id);
        SnapshotAudit {
            chain: verify_chain(election_id, &entries),
            tally_matches: schema.map(|schema| project(schema, &entries) == self.tally),
        }
    }

    pub fn save_compressed(&self, path: PathBuf) -> io::Result<()> {
        let data = serde_json::to_vec(self)?;
        let file = File::create(path)?;
        let mut enc = GzEncoder::new(file, Compression::default());
        enc.write_all(&data)?;
        enc.finish()?;

        Ok(())
    }

    pub fn read(path: PathBuf, is_compressed: bool) -> io::Result<Self> {
        let file = File::open(path)?;
        let limit = max_snapshot_bytes();
        let buf = if is_compressed {
            read_gzip_bounded(file, limit)?
        } else {
            read_bounded(file, limit)?
        };
        Self::read_from_bytes(&buf)
    }

    pub fn read_from_bytes(buf: &[u8]) -> io::Result<Self> {
        serde_json::from_slice(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
