//! Startup fixture of elections and voter credentials

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;
use votechain_cli::BallotSchema;

use crate::database::models::{ElectionRecord, RegisteredVoterRecord};
use crate::registry::hash_credential;
use crate::utils::validate_election_id;

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub elections: Vec<SeedElection>,
}

#[derive(Debug, Deserialize)]
pub struct SeedElection {
    pub election_id: String,
    pub name: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    pub positions: BallotSchema,
    /// Raw credentials; only their hashes are stored
    #[serde(default)]
    pub voters: Vec<String>,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub elections: usize,
    pub voters_registered: usize,
}

pub async fn load_seed_file(pool: &SqlitePool, path: &Path) -> Result<SeedSummary> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let seed: SeedFile = serde_json::from_str(&raw)
        .with_context(|| format!("parsing seed file {}", path.display()))?;
    apply_seed(pool, &seed).await
}

/// Idempotent: existing elections keep their schema and existing voters keep
/// their `has_voted` flag.
pub async fn apply_seed(pool: &SqlitePool, seed: &SeedFile) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    let mut tx = pool.begin().await?;

    for election in &seed.elections {
        validate_election_id(&election.election_id)?;
        ElectionRecord {
            election_id: election.election_id.clone(),
            name: election.name.clone(),
            is_active: election.is_active,
            positions_json: election.positions.to_json()?,
        }
        .upsert(&mut *tx)
        .await?;
        summary.elections += 1;

        for credential in &election.voters {
            let voter_hash = hash_credential(credential);
            if RegisteredVoterRecord::register(&mut *tx, &election.election_id, &voter_hash).await? {
                summary.voters_registered += 1;
            }
        }
        info!(
            "Seeded election {} ({} voters listed)",
            election.election_id,
            election.voters.len()
        );
    }

    tx.commit().await?;
    Ok(summary)
}
