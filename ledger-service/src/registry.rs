//! Eligibility boundary: elections and registered voters

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};
use votechain_cli::BallotSchema;

use crate::database::models::{ElectionRecord, RegisteredVoterRecord};
use crate::error::{Error, Result};
use crate::ledger::Bundle;

/// Lowercase hex SHA-256 of an opaque voter credential
pub fn hash_credential(credential: &str) -> String {
    hex::encode(Sha256::digest(credential.as_bytes()))
}

/// A voter cleared to cast in one active election.
#[derive(Debug, Clone)]
pub struct Eligibility {
    pub election: ElectionRecord,
    pub schema: BallotSchema,
    pub voter_hash: String,
}

#[async_trait]
pub trait VoterRegistry: Send + Sync {
    /// The election and its schema, if it exists and is accepting votes.
    async fn active_election(&self, election_id: &str) -> Result<(ElectionRecord, BallotSchema)>;

    /// Read-only check that the credential is registered and unconsumed.
    async fn check_eligibility(&self, election_id: &str, voter_credential: &str)
        -> Result<Eligibility>;

    /// Bundle that consumes the voter inside the ledger append. Fails with
    /// `DuplicateVote` if the voter was consumed in the meantime.
    fn consume(&self, eligibility: &Eligibility) -> Box<dyn Bundle>;
}

pub struct SqlVoterRegistry {
    pool: SqlitePool,
}

impl SqlVoterRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VoterRegistry for SqlVoterRegistry {
    async fn active_election(&self, election_id: &str) -> Result<(ElectionRecord, BallotSchema)> {
        match ElectionRecord::get(&self.pool, election_id).await? {
            Some(election) if election.is_active => {
                let schema = election.schema()?;
                Ok((election, schema))
            }
            _ => Err(Error::Eligibility(format!(
                "Election '{}' does not exist or is not active.",
                election_id
            ))),
        }
    }

    async fn check_eligibility(
        &self,
        election_id: &str,
        voter_credential: &str,
    ) -> Result<Eligibility> {
        let (election, schema) = self.active_election(election_id).await?;
        let voter_hash = hash_credential(voter_credential);

        let voter = RegisteredVoterRecord::get(&self.pool, election_id, &voter_hash)
            .await?
            .ok_or_else(|| {
                Error::Eligibility("Invalid voter: credential not registered for this election.".into())
            })?;
        if voter.has_voted {
            return Err(Error::DuplicateVote);
        }

        Ok(Eligibility {
            election,
            schema,
            voter_hash,
        })
    }

    fn consume(&self, eligibility: &Eligibility) -> Box<dyn Bundle> {
        Box::new(MarkVoted {
            election_id: eligibility.election.election_id.clone(),
            voter_hash: eligibility.voter_hash.clone(),
        })
    }
}

struct MarkVoted {
    election_id: String,
    voter_hash: String,
}

#[async_trait]
impl Bundle for MarkVoted {
    async fn apply(&self, conn: &mut SqliteConnection) -> Result<()> {
        if !RegisteredVoterRecord::mark_voted(conn, &self.election_id, &self.voter_hash).await? {
            return Err(Error::DuplicateVote);
        }
        Ok(())
    }
}
