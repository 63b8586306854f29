//! One vote-casting request, end to end

use std::sync::Arc;

use tracing::info;
use votechain_cli::{BallotData, LedgerEntry, SchemaError};

use crate::error::{Error, Result};
use crate::fanout::FanoutSender;
use crate::ledger::LedgerStore;
use crate::metrics::{self, CastOutcome};
use crate::registry::VoterRegistry;
use crate::utils::validate_election_id;

pub struct CastOrchestrator {
    registry: Arc<dyn VoterRegistry>,
    store: Arc<LedgerStore>,
    fanout: FanoutSender,
}

impl CastOrchestrator {
    pub fn new(registry: Arc<dyn VoterRegistry>, store: Arc<LedgerStore>, fanout: FanoutSender) -> Self {
        Self {
            registry,
            store,
            fanout,
        }
    }

    /// Checks request shape and eligibility before the ballot itself, then
    /// appends the ballot and consumes the voter in one transaction. Dashboard refresh is queued after commit and
    /// cannot fail the cast.
    pub async fn cast_vote(
        &self,
        election_id: &str,
        voter_credential: &str,
        ballot_data: BallotData,
    ) -> Result<LedgerEntry> {
        let result = self.try_cast(election_id, voter_credential, ballot_data).await;
        metrics::record_cast_outcome(CastOutcome::of(&result));
        result
    }

    async fn try_cast(
        &self,
        election_id: &str,
        voter_credential: &str,
        ballot_data: BallotData,
    ) -> Result<LedgerEntry> {
        validate_request(election_id, voter_credential)?;
        if ballot_data.is_empty() {
            return Err(SchemaError::EmptyBallot.into());
        }

        // A consumed or unknown voter is reported as such, whatever the ballot
        let eligibility = self
            .registry
            .check_eligibility(election_id, voter_credential)
            .await?;
        eligibility.schema.validate_ballot(&ballot_data)?;

        let consume = self.registry.consume(&eligibility);

        let entry = self
            .store
            .append_bundled(election_id, ballot_data, consume.as_ref())
            .await?;
        info!(
            "Vote {} recorded for {} ({})",
            entry.vote_id(),
            election_id,
            entry.current_hash()
        );

        self.fanout.notify(election_id);
        Ok(entry)
    }

    /// Read-only pre-check with the same failures as a cast, minus ballot checks.
    pub async fn check_status(&self, election_id: &str, voter_credential: &str) -> Result<()> {
        validate_request(election_id, voter_credential)?;
        self.registry
            .check_eligibility(election_id, voter_credential)
            .await?;
        Ok(())
    }
}

fn validate_request(election_id: &str, voter_credential: &str) -> Result<()> {
    validate_election_id(election_id)?;
    if voter_credential.trim().is_empty() {
        return Err(Error::Validation("voter_credential must not be empty".into()));
    }
    Ok(())
}
