//! Append-only, hash-linked ledger store with per-election write serialization

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use votechain_cli::{
    hash::now, verify_chain, BallotData, ChainFault, ChainLink, ChainReport, LedgerEntry, Snapshot,
};

use crate::database::models::{ElectionRecord, LedgerRow};
use crate::error::{Error, Result};
use crate::hub::{SequencedSnapshot, SnapshotSource};
use crate::metrics;

/// State change committed in the same transaction as a ledger append.
/// Any error rolls the append back.
#[async_trait]
pub trait Bundle: Send + Sync {
    async fn apply(&self, conn: &mut SqliteConnection) -> Result<()>;
}

/// Append with nothing bundled.
pub struct NoBundle;

#[async_trait]
impl Bundle for NoBundle {
    async fn apply(&self, _conn: &mut SqliteConnection) -> Result<()> {
        Ok(())
    }
}

/// One async mutex per election, created on first use.
#[derive(Default)]
struct ChainLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ChainLocks {
    fn for_election(&self, election_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(election_id.to_string())
            .or_default()
            .clone()
    }
}

pub struct LedgerStore {
    pool: SqlitePool,
    locks: ChainLocks,
    max_retries: u32,
}

impl LedgerStore {
    pub fn new(pool: SqlitePool, max_retries: u32) -> Self {
        Self {
            pool,
            locks: ChainLocks::default(),
            max_retries,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn append(&self, election_id: &str, ballot_data: BallotData) -> Result<LedgerEntry> {
        self.append_bundled(election_id, ballot_data, &NoBundle).await
    }

    /// Links `ballot_data` onto the election's tail and commits it together
    /// with `bundle`. Holds the election's lock from tail read to commit; a
    /// tail that still moved (another process) is retried up to the configured
    /// count before surfacing `ConcurrencyConflict`.
    pub async fn append_bundled<B: Bundle + ?Sized>(
        &self,
        election_id: &str,
        ballot_data: BallotData,
        bundle: &B,
    ) -> Result<LedgerEntry> {
        let lock = self.locks.for_election(election_id);
        let _guard = lock.lock().await;

        let mut attempt = 0;
        loop {
            match self.try_append(election_id, &ballot_data, bundle).await {
                Err(Error::ConcurrencyConflict(_)) if attempt < self.max_retries => {
                    attempt += 1;
                    metrics::record_append_conflict();
                    warn!(
                        "Chain tail for {} moved, retrying append ({}/{})",
                        election_id, attempt, self.max_retries
                    );
                }
                result => return result,
            }
        }
    }

    async fn try_append<B: Bundle + ?Sized>(
        &self,
        election_id: &str,
        ballot_data: &BallotData,
        bundle: &B,
    ) -> Result<LedgerEntry> {
        let mut tx = self.pool.begin().await?;
        LedgerRow::reserve_writer(&mut *tx, election_id)
            .await
            .map_err(|e| classify_insert_error(e, election_id))?;

        let tail = match LedgerRow::tail(&mut *tx, election_id).await? {
            Some(row) => Some(row.into_entry()?),
            None => None,
        };

        // Strictly after the tail even if the wall clock stepped back
        let mut timestamp = now();
        if let Some(tail) = &tail {
            if timestamp <= *tail.timestamp() {
                timestamp = *tail.timestamp() + Duration::microseconds(1);
            }
        }

        let link = ChainLink::seal(
            election_id,
            ballot_data.clone(),
            timestamp,
            tail.as_ref().map(LedgerEntry::current_hash),
        );
        let vote_id = LedgerRow::insert(&mut *tx, &link)
            .await
            .map_err(|e| classify_insert_error(e, election_id))?;

        bundle.apply(&mut *tx).await?;

        tx.commit()
            .await
            .map_err(|e| classify_insert_error(e, election_id))?;

        debug!(
            "Appended vote {} to {} ({})",
            vote_id,
            election_id,
            link.current_hash()
        );
        Ok(link.recorded(vote_id))
    }

    pub async fn list_entries(&self, election_id: &str) -> Result<Vec<LedgerEntry>> {
        LedgerRow::list(&self.pool, election_id)
            .await?
            .into_iter()
            .map(|row| row.into_entry().map_err(Error::from))
            .collect()
    }

    pub async fn verify_chain(&self, election_id: &str) -> Result<bool> {
        Ok(self.verify_report(election_id).await?.valid)
    }

    /// Replays the chain and checks `current_hash` uniqueness across all
    /// elections. Findings are logged and counted, never returned as errors.
    pub async fn verify_report(&self, election_id: &str) -> Result<ChainReport> {
        let entries = self.list_entries(election_id).await?;
        let mut report = verify_chain(election_id, &entries);

        if report.valid {
            if let Some((vote_id, hash)) =
                LedgerRow::first_shared_hash(&self.pool, election_id).await?
            {
                report = ChainReport {
                    total_entries: report.total_entries,
                    valid: false,
                    first_invalid_entry: Some(vote_id),
                    fault: Some(ChainFault::DuplicateHash(hash)),
                };
            }
        }

        if report.valid {
            info!(
                "Chain for {} verified ({} entries)",
                election_id, report.total_entries
            );
        } else {
            metrics::record_integrity_finding();
            warn!(
                "Chain for {} failed verification at vote {:?}: {}",
                election_id,
                report.first_invalid_entry,
                report
                    .fault
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            );
        }
        Ok(report)
    }
}

#[async_trait]
impl SnapshotSource for LedgerStore {
    async fn snapshot(&self, election_id: &str) -> Result<SequencedSnapshot> {
        let election = ElectionRecord::get(&self.pool, election_id)
            .await?
            .ok_or_else(|| Error::election_not_found(election_id))?;
        let schema = election.schema()?;
        let entries = self.list_entries(election_id).await?;
        Ok(SequencedSnapshot::new(Snapshot::build(&schema, &entries)))
    }
}

/// SQLITE_BUSY and SQLITE_LOCKED, including their extended codes
fn is_busy(db_err: &dyn sqlx::error::DatabaseError) -> bool {
    db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, 5 | 6))
}

fn classify_insert_error(err: sqlx::Error, election_id: &str) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() || is_busy(db_err.as_ref()) => {
            Error::ConcurrencyConflict(election_id.to_string())
        }
        _ => Error::Persistence(err),
    }
}
