use chrono::Utc;
use sqlx::{Error as SqlxError, Result, SqliteExecutor};
use tracing::debug;
use votechain_cli::{
    canonical_ballot, format_timestamp, hash::parse_timestamp, BallotData, BallotSchema, ChainLink,
    LedgerEntry,
};

use super::models::*;
use super::sql::SELECT_LEDGER_COLUMNS;

/// Database operations for elections
impl ElectionRecord {
    /// Insert, or refresh `name`/`is_active` of an existing election. The
    /// ballot schema of an existing election is never replaced.
    pub async fn upsert<'e, E: SqliteExecutor<'e>>(&self, executor: E) -> Result<()> {
        debug!("Upserting election {}", self.election_id);

        sqlx::query(
            "INSERT INTO elections (election_id, name, is_active, positions_json, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(election_id) DO UPDATE SET name = excluded.name, is_active = excluded.is_active",
        )
        .bind(&self.election_id)
        .bind(&self.name)
        .bind(self.is_active)
        .bind(&self.positions_json)
        .bind(Utc::now().to_rfc3339())
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn get<'e, E: SqliteExecutor<'e>>(
        executor: E,
        election_id: &str,
    ) -> Result<Option<ElectionRecord>> {
        sqlx::query_as(
            "SELECT election_id, name, is_active, positions_json FROM elections WHERE election_id = ?",
        )
        .bind(election_id)
        .fetch_optional(executor)
        .await
    }

    /// Parse the stored ballot schema
    pub fn schema(&self) -> Result<BallotSchema> {
        BallotSchema::from_json(&self.positions_json).map_err(|e| SqlxError::Decode(e.into()))
    }
}

/// Database operations for registered voters
impl RegisteredVoterRecord {
    /// Returns false if the voter was already registered.
    pub async fn register<'e, E: SqliteExecutor<'e>>(
        executor: E,
        election_id: &str,
        voter_hash: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO registered_voters (election_id, voter_hash, has_voted)
             VALUES (?, ?, 0)",
        )
        .bind(election_id)
        .bind(voter_hash)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get<'e, E: SqliteExecutor<'e>>(
        executor: E,
        election_id: &str,
        voter_hash: &str,
    ) -> Result<Option<RegisteredVoterRecord>> {
        sqlx::query_as(
            "SELECT election_id, voter_hash, has_voted FROM registered_voters
             WHERE election_id = ? AND voter_hash = ?",
        )
        .bind(election_id)
        .bind(voter_hash)
        .fetch_optional(executor)
        .await
    }

    /// Flip `has_voted` from 0 to 1. Returns false when no unconsumed row
    /// matched, i.e. the voter already voted or is not registered.
    pub async fn mark_voted<'e, E: SqliteExecutor<'e>>(
        executor: E,
        election_id: &str,
        voter_hash: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE registered_voters SET has_voted = 1
             WHERE election_id = ? AND voter_hash = ? AND has_voted = 0",
        )
        .bind(election_id)
        .bind(voter_hash)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

/// Database operations for the vote ledger
impl LedgerRow {
    /// Persist a sealed link and return its assigned `vote_id`
    pub async fn insert<'e, E: SqliteExecutor<'e>>(executor: E, link: &ChainLink) -> Result<i64> {
        debug!(
            "Inserting ledger entry {} for {}",
            link.current_hash(),
            link.election_id()
        );

        let result = sqlx::query(
            "INSERT INTO vote_ledger (election_id, ballot_data, timestamp, previous_hash, current_hash)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(link.election_id())
        .bind(canonical_ballot(link.ballot_data()))
        .bind(format_timestamp(link.timestamp()))
        .bind(link.previous_hash())
        .bind(link.current_hash())
        .execute(executor)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Takes the database write lock for the enclosing transaction. A
    /// deferred transaction that reads before writing cannot upgrade once
    /// another connection commits, so appends write first.
    pub async fn reserve_writer<'e, E: SqliteExecutor<'e>>(
        executor: E,
        election_id: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE elections SET name = name WHERE election_id = ?")
            .bind(election_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Latest entry of an election's chain
    pub async fn tail<'e, E: SqliteExecutor<'e>>(
        executor: E,
        election_id: &str,
    ) -> Result<Option<LedgerRow>> {
        let sql = format!(
            "{} WHERE election_id = ? ORDER BY timestamp DESC, vote_id DESC LIMIT 1",
            SELECT_LEDGER_COLUMNS
        );
        sqlx::query_as(&sql)
            .bind(election_id)
            .fetch_optional(executor)
            .await
    }

    /// Whole chain, timestamp ascending with `vote_id` breaking ties
    pub async fn list<'e, E: SqliteExecutor<'e>>(
        executor: E,
        election_id: &str,
    ) -> Result<Vec<LedgerRow>> {
        let sql = format!(
            "{} WHERE election_id = ? ORDER BY timestamp ASC, vote_id ASC",
            SELECT_LEDGER_COLUMNS
        );
        sqlx::query_as(&sql)
            .bind(election_id)
            .fetch_all(executor)
            .await
    }

    /// First entry of this election whose `current_hash` also appears on any
    /// other row, in any election.
    pub async fn first_shared_hash<'e, E: SqliteExecutor<'e>>(
        executor: E,
        election_id: &str,
    ) -> Result<Option<(i64, String)>> {
        sqlx::query_as(
            "SELECT l.vote_id, l.current_hash FROM vote_ledger l
             WHERE l.election_id = ?
               AND EXISTS (SELECT 1 FROM vote_ledger o
                           WHERE o.current_hash = l.current_hash AND o.vote_id != l.vote_id)
             ORDER BY l.timestamp ASC, l.vote_id ASC LIMIT 1",
        )
        .bind(election_id)
        .fetch_optional(executor)
        .await
    }

    /// Decode the stored JSON and timestamp. The hash is not recomputed.
    pub fn into_entry(self) -> Result<LedgerEntry> {
        let ballot_data: BallotData =
            serde_json::from_str(&self.ballot_data).map_err(|e| SqlxError::Decode(e.into()))?;
        let timestamp =
            parse_timestamp(&self.timestamp).map_err(|e| SqlxError::Decode(e.into()))?;
        Ok(LedgerEntry::from_stored(
            self.vote_id,
            self.election_id,
            ballot_data,
            timestamp,
            self.previous_hash,
            self.current_hash,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use votechain_cli::hash::now;

    async fn setup() -> Database {
        let db = Database::connect(":memory:", 1).await.unwrap();
        ElectionRecord {
            election_id: "e1".into(),
            name: "Election One".into(),
            is_active: true,
            positions_json: r#"{"President":["Alice","Bob"]}"#.into(),
        }
        .upsert(db.pool())
        .await
        .unwrap();
        db
    }

    fn ballot(candidate: &str) -> BallotData {
        BallotData::from([("President".to_string(), candidate.to_string())])
    }

    #[tokio::test]
    async fn test_election_upsert_keeps_schema() {
        let db = setup().await;
        ElectionRecord {
            election_id: "e1".into(),
            name: "Election One".into(),
            is_active: false,
            positions_json: r#"{"Mayor":["Zed"]}"#.into(),
        }
        .upsert(db.pool())
        .await
        .unwrap();

        let stored = ElectionRecord::get(db.pool(), "e1").await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.positions_json, r#"{"President":["Alice","Bob"]}"#);
        assert!(ElectionRecord::get(db.pool(), "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_voted_only_once() {
        let db = setup().await;
        assert!(RegisteredVoterRecord::register(db.pool(), "e1", "h1").await.unwrap());
        assert!(!RegisteredVoterRecord::register(db.pool(), "e1", "h1").await.unwrap());

        assert!(RegisteredVoterRecord::mark_voted(db.pool(), "e1", "h1").await.unwrap());
        assert!(!RegisteredVoterRecord::mark_voted(db.pool(), "e1", "h1").await.unwrap());
        assert!(!RegisteredVoterRecord::mark_voted(db.pool(), "e1", "h2").await.unwrap());

        let voter = RegisteredVoterRecord::get(db.pool(), "e1", "h1")
            .await
            .unwrap()
            .unwrap();
        assert!(voter.has_voted);
    }

    #[tokio::test]
    async fn test_insert_and_read_back_entries() {
        let db = setup().await;
        let first = ChainLink::seal("e1", ballot("Alice"), now(), None);
        let first_id = LedgerRow::insert(db.pool(), &first).await.unwrap();
        let second = ChainLink::seal(
            "e1",
            ballot("Bob"),
            *first.timestamp() + chrono::Duration::microseconds(1),
            Some(first.current_hash()),
        );
        LedgerRow::insert(db.pool(), &second).await.unwrap();

        let tail = LedgerRow::tail(db.pool(), "e1").await.unwrap().unwrap();
        assert_eq!(tail.current_hash, second.current_hash());

        let rows = LedgerRow::list(db.pool(), "e1").await.unwrap();
        assert_eq!(rows.len(), 2);
        let entry = rows[0].clone().into_entry().unwrap();
        assert_eq!(entry, first.recorded(first_id));
    }

    #[tokio::test]
    async fn test_second_child_of_a_link_is_rejected() {
        let db = setup().await;
        let genesis = ChainLink::seal("e1", ballot("Alice"), now(), None);
        LedgerRow::insert(db.pool(), &genesis).await.unwrap();

        let sibling = ChainLink::seal(
            "e1",
            ballot("Bob"),
            *genesis.timestamp() + chrono::Duration::seconds(1),
            None,
        );
        let err = LedgerRow::insert(db.pool(), &sibling).await.unwrap_err();
        match err {
            SqlxError::Database(db_err) => assert!(db_err.is_unique_violation()),
            other => panic!("expected unique violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ledger_rows_cannot_be_rewritten() {
        let db = setup().await;
        let genesis = ChainLink::seal("e1", ballot("Alice"), now(), None);
        LedgerRow::insert(db.pool(), &genesis).await.unwrap();

        assert!(sqlx::query("UPDATE vote_ledger SET ballot_data = '{}'")
            .execute(db.pool())
            .await
            .is_err());
        assert!(sqlx::query("DELETE FROM vote_ledger")
            .execute(db.pool())
            .await
            .is_err());
    }
}
