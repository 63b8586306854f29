//! Per-election subscriber groups and snapshot fan-out

pub mod broadcaster;
pub mod session;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use broadcaster::{Broadcaster, InProcessBroadcaster};
pub use session::{SequencedSnapshot, Session, SessionId, SessionState};

use crate::error::{Error, Result};
use crate::metrics;

/// Computes the current dashboard snapshot of an election.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// `NotFound` when the election does not exist.
    async fn snapshot(&self, election_id: &str) -> Result<SequencedSnapshot>;
}

pub struct BroadcastHub {
    broadcaster: Arc<dyn Broadcaster>,
    source: Arc<dyn SnapshotSource>,
    session_buffer: usize,
    next_session: AtomicU64,
}

impl BroadcastHub {
    pub fn new(
        broadcaster: Arc<dyn Broadcaster>,
        source: Arc<dyn SnapshotSource>,
        session_buffer: usize,
    ) -> Self {
        Self {
            broadcaster,
            source,
            session_buffer,
            next_session: AtomicU64::new(1),
        }
    }

    /// A fresh session in `Connecting` state.
    pub fn open_session(&self) -> Session {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        Session::new(id, self.session_buffer)
    }

    /// Joins the election's group and hands this session one current
    /// snapshot before returning. Unknown elections close the session.
    pub async fn subscribe(&self, election_id: &str, session: &mut Session) -> Result<()> {
        let Some(handle) = session.take_handle() else {
            return Err(Error::Broadcast {
                session: session.id(),
                reason: "session already subscribed or closed".into(),
            });
        };

        // Join before computing so no change between the two is missed;
        // anything older than the initial snapshot is discarded by sequence.
        self.broadcaster.subscribe(election_id, handle);
        let initial = match self.source.snapshot(election_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.broadcaster.unsubscribe(session.id());
                session.close();
                return Err(err);
            }
        };

        if let Err(err) = self
            .broadcaster
            .send_to(session.id(), Arc::new(initial))
            .await
        {
            self.broadcaster.unsubscribe(session.id());
            session.close();
            return Err(err);
        }

        session.mark_subscribed();
        metrics::record_session_opened();
        info!(
            "Session {} subscribed to {} ({} in group)",
            session.id(),
            election_id,
            self.broadcaster.group_size(election_id)
        );
        Ok(())
    }

    /// Idempotent.
    pub fn unsubscribe(&self, session: &mut Session) {
        let was_subscribed = session.state() == SessionState::Subscribed;
        self.broadcaster.unsubscribe(session.id());
        session.close();
        if was_subscribed {
            metrics::record_session_closed();
            debug!("Session {} unsubscribed", session.id());
        }
    }

    /// Best-effort delivery to the election's group. Per-session failures are
    /// logged and counted, never returned.
    pub async fn publish(&self, election_id: &str, snapshot: SequencedSnapshot) {
        let sequence = snapshot.sequence;
        let failures = self
            .broadcaster
            .publish(election_id, Arc::new(snapshot))
            .await;
        for failure in &failures {
            metrics::record_broadcast_failure();
            warn!("Dashboard update for {} dropped: {}", election_id, failure);
        }
        debug!(
            "Published snapshot {} of {} ({} failed deliveries)",
            sequence,
            election_id,
            failures.len()
        );
    }

    /// Recomputes the election's snapshot and publishes it.
    pub async fn publish_latest(&self, election_id: &str) -> Result<()> {
        let snapshot = self.source.snapshot(election_id).await?;
        self.publish(election_id, snapshot).await;
        Ok(())
    }

    pub async fn snapshot_for(&self, election_id: &str) -> Result<SequencedSnapshot> {
        self.source.snapshot(election_id).await
    }

    pub fn session_count(&self) -> usize {
        self.broadcaster.session_count()
    }
}
