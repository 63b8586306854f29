//! Queue between committed casts and dashboard publication

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hub::BroadcastHub;
use crate::metrics;

/// An election's chain grew by at least one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainAdvanced {
    pub election_id: String,
}

#[derive(Clone)]
pub struct FanoutSender {
    tx: mpsc::Sender<ChainAdvanced>,
}

impl FanoutSender {
    /// Never blocks; a full or closed queue only costs a dashboard refresh.
    pub fn notify(&self, election_id: &str) {
        let message = ChainAdvanced {
            election_id: election_id.to_string(),
        };
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                metrics::record_broadcast_failure();
                warn!("Fan-out queue full, dropped update for {}", msg.election_id);
            }
            Err(TrySendError::Closed(msg)) => {
                metrics::record_broadcast_failure();
                warn!("Fan-out worker stopped, dropped update for {}", msg.election_id);
            }
        }
    }
}

/// Starts the worker. It exits once every `FanoutSender` is dropped.
pub fn spawn_fanout_worker(hub: Arc<BroadcastHub>, capacity: usize) -> (FanoutSender, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(run(hub, rx));
    (FanoutSender { tx }, handle)
}

async fn run(hub: Arc<BroadcastHub>, mut rx: mpsc::Receiver<ChainAdvanced>) {
    info!("Fan-out worker started");
    while let Some(first) = rx.recv().await {
        // Snapshots carry full state, so queued duplicates collapse into one
        let mut pending = BTreeSet::from([first.election_id]);
        while let Ok(next) = rx.try_recv() {
            pending.insert(next.election_id);
        }

        for election_id in pending {
            if let Err(err) = hub.publish_latest(&election_id).await {
                metrics::record_broadcast_failure();
                warn!("Could not refresh dashboard for {}: {}", election_id, err);
            } else {
                debug!("Dashboard refreshed for {}", election_id);
            }
        }
    }
    info!("Fan-out worker stopped");
}
