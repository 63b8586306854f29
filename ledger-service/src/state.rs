//! Shared application state

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cast::CastOrchestrator;
use crate::config::Config;
use crate::database::Database;
use crate::fanout::spawn_fanout_worker;
use crate::hub::{BroadcastHub, InProcessBroadcaster};
use crate::ledger::LedgerStore;
use crate::registry::{SqlVoterRegistry, VoterRegistry};
use crate::seed::load_seed_file;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<LedgerStore>,
    pub registry: Arc<dyn VoterRegistry>,
    pub hub: Arc<BroadcastHub>,
    pub orchestrator: Arc<CastOrchestrator>,
}

impl AppState {
    /// Opens the database, applies the seed fixture and starts the fan-out
    /// worker. The worker stops once the returned state is dropped.
    pub async fn initialize(config: Config) -> Result<(Self, JoinHandle<()>)> {
        let db = Database::connect(&config.db_path, config.db_max_connections).await?;
        let pool = db.pool().clone();

        if let Some(seed_path) = &config.seed_path {
            let summary = load_seed_file(&pool, seed_path).await?;
            info!(
                "Seed applied: {} elections, {} new voters",
                summary.elections, summary.voters_registered
            );
        }

        let store = Arc::new(LedgerStore::new(pool.clone(), config.append_max_retries));
        let registry: Arc<dyn VoterRegistry> = Arc::new(SqlVoterRegistry::new(pool));
        let hub = Arc::new(BroadcastHub::new(
            Arc::new(InProcessBroadcaster::new()),
            store.clone(),
            config.session_buffer,
        ));
        let (fanout, worker) = spawn_fanout_worker(hub.clone(), config.fanout_queue);
        let orchestrator = Arc::new(CastOrchestrator::new(
            registry.clone(),
            store.clone(),
            fanout,
        ));

        let state = AppState {
            config: Arc::new(config),
            store,
            registry,
            hub,
            orchestrator,
        };
        Ok((state, worker))
    }
}
