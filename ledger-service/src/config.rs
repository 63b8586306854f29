//! Service configuration read from the environment

use std::path::PathBuf;

use crate::database::constants::DEFAULT_DB_PATH;
use crate::utils::{env_opt, env_parse};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_APPEND_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SESSION_BUFFER: usize = 32;
pub const DEFAULT_FANOUT_QUEUE: usize = 1024;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub port: u16,
    /// Extra attempts after an append loses a race for the chain tail
    pub append_max_retries: u32,
    /// Per-session outbound buffer, in snapshots
    pub session_buffer: usize,
    pub fanout_queue: usize,
    pub db_max_connections: u32,
    /// Required `x-api-key` for `/vote/*` when set
    pub terminal_api_key: Option<String>,
    /// Required bearer token for `/metrics` when set
    pub metrics_auth_token: Option<String>,
    pub seed_path: Option<PathBuf>,
    pub cors_allow_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: env_opt("DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            port: env_parse("PORT", DEFAULT_PORT),
            append_max_retries: env_parse("APPEND_MAX_RETRIES", DEFAULT_APPEND_MAX_RETRIES),
            session_buffer: env_parse("SESSION_BUFFER", DEFAULT_SESSION_BUFFER).max(1),
            fanout_queue: env_parse("FANOUT_QUEUE", DEFAULT_FANOUT_QUEUE).max(1),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS).max(1),
            terminal_api_key: env_opt("TERMINAL_API_KEY"),
            metrics_auth_token: env_opt("METRICS_AUTH_TOKEN"),
            seed_path: env_opt("SEED_PATH").map(PathBuf::from),
            cors_allow_origin: env_opt("CORS_ALLOW_ORIGIN"),
        }
    }

    /// Defaults against an in-memory database, with no keys configured.
    pub fn in_memory() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            port: DEFAULT_PORT,
            append_max_retries: DEFAULT_APPEND_MAX_RETRIES,
            session_buffer: DEFAULT_SESSION_BUFFER,
            fanout_queue: DEFAULT_FANOUT_QUEUE,
            db_max_connections: 1,
            terminal_api_key: None,
            metrics_auth_token: None,
            seed_path: None,
            cors_allow_origin: None,
        }
    }
}
