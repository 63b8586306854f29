pub mod api;
pub mod auth_middleware;
pub mod cast;
pub mod config;
pub mod database;
pub mod error;
pub mod fanout;
pub mod hub;
pub mod ledger;
pub mod metrics;
pub mod registry;
pub mod seed;
pub mod state;
pub mod types;
pub mod utils;
