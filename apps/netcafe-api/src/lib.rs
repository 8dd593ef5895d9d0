pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod sessions;
pub mod storage;
pub mod validation;

use std::sync::Arc;

use config::Config;
use db::kv::KeyValueStore;
use db::pool::DbPool;
use realtime::fanout::RealtimeBroadcast;
use realtime::registry::ConnectionRegistry;
use storage::ObjectStore;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub kv: Arc<dyn KeyValueStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub config: Arc<Config>,
    pub broadcast: Arc<RealtimeBroadcast>,
    pub connections: Arc<ConnectionRegistry>,
}
