pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use auth::tokens::TokenKeys;
use config::Config;
use db::memory::MemoryDb;
use db::users::UserStore;
use gateway::fanout::Dispatcher;
use gateway::registry::ConnectionRegistry;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<MemoryDb>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<TokenKeys>,
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionRegistry>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    /// Build state with empty tables and no live connections.
    pub fn new(config: Config) -> Self {
        let db = Arc::new(MemoryDb::new());
        let connections = Arc::new(ConnectionRegistry::new());
        Self {
            users: db.clone(),
            db,
            tokens: Arc::new(TokenKeys::new(
                &config.jwt_secret,
                config.access_token_expire_minutes,
            )),
            config: Arc::new(config),
            dispatcher: Dispatcher::new(connections.clone()),
            connections,
        }
    }
}
