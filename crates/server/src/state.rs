//! Application state shared across request handlers.

use std::sync::Arc;

use crate::{config::Config, store::Store, token::TokenKeys, ws::ChatHub};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub tokens: TokenKeys,
    pub hub: ChatHub,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        Self {
            store,
            tokens: TokenKeys::new(&config.jwt_secret, config.token_ttl_hours),
            hub: ChatHub::default(),
            config: Arc::new(config),
        }
    }
}
