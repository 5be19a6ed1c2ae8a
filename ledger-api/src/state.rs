//! Shared application state for the ledger server.

use std::sync::Arc;

use actions::{Engine, TopicBroker};

use crate::config::ApiConfig;
use crate::ledger::LedgerStore;
use crate::ledgers::LedgerEnv;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Topic broker shared by the engine and the ingester.
    pub broker: Arc<TopicBroker>,
    pub store: Arc<LedgerStore>,
    pub ledgers: Arc<LedgerEnv>,
}

impl AppState {
    pub fn new(config: &ApiConfig) -> Self {
        let broker = Arc::new(TopicBroker::new());
        let store = Arc::new(LedgerStore::new(config.ledger.retention));
        let engine = Arc::new(Engine::new(broker.clone(), config.stream_config()));
        let ledgers = Arc::new(LedgerEnv {
            history: store.clone(),
            base_url: config.base_url().to_string(),
            stale_threshold: config.stale_threshold(),
        });
        Self {
            engine,
            broker,
            store,
            ledgers,
        }
    }
}
