use std::sync::Arc;

use crate::config::Config;
use crate::history::HistoryQueue;
use crate::llm::CompletionProvider;
use crate::session::SessionStore;
use crate::store::FarmStore;

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn FarmStore>,
    /// `None` when no provider API key is configured.
    pub provider: Option<Arc<dyn CompletionProvider>>,
    pub sessions: Arc<SessionStore>,
    pub history: HistoryQueue,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn FarmStore>,
        provider: Option<Arc<dyn CompletionProvider>>,
        history: HistoryQueue,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session_ttl));
        Self {
            config: Arc::new(config),
            store,
            provider,
            sessions,
            history,
        }
    }
}
