use crate::config::AppConfig;
use crate::events::EventBus;
use crate::store::EntityStore;
use std::sync::Arc;

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<EntityStore>,
    pub events: Arc<EventBus>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            events: Arc::clone(&self.events),
        }
    }
}
