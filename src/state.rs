//! Shared application state for all routes.

use crate::rocrate::{CrateManager, FsCrateManager};
use crate::rocrate::rclone::Rclone;
use crate::service::EntityService;
use crate::store::{EntityStore, SessionStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub entities: EntityService,
    pub sessions: Arc<dyn SessionStore>,
    pub crates: Arc<dyn CrateManager>,
}

impl AppState {
    pub fn new(
        entities: Arc<dyn EntityStore>,
        sessions: Arc<dyn SessionStore>,
        crates: Arc<dyn CrateManager>,
    ) -> Self {
        AppState {
            entities: EntityService::new(entities),
            sessions,
            crates,
        }
    }

    /// State over one store implementing both contracts, saving crates to the filesystem.
    pub fn with_store<S>(store: Arc<S>, rclone: Rclone) -> Self
    where
        S: EntityStore + SessionStore + 'static,
    {
        let crates = Arc::new(FsCrateManager::new(store.clone(), rclone));
        AppState::new(store.clone(), store, crates)
    }
}
