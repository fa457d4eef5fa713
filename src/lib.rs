//! describo-api: entity and crate editing REST backend.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod model;
pub mod response;
pub mod rocrate;
pub mod routes;
pub mod service;
pub mod session;
pub mod state;
pub mod store;

pub use config::ServerConfig;
pub use error::{AppError, ConfigError, CrateError, StoreError};
pub use rocrate::{rclone::Rclone, CrateAction, CrateManager, FsCrateManager, SaveCrate};
pub use routes::{app_router, common_routes, entity_routes, onedrive_routes};
pub use service::EntityService;
pub use state::AppState;
pub use store::{ensure_database_exists, ensure_tables, EntityStore, MemoryStore, PgStore, SessionStore};
