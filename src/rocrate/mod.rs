//! Crate (RO-Crate JSON-LD document) maintenance: apply entity changes to the crate of the
//! current collection and save it back to its target.

pub mod graph;
pub mod manager;
pub mod rclone;

use crate::error::CrateError;
use crate::model::Entity;
use crate::session::{Session, User};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

pub use manager::FsCrateManager;

/// File name of the crate metadata document in a crate root.
pub const CRATE_METADATA_FILE: &str = "ro-crate-metadata.json";

/// A change to replay on the crate.
#[derive(Clone, Debug, PartialEq)]
pub enum CrateAction {
    Insert(Entity),
    /// Re-render the entity with this id from the store.
    Update(Uuid),
    /// The entity's `@id` changed; references to it follow.
    Rename { from: String, to: String },
    Remove(Entity),
}

impl CrateAction {
    pub fn name(&self) -> &'static str {
        match self {
            CrateAction::Insert(_) => "insert",
            CrateAction::Update(_) => "update",
            CrateAction::Rename { .. } => "rename",
            CrateAction::Remove(_) => "remove",
        }
    }
}

pub struct SaveCrate<'a> {
    pub session: &'a Session,
    pub user: &'a User,
    pub resource: Option<&'a str>,
    pub parent: Option<&'a str>,
    pub local_file: Option<&'a Path>,
    pub crate_doc: Value,
}

#[async_trait]
pub trait CrateManager: Send + Sync {
    /// Exclusive access to one crate file, held across `update_crate` and `save_crate`.
    async fn lock_crate(&self, local_crate_file: &Path) -> OwnedMutexGuard<()>;

    /// Load the local crate and apply `actions`, returning the updated document.
    async fn update_crate(
        &self,
        local_crate_file: Option<&Path>,
        collection_id: Uuid,
        actions: &[CrateAction],
    ) -> Result<Value, CrateError>;

    /// Persist the document locally and push it to the session's remote target.
    async fn save_crate(&self, request: SaveCrate<'_>) -> Result<PathBuf, CrateError>;
}
