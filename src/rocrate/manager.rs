//! Filesystem-backed crate manager.

use super::graph::{empty_crate, push_value, remove_node, rename_node, upsert_node};
use super::rclone::Rclone;
use super::{CrateAction, CrateManager, SaveCrate, CRATE_METADATA_FILE};
use crate::error::{CrateError, StoreError};
use crate::model::Entity;
use crate::store::EntityStore;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Remote name used for OneDrive targets, both as `resource` and as rclone remote.
pub const ONEDRIVE: &str = "onedrive";

pub struct FsCrateManager {
    store: Arc<dyn EntityStore>,
    rclone: Rclone,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FsCrateManager {
    pub fn new(store: Arc<dyn EntityStore>, rclone: Rclone) -> Self {
        FsCrateManager {
            store,
            rclone,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn load(path: &Path) -> Result<Value, CrateError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let doc: Value = serde_json::from_slice(&bytes)?;
                if !doc.get("@graph").map(Value::is_array).unwrap_or(false) {
                    return Err(CrateError::Malformed(format!("{} has no @graph", path.display())));
                }
                Ok(doc)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(empty_crate()),
            Err(e) => Err(e.into()),
        }
    }

    /// JSON-LD node for an entity and its current properties.
    async fn render(&self, collection_id: Uuid, entity: &Entity) -> Result<Value, CrateError> {
        let mut node = Map::new();
        node.insert("@id".into(), json!(entity.eid));
        node.insert("@type".into(), json!(entity.etype));
        if let Some(name) = &entity.name {
            node.insert("name".into(), json!(name));
        }
        for property in self.store.entity_properties(collection_id, entity.id).await? {
            let value = match property.tgt_entity_id {
                Some(tgt) => {
                    let target = self.store.get_entity(collection_id, tgt).await?;
                    json!({ "@id": target.eid })
                }
                None => json!(property.value.unwrap_or_default()),
            };
            push_value(&mut node, &property.name, value);
        }
        Ok(Value::Object(node))
    }

    async fn apply(&self, doc: &mut Value, collection_id: Uuid, action: &CrateAction) -> Result<(), CrateError> {
        match action {
            CrateAction::Insert(entity) => {
                let node = self.render(collection_id, entity).await?;
                upsert_node(doc, node)
            }
            CrateAction::Update(id) => match self.store.get_entity(collection_id, *id).await {
                Ok(entity) => {
                    let node = self.render(collection_id, &entity).await?;
                    upsert_node(doc, node)
                }
                Err(StoreError::NotFound(_)) => {
                    tracing::warn!(%id, "entity vanished before crate update, skipping");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            CrateAction::Rename { from, to } => rename_node(doc, from, to),
            CrateAction::Remove(entity) => remove_node(doc, &entity.eid),
        }
    }
}

#[async_trait]
impl CrateManager for FsCrateManager {
    async fn lock_crate(&self, local_crate_file: &Path) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .await
            .entry(local_crate_file.to_path_buf())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    async fn update_crate(
        &self,
        local_crate_file: Option<&Path>,
        collection_id: Uuid,
        actions: &[CrateAction],
    ) -> Result<Value, CrateError> {
        let path = local_crate_file.ok_or(CrateError::NoLocalCrate)?;
        let mut doc = Self::load(path).await?;
        for action in actions {
            tracing::debug!(action = action.name(), %collection_id, "applying crate action");
            self.apply(&mut doc, collection_id, action).await?;
        }
        Ok(doc)
    }

    async fn save_crate(&self, request: SaveCrate<'_>) -> Result<PathBuf, CrateError> {
        let path = request.local_file.ok_or(CrateError::NoLocalCrate)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let body = serde_json::to_vec_pretty(&request.crate_doc)?;
        tokio::fs::write(path, body).await?;
        tracing::debug!(path = %path.display(), user = %request.user.email, "crate written");

        match request.resource {
            None | Some("local") => {}
            Some(ONEDRIVE) => {
                let config = request
                    .session
                    .data
                    .rclone_remote(ONEDRIVE)
                    .ok_or(CrateError::MissingRemoteConfig(ONEDRIVE))?;
                let parent = request.parent.unwrap_or("").trim_matches('/');
                let destination = if parent.is_empty() {
                    CRATE_METADATA_FILE.to_string()
                } else {
                    format!("{}/{}", parent, CRATE_METADATA_FILE)
                };
                self.rclone
                    .copy_to(request.session.id, ONEDRIVE, config, path, &destination)
                    .await?;
            }
            Some(other) => return Err(CrateError::UnsupportedTarget(other.to_string())),
        }
        Ok(path.to_path_buf())
    }
}
