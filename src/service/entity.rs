//! Compound entity operations built on the store primitives.

use crate::error::StoreError;
use crate::model::{
    Entity, EntityFind, EntityRef, FileSpec, NewEntity, Property, DATASET_TYPE, FILE_TYPE, ROOT_DATASET_EID,
};
use crate::store::EntityStore;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Property linking a folder to its children.
pub const HAS_PART: &str = "hasPart";

#[derive(Clone)]
pub struct EntityService {
    store: Arc<dyn EntityStore>,
}

/// Counts of what a file-tree ingestion created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileImport {
    pub folders: usize,
    pub files: usize,
}

impl EntityService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        EntityService { store }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// The collection's root dataset (`./`), or None when the collection has none.
    pub async fn root_dataset(&self, collection_id: Uuid) -> Result<Option<Entity>, StoreError> {
        let find = EntityFind {
            eid: Some(ROOT_DATASET_EID.into()),
            etype: Some(DATASET_TYPE.into()),
            ..EntityFind::default()
        };
        Ok(self.store.find_entities(collection_id, &find).await?.pop())
    }

    /// Map a route reference to an entity id.
    pub async fn resolve(&self, collection_id: Uuid, entity: EntityRef) -> Result<Uuid, StoreError> {
        match entity {
            EntityRef::Id(id) => Ok(id),
            EntityRef::RootDataset => self
                .root_dataset(collection_id)
                .await?
                .map(|e| e.id)
                .ok_or_else(|| StoreError::NotFound("Root dataset".into())),
        }
    }

    /// Link `entity_id` to `tgt_entity_id` through `property`.
    pub async fn associate(
        &self,
        collection_id: Uuid,
        entity_id: Uuid,
        property: &str,
        tgt_entity_id: Uuid,
    ) -> Result<Property, StoreError> {
        if entity_id == tgt_entity_id {
            return Err(StoreError::Invalid("an entity cannot be associated with itself".into()));
        }
        self.store.get_entity(collection_id, tgt_entity_id).await?;
        self.store
            .attach_property(collection_id, entity_id, property, None, Some(tgt_entity_id))
            .await
    }

    /// Create `Dataset` entities for folders and `File` entities for files, linking each new
    /// node from its parent folder (the root dataset at top level) via `hasPart`.
    /// Paths already present in the collection are reused.
    pub async fn insert_files_and_folders(
        &self,
        collection_id: Uuid,
        files: &[FileSpec],
    ) -> Result<FileImport, StoreError> {
        let root = self
            .root_dataset(collection_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Root dataset".into()))?;

        let mut known: HashMap<String, Uuid> = HashMap::new();
        known.insert(String::new(), root.id);
        let mut import = FileImport::default();

        for spec in files {
            let segments = split_path(spec.path())?;
            let Some((last, folders)) = segments.split_last() else {
                continue;
            };

            let mut parent = String::new();
            for folder in folders {
                let eid = format!("{}{}/", parent, folder);
                if self.ensure_node(collection_id, &mut known, &parent, &eid, folder, DATASET_TYPE).await? {
                    import.folders += 1;
                }
                parent = eid;
            }

            let (eid, etype) = if spec.is_dir() {
                (format!("{}{}/", parent, last), DATASET_TYPE)
            } else {
                (format!("{}{}", parent, last), FILE_TYPE)
            };
            if self.ensure_node(collection_id, &mut known, &parent, &eid, last, etype).await? {
                if etype == DATASET_TYPE {
                    import.folders += 1;
                } else {
                    import.files += 1;
                }
            }
        }
        tracing::info!(%collection_id, folders = import.folders, files = import.files, "imported file tree");
        Ok(import)
    }

    /// Returns true when the node was created.
    async fn ensure_node(
        &self,
        collection_id: Uuid,
        known: &mut HashMap<String, Uuid>,
        parent: &str,
        eid: &str,
        name: &str,
        etype: &str,
    ) -> Result<bool, StoreError> {
        if known.contains_key(eid) {
            return Ok(false);
        }
        let find = EntityFind {
            eid: Some(eid.to_string()),
            ..EntityFind::default()
        };
        if let Some(existing) = self.store.find_entities(collection_id, &find).await?.pop() {
            known.insert(eid.to_string(), existing.id);
            return Ok(false);
        }
        let parent_id = *known
            .get(parent)
            .ok_or_else(|| StoreError::NotFound(format!("folder '{}'", parent)))?;
        let entity = self
            .store
            .insert_entity(
                collection_id,
                NewEntity {
                    eid: Some(eid.to_string()),
                    etype: etype.to_string(),
                    name: Some(name.to_string()),
                    hierarchy: Some(parent.to_string()),
                },
            )
            .await?;
        self.store
            .attach_property(collection_id, parent_id, HAS_PART, None, Some(entity.id))
            .await?;
        known.insert(eid.to_string(), entity.id);
        Ok(true)
    }
}

/// Split a relative path into its segments, dropping `.` and empty segments.
fn split_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(StoreError::Invalid(format!("path '{}' must not contain '..'", path))),
            s => segments.push(s),
        }
    }
    Ok(segments)
}
