//! In-memory store used by tests and embedders that do not need persistence.

use super::{EntityStore, SessionStore};
use crate::error::StoreError;
use crate::model::{
    Entity, EntityFind, EntityPage, EntityPatch, EntityQuery, NewEntity, OrderDirection, OrderField, Property,
    Removal,
};
use crate::session::{Session, SessionData, User};
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    entities: HashMap<Uuid, Entity>,
    properties: Vec<Property>,
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, Session>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }

    pub fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.write()?.users.insert(user.id, user);
        Ok(())
    }

    pub fn insert_session(&self, session: Session) -> Result<(), StoreError> {
        self.write()?.sessions.insert(session.id, session);
        Ok(())
    }
}

fn entity_in<'a>(tables: &'a Tables, collection_id: Uuid, id: Uuid) -> Result<&'a Entity, StoreError> {
    tables
        .entities
        .get(&id)
        .filter(|e| e.collection_id == collection_id)
        .ok_or_else(|| StoreError::NotFound(format!("entity {}", id)))
}

fn eid_taken(tables: &Tables, collection_id: Uuid, eid: &str, except: Option<Uuid>) -> bool {
    tables
        .entities
        .values()
        .any(|e| e.collection_id == collection_id && e.eid == eid && Some(e.id) != except)
}

fn compare(a: &Entity, b: &Entity, order_by: &[OrderField], direction: OrderDirection) -> Ordering {
    for field in order_by {
        let ord = match field {
            OrderField::Name => a.name.cmp(&b.name),
            OrderField::Eid => a.eid.cmp(&b.eid),
            OrderField::Etype => a.etype.cmp(&b.etype),
            OrderField::CreatedAt => a.created_at.cmp(&b.created_at),
            OrderField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        };
        let ord = match direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get_entity(&self, collection_id: Uuid, id: Uuid) -> Result<Entity, StoreError> {
        let tables = self.read()?;
        entity_in(&tables, collection_id, id).cloned()
    }

    async fn list_entities(&self, collection_id: Uuid, query: &EntityQuery) -> Result<EntityPage, StoreError> {
        let tables = self.read()?;
        let needle = query.filter.as_deref().map(str::to_lowercase).filter(|s| !s.is_empty());
        let mut matched: Vec<&Entity> = tables
            .entities
            .values()
            .filter(|e| e.collection_id == collection_id)
            .filter(|e| match &needle {
                Some(n) => {
                    e.eid.to_lowercase().contains(n)
                        || e.name.as_deref().map(|s| s.to_lowercase().contains(n)).unwrap_or(false)
                }
                None => true,
            })
            .collect();
        matched.sort_by(|a, b| compare(a, b, &query.order_by, query.direction));
        let total = matched.len() as u64;
        let entities = matched
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(EntityPage { entities, total })
    }

    async fn entity_properties(&self, collection_id: Uuid, id: Uuid) -> Result<Vec<Property>, StoreError> {
        let tables = self.read()?;
        entity_in(&tables, collection_id, id)?;
        let mut props: Vec<Property> = tables
            .properties
            .iter()
            .filter(|p| p.entity_id == id && p.collection_id == collection_id)
            .cloned()
            .collect();
        props.sort_by_key(|p| p.created_at);
        Ok(props)
    }

    async fn find_entities(&self, collection_id: Uuid, find: &EntityFind) -> Result<Vec<Entity>, StoreError> {
        let tables = self.read()?;
        let mut found: Vec<Entity> = tables
            .entities
            .values()
            .filter(|e| e.collection_id == collection_id && find.matches(e))
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    async fn insert_entity(&self, collection_id: Uuid, new: NewEntity) -> Result<Entity, StoreError> {
        let eid = new.eid.ok_or_else(|| StoreError::Invalid("entity eid is required".into()))?;
        let mut tables = self.write()?;
        if eid_taken(&tables, collection_id, &eid, None) {
            return Err(StoreError::Conflict(format!("an entity with @id '{}' already exists", eid)));
        }
        let now = Utc::now();
        let entity = Entity {
            id: Uuid::new_v4(),
            eid,
            etype: new.etype,
            name: new.name,
            hierarchy: new.hierarchy,
            collection_id,
            created_at: now,
            updated_at: now,
        };
        tables.entities.insert(entity.id, entity.clone());
        Ok(entity)
    }

    async fn update_entity(&self, collection_id: Uuid, id: Uuid, patch: EntityPatch) -> Result<Entity, StoreError> {
        let mut tables = self.write()?;
        entity_in(&tables, collection_id, id)?;
        if let Some(eid) = &patch.eid {
            if eid_taken(&tables, collection_id, eid, Some(id)) {
                return Err(StoreError::Conflict(format!("an entity with @id '{}' already exists", eid)));
            }
        }
        let entity = tables
            .entities
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("entity {}", id)))?;
        if let Some(name) = patch.name {
            entity.name = Some(name);
        }
        if let Some(eid) = patch.eid {
            entity.eid = eid;
        }
        entity.updated_at = Utc::now();
        Ok(entity.clone())
    }

    async fn remove_entity(&self, collection_id: Uuid, id: Uuid) -> Result<Removal, StoreError> {
        let mut tables = self.write()?;
        entity_in(&tables, collection_id, id)?;
        let mut updated: Vec<Uuid> = tables
            .properties
            .iter()
            .filter(|p| p.tgt_entity_id == Some(id) && p.entity_id != id)
            .map(|p| p.entity_id)
            .collect();
        updated.sort();
        updated.dedup();
        tables
            .properties
            .retain(|p| p.entity_id != id && p.tgt_entity_id != Some(id));
        let removed = tables
            .entities
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("entity {}", id)))?;
        Ok(Removal { updated, removed })
    }

    async fn attach_property(
        &self,
        collection_id: Uuid,
        entity_id: Uuid,
        name: &str,
        value: Option<String>,
        tgt_entity_id: Option<Uuid>,
    ) -> Result<Property, StoreError> {
        let mut tables = self.write()?;
        entity_in(&tables, collection_id, entity_id)?;
        if let Some(tgt) = tgt_entity_id {
            entity_in(&tables, collection_id, tgt)?;
        }
        let property = Property {
            id: Uuid::new_v4(),
            name: name.to_string(),
            value,
            tgt_entity_id,
            entity_id,
            collection_id,
            created_at: Utc::now(),
        };
        tables.properties.push(property.clone());
        Ok(property)
    }

    async fn update_property(
        &self,
        collection_id: Uuid,
        entity_id: Uuid,
        property_id: Uuid,
        value: Option<String>,
    ) -> Result<Property, StoreError> {
        let mut tables = self.write()?;
        let property = tables
            .properties
            .iter_mut()
            .find(|p| p.id == property_id && p.entity_id == entity_id && p.collection_id == collection_id)
            .ok_or_else(|| StoreError::NotFound(format!("property {}", property_id)))?;
        property.value = value;
        Ok(property.clone())
    }

    async fn remove_property(&self, collection_id: Uuid, entity_id: Uuid, property_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let before = tables.properties.len();
        tables
            .properties
            .retain(|p| !(p.id == property_id && p.entity_id == entity_id && p.collection_id == collection_id));
        if tables.properties.len() == before {
            return Err(StoreError::NotFound(format!("property {}", property_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.read()?.sessions.get(&id).cloned())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn update_session_data(&self, id: Uuid, data: &SessionData) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let session = tables
            .sessions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", id)))?;
        session.data = data.clone();
        Ok(())
    }
}
