//! Data-access contracts for entities, properties and sessions, with a Postgres and an
//! in-memory implementation.

pub mod memory;
pub mod postgres;

use crate::error::StoreError;
use crate::model::{Entity, EntityFind, EntityPage, EntityPatch, EntityQuery, NewEntity, Property, Removal};
use crate::session::{Session, SessionData, User};
use async_trait::async_trait;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, ensure_tables, PgStore};

/// Entity and property persistence, always scoped to one collection.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_entity(&self, collection_id: Uuid, id: Uuid) -> Result<Entity, StoreError>;

    async fn list_entities(&self, collection_id: Uuid, query: &EntityQuery) -> Result<EntityPage, StoreError>;

    /// Properties of one entity, oldest first. Fails with `NotFound` when the entity is absent.
    async fn entity_properties(&self, collection_id: Uuid, id: Uuid) -> Result<Vec<Property>, StoreError>;

    async fn find_entities(&self, collection_id: Uuid, find: &EntityFind) -> Result<Vec<Entity>, StoreError>;

    /// `new.eid` and `new.etype` must already be validated and set.
    async fn insert_entity(&self, collection_id: Uuid, new: NewEntity) -> Result<Entity, StoreError>;

    async fn update_entity(&self, collection_id: Uuid, id: Uuid, patch: EntityPatch) -> Result<Entity, StoreError>;

    /// Deletes the entity, its properties and every link property that targets it.
    async fn remove_entity(&self, collection_id: Uuid, id: Uuid) -> Result<Removal, StoreError>;

    async fn attach_property(
        &self,
        collection_id: Uuid,
        entity_id: Uuid,
        name: &str,
        value: Option<String>,
        tgt_entity_id: Option<Uuid>,
    ) -> Result<Property, StoreError>;

    async fn update_property(
        &self,
        collection_id: Uuid,
        entity_id: Uuid,
        property_id: Uuid,
        value: Option<String>,
    ) -> Result<Property, StoreError>;

    async fn remove_property(&self, collection_id: Uuid, entity_id: Uuid, property_id: Uuid) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn update_session_data(&self, id: Uuid, data: &SessionData) -> Result<(), StoreError>;
}
