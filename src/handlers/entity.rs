//! Entity handlers: lookup, listing, CRUD, properties, associations and file-tree import.
//!
//! Reads answer 403 for any store failure other than a missing record; mutations answer 400
//! with the failure message. Every successful mutation is replayed on the session's crate
//! unless the request carries `x-testing`.

use crate::error::{AppError, StoreError};
use crate::extractors::{AuthSession, CrateSync};
use crate::model::{EntityFind, EntityPatch, EntityQuery, EntityRef, FileSpec, NewEntity, OrderDirection, OrderField, ROOT_DATASET_EID};
use crate::response::{empty, ok, EntitiesBody, EntityBody, PropertiesBody, PropertyBody};
use crate::rocrate::{CrateAction, SaveCrate};
use crate::service::RequestValidator;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

pub const NO_COLLECTION: &str = "No collection loaded";
pub const MISSING_ENTITY_ID: &str = "You must provide an entityId to lookup or the special value 'RootDataset'";
pub const MISSING_FILES: &str = "You must provide an array of files to add";
pub const CRATE_SAVE_FAILED: &str = "Error saving the crate back to the target";
pub const ROOT_DATASET_REMOVAL: &str = "The root dataset cannot be removed";
pub const ROOT_DATASET_ID_FIXED: &str = "The @id of the root dataset cannot be changed";

fn read_collection(auth: &AuthSession) -> Result<Uuid, AppError> {
    auth.collection_id().ok_or_else(|| AppError::forbidden(NO_COLLECTION))
}

fn write_collection(auth: &AuthSession) -> Result<Uuid, AppError> {
    auth.collection_id().ok_or(AppError::Forbidden(None))
}

fn parse_entity_ref(raw: &str) -> Result<EntityRef, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::BadRequest(MISSING_ENTITY_ID.into()));
    }
    raw.parse().map_err(AppError::BadRequest)
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::BadRequest(format!("invalid {} '{}'", what, raw)))
}

/// Failure of a read: missing records are 404, anything else a bare 403.
fn read_failure(handler: &'static str, e: StoreError) -> AppError {
    match e {
        StoreError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
        e => {
            tracing::error!(handler, error = %e, "read failed");
            AppError::Forbidden(None)
        }
    }
}

fn write_failure(handler: &'static str, e: impl std::fmt::Display) -> AppError {
    tracing::error!(handler, error = %e, "write failed");
    AppError::BadRequest(e.to_string())
}

/// Replay `actions` on the session's crate and save it to the session's target.
async fn save_crate(
    state: &AppState,
    auth: &AuthSession,
    collection_id: Uuid,
    actions: Vec<CrateAction>,
) -> Result<(), AppError> {
    let session = &auth.session;
    let _guard = match session.local_crate_file() {
        Some(path) => Some(state.crates.lock_crate(path).await),
        None => None,
    };
    let started = Instant::now();
    let result = async {
        let crate_doc = state
            .crates
            .update_crate(session.local_crate_file().map(|p| p.as_path()), collection_id, &actions)
            .await?;
        let elapsed = started.elapsed();
        let remote = session.remote();
        state
            .crates
            .save_crate(SaveCrate {
                session,
                user: &auth.user,
                resource: remote.and_then(|r| r.resource.as_deref()),
                parent: remote.and_then(|r| r.parent.as_deref()),
                local_file: session.local_crate_file().map(|p| p.as_path()),
                crate_doc,
            })
            .await?;
        tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, actions = actions.len(), "crate update time");
        Ok::<(), crate::error::CrateError>(())
    }
    .await;
    result.map_err(|e| {
        tracing::error!(error = %e, %collection_id, "error saving crate");
        AppError::BadRequest(CRATE_SAVE_FAILED.into())
    })
}

async fn sync_crate(
    sync: CrateSync,
    state: &AppState,
    auth: &AuthSession,
    collection_id: Uuid,
    actions: Vec<CrateAction>,
) -> Result<(), AppError> {
    if sync.0 {
        save_crate(state, auth, collection_id, actions).await?;
    }
    Ok(())
}

/// GET /entity/:entity_id
pub async fn get_entity(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(entity_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let collection_id = read_collection(&auth)?;
    let entity_ref = parse_entity_ref(&entity_id)?;
    let id = state
        .entities
        .resolve(collection_id, entity_ref)
        .await
        .map_err(|e| read_failure("get_entity", e))?;
    let entity = state
        .entities
        .store()
        .get_entity(collection_id, id)
        .await
        .map_err(|e| read_failure("get_entity", e))?;
    Ok(ok(EntityBody { entity }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub filter: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub order_by: Option<String>,
    pub direction: Option<String>,
}

impl ListParams {
    fn into_query(self) -> Result<EntityQuery, AppError> {
        let mut query = EntityQuery {
            filter: self.filter.filter(|f| !f.trim().is_empty()),
            ..EntityQuery::default()
        };
        if let Some(page) = self.page.filter(|s| !s.is_empty()) {
            query.page = page
                .parse()
                .map_err(|_| AppError::BadRequest(format!("invalid page '{}'", page)))?;
        }
        if let Some(limit) = self.limit.filter(|s| !s.is_empty()) {
            let limit: u32 = limit
                .parse()
                .map_err(|_| AppError::BadRequest(format!("invalid limit '{}'", limit)))?;
            query.limit = limit.clamp(1, EntityQuery::MAX_LIMIT);
        }
        if let Some(order_by) = self.order_by {
            let fields = order_by
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse::<OrderField>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(AppError::BadRequest)?;
            if !fields.is_empty() {
                query.order_by = fields;
            }
        }
        if let Some(direction) = self.direction.filter(|s| !s.is_empty()) {
            query.direction = direction.parse::<OrderDirection>().map_err(AppError::BadRequest)?;
        }
        Ok(query)
    }
}

/// GET /entity?filter=&page=&limit=&orderBy=&direction=
pub async fn get_entities(
    State(state): State<AppState>,
    auth: AuthSession,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let collection_id = read_collection(&auth)?;
    let query = params.into_query()?;
    let page = state
        .entities
        .store()
        .list_entities(collection_id, &query)
        .await
        .map_err(|e| read_failure("get_entities", e))?;
    Ok(ok(page))
}

/// GET /entity/:entity_id/properties
pub async fn get_entity_properties(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(entity_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let collection_id = read_collection(&auth)?;
    let entity_ref = parse_entity_ref(&entity_id)?;
    let id = state
        .entities
        .resolve(collection_id, entity_ref)
        .await
        .map_err(|e| read_failure("get_entity_properties", e))?;
    let properties = state
        .entities
        .store()
        .entity_properties(collection_id, id)
        .await
        .map_err(|e| read_failure("get_entity_properties", e))?;
    Ok(ok(PropertiesBody { properties }))
}

/// POST /entity/lookup with optional `{hierarchy, eid, etype, name}`.
pub async fn find_entity(
    State(state): State<AppState>,
    auth: AuthSession,
    body: Option<Json<EntityFind>>,
) -> Result<impl IntoResponse, AppError> {
    let collection_id = read_collection(&auth)?;
    let find = body.map(|Json(f)| f).unwrap_or_default();
    let entities = state
        .entities
        .store()
        .find_entities(collection_id, &find)
        .await
        .map_err(|e| read_failure("find_entity", e))?;
    Ok(ok(EntitiesBody { entities }))
}

#[derive(Debug, Deserialize)]
pub struct PostEntityBody {
    pub entity: Option<NewEntity>,
}

/// POST /entity with `{entity}`.
pub async fn post_entity(
    State(state): State<AppState>,
    auth: AuthSession,
    sync: CrateSync,
    Json(body): Json<PostEntityBody>,
) -> Result<impl IntoResponse, AppError> {
    let collection_id = write_collection(&auth)?;
    let new = body
        .entity
        .ok_or_else(|| AppError::BadRequest("You must provide an entity to create".into()))?;
    let new = RequestValidator::new_entity(new)?;
    let entity = state
        .entities
        .store()
        .insert_entity(collection_id, new)
        .await
        .map_err(|e| write_failure("post_entity", e))?;
    tracing::info!(%collection_id, eid = %entity.eid, etype = %entity.etype, "entity created");
    sync_crate(sync, &state, &auth, collection_id, vec![CrateAction::Insert(entity.clone())]).await?;
    Ok(ok(EntityBody { entity }))
}

/// PUT /entity/:entity_id with `{name, eid}`.
pub async fn put_entity(
    State(state): State<AppState>,
    auth: AuthSession,
    sync: CrateSync,
    Path(entity_id): Path<String>,
    Json(patch): Json<EntityPatch>,
) -> Result<impl IntoResponse, AppError> {
    let collection_id = write_collection(&auth)?;
    let entity_ref = parse_entity_ref(&entity_id)?;
    let patch = EntityPatch {
        eid: RequestValidator::eid(patch.eid)?,
        name: patch.name,
    };
    let id = state
        .entities
        .resolve(collection_id, entity_ref)
        .await
        .map_err(|e| write_failure("put_entity", e))?;
    let store = state.entities.store();
    let existing = store
        .get_entity(collection_id, id)
        .await
        .map_err(|e| write_failure("put_entity", e))?;
    let renamed = patch.eid.as_deref().filter(|eid| *eid != existing.eid).is_some();
    if renamed && existing.eid == ROOT_DATASET_EID {
        return Err(AppError::BadRequest(ROOT_DATASET_ID_FIXED.into()));
    }
    let entity = store
        .update_entity(collection_id, id, patch)
        .await
        .map_err(|e| write_failure("put_entity", e))?;
    let mut actions = Vec::with_capacity(2);
    if renamed {
        tracing::info!(%collection_id, from = %existing.eid, to = %entity.eid, "entity renamed");
        actions.push(CrateAction::Rename {
            from: existing.eid,
            to: entity.eid.clone(),
        });
    }
    actions.push(CrateAction::Update(entity.id));
    sync_crate(sync, &state, &auth, collection_id, actions).await?;
    Ok(ok(EntityBody { entity }))
}

/// DELETE /entity/:entity_id
pub async fn del_entity(
    State(state): State<AppState>,
    auth: AuthSession,
    sync: CrateSync,
    Path(entity_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let collection_id = write_collection(&auth)?;
    let id = match parse_entity_ref(&entity_id)? {
        EntityRef::RootDataset => return Err(AppError::BadRequest(ROOT_DATASET_REMOVAL.into())),
        EntityRef::Id(id) => id,
    };
    let store = state.entities.store();
    let existing = store
        .get_entity(collection_id, id)
        .await
        .map_err(|e| write_failure("del_entity", e))?;
    if existing.eid == ROOT_DATASET_EID {
        return Err(AppError::BadRequest(ROOT_DATASET_REMOVAL.into()));
    }
    let removal = store
        .remove_entity(collection_id, id)
        .await
        .map_err(|e| write_failure("del_entity", e))?;
    tracing::info!(%collection_id, eid = %removal.removed.eid, updated = removal.updated.len(), "entity removed");
    let mut actions: Vec<CrateAction> = removal.updated.into_iter().map(CrateAction::Update).collect();
    actions.push(CrateAction::Remove(removal.removed));
    sync_crate(sync, &state, &auth, collection_id, actions).await?;
    Ok(empty())
}

#[derive(Debug, Deserialize)]
pub struct PostPropertyBody {
    pub property: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

/// POST /entity/:entity_id/property with `{property, value}`.
pub async fn post_entity_property(
    State(state): State<AppState>,
    auth: AuthSession,
    sync: CrateSync,
    Path(entity_id): Path<String>,
    Json(body): Json<PostPropertyBody>,
) -> Result<impl IntoResponse, AppError> {
    let collection_id = write_collection(&auth)?;
    let entity_ref = parse_entity_ref(&entity_id)?;
    let name = RequestValidator::property_name(body.property.as_deref())?;
    let value = RequestValidator::property_value(body.value.as_ref())?;
    let id = state
        .entities
        .resolve(collection_id, entity_ref)
        .await
        .map_err(|e| write_failure("post_entity_property", e))?;
    let property = state
        .entities
        .store()
        .attach_property(collection_id, id, name, value, None)
        .await
        .map_err(|e| write_failure("post_entity_property", e))?;
    sync_crate(sync, &state, &auth, collection_id, vec![CrateAction::Update(id)]).await?;
    Ok(ok(PropertyBody { property }))
}

#[derive(Debug, Deserialize)]
pub struct PutPropertyBody {
    #[serde(default)]
    pub value: Option<Value>,
}

/// PUT /entity/:entity_id/property/:property_id with `{value}`.
pub async fn put_entity_property(
    State(state): State<AppState>,
    auth: AuthSession,
    sync: CrateSync,
    Path((entity_id, property_id)): Path<(String, String)>,
    Json(body): Json<PutPropertyBody>,
) -> Result<impl IntoResponse, AppError> {
    let collection_id = write_collection(&auth)?;
    let entity_ref = parse_entity_ref(&entity_id)?;
    let property_id = parse_id(&property_id, "propertyId")?;
    let value = RequestValidator::property_value(body.value.as_ref())?;
    let id = state
        .entities
        .resolve(collection_id, entity_ref)
        .await
        .map_err(|e| write_failure("put_entity_property", e))?;
    let property = state
        .entities
        .store()
        .update_property(collection_id, id, property_id, value)
        .await
        .map_err(|e| write_failure("put_entity_property", e))?;
    sync_crate(sync, &state, &auth, collection_id, vec![CrateAction::Update(id)]).await?;
    Ok(ok(PropertyBody { property }))
}

/// DELETE /entity/:entity_id/property/:property_id
pub async fn del_entity_property(
    State(state): State<AppState>,
    auth: AuthSession,
    sync: CrateSync,
    Path((entity_id, property_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let collection_id = write_collection(&auth)?;
    let entity_ref = parse_entity_ref(&entity_id)?;
    let property_id = parse_id(&property_id, "propertyId")?;
    let id = state
        .entities
        .resolve(collection_id, entity_ref)
        .await
        .map_err(|e| write_failure("del_entity_property", e))?;
    state
        .entities
        .store()
        .remove_property(collection_id, id, property_id)
        .await
        .map_err(|e| write_failure("del_entity_property", e))?;
    sync_crate(sync, &state, &auth, collection_id, vec![CrateAction::Update(id)]).await?;
    Ok(empty())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociateBody {
    pub property: Option<String>,
    pub tgt_entity_id: Option<String>,
}

/// PUT /entity/:entity_id/associate with `{property, tgtEntityId}`.
pub async fn put_entity_associate(
    State(state): State<AppState>,
    auth: AuthSession,
    sync: CrateSync,
    Path(entity_id): Path<String>,
    Json(body): Json<AssociateBody>,
) -> Result<impl IntoResponse, AppError> {
    let collection_id = write_collection(&auth)?;
    let entity_ref = parse_entity_ref(&entity_id)?;
    let name = RequestValidator::property_name(body.property.as_deref())?;
    let tgt = body
        .tgt_entity_id
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("You must provide a tgtEntityId to associate".into()))
        .and_then(|raw| parse_id(raw, "tgtEntityId"))?;
    let id = state
        .entities
        .resolve(collection_id, entity_ref)
        .await
        .map_err(|e| write_failure("put_entity_associate", e))?;
    state
        .entities
        .associate(collection_id, id, name, tgt)
        .await
        .map_err(|e| write_failure("put_entity_associate", e))?;
    sync_crate(sync, &state, &auth, collection_id, vec![CrateAction::Update(id)]).await?;
    Ok(empty())
}

#[derive(Debug, Deserialize)]
pub struct PostFilesBody {
    pub files: Option<Vec<FileSpec>>,
}

/// POST /entity/files with `{files}`.
pub async fn post_files(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(body): Json<PostFilesBody>,
) -> Result<impl IntoResponse, AppError> {
    let collection_id = write_collection(&auth)?;
    let files = body.files.ok_or_else(|| AppError::BadRequest(MISSING_FILES.into()))?;
    state
        .entities
        .insert_files_and_folders(collection_id, &files)
        .await
        .map_err(|e| write_failure("post_files", e))?;
    Ok(empty())
}
