//! Entity routes. Static segments (`lookup`, `files`) take precedence over `:entity_id`.

use crate::handlers::entity::{
    del_entity, del_entity_property, find_entity, get_entities, get_entity, get_entity_properties, post_entity,
    post_entity_property, post_files, put_entity, put_entity_associate, put_entity_property,
};
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/entity", get(get_entities).post(post_entity))
        .route("/entity/lookup", post(find_entity))
        .route("/entity/files", post(post_files))
        .route(
            "/entity/:entity_id",
            get(get_entity).put(put_entity).delete(del_entity),
        )
        .route("/entity/:entity_id/properties", get(get_entity_properties))
        .route("/entity/:entity_id/property", post(post_entity_property))
        .route(
            "/entity/:entity_id/property/:property_id",
            put(put_entity_property).delete(del_entity_property),
        )
        .route("/entity/:entity_id/associate", put(put_entity_associate))
        .with_state(state)
}
