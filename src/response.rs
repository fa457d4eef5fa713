//! Response bodies. Each route answers with a single-key JSON object (`{entity}`, `{properties}`, ...).

use crate::model::{Entity, Property};
use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct EntityBody {
    pub entity: Entity,
}

#[derive(Serialize)]
pub struct EntitiesBody {
    pub entities: Vec<Entity>,
}

#[derive(Serialize)]
pub struct PropertiesBody {
    pub properties: Vec<Property>,
}

#[derive(Serialize)]
pub struct PropertyBody {
    pub property: Property,
}

/// `{}`
#[derive(Serialize)]
pub struct Empty {}

pub fn ok<T: Serialize>(body: T) -> (StatusCode, Json<T>) {
    (StatusCode::OK, Json(body))
}

pub fn empty() -> (StatusCode, Json<Empty>) {
    ok(Empty {})
}
