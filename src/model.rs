//! Entity, property and query types shared by the stores, services and handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `@id` of the root dataset of every collection.
pub const ROOT_DATASET_EID: &str = "./";
pub const DATASET_TYPE: &str = "Dataset";
pub const FILE_TYPE: &str = "File";

/// Metadata record belonging to one collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: Uuid,
    /// JSON-LD `@id`, unique within the collection.
    pub eid: String,
    /// JSON-LD `@type`.
    pub etype: String,
    pub name: Option<String>,
    /// Parent folder path for entities created from a file tree ("" at top level).
    pub hierarchy: Option<String>,
    pub collection_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Literal value or link to another entity, attached to an entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: Uuid,
    pub name: String,
    pub value: Option<String>,
    pub tgt_entity_id: Option<Uuid>,
    pub entity_id: Uuid,
    pub collection_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Property {
    pub fn is_link(&self) -> bool {
        self.tgt_entity_id.is_some()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntity {
    #[serde(default, rename = "@id", alias = "eid")]
    pub eid: Option<String>,
    #[serde(default, rename = "@type", alias = "etype")]
    pub etype: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hierarchy: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EntityPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub eid: Option<String>,
}

/// Columns an entity listing may be ordered by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderField {
    Name,
    Eid,
    Etype,
    CreatedAt,
    UpdatedAt,
}

impl OrderField {
    pub fn column(self) -> &'static str {
        match self {
            OrderField::Name => "name",
            OrderField::Eid => "eid",
            OrderField::Etype => "etype",
            OrderField::CreatedAt => "created_at",
            OrderField::UpdatedAt => "updated_at",
        }
    }
}

impl std::str::FromStr for OrderField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "name" => Ok(OrderField::Name),
            "eid" | "@id" => Ok(OrderField::Eid),
            "etype" | "@type" => Ok(OrderField::Etype),
            "createdAt" | "created_at" => Ok(OrderField::CreatedAt),
            "updatedAt" | "updated_at" => Ok(OrderField::UpdatedAt),
            other => Err(format!("cannot order entities by '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn sql(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for OrderDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(OrderDirection::Asc),
            "desc" => Ok(OrderDirection::Desc),
            other => Err(format!("invalid order direction '{}' (expected asc or desc)", other)),
        }
    }
}

/// Paged, filtered listing of a collection's entities.
#[derive(Clone, Debug)]
pub struct EntityQuery {
    /// Case-insensitive substring matched against name and eid.
    pub filter: Option<String>,
    pub page: u32,
    pub limit: u32,
    pub order_by: Vec<OrderField>,
    pub direction: OrderDirection,
}

impl EntityQuery {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 1000;

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.limit)
    }
}

impl Default for EntityQuery {
    fn default() -> Self {
        EntityQuery {
            filter: None,
            page: 0,
            limit: Self::DEFAULT_LIMIT,
            order_by: vec![OrderField::Name],
            direction: OrderDirection::Asc,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EntityPage {
    pub entities: Vec<Entity>,
    pub total: u64,
}

/// Exact-match lookup; unset fields are ignored.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EntityFind {
    #[serde(default)]
    pub hierarchy: Option<String>,
    #[serde(default)]
    pub eid: Option<String>,
    #[serde(default)]
    pub etype: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl EntityFind {
    pub fn matches(&self, entity: &Entity) -> bool {
        fn opt_eq(want: &Option<String>, have: Option<&str>) -> bool {
            want.as_deref().map(|w| have == Some(w)).unwrap_or(true)
        }
        opt_eq(&self.hierarchy, entity.hierarchy.as_deref())
            && opt_eq(&self.eid, Some(entity.eid.as_str()))
            && opt_eq(&self.etype, Some(entity.etype.as_str()))
            && opt_eq(&self.name, entity.name.as_deref())
    }
}

/// Result of removing an entity.
#[derive(Clone, Debug)]
pub struct Removal {
    /// Other entities that lost a link property pointing at the removed one.
    pub updated: Vec<Uuid>,
    pub removed: Entity,
}

/// Identifies an entity in a route: the root dataset or a concrete id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityRef {
    RootDataset,
    Id(Uuid),
}

impl std::str::FromStr for EntityRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "RootDataset" {
            return Ok(EntityRef::RootDataset);
        }
        Uuid::parse_str(s)
            .map(EntityRef::Id)
            .map_err(|_| format!("invalid entity id '{}'", s))
    }
}

/// One item of a file-tree ingestion request.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum FileSpec {
    Path(String),
    Entry {
        path: String,
        #[serde(default, rename = "isDir")]
        is_dir: bool,
    },
}

impl FileSpec {
    pub fn path(&self) -> &str {
        match self {
            FileSpec::Path(p) => p,
            FileSpec::Entry { path, .. } => path,
        }
    }

    pub fn is_dir(&self) -> bool {
        match self {
            FileSpec::Path(p) => p.ends_with('/'),
            FileSpec::Entry { path, is_dir } => *is_dir || path.ends_with('/'),
        }
    }
}
