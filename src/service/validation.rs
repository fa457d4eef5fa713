//! Request validation for entities and properties.

use crate::error::AppError;
use crate::model::NewEntity;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use uuid::Uuid;

const ETYPE_PATTERN: &str = r"^[A-Za-z][\w:-]*$";
const PROPERTY_NAME_PATTERN: &str = r"^[@A-Za-z][\w:@-]*$";

static ETYPE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(ETYPE_PATTERN).expect("valid regex"));
static PROPERTY_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PROPERTY_NAME_PATTERN).expect("valid regex"));

pub struct RequestValidator;

impl RequestValidator {
    /// Check a new entity and fill in defaults: generated `#<uuid>` eid when absent.
    pub fn new_entity(mut entity: NewEntity) -> Result<NewEntity, AppError> {
        let etype = entity.etype.trim();
        if etype.is_empty() {
            return Err(AppError::BadRequest("entity @type is required".into()));
        }
        if !ETYPE_RE.is_match(etype) {
            return Err(AppError::BadRequest(format!("invalid entity @type '{}'", etype)));
        }
        entity.etype = etype.to_string();
        entity.eid = match entity.eid.as_deref().map(str::trim) {
            Some(eid) if !eid.is_empty() => Some(eid.to_string()),
            _ => Some(format!("#{}", Uuid::new_v4())),
        };
        Ok(entity)
    }

    /// Blank eids are rejected; a blank name is allowed.
    pub fn eid(eid: Option<String>) -> Result<Option<String>, AppError> {
        match eid {
            Some(e) if e.trim().is_empty() => Err(AppError::BadRequest("entity @id cannot be empty".into())),
            Some(e) => Ok(Some(e.trim().to_string())),
            None => Ok(None),
        }
    }

    pub fn property_name(name: Option<&str>) -> Result<&str, AppError> {
        let name = name.map(str::trim).unwrap_or("");
        if name.is_empty() {
            return Err(AppError::BadRequest("a property name is required".into()));
        }
        if !PROPERTY_NAME_RE.is_match(name) {
            return Err(AppError::BadRequest(format!("invalid property name '{}'", name)));
        }
        Ok(name)
    }

    /// Property values are stored as text: strings verbatim, other scalars as JSON.
    pub fn property_value(value: Option<&Value>) -> Result<Option<String>, AppError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(v @ (Value::Bool(_) | Value::Number(_))) => Ok(Some(v.to_string())),
            Some(_) => Err(AppError::BadRequest(
                "property values must be strings, numbers or booleans".into(),
            )),
        }
    }
}
