//! Session and user records. Sessions are created by the login flow; this service reads
//! them and only writes back the JSON `data` blob.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub data: SessionData,
}

impl Session {
    pub fn collection_id(&self) -> Option<Uuid> {
        self.data.current.as_ref().and_then(|c| c.collection_id)
    }

    pub fn local_crate_file(&self) -> Option<&PathBuf> {
        self.data
            .current
            .as_ref()
            .and_then(|c| c.local.as_ref())
            .and_then(|l| l.file.as_ref())
    }

    pub fn remote(&self) -> Option<&RemoteTarget> {
        self.data.current.as_ref().and_then(|c| c.remote.as_ref())
    }
}

/// Contents of the session `data` column. Unknown keys round-trip untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<CurrentCollection>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionData {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(SessionData::default());
        }
        serde_json::from_value(value)
    }

    /// Rclone settings stored for a named remote (e.g. `onedrive`).
    pub fn rclone_remote(&self, remote: &str) -> Option<&Value> {
        self.extra.get("rclone").and_then(|r| r.get(remote))
    }

    /// Store rclone settings for one remote, keeping the settings of other remotes.
    pub fn set_rclone_remote(&mut self, remote: &str, config: Value) {
        let rclone = self
            .extra
            .entry("rclone")
            .or_insert_with(|| Value::Object(Map::new()));
        if !rclone.is_object() {
            *rclone = Value::Object(Map::new());
        }
        if let Value::Object(map) = rclone {
            map.insert(remote.to_string(), config);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentCollection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalCrate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteTarget>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalCrate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Where the crate is saved after an update.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_data_keeps_unknown_keys() {
        let raw = json!({
            "current": {
                "collectionId": "5b0c1a52-8d0e-4bb4-8f6e-7b1e6c3f4a10",
                "local": { "file": "/tmp/c/ro-crate-metadata.json" },
                "remote": { "resource": "onedrive", "parent": "/crates" },
                "profile": "default"
            },
            "service": { "owncloud": { "url": "x" } }
        });
        let data = SessionData::from_value(raw.clone()).unwrap();
        assert_eq!(
            data.current.as_ref().and_then(|c| c.remote.as_ref()).and_then(|r| r.resource.as_deref()),
            Some("onedrive")
        );
        assert_eq!(serde_json::to_value(&data).unwrap(), raw);
    }

    #[test]
    fn set_rclone_remote_merges_with_existing_remotes() {
        let mut data = SessionData::from_value(json!({ "rclone": { "s3": { "type": "s3" } } })).unwrap();
        data.set_rclone_remote("onedrive", json!({ "token": "t" }));
        assert_eq!(data.rclone_remote("s3"), Some(&json!({ "type": "s3" })));
        assert_eq!(data.rclone_remote("onedrive"), Some(&json!({ "token": "t" })));
    }

    #[test]
    fn null_data_is_empty_session() {
        assert_eq!(SessionData::from_value(Value::Null).unwrap(), SessionData::default());
    }
}
