//! Shared helpers: an in-memory app with one user and session, plus request builders.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use describo_api::model::{NewEntity, DATASET_TYPE, ROOT_DATASET_EID};
use describo_api::session::{CurrentCollection, LocalCrate, RemoteTarget, Session, SessionData, User};
use describo_api::{app_router, AppState, EntityStore, MemoryStore, Rclone};

pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub session_id: Uuid,
    pub collection_id: Uuid,
    pub crate_file: PathBuf,
    _dir: tempfile::TempDir,
}

/// App whose session has a collection with a root dataset and a local crate file.
pub async fn app_with_collection() -> TestApp {
    build(true, true).await
}

/// App whose session has a collection that has no root dataset yet.
pub async fn app_without_root() -> TestApp {
    build(true, false).await
}

/// App whose session has no collection loaded.
pub async fn app_without_collection() -> TestApp {
    build(false, false).await
}

async fn build(with_collection: bool, with_root: bool) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let crate_file = dir.path().join("ro-crate-metadata.json");
    let store = Arc::new(MemoryStore::new());
    let user = User {
        id: Uuid::new_v4(),
        email: "tester@example.org".into(),
        name: Some("Tester".into()),
    };
    let collection_id = Uuid::new_v4();
    let current = with_collection.then(|| CurrentCollection {
        collection_id: Some(collection_id),
        local: Some(LocalCrate {
            file: Some(crate_file.clone()),
        }),
        remote: Some(RemoteTarget {
            resource: Some("local".into()),
            parent: None,
        }),
        ..CurrentCollection::default()
    });
    let session = Session {
        id: Uuid::new_v4(),
        user_id: user.id,
        data: SessionData {
            current,
            ..SessionData::default()
        },
    };
    store.insert_user(user).unwrap();
    let session_id = session.id;
    store.insert_session(session).unwrap();

    if with_root {
        store
            .insert_entity(
                collection_id,
                NewEntity {
                    eid: Some(ROOT_DATASET_EID.into()),
                    etype: DATASET_TYPE.into(),
                    name: Some("Test crate".into()),
                    hierarchy: None,
                },
            )
            .await
            .unwrap();
    }

    let state = AppState::with_store(store.clone(), Rclone::new("rclone"));
    TestApp {
        app: app_router(state, 1024 * 1024),
        store,
        session_id,
        collection_id,
        crate_file,
        _dir: dir,
    }
}

impl TestApp {
    /// Send a request authenticated with the test session. `testing` adds `x-testing`.
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>, testing: bool) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", self.session_id));
        if testing {
            builder = builder.header("x-testing", "true");
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Method::GET, uri, None, true).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response {
        self.send(Method::POST, uri, Some(body), true).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> Response {
        self.send(Method::PUT, uri, Some(body), true).await
    }

    pub async fn delete(&self, uri: &str) -> Response {
        self.send(Method::DELETE, uri, None, true).await
    }

    /// Create an entity through the API and return its JSON.
    pub async fn create_entity(&self, eid: &str, etype: &str, name: &str) -> Value {
        let resp = self
            .post(
                "/entity",
                serde_json::json!({ "entity": { "@id": eid, "@type": etype, "name": name } }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        body_json(resp).await["entity"].clone()
    }

    pub fn read_crate(&self) -> Value {
        serde_json::from_slice(&std::fs::read(&self.crate_file).unwrap()).unwrap()
    }
}

pub async fn body_json(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// The `@graph` node with the given `@id`.
pub fn crate_node<'a>(doc: &'a Value, id: &str) -> Option<&'a Value> {
    doc["@graph"].as_array()?.iter().find(|n| n["@id"] == id)
}
