//! Entity routes driven through the full router against the in-memory store.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{app_with_collection, app_without_collection, app_without_root, body_json, crate_node, TestApp};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

#[tokio::test]
async fn missing_or_unknown_session_is_unauthorized() {
    let t = app_with_collection().await;
    let resp = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/entity/RootDataset").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/entity/RootDataset")
                .header("authorization", format!("Bearer {}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reads_without_a_collection_are_forbidden() {
    let t = app_without_collection().await;
    let resp = t.get("/entity/RootDataset").await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["message"], "No collection loaded");

    let resp = t.post("/entity", json!({ "entity": { "@type": "Person" } })).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn root_dataset_lookup_and_unknown_entity() {
    let t = app_with_collection().await;
    let resp = t.get("/entity/RootDataset").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["entity"]["eid"], "./");
    assert_eq!(body["entity"]["etype"], "Dataset");

    let resp = t.get(&format!("/entity/{}", Uuid::new_v4())).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = t.get("/entity/not-a-uuid").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_then_fetch_entity() {
    let t = app_with_collection().await;
    let created = t.create_entity("#ada", "Person", "Ada Lovelace").await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["eid"], "#ada");
    assert_eq!(created["collectionId"], t.collection_id.to_string());

    let body = body_json(t.get(&format!("/entity/{}", id)).await).await;
    assert_eq!(body["entity"]["name"], "Ada Lovelace");

    // duplicate @id in the same collection
    let resp = t
        .post("/entity", json!({ "entity": { "@id": "#ada", "@type": "Person" } }))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_generates_an_id_and_rejects_bad_types() {
    let t = app_with_collection().await;
    let resp = t.post("/entity", json!({ "entity": { "@type": "Person", "name": "Anon" } })).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(body["entity"]["eid"].as_str().unwrap().starts_with('#'));

    let resp = t.post("/entity", json!({ "entity": { "@type": "  " } })).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_entities_filters_and_pages() {
    let t = app_with_collection().await;
    for (eid, name) in [("#c", "Carol"), ("#a", "Alice"), ("#b", "Bob")] {
        t.create_entity(eid, "Person", name).await;
    }

    let body = body_json(t.get("/entity?limit=2&orderBy=eid").await).await;
    assert_eq!(body["total"], 4);
    let eids: Vec<&str> = body["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["eid"].as_str().unwrap())
        .collect();
    assert_eq!(eids, vec!["#a", "#b"]);

    let body = body_json(t.get("/entity?limit=2&page=1&orderBy=eid").await).await;
    let eids: Vec<&str> = body["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["eid"].as_str().unwrap())
        .collect();
    assert_eq!(eids, vec!["#c", "./"]);

    let body = body_json(t.get("/entity?filter=ali").await).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["entities"][0]["name"], "Alice");

    let resp = t.get("/entity?orderBy=secret").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lookup_matches_exact_fields() {
    let t = app_with_collection().await;
    t.create_entity("#a", "Person", "Alice").await;
    t.create_entity("#org", "Organization", "Acme").await;

    let body = body_json(t.post("/entity/lookup", json!({ "etype": "Person" })).await).await;
    let found = body["entities"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["eid"], "#a");
}

#[tokio::test]
async fn update_entity_renames_and_changes_id() {
    let t = app_with_collection().await;
    let created = t.create_entity("#a", "Person", "Alice").await;
    let id = created["id"].as_str().unwrap();

    let resp = t
        .put(&format!("/entity/{}", id), json!({ "name": "Alice B.", "eid": "#alice" }))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["entity"]["name"], "Alice B.");
    assert_eq!(body["entity"]["eid"], "#alice");
}

#[tokio::test]
async fn property_lifecycle() {
    let t = app_with_collection().await;
    let created = t.create_entity("#a", "Person", "Alice").await;
    let id = created["id"].as_str().unwrap();

    let resp = t
        .post(
            &format!("/entity/{}/property", id),
            json!({ "property": "email", "value": "alice@example.org" }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let property = body_json(resp).await["property"].clone();
    let property_id = property["id"].as_str().unwrap();
    assert_eq!(property["value"], "alice@example.org");

    let resp = t
        .put(
            &format!("/entity/{}/property/{}", id, property_id),
            json!({ "value": "alice@example.com" }),
        )
        .await;
    assert_eq!(body_json(resp).await["property"]["value"], "alice@example.com");

    let body = body_json(t.get(&format!("/entity/{}/properties", id)).await).await;
    assert_eq!(body["properties"].as_array().unwrap().len(), 1);

    let resp = t.delete(&format!("/entity/{}/property/{}", id, property_id)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(t.get(&format!("/entity/{}/properties", id)).await).await;
    assert!(body["properties"].as_array().unwrap().is_empty());

    let resp = t
        .post(&format!("/entity/{}/property", id), json!({ "property": "bad name", "value": "x" }))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn associate_links_entities() {
    let t = app_with_collection().await;
    let a = t.create_entity("#a", "Person", "Alice").await;
    let b = t.create_entity("#b", "Person", "Bob").await;
    let a_id = a["id"].as_str().unwrap();

    let resp = t
        .put(
            &format!("/entity/{}/associate", a_id),
            json!({ "property": "knows", "tgtEntityId": b["id"] }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(t.get(&format!("/entity/{}/properties", a_id)).await).await;
    assert_eq!(body["properties"][0]["name"], "knows");
    assert_eq!(body["properties"][0]["tgtEntityId"], b["id"]);

    // self links are refused
    let resp = t
        .put(
            &format!("/entity/{}/associate", a_id),
            json!({ "property": "knows", "tgtEntityId": a["id"] }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn root_dataset_cannot_be_deleted() {
    let t = app_with_collection().await;
    let resp = t.delete("/entity/RootDataset").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

async fn create_synced(t: &TestApp, eid: &str, name: &str) -> serde_json::Value {
    let body = json!({ "entity": { "@id": eid, "@type": "Person", "name": name } });
    let resp = t.send(Method::POST, "/entity", Some(body), false).await;
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await["entity"].clone()
}

#[tokio::test]
async fn mutations_are_written_to_the_local_crate() {
    let t = app_with_collection().await;
    let a = create_synced(&t, "#a", "Alice").await;
    let b = create_synced(&t, "#b", "Bob").await;
    let a_id = a["id"].as_str().unwrap();

    let resp = t
        .send(
            Method::PUT,
            &format!("/entity/{}/associate", a_id),
            Some(json!({ "property": "knows", "tgtEntityId": b["id"] })),
            false,
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let doc = t.read_crate();
    assert_eq!(crate_node(&doc, "#a").unwrap()["knows"], json!({ "@id": "#b" }));
    assert_eq!(crate_node(&doc, "#b").unwrap()["name"], "Bob");

    let resp = t
        .send(Method::DELETE, &format!("/entity/{}", b["id"].as_str().unwrap()), None, false)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let doc = t.read_crate();
    assert!(crate_node(&doc, "#b").is_none());
    assert!(crate_node(&doc, "#a").unwrap().get("knows").is_none());
}

#[tokio::test]
async fn testing_header_skips_crate_write() {
    let t = app_with_collection().await;
    t.create_entity("#a", "Person", "Alice").await;
    assert!(!t.crate_file.exists());
}

#[tokio::test]
async fn files_import_builds_folder_tree() {
    let t = app_with_collection().await;
    let resp = t
        .post(
            "/entity/files",
            json!({ "files": ["data/a.csv", "data/raw/b.csv", { "path": "docs", "isDir": true }] }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(t.post("/entity/lookup", json!({ "etype": "Dataset", "hierarchy": "" })).await).await;
    let mut eids: Vec<&str> = body["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["eid"].as_str().unwrap())
        .collect();
    eids.sort();
    assert_eq!(eids, vec!["data/", "docs/"]);

    let body = body_json(t.post("/entity/lookup", json!({ "hierarchy": "data/raw/" })).await).await;
    assert_eq!(body["entities"][0]["eid"], "data/raw/b.csv");
    assert_eq!(body["entities"][0]["etype"], "File");

    let resp = t.post("/entity/files", json!({})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn collection_without_root_dataset() {
    let t = app_without_root().await;
    let resp = t.get("/entity/RootDataset").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"]["message"], "Root dataset not found");

    let resp = t.get("/entity/RootDataset/properties").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = t.post("/entity/files", json!({ "files": ["a.txt"] })).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn root_dataset_id_is_fixed() {
    let t = app_with_collection().await;
    let resp = t.put("/entity/RootDataset", json!({ "eid": "#not-root" })).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp).await["error"]["message"],
        "The @id of the root dataset cannot be changed"
    );

    let resp = t.get("/entity/RootDataset").await;
    assert_eq!(resp.status(), StatusCode::OK);

    // renaming is fine as long as the @id stays put
    let resp = t.put("/entity/RootDataset", json!({ "eid": "./", "name": "Renamed" })).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["entity"]["name"], "Renamed");
}

#[tokio::test]
async fn changing_an_id_moves_the_crate_node_and_links() {
    let t = app_with_collection().await;
    let a = create_synced(&t, "#a", "Alice").await;
    let resp = t
        .send(
            Method::PUT,
            "/entity/RootDataset/associate",
            Some(json!({ "property": "author", "tgtEntityId": a["id"] })),
            false,
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = t
        .send(
            Method::PUT,
            &format!("/entity/{}", a["id"].as_str().unwrap()),
            Some(json!({ "eid": "#alice" })),
            false,
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let doc = t.read_crate();
    assert!(crate_node(&doc, "#a").is_none());
    assert_eq!(crate_node(&doc, "#alice").unwrap()["name"], "Alice");
    assert_eq!(crate_node(&doc, "./").unwrap()["author"], json!({ "@id": "#alice" }));
}

#[tokio::test]
async fn entity_and_property_edits_reach_the_crate() {
    let t = app_with_collection().await;
    let a = create_synced(&t, "#a", "Alice").await;
    let id = a["id"].as_str().unwrap();

    let resp = t
        .send(Method::PUT, &format!("/entity/{}", id), Some(json!({ "name": "Alice B." })), false)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(crate_node(&t.read_crate(), "#a").unwrap()["name"], "Alice B.");

    let resp = t
        .send(
            Method::POST,
            &format!("/entity/{}/property", id),
            Some(json!({ "property": "email", "value": "alice@example.org" })),
            false,
        )
        .await;
    let property_id = body_json(resp).await["property"]["id"].as_str().unwrap().to_string();
    assert_eq!(crate_node(&t.read_crate(), "#a").unwrap()["email"], "alice@example.org");

    let resp = t
        .send(
            Method::PUT,
            &format!("/entity/{}/property/{}", id, property_id),
            Some(json!({ "value": "alice@example.com" })),
            false,
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(crate_node(&t.read_crate(), "#a").unwrap()["email"], "alice@example.com");

    let resp = t
        .send(Method::DELETE, &format!("/entity/{}/property/{}", id, property_id), None, false)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(crate_node(&t.read_crate(), "#a").unwrap().get("email").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_all_reach_the_crate() {
    let t = app_with_collection().await;
    tokio::join!(
        create_synced(&t, "#a", "Alice"),
        create_synced(&t, "#b", "Bob"),
        create_synced(&t, "#c", "Carol"),
        create_synced(&t, "#d", "Dan"),
    );
    let doc = t.read_crate();
    for eid in ["#a", "#b", "#c", "#d"] {
        assert!(crate_node(&doc, eid).is_some(), "{} missing from crate", eid);
    }
}
