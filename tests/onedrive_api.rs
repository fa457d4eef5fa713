mod common;

use axum::http::StatusCode;
use common::{app_with_collection, body_json};
use describo_api::SessionStore;
use serde_json::json;

#[tokio::test]
async fn configuration_is_stored_on_the_session() {
    let t = app_with_collection().await;
    let resp = t
        .post("/onedrive/configuration", json!({ "token": "{\"access_token\":\"x\"}", "drive_type": "personal" }))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({}));

    let session = t.store.get_session(t.session_id).await.unwrap().unwrap();
    assert_eq!(
        session.data.rclone_remote("onedrive"),
        Some(&json!({ "token": "{\"access_token\":\"x\"}", "drive_type": "personal" }))
    );
    // the loaded collection survives the update
    assert_eq!(session.collection_id(), Some(t.collection_id));
}

#[tokio::test]
async fn non_object_configuration_is_rejected() {
    let t = app_with_collection().await;
    let resp = t.post("/onedrive/configuration", json!(["token"])).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn onedrive_target_without_configuration_fails_the_save() {
    let t = app_with_collection().await;
    let mut session = t.store.get_session(t.session_id).await.unwrap().unwrap();
    if let Some(remote) = session.data.current.as_mut().and_then(|c| c.remote.as_mut()) {
        remote.resource = Some("onedrive".into());
    }
    t.store.update_session_data(t.session_id, &session.data).await.unwrap();

    let resp = t
        .send(
            axum::http::Method::POST,
            "/entity",
            Some(json!({ "entity": { "@id": "#a", "@type": "Person" } })),
            false,
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["message"], "Error saving the crate back to the target");
    // the local copy is written before the upload is attempted
    assert!(t.crate_file.exists());
}

#[tokio::test]
async fn health_and_ready() {
    let t = app_with_collection().await;
    let resp = t.get("/health").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = t.get("/ready").await;
    assert_eq!(body_json(resp).await["store"], "ok");
}
