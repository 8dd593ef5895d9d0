mod common;

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;

use netcafe_api::storage::USER_FILES_BUCKET;

fn text_upload(name: &str, contents: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(contents.as_bytes().to_vec())
            .file_name(name)
            .mime_type("text/plain"),
    )
}

async fn upload(server: &TestServer, token: &str, name: &str, contents: &str) -> serde_json::Value {
    let resp = server
        .post("/api/v1/files")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .multipart(text_upload(name, contents))
        .await;
    resp.assert_status(StatusCode::CREATED);
    resp.json()
}

// ---------------------------------------------------------------------------
// POST /api/v1/files
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_stores_object_and_metadata() {
    let (server, state) = common::test_server().await;
    let user = common::seed_profile(&state.db, "customer").await;
    let token = common::login(&server, &user).await;

    let record = upload(&server, &token, "../homework 1.txt", "hello netcafe").await;

    let file_id = record["id"].as_str().unwrap();
    assert!(file_id.starts_with("fil_"));
    assert_eq!(record["user_id"], user.id);
    assert_eq!(record["name"], "homework 1.txt");
    assert_eq!(record["size"], 13);
    assert_eq!(record["type"], "text/plain");

    let path = record["path"].as_str().unwrap();
    assert!(path.starts_with(&format!("{}/{file_id}/", user.id)));
    let stored = state.storage.get(USER_FILES_BUCKET, path).await.unwrap();
    assert_eq!(stored.as_deref(), Some(&b"hello netcafe"[..]));

    common::cleanup_profile(&state.db, &user.id).await;
}

#[tokio::test]
async fn upload_without_file_part_or_with_empty_file_is_rejected() {
    let (server, state) = common::test_server().await;
    let user = common::seed_profile(&state.db, "customer").await;
    let token = common::login(&server, &user).await;

    let resp = server
        .post("/api/v1/files")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .multipart(MultipartForm::new().add_text("note", "no file here"))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let resp = server
        .post("/api/v1/files")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .multipart(text_upload("empty.txt", ""))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    common::cleanup_profile(&state.db, &user.id).await;
}

#[tokio::test]
async fn upload_over_limit_is_payload_too_large() {
    let mut state = common::test_state().await;
    let mut config = (*state.config).clone();
    config.max_upload_bytes = 8;
    state.config = Arc::new(config);
    let server =
        TestServer::new(netcafe_api::routes::router().with_state(state.clone())).unwrap();

    let user = common::seed_profile(&state.db, "customer").await;
    let token = common::login(&server, &user).await;

    let resp = server
        .post("/api/v1/files")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .multipart(text_upload("big.txt", "more than eight bytes"))
        .await;
    resp.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        resp.json::<serde_json::Value>()["error"]["code"],
        "PAYLOAD_TOO_LARGE"
    );

    common::cleanup_profile(&state.db, &user.id).await;
}

// ---------------------------------------------------------------------------
// GET /api/v1/files, /files/:id, /files/:id/download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn owner_and_admin_can_read_but_others_cannot() {
    let (server, state) = common::test_server().await;
    let owner = common::seed_profile(&state.db, "customer").await;
    let other = common::seed_profile(&state.db, "customer").await;
    let admin = common::seed_profile(&state.db, "admin").await;
    let owner_token = common::login(&server, &owner).await;
    let other_token = common::login(&server, &other).await;
    let admin_token = common::login(&server, &admin).await;

    let record = upload(&server, &owner_token, "report.txt", "q3 numbers").await;
    let file_id = record["id"].as_str().unwrap();

    let resp = server
        .get("/api/v1/files")
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .await;
    resp.assert_status_ok();
    let mine: Vec<serde_json::Value> = resp.json();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["id"], file_id);

    let resp = server
        .get("/api/v1/files")
        .add_query_param("user_id", &owner.id)
        .add_header(AUTHORIZATION, format!("Bearer {admin_token}"))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Vec<serde_json::Value>>().len(), 1);

    let resp = server
        .get("/api/v1/files")
        .add_query_param("user_id", &owner.id)
        .add_header(AUTHORIZATION, format!("Bearer {other_token}"))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    let resp = server
        .get(&format!("/api/v1/files/{file_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {other_token}"))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    let resp = server
        .get(&format!("/api/v1/files/{file_id}/download"))
        .add_header(AUTHORIZATION, format!("Bearer {admin_token}"))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.header(CONTENT_TYPE), "text/plain");
    assert_eq!(
        resp.header(CONTENT_DISPOSITION),
        "attachment; filename=\"report.txt\""
    );
    assert_eq!(resp.text(), "q3 numbers");

    let resp = server
        .get("/api/v1/files/fil_missing")
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);

    common::cleanup_profile(&state.db, &owner.id).await;
    common::cleanup_profile(&state.db, &other.id).await;
    common::cleanup_profile(&state.db, &admin.id).await;
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/files/:id, GET /api/v1/file-logs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_removes_object_and_activity_is_logged() {
    let (server, state) = common::test_server().await;
    let user = common::seed_profile(&state.db, "customer").await;
    let token = common::login(&server, &user).await;

    let record = upload(&server, &token, "draft.txt", "v1").await;
    let file_id = record["id"].as_str().unwrap();
    let path = record["path"].as_str().unwrap();

    server
        .get(&format!("/api/v1/files/{file_id}/download"))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await
        .assert_status_ok();

    let resp = server
        .delete(&format!("/api/v1/files/{file_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status(StatusCode::NO_CONTENT);

    assert!(state
        .storage
        .get(USER_FILES_BUCKET, path)
        .await
        .unwrap()
        .is_none());

    let resp = server
        .get(&format!("/api/v1/files/{file_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);

    let resp = server
        .get("/api/v1/file-logs")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status_ok();
    let logs: Vec<serde_json::Value> = resp.json();
    let actions: Vec<&str> = logs.iter().map(|l| l["action"].as_str().unwrap()).collect();
    assert_eq!(actions, vec!["delete", "download", "upload"]);
    assert!(logs.iter().all(|l| l["file_name"] == "draft.txt"));

    let resp = server
        .get("/api/v1/file-logs")
        .add_query_param("limit", 1)
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    assert_eq!(resp.json::<Vec<serde_json::Value>>().len(), 1);

    common::cleanup_profile(&state.db, &user.id).await;
}

#[tokio::test]
async fn file_logs_of_others_are_admin_only() {
    let (server, state) = common::test_server().await;
    let alice = common::seed_profile(&state.db, "customer").await;
    let bob = common::seed_profile(&state.db, "customer").await;
    let token = common::login(&server, &alice).await;

    let resp = server
        .get("/api/v1/file-logs")
        .add_query_param("user_id", &bob.id)
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    common::cleanup_profile(&state.db, &alice.id).await;
    common::cleanup_profile(&state.db, &bob.id).await;
}

// ---------------------------------------------------------------------------
// GET /api/v1/files/stats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stats_count_uploaded_bytes() {
    let (server, state) = common::test_server().await;
    let admin = common::seed_profile(&state.db, "admin").await;
    let user = common::seed_profile(&state.db, "customer").await;
    let admin_token = common::login(&server, &admin).await;
    let token = common::login(&server, &user).await;

    let resp = server
        .get("/api/v1/files/stats")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    upload(&server, &token, "a.txt", "12345").await;
    upload(&server, &token, "b.txt", "1234567890").await;

    let resp = server
        .get("/api/v1/files/stats")
        .add_header(AUTHORIZATION, format!("Bearer {admin_token}"))
        .await;
    resp.assert_status_ok();
    let stats: serde_json::Value = resp.json();
    assert!(stats["total_files"].as_i64().unwrap() >= 2);
    assert!(stats["total_size"].as_i64().unwrap() >= 15);
    assert!(stats["uploaded_last_24h"].as_i64().unwrap() >= 2);
    let text = stats["by_type"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["type"] == "text/plain")
        .expect("text/plain bucket");
    assert!(text["count"].as_i64().unwrap() >= 2);

    common::cleanup_profile(&state.db, &admin.id).await;
    common::cleanup_profile(&state.db, &user.id).await;
}
