mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use netcafe_api::db::schema::{file_logs, files, workstations};
use netcafe_api::storage::USER_FILES_BUCKET;

fn note_upload() -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(b"saved game".to_vec())
            .file_name("save.txt")
            .mime_type("text/plain"),
    )
}

// ---------------------------------------------------------------------------
// GET /api/v1/profiles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_profiles_is_admin_only() {
    let (server, state) = common::test_server().await;
    let admin = common::seed_profile(&state.db, "admin").await;
    let customer = common::seed_profile(&state.db, "customer").await;
    let admin_token = common::login(&server, &admin).await;
    let customer_token = common::login(&server, &customer).await;

    let resp = server
        .get("/api/v1/profiles")
        .add_header(AUTHORIZATION, format!("Bearer {customer_token}"))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    let resp = server
        .get("/api/v1/profiles")
        .add_header(AUTHORIZATION, format!("Bearer {admin_token}"))
        .await;
    resp.assert_status_ok();
    let body: Vec<serde_json::Value> = resp.json();
    let ids: Vec<&str> = body.iter().map(|p| p["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&admin.id.as_str()));
    assert!(ids.contains(&customer.id.as_str()));

    common::cleanup_profile(&state.db, &admin.id).await;
    common::cleanup_profile(&state.db, &customer.id).await;
}

// ---------------------------------------------------------------------------
// GET /api/v1/profiles/:id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn customers_see_only_their_own_profile() {
    let (server, state) = common::test_server().await;
    let alice = common::seed_profile(&state.db, "customer").await;
    let bob = common::seed_profile(&state.db, "customer").await;
    let token = common::login(&server, &alice).await;

    let resp = server
        .get(&format!("/api/v1/profiles/{}", alice.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["username"], alice.username);

    let resp = server
        .get(&format!("/api/v1/profiles/{}", bob.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    common::cleanup_profile(&state.db, &alice.id).await;
    common::cleanup_profile(&state.db, &bob.id).await;
}

// ---------------------------------------------------------------------------
// PATCH /api/v1/profiles/:id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn customer_updates_own_display_fields() {
    let (server, state) = common::test_server().await;
    let user = common::seed_profile(&state.db, "customer").await;
    let token = common::login(&server, &user).await;
    let new_name = format!("{}_new", user.username);

    let resp = server
        .patch(&format!("/api/v1/profiles/{}", user.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&serde_json::json!({
            "username": new_name,
            "full_name": "Grace Hopper",
        }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["username"], new_name);
    assert_eq!(body["full_name"], "Grace Hopper");
    assert_eq!(body["role"], "customer");

    common::cleanup_profile(&state.db, &user.id).await;
}

#[tokio::test]
async fn customer_cannot_change_role() {
    let (server, state) = common::test_server().await;
    let user = common::seed_profile(&state.db, "customer").await;
    let token = common::login(&server, &user).await;

    let resp = server
        .patch(&format!("/api/v1/profiles/{}", user.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&serde_json::json!({ "role": "admin" }))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    common::cleanup_profile(&state.db, &user.id).await;
}

#[tokio::test]
async fn admin_suspends_customer_and_login_is_refused() {
    let (server, state) = common::test_server().await;
    let admin = common::seed_profile(&state.db, "admin").await;
    let customer = common::seed_profile(&state.db, "customer").await;
    let token = common::login(&server, &admin).await;

    let resp = server
        .patch(&format!("/api/v1/profiles/{}", customer.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&serde_json::json!({ "status": "suspended" }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["status"], "suspended");

    let resp = server
        .post("/api/v1/auth/login")
        .json(&serde_json::json!({
            "email": customer.email,
            "password": common::TEST_PASSWORD,
        }))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    common::cleanup_profile(&state.db, &admin.id).await;
    common::cleanup_profile(&state.db, &customer.id).await;
}

#[tokio::test]
async fn suspended_customer_token_stops_working() {
    let (server, state) = common::test_server().await;
    let admin = common::seed_profile(&state.db, "admin").await;
    let customer = common::seed_profile(&state.db, "customer").await;
    let admin_token = common::login(&server, &admin).await;
    let body = common::login_body(&server, &customer, None).await;
    let token = body["access_token"].as_str().unwrap();
    let session_id = body["session"]["id"].as_str().unwrap();

    server
        .patch(&format!("/api/v1/profiles/{}", customer.id))
        .add_header(AUTHORIZATION, format!("Bearer {admin_token}"))
        .json(&serde_json::json!({ "status": "suspended" }))
        .await
        .assert_status_ok();

    let resp = server
        .get("/api/v1/auth/me")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "FORBIDDEN");

    server
        .post(&format!("/api/v1/sessions/{session_id}/activity"))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    server
        .post("/api/v1/files")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .multipart(note_upload())
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let mut conn = state.db.get().await.unwrap();
    let uploaded: i64 = files::table
        .filter(files::user_id.eq(&customer.id))
        .count()
        .get_result(&mut conn)
        .await
        .unwrap();
    assert_eq!(uploaded, 0);

    common::cleanup_profile(&state.db, &admin.id).await;
    common::cleanup_profile(&state.db, &customer.id).await;
}

#[tokio::test]
async fn invalid_role_and_self_demotion_are_rejected() {
    let (server, state) = common::test_server().await;
    let admin = common::seed_profile(&state.db, "admin").await;
    let token = common::login(&server, &admin).await;

    let resp = server
        .patch(&format!("/api/v1/profiles/{}", admin.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&serde_json::json!({ "role": "superuser" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.json::<serde_json::Value>()["error"]["code"],
        "VALIDATION_ERROR"
    );

    let resp = server
        .patch(&format!("/api/v1/profiles/{}", admin.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&serde_json::json!({ "role": "customer" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "BAD_REQUEST");

    common::cleanup_profile(&state.db, &admin.id).await;
}

#[tokio::test]
async fn taken_username_is_conflict() {
    let (server, state) = common::test_server().await;
    let alice = common::seed_profile(&state.db, "customer").await;
    let bob = common::seed_profile(&state.db, "customer").await;
    let token = common::login(&server, &alice).await;

    let resp = server
        .patch(&format!("/api/v1/profiles/{}", alice.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&serde_json::json!({ "username": bob.username }))
        .await;
    resp.assert_status(StatusCode::CONFLICT);

    common::cleanup_profile(&state.db, &alice.id).await;
    common::cleanup_profile(&state.db, &bob.id).await;
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/profiles/:id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deleting_profile_removes_files_and_releases_workstation() {
    let (server, state) = common::test_server().await;
    let admin = common::seed_profile(&state.db, "admin").await;
    let customer = common::seed_profile(&state.db, "customer").await;
    let ws_id = common::seed_workstation(&state.db).await;
    let token = common::login(&server, &admin).await;
    let body = common::login_body(&server, &customer, Some(&ws_id)).await;
    let customer_token = body["access_token"].as_str().unwrap();

    let resp = server
        .post("/api/v1/files")
        .add_header(AUTHORIZATION, format!("Bearer {customer_token}"))
        .multipart(note_upload())
        .await;
    resp.assert_status(StatusCode::CREATED);
    let path = resp.json::<serde_json::Value>()["path"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(state.storage.get(USER_FILES_BUCKET, &path).await.unwrap().is_some());

    let resp = server
        .delete(&format!("/api/v1/profiles/{}", customer.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status(StatusCode::NO_CONTENT);

    let mut conn = state.db.get().await.unwrap();
    let status: String = workstations::table
        .find(&ws_id)
        .select(workstations::status)
        .get_result(&mut conn)
        .await
        .unwrap();
    assert_eq!(status, "available");

    let file_rows: i64 = files::table
        .filter(files::user_id.eq(&customer.id))
        .count()
        .get_result(&mut conn)
        .await
        .unwrap();
    assert_eq!(file_rows, 0);
    let log_rows: i64 = file_logs::table
        .filter(file_logs::user_id.eq(&customer.id))
        .count()
        .get_result(&mut conn)
        .await
        .unwrap();
    assert_eq!(log_rows, 0);
    assert!(state.storage.get(USER_FILES_BUCKET, &path).await.unwrap().is_none());

    let resp = server
        .get(&format!("/api/v1/profiles/{}", customer.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);

    // The deleted customer's token no longer authenticates.
    server
        .get("/api/v1/auth/me")
        .add_header(AUTHORIZATION, format!("Bearer {customer_token}"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    common::cleanup_profile(&state.db, &admin.id).await;
    common::cleanup_workstation(&state.db, &ws_id).await;
}

#[tokio::test]
async fn admin_cannot_delete_self() {
    let (server, state) = common::test_server().await;
    let admin = common::seed_profile(&state.db, "admin").await;
    let token = common::login(&server, &admin).await;

    let resp = server
        .delete(&format!("/api/v1/profiles/{}", admin.id))
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let resp = server
        .delete("/api/v1/profiles/usr_missing")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);

    common::cleanup_profile(&state.db, &admin.id).await;
}
