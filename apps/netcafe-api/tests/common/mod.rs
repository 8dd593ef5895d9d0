#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use netcafe_api::auth::password::hash_password;
use netcafe_api::config::{self, Config};
use netcafe_api::db::kv::{KeyValueStore, MemoryStore};
use netcafe_api::db::pool::DbPool;
use netcafe_api::db::schema::{backups, profiles, workstations};
use netcafe_api::models::profile::{NewProfile, STATUS_ACTIVE};
use netcafe_api::models::workstation::{NewWorkstation, STATUS_AVAILABLE};
use netcafe_api::realtime::fanout::RealtimeBroadcast;
use netcafe_api::realtime::registry::ConnectionRegistry;
use netcafe_api::storage::{MemoryObjectStore, ObjectStore};
use netcafe_api::AppState;
use netcafe_common::id::{prefix, prefixed_ulid};

pub const TEST_PASSWORD: &str = "hunter22";

/// Build a test AppState against the `<db>_test` database with in-memory
/// token and object stores.
pub async fn test_state() -> AppState {
    let env_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(env_path);

    let mut config = Config::from_env();
    config.database_url = config::with_test_db_suffix(&config.database_url);

    let db = netcafe_api::db::pool::connect(&config.database_url).await;
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let storage: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());

    AppState {
        db,
        kv,
        storage,
        config: Arc::new(config),
        broadcast: Arc::new(RealtimeBroadcast::new()),
        connections: Arc::new(ConnectionRegistry::new()),
    }
}

/// Build the full application router wired to the test state.
pub async fn test_app() -> (Router, AppState) {
    let state = test_state().await;
    let app = netcafe_api::routes::router().with_state(state.clone());
    (app, state)
}

pub async fn test_server() -> (TestServer, AppState) {
    let (app, state) = test_app().await;
    (TestServer::new(app).unwrap(), state)
}

/// A profile inserted straight into the database.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub username: String,
}

/// Insert a profile with [`TEST_PASSWORD`], bypassing signup so admins can
/// be created too.
pub async fn seed_profile(db: &DbPool, role: &str) -> TestUser {
    seed_profile_with_status(db, role, STATUS_ACTIVE).await
}

pub async fn seed_profile_with_status(db: &DbPool, role: &str, status: &str) -> TestUser {
    let id = prefixed_ulid(prefix::USER);
    let suffix = id[id.len() - 10..].to_lowercase();
    let email = format!("{role}_{suffix}@netcafe.test");
    let username = format!("{role}_{suffix}");
    let hash = hash_password(TEST_PASSWORD).unwrap();

    let mut conn = db.get().await.expect("pool");
    diesel::insert_into(profiles::table)
        .values(NewProfile {
            id: &id,
            email: &email,
            username: &username,
            full_name: Some("Test User"),
            role,
            status,
            password_hash: &hash,
        })
        .execute(&mut conn)
        .await
        .expect("insert profile");

    TestUser {
        id,
        email,
        username,
    }
}

/// Insert an available workstation with a unique label.
pub async fn seed_workstation(db: &DbPool) -> String {
    let id = prefixed_ulid(prefix::WORKSTATION);
    let label = format!("PC-{}", &id[id.len() - 8..]);

    let mut conn = db.get().await.expect("pool");
    diesel::insert_into(workstations::table)
        .values(NewWorkstation {
            id: &id,
            label: &label,
            section: "Main floor",
            status: STATUS_AVAILABLE,
            ip_address: None,
        })
        .execute(&mut conn)
        .await
        .expect("insert workstation");
    id
}

/// Log in and return the full response body.
pub async fn login_body(
    server: &TestServer,
    user: &TestUser,
    workstation_id: Option<&str>,
) -> serde_json::Value {
    let resp = server
        .post("/api/v1/auth/login")
        .json(&serde_json::json!({
            "email": user.email,
            "password": TEST_PASSWORD,
            "workstation_id": workstation_id,
        }))
        .await;
    resp.assert_status_ok();
    resp.json()
}

/// Log in without a workstation and return the access token.
pub async fn login(server: &TestServer, user: &TestUser) -> String {
    login_body(server, user, None).await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Delete a profile; sessions, files and file logs cascade.
pub async fn cleanup_profile(db: &DbPool, user_id: &str) {
    let mut conn = db.get().await.expect("pool");
    diesel::delete(profiles::table.filter(profiles::id.eq(user_id)))
        .execute(&mut conn)
        .await
        .ok();
}

pub async fn cleanup_workstation(db: &DbPool, workstation_id: &str) {
    let mut conn = db.get().await.expect("pool");
    diesel::delete(workstations::table.filter(workstations::id.eq(workstation_id)))
        .execute(&mut conn)
        .await
        .ok();
}

pub async fn cleanup_backup(db: &DbPool, backup_id: &str) {
    let mut conn = db.get().await.expect("pool");
    diesel::delete(backups::table.filter(backups::id.eq(backup_id)))
        .execute(&mut conn)
        .await
        .ok();
}
