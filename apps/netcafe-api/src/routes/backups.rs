//! Backup run bookkeeping.
//!
//! A run is created `in_progress` and finished exactly once, as either
//! `completed` or `failed`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use netcafe_common::PrefixedId;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::middleware::AdminUser;
use crate::db::schema::backups;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::backup::{
    Backup, FinishBackup, NewBackup, STATUS_COMPLETED, STATUS_FAILED, STATUS_IN_PROGRESS,
};
use crate::realtime::events::{ChangeKind, Table};
use crate::validation;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/backups", get(list_backups).post(start_backup))
        .route("/backups/{id}", patch(finish_backup))
}

// ---------------------------------------------------------------------------
// POST /api/v1/backups
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/backups",
    tag = "Backups",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Backup run started", body = Backup),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
    ),
)]
pub async fn start_backup(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Backup>), ApiError> {
    let mut conn = state.db.get().await?;
    let id = Backup::generate();

    let backup: Backup = diesel_async::RunQueryDsl::get_result(
        diesel::insert_into(backups::table)
            .values(NewBackup {
                id: &id,
                status: STATUS_IN_PROGRESS,
                backup_size: 0,
                file_count: 0,
                created_by: Some(&admin.user_id),
                started_at: Utc::now(),
            })
            .returning(Backup::as_returning()),
        &mut conn,
    )
    .await?;

    tracing::info!(backup_id = %backup.id, started_by = %admin.user_id, "backup started");
    state
        .broadcast
        .publish(Table::Backups, ChangeKind::Insert, None, &backup);

    Ok((StatusCode::CREATED, Json(backup)))
}

// ---------------------------------------------------------------------------
// PATCH /api/v1/backups/:id
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct FinishBackupRequest {
    /// `completed` or `failed`.
    pub status: String,
    pub backup_size: Option<i64>,
    pub file_count: Option<i32>,
}

#[utoipa::path(
    patch,
    path = "/api/v1/backups/{id}",
    tag = "Backups",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Backup ID")),
    request_body = FinishBackupRequest,
    responses(
        (status = 200, description = "Backup finished", body = Backup),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Backup already finished", body = ApiErrorBody),
    ),
)]
pub async fn finish_backup(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<FinishBackupRequest>,
) -> Result<Json<Backup>, ApiError> {
    let mut errors = Vec::new();
    validation::check_one_of(
        "status",
        &body.status,
        &[STATUS_COMPLETED, STATUS_FAILED],
        &mut errors,
    );
    if body.backup_size.is_some_and(|s| s < 0) {
        errors.push(FieldError::new("backup_size", "Must not be negative"));
    }
    if body.file_count.is_some_and(|c| c < 0) {
        errors.push(FieldError::new("file_count", "Must not be negative"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let mut conn = state.db.get().await?;

    let current: Backup = diesel_async::RunQueryDsl::get_result(
        backups::table.find(&id).select(Backup::as_select()),
        &mut conn,
    )
    .await
    .optional()?
    .ok_or_else(|| ApiError::not_found("Backup not found"))?;

    let changes = FinishBackup {
        status: &body.status,
        backup_size: body.backup_size.unwrap_or(current.backup_size),
        file_count: body.file_count.unwrap_or(current.file_count),
        completed_at: Utc::now(),
    };

    let updated: Backup = diesel_async::RunQueryDsl::get_result(
        diesel::update(
            backups::table
                .find(&id)
                .filter(backups::status.eq(STATUS_IN_PROGRESS)),
        )
        .set(&changes)
        .returning(Backup::as_returning()),
        &mut conn,
    )
    .await
    .optional()?
    .ok_or_else(|| ApiError::conflict(format!("Backup is already {}", current.status)))?;

    tracing::info!(
        backup_id = %updated.id,
        status = %updated.status,
        size = updated.backup_size,
        files = updated.file_count,
        "backup finished"
    );
    state
        .broadcast
        .publish(Table::Backups, ChangeKind::Update, None, &updated);

    Ok(Json(updated))
}

// ---------------------------------------------------------------------------
// GET /api/v1/backups
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListBackupsParams {
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/backups",
    tag = "Backups",
    security(("bearer" = [])),
    params(
        ("limit" = Option<i64>, Query, description = "Number of runs (1-100, default 10)"),
    ),
    responses(
        (status = 200, description = "Backup runs, newest first", body = Vec<Backup>),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
    ),
)]
pub async fn list_backups(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(params): Query<ListBackupsParams>,
) -> Result<Json<Vec<Backup>>, ApiError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 100);

    let mut conn = state.db.get().await?;
    let rows: Vec<Backup> = diesel_async::RunQueryDsl::load(
        backups::table
            .order((backups::started_at.desc(), backups::id.desc()))
            .limit(limit)
            .select(Backup::as_select()),
        &mut conn,
    )
    .await?;
    Ok(Json(rows))
}
