//! Customer file storage: upload, list, download, delete, usage stats.

use std::collections::BTreeMap;

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use netcafe_common::PrefixedId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::{AdminUser, AuthUser};
use crate::db::schema::files;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::file::{FileRecord, NewFileRecord};
use crate::models::file_log::{self, ACTION_DELETE, ACTION_DOWNLOAD, ACTION_UPLOAD};
use crate::realtime::events::{ChangeKind, Table};
use crate::storage::{object_path, sanitize_file_name, USER_FILES_BUCKET};
use crate::AppState;

const UPLOAD_FIELD: &str = "file";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/files", get(list_files).post(upload_file))
        .route("/files/stats", get(file_stats))
        .route("/files/{id}", get(get_file).delete(delete_file))
        .route("/files/{id}/download", get(download_file))
}

/// Load a file row the caller may act on.
async fn load_accessible(
    state: &AppState,
    auth: &AuthUser,
    id: &str,
) -> Result<FileRecord, ApiError> {
    let mut conn = state.db.get().await?;
    let record: FileRecord = diesel_async::RunQueryDsl::get_result(
        files::table.find(id).select(FileRecord::as_select()),
        &mut conn,
    )
    .await
    .optional()?
    .ok_or_else(|| ApiError::not_found("File not found"))?;

    if !auth.can_access(&record.user_id) {
        return Err(ApiError::forbidden("You can only access your own files"));
    }
    Ok(record)
}

/// Append a file log row and publish it. Failures are logged and swallowed:
/// the file operation itself has already succeeded.
async fn log_activity(state: &AppState, user_id: &str, file_name: &str, action: &str) {
    let result = async {
        let mut conn = state.db.get().await?;
        let entry = file_log::record(&mut conn, user_id, file_name, action).await?;
        Ok::<_, ApiError>(entry)
    }
    .await;

    match result {
        Ok(entry) => state.broadcast.publish(
            Table::FileLogs,
            ChangeKind::Insert,
            Some(entry.user_id.as_str()),
            &entry,
        ),
        Err(err) => tracing::error!(?err, %user_id, %action, "failed to record file activity"),
    }
}

// ---------------------------------------------------------------------------
// POST /api/v1/files
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/files",
    tag = "Files",
    security(("bearer" = [])),
    request_body(content_type = "multipart/form-data", description = "Form with a `file` part"),
    responses(
        (status = 201, description = "File stored", body = FileRecord),
        (status = 400, description = "Missing or empty file", body = ApiErrorBody),
        (status = 413, description = "File too large", body = ApiErrorBody),
    ),
)]
pub async fn upload_file(
    AuthUser { user_id, .. }: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileRecord>), ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or("file").to_string();
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let bytes = field.bytes().await?;
        upload = Some((name, content_type, bytes));
        break;
    }

    let (name, content_type, bytes) =
        upload.ok_or_else(|| ApiError::bad_request("Multipart form must include a file part"))?;

    if bytes.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }
    if bytes.len() > state.config.max_upload_bytes {
        return Err(ApiError::payload_too_large(format!(
            "File exceeds the {} byte limit",
            state.config.max_upload_bytes
        )));
    }

    let file_id = FileRecord::generate();
    let display_name = sanitize_file_name(&name);
    let path = object_path(&user_id, &file_id, &name);
    let size = bytes.len() as i64;

    state
        .storage
        .put(USER_FILES_BUCKET, &path, bytes.to_vec())
        .await?;

    let inserted = async {
        let mut conn = state.db.get().await?;
        let record: FileRecord = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(files::table)
                .values(NewFileRecord {
                    id: &file_id,
                    user_id: &user_id,
                    name: &display_name,
                    path: &path,
                    size,
                    content_type: &content_type,
                })
                .returning(FileRecord::as_returning()),
            &mut conn,
        )
        .await?;
        Ok::<_, ApiError>(record)
    }
    .await;

    let record = match inserted {
        Ok(record) => record,
        Err(err) => {
            // No row points at the object, so drop it.
            if let Err(cleanup) = state.storage.delete(USER_FILES_BUCKET, &path).await {
                tracing::warn!(?cleanup, %path, "failed to remove orphaned upload");
            }
            return Err(err);
        }
    };

    tracing::info!(file_id = %record.id, %user_id, size, "file uploaded");
    state.broadcast.publish(
        Table::Files,
        ChangeKind::Insert,
        Some(record.user_id.as_str()),
        &record,
    );
    log_activity(&state, &user_id, &record.name, ACTION_UPLOAD).await;

    Ok((StatusCode::CREATED, Json(record)))
}

// ---------------------------------------------------------------------------
// GET /api/v1/files
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    /// Admin only: list another user's files.
    pub user_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/files",
    tag = "Files",
    security(("bearer" = [])),
    params(
        ("user_id" = Option<String>, Query, description = "Owner to list (admin only)"),
    ),
    responses(
        (status = 200, description = "Files, newest first", body = Vec<FileRecord>),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
    ),
)]
pub async fn list_files(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListFilesParams>,
) -> Result<Json<Vec<FileRecord>>, ApiError> {
    let owner = params.user_id.unwrap_or_else(|| auth.user_id.clone());
    if !auth.can_access(&owner) {
        return Err(ApiError::forbidden("You can only list your own files"));
    }

    let mut conn = state.db.get().await?;
    let rows: Vec<FileRecord> = diesel_async::RunQueryDsl::load(
        files::table
            .filter(files::user_id.eq(&owner))
            .order(files::created_at.desc())
            .select(FileRecord::as_select()),
        &mut conn,
    )
    .await?;
    Ok(Json(rows))
}

// ---------------------------------------------------------------------------
// GET /api/v1/files/:id
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}",
    tag = "Files",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "File metadata", body = FileRecord),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn get_file(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, ApiError> {
    Ok(Json(load_accessible(&state, &auth, &id).await?))
}

// ---------------------------------------------------------------------------
// GET /api/v1/files/:id/download
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}/download",
    tag = "Files",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn download_file(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let record = load_accessible(&state, &auth, &id).await?;

    let bytes = state
        .storage
        .get(USER_FILES_BUCKET, &record.path)
        .await?
        .ok_or_else(|| {
            tracing::error!(file_id = %record.id, path = %record.path, "stored object missing");
            ApiError::not_found("File contents not found")
        })?;

    log_activity(&state, &auth.user_id, &record.name, ACTION_DOWNLOAD).await;

    let content_type = HeaderValue::from_str(&record.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        sanitize_file_name(&record.name)
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(bytes),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/files/:id
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/v1/files/{id}",
    tag = "Files",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 204, description = "File deleted"),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_file(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let record = load_accessible(&state, &auth, &id).await?;

    {
        let mut conn = state.db.get().await?;
        diesel_async::RunQueryDsl::execute(diesel::delete(files::table.find(&id)), &mut conn)
            .await?;
    }

    if let Err(err) = state.storage.delete(USER_FILES_BUCKET, &record.path).await {
        tracing::warn!(?err, path = %record.path, "failed to remove stored object");
    }

    tracing::info!(file_id = %id, deleted_by = %auth.user_id, "file deleted");
    state.broadcast.publish(
        Table::Files,
        ChangeKind::Delete,
        Some(record.user_id.as_str()),
        &serde_json::json!({ "id": record.id, "user_id": record.user_id }),
    );
    log_activity(&state, &auth.user_id, &record.name, ACTION_DELETE).await;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// GET /api/v1/files/stats
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct TypeUsage {
    #[serde(rename = "type")]
    pub content_type: String,
    pub count: i64,
    pub size: i64,
}

#[derive(Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct FileStats {
    pub total_files: i64,
    pub total_size: i64,
    /// Per content type, largest total size first.
    pub by_type: Vec<TypeUsage>,
    pub uploaded_last_24h: i64,
}

/// Fold `(type, size, created_at)` rows into usage totals.
pub fn summarize(rows: &[(String, i64, DateTime<Utc>)], now: DateTime<Utc>) -> FileStats {
    let day_ago = now - Duration::hours(24);
    let mut by_type: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
    let mut total_size = 0;
    let mut recent = 0;

    for (content_type, size, created_at) in rows {
        total_size += size;
        if *created_at >= day_ago {
            recent += 1;
        }
        let entry = by_type.entry(content_type.as_str()).or_default();
        entry.0 += 1;
        entry.1 += size;
    }

    let mut by_type: Vec<TypeUsage> = by_type
        .into_iter()
        .map(|(content_type, (count, size))| TypeUsage {
            content_type: content_type.to_string(),
            count,
            size,
        })
        .collect();
    by_type.sort_by(|a, b| b.size.cmp(&a.size));

    FileStats {
        total_files: rows.len() as i64,
        total_size,
        by_type,
        uploaded_last_24h: recent,
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/files/stats",
    tag = "Files",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Storage usage", body = FileStats),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
    ),
)]
pub async fn file_stats(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<FileStats>, ApiError> {
    let mut conn = state.db.get().await?;
    let rows: Vec<(String, i64, DateTime<Utc>)> = diesel_async::RunQueryDsl::load(
        files::table.select((files::content_type, files::size, files::created_at)),
        &mut conn,
    )
    .await?;
    Ok(Json(summarize(&rows, Utc::now())))
}
