//! File activity history.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use diesel::prelude::*;
use serde::Deserialize;

use crate::auth::middleware::AuthUser;
use crate::db::schema::file_logs;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::file_log::FileLog;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/file-logs", get(list_file_logs))
}

#[derive(Debug, Deserialize)]
pub struct FileLogParams {
    /// Admin only.
    pub user_id: Option<String>,
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/file-logs",
    tag = "File Logs",
    security(("bearer" = [])),
    params(
        ("user_id" = Option<String>, Query, description = "User to list (admin only)"),
        ("limit" = Option<i64>, Query, description = "Number of entries (1-200, default 50)"),
    ),
    responses(
        (status = 200, description = "Activity, newest first", body = Vec<FileLog>),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
    ),
)]
pub async fn list_file_logs(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<FileLogParams>,
) -> Result<Json<Vec<FileLog>>, ApiError> {
    let owner = params.user_id.unwrap_or_else(|| auth.user_id.clone());
    if !auth.can_access(&owner) {
        return Err(ApiError::forbidden("You can only view your own activity"));
    }
    let limit = params.limit.unwrap_or(50).clamp(1, 200);

    let mut conn = state.db.get().await?;
    let rows: Vec<FileLog> = diesel_async::RunQueryDsl::load(
        file_logs::table
            .filter(file_logs::user_id.eq(&owner))
            .order((file_logs::created_at.desc(), file_logs::id.desc()))
            .limit(limit)
            .select(FileLog::as_select()),
        &mut conn,
    )
    .await?;
    Ok(Json(rows))
}
