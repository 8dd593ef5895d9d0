//! Admin dashboard: health scoring and log export.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AdminUser;
use crate::db::schema::{backups, file_logs, files, sessions as sessions_table, workstations};
use crate::error::{ApiError, ApiErrorBody};
use crate::health::{self, HealthInputs, HealthScores};
use crate::models::backup::Backup;
use crate::models::file_log::FileLog;
use crate::models::session::Session;
use crate::models::workstation::STATUS_OCCUPIED;
use crate::sessions;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/system/health", get(system_health))
        .route("/system/logs/export", get(export_logs))
}

// ---------------------------------------------------------------------------
// GET /api/v1/system/health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct SystemHealthResponse {
    #[serde(flatten)]
    pub scores: HealthScores,
    pub active_workstations: i64,
    pub total_workstations: i64,
    /// Open sessions, one per user.
    pub active_sessions: i64,
    pub total_files: i64,
    pub last_backup_at: Option<DateTime<Utc>>,
    pub realtime_connections: usize,
    pub timestamp: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/v1/system/health",
    tag = "System",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Health scores and counts", body = SystemHealthResponse),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
    ),
)]
pub async fn system_health(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<SystemHealthResponse>, ApiError> {
    let mut conn = state.db.get().await?;

    let total_workstations: i64 =
        diesel_async::RunQueryDsl::get_result(workstations::table.count(), &mut conn).await?;
    let active_workstations: i64 = diesel_async::RunQueryDsl::get_result(
        workstations::table
            .filter(workstations::status.eq(STATUS_OCCUPIED))
            .count(),
        &mut conn,
    )
    .await?;
    let total_files: i64 =
        diesel_async::RunQueryDsl::get_result(files::table.count(), &mut conn).await?;

    let open = sessions::load_open_sessions(&mut conn).await?;
    let active_sessions = sessions::latest_per_user(open).len() as i64;

    let last_backup: Option<(String, DateTime<Utc>)> = diesel_async::RunQueryDsl::get_result(
        backups::table
            .order((backups::started_at.desc(), backups::id.desc()))
            .limit(1)
            .select((backups::status, backups::started_at)),
        &mut conn,
    )
    .await
    .optional()?;

    let (last_backup_status, last_backup_at) = match last_backup {
        Some((status, at)) => (Some(status), Some(at)),
        None => (None, None),
    };

    let scores = health::compute(&HealthInputs {
        occupied_workstations: active_workstations,
        total_workstations,
        active_sessions,
        total_files,
        last_backup_status,
    });

    if scores.status != "healthy" {
        tracing::warn!(overall = scores.overall, status = %scores.status, "system health below threshold");
    }

    Ok(Json(SystemHealthResponse {
        scores,
        active_workstations,
        total_workstations,
        active_sessions,
        total_files,
        last_backup_at,
        realtime_connections: state.connections.len(),
        timestamp: Utc::now(),
    }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/system/logs/export
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogExport {
    pub generated_at: DateTime<Utc>,
    pub since: DateTime<Utc>,
    pub file_logs: Vec<FileLog>,
    pub sessions: Vec<Session>,
    pub backups: Vec<Backup>,
}

#[utoipa::path(
    get,
    path = "/api/v1/system/logs/export",
    tag = "System",
    security(("bearer" = [])),
    params(
        ("days" = Option<i64>, Query, description = "Look-back window in days (1-365, default 7)"),
    ),
    responses(
        (status = 200, description = "Activity in the window, newest first", body = LogExport),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
    ),
)]
pub async fn export_logs(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<Json<LogExport>, ApiError> {
    let days = params.days.unwrap_or(7).clamp(1, 365);
    let generated_at = Utc::now();
    let since = generated_at - Duration::days(days);

    let mut conn = state.db.get().await?;

    let file_logs: Vec<FileLog> = diesel_async::RunQueryDsl::load(
        file_logs::table
            .filter(file_logs::created_at.ge(since))
            .order(file_logs::created_at.desc())
            .select(FileLog::as_select()),
        &mut conn,
    )
    .await?;

    let sessions: Vec<Session> = diesel_async::RunQueryDsl::load(
        sessions_table::table
            .filter(sessions_table::started_at.ge(since))
            .order(sessions_table::started_at.desc())
            .select(Session::as_select()),
        &mut conn,
    )
    .await?;

    let backups: Vec<Backup> = diesel_async::RunQueryDsl::load(
        backups::table
            .filter(backups::started_at.ge(since))
            .order(backups::started_at.desc())
            .select(Backup::as_select()),
        &mut conn,
    )
    .await?;

    tracing::info!(
        exported_by = %admin.user_id,
        days,
        file_logs = file_logs.len(),
        sessions = sessions.len(),
        backups = backups.len(),
        "logs exported"
    );

    Ok(Json(LogExport {
        generated_at,
        since,
        file_logs,
        sessions,
        backups,
    }))
}
