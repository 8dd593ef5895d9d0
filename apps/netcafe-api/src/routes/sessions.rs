//! Session console: active view, history, admin open/close, stale sweep.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::{AdminUser, AuthUser};
use crate::db::schema::{profiles, sessions as sessions_table, workstations};
use crate::error::{ApiError, ApiErrorBody};
use crate::models::profile;
use crate::models::session::{ActiveSession, Session};
use crate::realtime::events::{ChangeKind, Table};
use crate::sessions;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/active", get(active_sessions))
        .route("/sessions/mine", get(my_sessions))
        .route("/sessions/cleanup", post(cleanup_sessions))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/end", post(end_session))
        .route("/sessions/{id}/activity", post(record_activity))
}

// ---------------------------------------------------------------------------
// GET /api/v1/sessions/active
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveSessionsResponse {
    /// One open session per user, newest first.
    pub sessions: Vec<ActiveSession>,
    /// Open rows before de-duplication.
    pub raw_count: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/active",
    tag = "Sessions",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Open sessions, one per user", body = ActiveSessionsResponse),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
    ),
)]
pub async fn active_sessions(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<ActiveSessionsResponse>, ApiError> {
    let mut conn = state.db.get().await?;
    let rows = sessions::load_open_sessions(&mut conn).await?;
    let raw_count = rows.len();
    let sessions = sessions::latest_per_user(rows);

    if sessions.len() != raw_count {
        tracing::debug!(raw_count, unique = sessions.len(), "duplicate open sessions collapsed");
    }

    Ok(Json(ActiveSessionsResponse {
        sessions,
        raw_count,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListSessionsParams {
    pub days: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Sessions",
    security(("bearer" = [])),
    params(
        ("days" = Option<i64>, Query, description = "Look-back window in days (1-365, default 7)"),
    ),
    responses(
        (status = 200, description = "Sessions started in the window, oldest first", body = Vec<Session>),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
    ),
)]
pub async fn list_sessions(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(params): Query<ListSessionsParams>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let days = params.days.unwrap_or(7).clamp(1, 365);
    let since = Utc::now() - Duration::days(days);

    let mut conn = state.db.get().await?;
    let rows: Vec<Session> = diesel_async::RunQueryDsl::load(
        sessions_table::table
            .filter(sessions_table::started_at.ge(since))
            .order(sessions_table::started_at.asc())
            .select(Session::as_select()),
        &mut conn,
    )
    .await?;
    Ok(Json(rows))
}

// ---------------------------------------------------------------------------
// GET /api/v1/sessions/mine
// ---------------------------------------------------------------------------

const MY_SESSIONS_LIMIT: i64 = 50;

#[utoipa::path(
    get,
    path = "/api/v1/sessions/mine",
    tag = "Sessions",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Caller's recent sessions, newest first", body = Vec<Session>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn my_sessions(
    AuthUser { user_id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let mut conn = state.db.get().await?;
    let rows: Vec<Session> = diesel_async::RunQueryDsl::load(
        sessions_table::table
            .filter(sessions_table::user_id.eq(&user_id))
            .order(sessions_table::started_at.desc())
            .limit(MY_SESSIONS_LIMIT)
            .select(Session::as_select()),
        &mut conn,
    )
    .await?;
    Ok(Json(rows))
}

// ---------------------------------------------------------------------------
// GET /api/v1/sessions/:id
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionProfile {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub profile: SessionProfile,
    pub workstation_label: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}",
    tag = "Sessions",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session with profile and workstation", body = SessionDetail),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn get_session(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetail>, ApiError> {
    let mut conn = state.db.get().await?;

    let (session, (email, username, full_name)): (Session, (String, String, Option<String>)) =
        diesel_async::RunQueryDsl::get_result(
            sessions_table::table
                .inner_join(profiles::table)
                .filter(sessions_table::id.eq(&id))
                .select((
                    Session::as_select(),
                    (profiles::email, profiles::username, profiles::full_name),
                )),
            &mut conn,
        )
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Session not found"))?;

    if !auth.can_access(&session.user_id) {
        return Err(ApiError::forbidden("You can only view your own sessions"));
    }

    let workstation_label: Option<String> = match session.workstation_id {
        Some(ref ws_id) => diesel_async::RunQueryDsl::get_result(
            workstations::table.find(ws_id).select(workstations::label),
            &mut conn,
        )
        .await
        .optional()?,
        None => None,
    };

    Ok(Json(SessionDetail {
        session,
        profile: SessionProfile {
            email,
            username,
            full_name,
        },
        workstation_label,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/v1/sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub workstation_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    tag = "Sessions",
    security(("bearer" = [])),
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session opened", body = Session),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
        (status = 404, description = "User or workstation not found", body = ApiErrorBody),
        (status = 409, description = "Workstation not available", body = ApiErrorBody),
    ),
)]
pub async fn create_session(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let mut conn = state.db.get().await?;

    profile::find(&mut conn, &body.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let change =
        sessions::open_session(&mut conn, &body.user_id, body.workstation_id.as_deref()).await?;

    tracing::info!(
        session_id = %change.session.id,
        user_id = %body.user_id,
        workstation_id = ?body.workstation_id,
        opened_by = %admin.user_id,
        "session opened from console"
    );
    change.publish(&state.broadcast, ChangeKind::Insert);

    Ok((StatusCode::CREATED, Json(change.session)))
}

// ---------------------------------------------------------------------------
// POST /api/v1/sessions/:id/end
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/end",
    tag = "Sessions",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session ended", body = Session),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Already ended", body = ApiErrorBody),
    ),
)]
pub async fn end_session(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let mut conn = state.db.get().await?;

    let owner: String = diesel_async::RunQueryDsl::get_result(
        sessions_table::table.find(&id).select(sessions_table::user_id),
        &mut conn,
    )
    .await
    .optional()?
    .ok_or_else(|| ApiError::not_found("Session not found"))?;

    if !auth.can_access(&owner) {
        return Err(ApiError::forbidden("You can only end your own sessions"));
    }

    let change = sessions::close_session(&mut conn, &id).await?;
    tracing::info!(session_id = %id, ended_by = %auth.user_id, "session ended");
    change.publish(&state.broadcast, ChangeKind::Update);

    Ok(Json(change.session))
}

// ---------------------------------------------------------------------------
// POST /api/v1/sessions/:id/activity
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/activity",
    tag = "Sessions",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Activity recorded", body = Session),
        (status = 403, description = "Not the session owner", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Session already ended", body = ApiErrorBody),
    ),
)]
pub async fn record_activity(
    AuthUser { user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let mut conn = state.db.get().await?;

    let owner: String = diesel_async::RunQueryDsl::get_result(
        sessions_table::table.find(&id).select(sessions_table::user_id),
        &mut conn,
    )
    .await
    .optional()?
    .ok_or_else(|| ApiError::not_found("Session not found"))?;

    if owner != user_id {
        return Err(ApiError::forbidden("Not your session"));
    }

    let session = sessions::touch_session(&mut conn, &id).await?;
    state.broadcast.publish(
        Table::Sessions,
        ChangeKind::Update,
        Some(session.user_id.as_str()),
        &session,
    );

    Ok(Json(session))
}

// ---------------------------------------------------------------------------
// POST /api/v1/sessions/cleanup
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CleanupRequest {
    #[serde(default)]
    pub dry_run: bool,
    /// Defaults to the configured stale threshold.
    pub older_than_hours: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupResponse {
    pub cutoff: DateTime<Utc>,
    pub stale_count: usize,
    /// Sessions closed by this call. Empty on a dry run.
    pub closed: Vec<Session>,
}

#[utoipa::path(
    post,
    path = "/api/v1/sessions/cleanup",
    tag = "Sessions",
    security(("bearer" = [])),
    request_body = CleanupRequest,
    responses(
        (status = 200, description = "Sweep result", body = CleanupResponse),
        (status = 400, description = "Invalid threshold", body = ApiErrorBody),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
    ),
)]
pub async fn cleanup_sessions(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    body: Option<Json<CleanupRequest>>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let hours = body
        .older_than_hours
        .unwrap_or(state.config.stale_session_hours);
    if hours < 1 {
        return Err(ApiError::bad_request("older_than_hours must be at least 1"));
    }
    let cutoff = sessions::stale_cutoff(Utc::now(), hours)
        .ok_or_else(|| ApiError::bad_request("older_than_hours is out of range"))?;
    let mut conn = state.db.get().await?;

    if body.dry_run {
        let stale = sessions::find_stale(&mut conn, cutoff).await?;
        return Ok(Json(CleanupResponse {
            cutoff,
            stale_count: stale.len(),
            closed: Vec::new(),
        }));
    }

    let sweep = sessions::close_stale_sessions(&mut conn, cutoff).await?;
    tracing::info!(
        closed = sweep.closed.len(),
        released = sweep.released.len(),
        %cutoff,
        requested_by = %admin.user_id,
        "stale sessions closed"
    );
    sweep.publish(&state.broadcast);

    Ok(Json(CleanupResponse {
        cutoff,
        stale_count: sweep.closed.len(),
        closed: sweep.closed,
    }))
}
