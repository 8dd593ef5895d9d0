//! Auth routes: signup, login/logout with workstation sessions, token refresh.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use diesel::prelude::*;
use netcafe_common::PrefixedId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::auth::{password, tokens};
use crate::db::schema::profiles;
use crate::error::{is_unique_violation, ApiError, ApiErrorBody, FieldError};
use crate::models::profile::{self, NewProfile, Profile, ROLE_CUSTOMER, STATUS_ACTIVE};
use crate::models::session::Session;
use crate::realtime::events::{ChangeKind, Table};
use crate::sessions;
use crate::validation;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(me))
        .route("/auth/realtime-ticket", post(realtime_ticket))
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/signup
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    tag = "Auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = Profile),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 409, description = "Email or username taken", body = ApiErrorBody),
    ),
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    let email = body.email.trim().to_lowercase();
    let username = body
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| validation::username_from_email(&email));
    let full_name = body
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let mut errors = Vec::new();
    validation::check_email(&email, &mut errors);
    validation::check_password(&body.password, &mut errors);
    validation::check_username(&username, &mut errors);
    if full_name.is_some_and(|n| n.len() > 100) {
        errors.push(FieldError::new(
            "full_name",
            "Full name must be 100 characters or fewer",
        ));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let password_hash = password::hash_password(&body.password)?;
    let user_id = Profile::generate();

    let mut conn = state.db.get().await?;
    let created: Profile = diesel_async::RunQueryDsl::get_result(
        diesel::insert_into(profiles::table)
            .values(NewProfile {
                id: &user_id,
                email: &email,
                username: &username,
                full_name,
                role: ROLE_CUSTOMER,
                status: STATUS_ACTIVE,
                password_hash: &password_hash,
            })
            .returning(Profile::as_returning()),
        &mut conn,
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::conflict("Email or username is already registered")
        } else {
            e.into()
        }
    })?;

    tracing::info!(user_id = %created.id, "profile created");
    state
        .broadcast
        .publish(Table::Profiles, ChangeKind::Insert, Some(created.id.as_str()), &created);

    Ok((StatusCode::CREATED, Json(created)))
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/login
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Workstation to claim for the new session.
    pub workstation_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
    pub realtime_ticket: String,
    pub realtime_url: String,
    pub session: Session,
    pub profile: Profile,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Invalid credentials", body = ApiErrorBody),
        (status = 403, description = "Account not active", body = ApiErrorBody),
        (status = 404, description = "Workstation not found", body = ApiErrorBody),
        (status = 409, description = "Workstation unavailable", body = ApiErrorBody),
    ),
)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut errors = Vec::new();
    validation::check_email(&body.email, &mut errors);
    validation::check_password(&body.password, &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let mut conn = state.db.get().await?;

    let Some(user) = profile::find_by_email(&mut conn, &body.email).await? else {
        tracing::warn!("login attempt for unknown email");
        return Err(ApiError::unauthorized("Invalid login credentials"));
    };

    if let Err(err) = password::verify_password(&body.password, &user.password_hash) {
        tracing::warn!(user_id = %user.id, "login rejected: wrong password");
        return Err(err);
    }

    if !user.is_active() {
        tracing::warn!(user_id = %user.id, status = %user.status, "login rejected: account not active");
        return Err(ApiError::forbidden(format!("Account is {}", user.status)));
    }

    let change =
        sessions::open_session(&mut conn, &user.id, body.workstation_id.as_deref()).await?;

    tracing::info!(
        user_id = %user.id,
        session_id = %change.session.id,
        workstation_id = ?change.session.workstation_id,
        "session opened"
    );

    change.publish(&state.broadcast, ChangeKind::Insert);

    let access = tokens::AccessData {
        user_id: user.id.clone(),
        role: user.role.clone(),
        session_id: Some(change.session.id.clone()),
    };

    let access_token = tokens::generate_access_token();
    let refresh_token = tokens::generate_refresh_token();
    let kv = state.kv.as_ref();

    tokens::store_access_token(kv, &access_token, &access).await?;
    tokens::store_refresh_token(kv, &refresh_token, &access).await?;
    let realtime_ticket = tokens::issue_realtime_ticket(kv, &user.id).await?;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: tokens::ACCESS_TTL_SECS,
        refresh_token,
        realtime_ticket,
        realtime_url: state.config.public_ws_url.clone(),
        session: change.session,
        profile: user,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/logout
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn logout(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    if let Some(ref session_id) = auth.session_id {
        let mut conn = state.db.get().await?;
        match sessions::close_session(&mut conn, session_id).await {
            Ok(change) => {
                tracing::info!(user_id = %auth.user_id, %session_id, "session closed on logout");
                change.publish(&state.broadcast, ChangeKind::Update);
            }
            // Already closed by an admin or the stale sweep.
            Err(err)
                if err.status == StatusCode::CONFLICT || err.status == StatusCode::NOT_FOUND => {}
            Err(err) => return Err(err),
        }
    }

    tokens::revoke_access_token(state.kv.as_ref(), &auth.token).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/refresh
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
    /// When true, the response includes a fresh realtime ticket.
    #[serde(default)]
    pub include_realtime_ticket: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_ticket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_url: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = RefreshResponse),
        (status = 401, description = "Invalid refresh token", body = ApiErrorBody),
    ),
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let kv = state.kv.as_ref();

    // Consume the old refresh token (single-use rotation).
    let data = tokens::consume_refresh_token(kv, &body.refresh_token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired refresh token"))?;

    // Pick up role or status changes made since the last login.
    let mut conn = state.db.get().await?;
    let user = profile::find(&mut conn, &data.user_id)
        .await?
        .filter(Profile::is_active)
        .ok_or_else(|| ApiError::unauthorized("Account is no longer active"))?;

    let access = tokens::AccessData {
        user_id: user.id.clone(),
        role: user.role,
        session_id: data.session_id,
    };

    let new_access = tokens::generate_access_token();
    let new_refresh = tokens::generate_refresh_token();
    tokens::store_access_token(kv, &new_access, &access).await?;
    tokens::store_refresh_token(kv, &new_refresh, &access).await?;

    let (realtime_ticket, realtime_url) = if body.include_realtime_ticket {
        let ticket = tokens::issue_realtime_ticket(kv, &user.id).await?;
        (Some(ticket), Some(state.config.public_ws_url.clone()))
    } else {
        (None, None)
    };

    Ok(Json(RefreshResponse {
        access_token: new_access,
        token_type: "Bearer".to_string(),
        expires_in: tokens::ACCESS_TTL_SECS,
        refresh_token: new_refresh,
        realtime_ticket,
        realtime_url,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/auth/me
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current profile", body = Profile),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn me(
    AuthUser { user_id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Profile>, ApiError> {
    let mut conn = state.db.get().await?;
    let user = profile::find(&mut conn, &user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(Json(user))
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/realtime-ticket
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct RealtimeTicketResponse {
    pub ticket: String,
    pub url: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/realtime-ticket",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Single-use realtime ticket", body = RealtimeTicketResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn realtime_ticket(
    AuthUser { user_id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<RealtimeTicketResponse>, ApiError> {
    let ticket = tokens::issue_realtime_ticket(state.kv.as_ref(), &user_id).await?;
    Ok(Json(RealtimeTicketResponse {
        ticket,
        url: state.config.public_ws_url.clone(),
    }))
}
