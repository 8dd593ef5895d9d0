//! Profile administration: list, view, edit, delete.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::AsyncConnection;
use scoped_futures::ScopedFutureExt;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::middleware::{AdminUser, AuthUser};
use crate::db::schema::{files, profiles, sessions as sessions_table};
use crate::error::{is_unique_violation, ApiError, ApiErrorBody, FieldError};
use crate::models::profile::{
    self, Profile, UpdateProfile, ROLES, ROLE_ADMIN, STATUSES, STATUS_ACTIVE,
};
use crate::models::workstation::Workstation;
use crate::realtime::events::{ChangeKind, Table};
use crate::sessions;
use crate::storage::USER_FILES_BUCKET;
use crate::validation;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profiles", get(list_profiles))
        .route(
            "/profiles/{id}",
            get(get_profile).patch(update_profile).delete(delete_profile),
        )
}

// ---------------------------------------------------------------------------
// GET /api/v1/profiles
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/profiles",
    tag = "Profiles",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All profiles, newest first", body = Vec<Profile>),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
    ),
)]
pub async fn list_profiles(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Profile>>, ApiError> {
    let mut conn = state.db.get().await?;
    let list: Vec<Profile> = diesel_async::RunQueryDsl::load(
        profiles::table
            .order(profiles::created_at.desc())
            .select(Profile::as_select()),
        &mut conn,
    )
    .await?;
    Ok(Json(list))
}

// ---------------------------------------------------------------------------
// GET /api/v1/profiles/:id
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/profiles/{id}",
    tag = "Profiles",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Profile ID")),
    responses(
        (status = 200, description = "Profile", body = Profile),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn get_profile(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Profile>, ApiError> {
    if !auth.can_access(&id) {
        return Err(ApiError::forbidden("You can only view your own profile"));
    }
    let mut conn = state.db.get().await?;
    let found = profile::find(&mut conn, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(Json(found))
}

// ---------------------------------------------------------------------------
// PATCH /api/v1/profiles/:id
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Admin only.
    pub role: Option<String>,
    /// Admin only.
    pub status: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/api/v1/profiles/{id}",
    tag = "Profiles",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Profile ID")),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = Profile),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Username taken", body = ApiErrorBody),
    ),
)]
pub async fn update_profile(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    if !auth.can_access(&id) {
        return Err(ApiError::forbidden("You can only edit your own profile"));
    }

    let mut conn = state.db.get().await?;

    let privileged = body.role.is_some() || body.status.is_some();
    if privileged {
        let caller = profile::find(&mut conn, &auth.user_id).await?;
        if !caller.is_some_and(|c| c.is_admin() && c.is_active()) {
            return Err(ApiError::forbidden(
                "Only administrators can change role or status",
            ));
        }
    }

    let username = body.username.as_deref().map(str::trim);
    let full_name = body.full_name.as_deref().map(str::trim);

    let mut errors = Vec::new();
    if let Some(u) = username {
        validation::check_username(u, &mut errors);
    }
    if full_name.is_some_and(|n| n.len() > 100) {
        errors.push(FieldError::new(
            "full_name",
            "Full name must be 100 characters or fewer",
        ));
    }
    if let Some(ref role) = body.role {
        validation::check_one_of("role", role, &ROLES, &mut errors);
    }
    if let Some(ref status) = body.status {
        validation::check_one_of("status", status, &STATUSES, &mut errors);
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    if id == auth.user_id
        && (body.role.as_deref().is_some_and(|r| r != ROLE_ADMIN)
            || body.status.as_deref().is_some_and(|s| s != STATUS_ACTIVE))
    {
        return Err(ApiError::bad_request(
            "Administrators cannot demote or deactivate themselves",
        ));
    }

    let changes = UpdateProfile {
        username: username.map(str::to_string),
        full_name: full_name.map(str::to_string),
        avatar_url: body.avatar_url.clone(),
        role: body.role.clone(),
        status: body.status.clone(),
        updated_at: Utc::now(),
    };

    let updated: Profile = diesel_async::RunQueryDsl::get_result(
        diesel::update(profiles::table.find(&id))
            .set(&changes)
            .returning(Profile::as_returning()),
        &mut conn,
    )
    .await
    .optional()
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::conflict("Username is already taken")
        } else {
            e.into()
        }
    })?
    .ok_or_else(|| ApiError::not_found("Profile not found"))?;

    if privileged {
        tracing::info!(
            user_id = %updated.id,
            role = %updated.role,
            status = %updated.status,
            changed_by = %auth.user_id,
            "profile access changed"
        );
        // Live connections were authorized under the old role or status.
        state.connections.disconnect_user(&updated.id);
    }

    state.broadcast.publish(
        Table::Profiles,
        ChangeKind::Update,
        Some(updated.id.as_str()),
        &updated,
    );

    Ok(Json(updated))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/profiles/:id
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/v1/profiles/{id}",
    tag = "Profiles",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Profile ID")),
    responses(
        (status = 204, description = "Profile deleted"),
        (status = 400, description = "Cannot delete yourself", body = ApiErrorBody),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_profile(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if id == admin.user_id {
        return Err(ApiError::bad_request("You cannot delete your own profile"));
    }

    let mut conn = state.db.get().await?;
    let target_id = id.clone();

    let (object_paths, released) = conn
        .transaction::<_, ApiError, _>(|conn| {
            async move {
                profile::find(conn, &target_id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("Profile not found"))?;

                let object_paths: Vec<String> = diesel_async::RunQueryDsl::load(
                    files::table
                        .filter(files::user_id.eq(&target_id))
                        .select(files::path),
                    conn,
                )
                .await?;

                let open_ids: Vec<String> = diesel_async::RunQueryDsl::load(
                    sessions_table::table
                        .filter(sessions_table::user_id.eq(&target_id))
                        .filter(sessions_table::ended_at.is_null())
                        .select(sessions_table::id),
                    conn,
                )
                .await?;
                let released: Vec<Workstation> =
                    sessions::release_workstations(conn, &open_ids).await?;

                // Sessions, files and file logs cascade.
                diesel_async::RunQueryDsl::execute(
                    diesel::delete(profiles::table.find(&target_id)),
                    conn,
                )
                .await?;

                Ok((object_paths, released))
            }
            .scope_boxed()
        })
        .await?;

    for path in &object_paths {
        if let Err(err) = state.storage.delete(USER_FILES_BUCKET, path).await {
            tracing::warn!(?err, %path, "failed to remove stored object of deleted profile");
        }
    }

    state.connections.disconnect_user(&id);
    tracing::info!(user_id = %id, deleted_by = %admin.user_id, files = object_paths.len(), "profile deleted");

    state.broadcast.publish(
        Table::Profiles,
        ChangeKind::Delete,
        Some(id.as_str()),
        &serde_json::json!({ "id": id }),
    );
    for ws in &released {
        state
            .broadcast
            .publish(Table::Workstations, ChangeKind::Update, None, ws);
    }

    Ok(StatusCode::NO_CONTENT)
}
