//! Workstation inventory.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use netcafe_common::PrefixedId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::{AdminUser, AuthUser};
use crate::db::schema::{sessions, workstations};
use crate::error::{is_unique_violation, ApiError, ApiErrorBody, FieldError};
use crate::models::workstation::{
    NewWorkstation, UpdateWorkstation, Workstation, STATUS_AVAILABLE, STATUS_MAINTENANCE,
    STATUS_OCCUPIED,
};
use crate::realtime::events::{ChangeKind, Table};
use crate::validation;
use crate::AppState;

/// Statuses an administrator may set directly. `occupied` is only reached
/// through a session.
const ASSIGNABLE_STATUSES: [&str; 2] = [STATUS_AVAILABLE, STATUS_MAINTENANCE];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workstations", get(list_workstations).post(create_workstation))
        .route(
            "/workstations/{id}",
            patch(update_workstation).delete(delete_workstation),
        )
}

fn check_label(label: &str, errors: &mut Vec<FieldError>) {
    let len = label.chars().count();
    if len == 0 {
        errors.push(FieldError::new("label", "Label is required"));
    } else if len > 32 {
        errors.push(FieldError::new("label", "Label must be 32 characters or fewer"));
    }
}

fn check_section(section: &str, errors: &mut Vec<FieldError>) {
    if section.is_empty() {
        errors.push(FieldError::new("section", "Section is required"));
    } else if section.chars().count() > 64 {
        errors.push(FieldError::new(
            "section",
            "Section must be 64 characters or fewer",
        ));
    }
}

// ---------------------------------------------------------------------------
// GET /api/v1/workstations
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct WorkstationView {
    #[serde(flatten)]
    pub workstation: Workstation,
    /// Holder of the current session, if occupied.
    pub current_user_id: Option<String>,
    pub session_started_at: Option<DateTime<Utc>>,
}

#[utoipa::path(
    get,
    path = "/api/v1/workstations",
    tag = "Workstations",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All workstations ordered by label", body = Vec<WorkstationView>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_workstations(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkstationView>>, ApiError> {
    let mut conn = state.db.get().await?;

    let rows: Vec<(Workstation, Option<String>, Option<DateTime<Utc>>)> =
        diesel_async::RunQueryDsl::load(
            workstations::table
                .left_join(sessions::table)
                .order(workstations::label.asc())
                .select((
                    Workstation::as_select(),
                    sessions::user_id.nullable(),
                    sessions::started_at.nullable(),
                )),
            &mut conn,
        )
        .await?;

    let views = rows
        .into_iter()
        .map(|(workstation, current_user_id, session_started_at)| WorkstationView {
            workstation,
            current_user_id,
            session_started_at,
        })
        .collect();

    Ok(Json(views))
}

// ---------------------------------------------------------------------------
// POST /api/v1/workstations
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWorkstationRequest {
    pub label: String,
    pub section: String,
    pub ip_address: Option<String>,
    /// `available` (default) or `maintenance`.
    pub status: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/workstations",
    tag = "Workstations",
    security(("bearer" = [])),
    request_body = CreateWorkstationRequest,
    responses(
        (status = 201, description = "Workstation created", body = Workstation),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Not an administrator", body = ApiErrorBody),
        (status = 409, description = "Label already in use", body = ApiErrorBody),
    ),
)]
pub async fn create_workstation(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(body): Json<CreateWorkstationRequest>,
) -> Result<(StatusCode, Json<Workstation>), ApiError> {
    let label = body.label.trim();
    let section = body.section.trim();
    let status = body.status.as_deref().unwrap_or(STATUS_AVAILABLE);
    let ip_address = body
        .ip_address
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let mut errors = Vec::new();
    check_label(label, &mut errors);
    check_section(section, &mut errors);
    validation::check_one_of("status", status, &ASSIGNABLE_STATUSES, &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let mut conn = state.db.get().await?;
    let id = Workstation::generate();

    let workstation: Workstation = diesel_async::RunQueryDsl::get_result(
        diesel::insert_into(workstations::table)
            .values(NewWorkstation {
                id: &id,
                label,
                section,
                status,
                ip_address,
            })
            .returning(Workstation::as_returning()),
        &mut conn,
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::conflict(format!("Workstation {label} already exists"))
        } else {
            e.into()
        }
    })?;

    tracing::info!(workstation_id = %workstation.id, label = %workstation.label, "workstation created");
    state
        .broadcast
        .publish(Table::Workstations, ChangeKind::Insert, None, &workstation);

    Ok((StatusCode::CREATED, Json(workstation)))
}

// ---------------------------------------------------------------------------
// PATCH /api/v1/workstations/:id
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateWorkstationRequest {
    pub section: Option<String>,
    pub ip_address: Option<String>,
    /// `available` or `maintenance`.
    pub status: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/api/v1/workstations/{id}",
    tag = "Workstations",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Workstation ID")),
    request_body = UpdateWorkstationRequest,
    responses(
        (status = 200, description = "Updated workstation", body = Workstation),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Workstation is occupied", body = ApiErrorBody),
    ),
)]
pub async fn update_workstation(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateWorkstationRequest>,
) -> Result<Json<Workstation>, ApiError> {
    let section = body.section.as_deref().map(str::trim);

    let mut errors = Vec::new();
    if let Some(section) = section {
        check_section(section, &mut errors);
    }
    if let Some(ref status) = body.status {
        if status == STATUS_OCCUPIED {
            errors.push(FieldError::new(
                "status",
                "Workstations become occupied only through a session",
            ));
        } else {
            validation::check_one_of("status", status, &ASSIGNABLE_STATUSES, &mut errors);
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let mut conn = state.db.get().await?;

    let current: Workstation = diesel_async::RunQueryDsl::get_result(
        workstations::table
            .find(&id)
            .select(Workstation::as_select()),
        &mut conn,
    )
    .await
    .optional()?
    .ok_or_else(|| ApiError::not_found("Workstation not found"))?;

    if body.status.is_some() && current.status == STATUS_OCCUPIED {
        return Err(ApiError::conflict(
            "Workstation is occupied; end its session first",
        ));
    }

    let changes = UpdateWorkstation {
        section: section.map(str::to_string),
        ip_address: body.ip_address.clone(),
        status: body.status.clone(),
        updated_at: Utc::now(),
    };

    // Matching on the status read above keeps a session that claimed the
    // row meanwhile from being overwritten.
    let updated: Workstation = diesel_async::RunQueryDsl::get_result(
        diesel::update(
            workstations::table
                .find(&id)
                .filter(workstations::status.eq(&current.status)),
        )
        .set(&changes)
        .returning(Workstation::as_returning()),
        &mut conn,
    )
    .await
    .optional()?
    .ok_or_else(|| ApiError::conflict("Workstation is occupied; end its session first"))?;

    state
        .broadcast
        .publish(Table::Workstations, ChangeKind::Update, None, &updated);

    Ok(Json(updated))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/workstations/:id
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/v1/workstations/{id}",
    tag = "Workstations",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Workstation ID")),
    responses(
        (status = 204, description = "Workstation deleted"),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Workstation is occupied", body = ApiErrorBody),
    ),
)]
pub async fn delete_workstation(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.db.get().await?;

    let deleted = diesel_async::RunQueryDsl::execute(
        diesel::delete(
            workstations::table
                .find(&id)
                .filter(workstations::status.ne(STATUS_OCCUPIED)),
        ),
        &mut conn,
    )
    .await?;

    if deleted == 0 {
        let status: Option<String> = diesel_async::RunQueryDsl::get_result(
            workstations::table.find(&id).select(workstations::status),
            &mut conn,
        )
        .await
        .optional()?;
        return Err(match status {
            Some(_) => ApiError::conflict("Workstation is occupied; end its session first"),
            None => ApiError::not_found("Workstation not found"),
        });
    }

    tracing::info!(workstation_id = %id, "workstation deleted");
    state.broadcast.publish(
        Table::Workstations,
        ChangeKind::Delete,
        None,
        &serde_json::json!({ "id": id }),
    );

    Ok(StatusCode::NO_CONTENT)
}
