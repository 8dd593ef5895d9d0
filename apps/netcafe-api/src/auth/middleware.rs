//! Bearer token extraction for authenticated and admin-only routes.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::tokens;
use crate::models::profile::{self, ROLE_ADMIN};
use crate::AppState;

/// Authenticated user extracted from the `Authorization: Bearer <token>` header.
///
/// The profile is re-read on every request, so `role` is current and
/// suspended or deleted accounts are turned away before their token expires.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub role: String,
    /// Session opened by the login that issued the token, if any.
    pub session_id: Option<String>,
    /// The raw access token, kept so logout can revoke it.
    pub token: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Whether the caller may act on a row owned by `owner_id`.
    pub fn can_access(&self, owner_id: &str) -> bool {
        self.user_id == owner_id || self.is_admin()
    }
}

/// An [`AuthUser`] whose profile is currently an active admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

/// Rejection returned when the bearer token is missing, invalid, or lacks
/// the required role.
pub struct AuthError {
    status: StatusCode,
    message: &'static str,
}

impl AuthError {
    fn unauthorized(message: &'static str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message,
        }
    }

    fn forbidden(message: &'static str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let code = if self.status == StatusCode::FORBIDDEN {
            "FORBIDDEN"
        } else {
            "UNAUTHORIZED"
        };
        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": self.message
            }
        });
        (self.status, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::unauthorized("Missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::unauthorized("Invalid Authorization header format"))?;

        let data = tokens::lookup_access_token(state.kv.as_ref(), token)
            .await
            .map_err(|_| AuthError::unauthorized("Token lookup failed"))?
            .ok_or(AuthError::unauthorized("Invalid or expired token"))?;

        // Tokens outlive suspensions, deletions and role changes.
        let mut conn = state
            .db
            .get()
            .await
            .map_err(|_| AuthError::unauthorized("Database unavailable"))?;
        let current = profile::find(&mut conn, &data.user_id)
            .await
            .map_err(|_| AuthError::unauthorized("Profile lookup failed"))?
            .ok_or(AuthError::unauthorized("Profile no longer exists"))?;
        if !current.is_active() {
            return Err(AuthError::forbidden("Account is not active"));
        }

        Ok(AuthUser {
            user_id: data.user_id,
            role: current.role,
            session_id: data.session_id,
            token: token.to_string(),
        })
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthError::forbidden("Administrator access required"));
        }
        Ok(AdminUser(user))
    }
}
