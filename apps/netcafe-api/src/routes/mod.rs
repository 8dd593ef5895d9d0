pub mod auth;
pub mod backups;
pub mod file_logs;
pub mod files;
pub mod health;
pub mod profiles;
pub mod sessions;
pub mod system;
pub mod workstations;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::realtime::server::router())
        .nest(
            "/api/v1",
            auth::router()
                .merge(profiles::router())
                .merge(sessions::router())
                .merge(workstations::router())
                .merge(files::router())
                .merge(file_logs::router())
                .merge(backups::router())
                .merge(system::router()),
        )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Auth
        auth::signup,
        auth::login,
        auth::logout,
        auth::refresh,
        auth::me,
        auth::realtime_ticket,
        // Profiles
        profiles::list_profiles,
        profiles::get_profile,
        profiles::update_profile,
        profiles::delete_profile,
        // Sessions
        sessions::active_sessions,
        sessions::list_sessions,
        sessions::my_sessions,
        sessions::get_session,
        sessions::create_session,
        sessions::end_session,
        sessions::record_activity,
        sessions::cleanup_sessions,
        // Workstations
        workstations::list_workstations,
        workstations::create_workstation,
        workstations::update_workstation,
        workstations::delete_workstation,
        // Files
        files::upload_file,
        files::list_files,
        files::get_file,
        files::download_file,
        files::delete_file,
        files::file_stats,
        // File logs
        file_logs::list_file_logs,
        // Backups
        backups::start_backup,
        backups::finish_backup,
        backups::list_backups,
        // System
        system::system_health,
        system::export_logs,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::profile::Profile,
            crate::models::session::Session,
            crate::models::session::ActiveSession,
            crate::models::workstation::Workstation,
            crate::models::file::FileRecord,
            crate::models::file_log::FileLog,
            crate::models::backup::Backup,
            crate::health::HealthScores,
            // Route request/response types
            health::HealthResponse,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::RefreshRequest,
            auth::RefreshResponse,
            auth::RealtimeTicketResponse,
            profiles::UpdateProfileRequest,
            sessions::ActiveSessionsResponse,
            sessions::SessionProfile,
            sessions::SessionDetail,
            sessions::CreateSessionRequest,
            sessions::CleanupRequest,
            sessions::CleanupResponse,
            workstations::WorkstationView,
            workstations::CreateWorkstationRequest,
            workstations::UpdateWorkstationRequest,
            files::FileStats,
            files::TypeUsage,
            backups::FinishBackupRequest,
            system::SystemHealthResponse,
            system::LogExport,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Auth", description = "Authentication and workstation login"),
        (name = "Profiles", description = "User profiles"),
        (name = "Sessions", description = "Workstation sessions"),
        (name = "Workstations", description = "Workstation inventory"),
        (name = "Files", description = "Customer file storage"),
        (name = "File Logs", description = "File activity history"),
        (name = "Backups", description = "Backup runs"),
        (name = "System", description = "System health and log export"),
    )
)]
pub struct ApiDoc;
