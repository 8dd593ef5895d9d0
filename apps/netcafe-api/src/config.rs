use std::path::Path;

/// Load `.env` from the working directory, falling back to the crate
/// directory. A missing file is fine; variables may be set externally.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }
}

/// netcafe API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Root directory of the local object store.
    pub storage_root: String,
    /// Open sessions older than this many hours are considered stale.
    pub stale_session_hours: i64,
    /// Largest accepted file upload, in bytes.
    pub max_upload_bytes: usize,
    /// Realtime endpoint advertised to clients at login.
    pub public_ws_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        let port = parsed_var("PORT", 4000);
        Self {
            database_url: required_var("DATABASE_URL"),
            port,
            storage_root: std::env::var("STORAGE_ROOT")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "./storage".to_string()),
            stale_session_hours: parsed_var("STALE_SESSION_HOURS", 12),
            max_upload_bytes: parsed_var("MAX_UPLOAD_BYTES", 50 * 1024 * 1024),
            public_ws_url: std::env::var("PUBLIC_WS_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("ws://localhost:{port}/realtime")),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Point a database URL at its `_test` sibling database.
///
/// Used by `netcafe-migrate --test` and the integration tests.
pub fn with_test_db_suffix(database_url: &str) -> String {
    let mut parts = database_url.splitn(2, '?');
    let base = parts.next().unwrap_or(database_url);
    let query = parts.next();

    let mut base_parts = base.rsplitn(2, '/');
    let db_name = base_parts.next().unwrap_or("");
    let prefix = base_parts.next().unwrap_or("");

    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    let mut updated = format!("{prefix}/{db_name}_test");
    if let Some(query) = query {
        updated.push('?');
        updated.push_str(query);
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_appended_to_db_name() {
        assert_eq!(
            with_test_db_suffix("postgres://u:p@localhost:5432/netcafe"),
            "postgres://u:p@localhost:5432/netcafe_test"
        );
    }

    #[test]
    fn test_suffix_keeps_query_string() {
        assert_eq!(
            with_test_db_suffix("postgres://localhost/netcafe?sslmode=disable"),
            "postgres://localhost/netcafe_test?sslmode=disable"
        );
    }

    #[test]
    fn test_suffix_is_idempotent() {
        let url = "postgres://localhost/netcafe_test";
        assert_eq!(with_test_db_suffix(url), url);
    }
}
