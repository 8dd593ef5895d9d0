//! Print every open session grouped by user, and how the active view
//! collapses duplicates.

use std::collections::BTreeMap;
use std::process::ExitCode;

use netcafe_api::config::{self, Config};
use netcafe_api::models::session::ActiveSession;
use netcafe_api::sessions;

#[tokio::main]
async fn main() -> ExitCode {
    config::load_dotenv();
    let config = Config::from_env();

    let db = netcafe_api::db::pool::connect(&config.database_url).await;
    let mut conn = match db.get().await {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("Failed to connect to database: {err}");
            return ExitCode::FAILURE;
        }
    };

    let rows = match sessions::load_open_sessions(&mut conn).await {
        Ok(rows) => rows,
        Err(err) => {
            eprintln!("Failed to query sessions: {err}");
            return ExitCode::FAILURE;
        }
    };

    if rows.is_empty() {
        println!("No open sessions.");
        return ExitCode::SUCCESS;
    }

    let mut by_user: BTreeMap<&str, Vec<&ActiveSession>> = BTreeMap::new();
    for row in &rows {
        by_user.entry(row.user_id.as_str()).or_default().push(row);
    }

    let cutoff = sessions::stale_cutoff(chrono::Utc::now(), config.stale_session_hours);

    println!("Open sessions by user:");
    for (user_id, sessions) in &by_user {
        let name = sessions[0]
            .full_name
            .as_deref()
            .unwrap_or(&sessions[0].username);
        println!("  {name} ({user_id}): {} open", sessions.len());
        for s in sessions {
            println!(
                "    {}  started {}  workstation {}  last event {}{}",
                s.id,
                s.started_at.format("%Y-%m-%d %H:%M:%S"),
                s.workstation_id.as_deref().unwrap_or("-"),
                s.event,
                if cutoff.is_some_and(|c| s.started_at < c) { "  (stale)" } else { "" }
            );
        }
    }

    let raw = rows.len();
    let unique = sessions::latest_per_user(rows).len();
    println!();
    println!("Raw open sessions:  {raw}");
    println!("Unique users:       {unique}");
    if raw != unique {
        println!("Would be deduplicated from {raw} → {unique}");
    }

    ExitCode::SUCCESS
}
