//! Close sessions that were never ended.
//!
//! Usage:
//!   netcafe-cleanup [--dry-run] [--force] [--hours N]
//!
//! `--dry-run` only lists the stale sessions. Without `--force` the sweep
//! asks for confirmation first. `--hours` overrides `STALE_SESSION_HOURS`.

use std::io::{self, Write};
use std::process::ExitCode;

use chrono::{DateTime, Utc};

use netcafe_api::config::{self, Config};
use netcafe_api::sessions;

struct Options {
    dry_run: bool,
    force: bool,
    hours: Option<i64>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        dry_run: false,
        force: false,
        hours: None,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dry-run" => options.dry_run = true,
            "--force" => options.force = true,
            "--hours" => {
                let value = args.next().ok_or("--hours needs a value")?;
                let hours: i64 = value
                    .parse()
                    .map_err(|_| format!("invalid --hours value: {value}"))?;
                if hours < 1 {
                    return Err("--hours must be at least 1".to_string());
                }
                options.hours = Some(hours);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(options)
}

/// The threshold may come from `--hours` or `STALE_SESSION_HOURS`, so it is
/// checked here rather than only in `parse_args`.
fn resolve_cutoff(now: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>, String> {
    if hours < 1 {
        return Err(format!("stale threshold must be at least 1 hour, got {hours}"));
    }
    sessions::stale_cutoff(now, hours)
        .ok_or_else(|| format!("stale threshold of {hours} hours is out of range"))
}

fn confirm(count: usize) -> bool {
    print!("This will close {count} stale session(s). Continue? (yes/no) ");
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    answer.trim().eq_ignore_ascii_case("yes")
}

#[tokio::main]
async fn main() -> ExitCode {
    config::load_dotenv();

    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("usage: netcafe-cleanup [--dry-run] [--force] [--hours N]");
            return ExitCode::from(2);
        }
    };

    let config = Config::from_env();
    let hours = options.hours.unwrap_or(config.stale_session_hours);
    let now = Utc::now();
    let cutoff = match resolve_cutoff(now, hours) {
        Ok(cutoff) => cutoff,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    let db = netcafe_api::db::pool::connect(&config.database_url).await;
    let mut conn = match db.get().await {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("Failed to connect to database: {err}");
            return ExitCode::FAILURE;
        }
    };

    let stale = match sessions::find_stale(&mut conn, cutoff).await {
        Ok(stale) => stale,
        Err(err) => {
            eprintln!("Failed to query sessions: {err}");
            return ExitCode::FAILURE;
        }
    };

    let stale: Vec<_> = stale
        .into_iter()
        .filter(|s| sessions::is_stale(s, cutoff))
        .collect();
    if stale.is_empty() {
        println!("No stale sessions found.");
        return ExitCode::SUCCESS;
    }

    println!("Found {} session(s) open for more than {hours} hour(s):", stale.len());
    for session in &stale {
        let age = now - session.started_at;
        println!(
            "  {}  user {}  started {}  ({}h open)",
            session.id,
            session.user_id,
            session.started_at.format("%Y-%m-%d %H:%M"),
            age.num_hours()
        );
    }

    if options.dry_run {
        println!("Dry run, nothing was changed.");
        return ExitCode::SUCCESS;
    }

    if !options.force && !confirm(stale.len()) {
        println!("Aborted.");
        return ExitCode::SUCCESS;
    }

    match sessions::close_stale_sessions(&mut conn, cutoff).await {
        Ok(sweep) => {
            println!(
                "Closed {} session(s), released {} workstation(s).",
                sweep.closed.len(),
                sweep.released.len()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Cleanup failed: {}", err.message);
            ExitCode::FAILURE
        }
    }
}
