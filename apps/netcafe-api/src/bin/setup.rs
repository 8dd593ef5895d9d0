//! Interactive first-run setup: create (or promote) the admin account and
//! record server settings in `.env`.
//!
//! The database must already be migrated (`netcafe-migrate`).

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use netcafe_common::PrefixedId;

use netcafe_api::auth::password::hash_password;
use netcafe_api::db::schema::profiles;
use netcafe_api::error::FieldError;
use netcafe_api::models::profile::{NewProfile, Profile, ROLE_ADMIN, STATUS_ACTIVE};
use netcafe_api::validation;

fn prompt(label: &str, default: Option<&str>) -> String {
    match default {
        Some(d) if !d.is_empty() => print!("{label} [{d}]: "),
        _ => print!("{label}: "),
    }
    let _ = io::stdout().flush();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        fail("Failed to read input");
    }
    let input = input.trim();
    if input.is_empty() {
        default.unwrap_or_default().to_string()
    } else {
        input.to_string()
    }
}

fn prompt_password(label: &str) -> String {
    print!("{label}: ");
    let _ = io::stdout().flush();
    rpassword::read_password().unwrap_or_else(|_| fail("Failed to read password"))
}

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn report(errors: &[FieldError]) -> ! {
    for e in errors {
        eprintln!("  {}: {}", e.field, e.message);
    }
    fail("Invalid input, nothing was changed.");
}

fn read_env_file(path: &Path) -> HashMap<String, String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Rewrite the keys in `updates`, keeping every other line as it was.
fn write_env_file(path: &Path, updates: &[(&str, String)]) -> io::Result<()> {
    let mut lines = Vec::new();
    let mut written = HashSet::new();

    if let Ok(content) = std::fs::read_to_string(path) {
        for line in content.lines() {
            let replaced = line.split_once('=').and_then(|(key, _)| {
                let key = key.trim();
                updates.iter().find(|(k, _)| *k == key)
            });
            match replaced {
                Some((key, value)) => {
                    lines.push(format!("{key}={value}"));
                    written.insert(*key);
                }
                None => lines.push(line.to_string()),
            }
        }
    }
    for (key, value) in updates {
        if !written.contains(key) {
            lines.push(format!("{key}={value}"));
        }
    }

    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content)
}

fn main() {
    println!("=== netcafe setup ===\n");

    let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let env_vars = read_env_file(&env_path);
    let current = |key: &str, fallback: &str| {
        env_vars
            .get(key)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    };

    let database_url = prompt("Database URL", Some(&current("DATABASE_URL", "")));
    if database_url.is_empty() {
        fail("A database URL is required.");
    }
    let port = prompt("HTTP port", Some(&current("PORT", "4000")));
    if port.parse::<u16>().is_err() {
        fail("Port must be a number between 0 and 65535.");
    }
    let storage_root = prompt("File storage directory", Some(&current("STORAGE_ROOT", "./storage")));

    println!("\nAdministrator account");
    let email = prompt("Email", None).to_lowercase();
    let username = prompt(
        "Username",
        Some(&validation::username_from_email(&email)),
    );
    let password = prompt_password("Password");
    let confirm = prompt_password("Confirm password");

    let mut errors = Vec::new();
    validation::check_email(&email, &mut errors);
    validation::check_username(&username, &mut errors);
    validation::check_password(&password, &mut errors);
    if !errors.is_empty() {
        report(&errors);
    }
    if password != confirm {
        fail("Passwords do not match, nothing was changed.");
    }

    let password_hash =
        hash_password(&password).unwrap_or_else(|e| fail(&format!("Hashing failed: {}", e.message)));

    println!("\nConnecting to database...");
    let mut conn = PgConnection::establish(&database_url)
        .unwrap_or_else(|e| fail(&format!("Failed to connect: {e}")));

    let existing: Option<Profile> = profiles::table
        .filter(profiles::email.eq(&email))
        .select(Profile::as_select())
        .first(&mut conn)
        .optional()
        .unwrap_or_else(|e| fail(&format!("Lookup failed: {e}")));

    let admin_id = match existing {
        Some(profile) => {
            diesel::update(profiles::table.find(&profile.id))
                .set((
                    profiles::role.eq(ROLE_ADMIN),
                    profiles::status.eq(STATUS_ACTIVE),
                    profiles::password_hash.eq(&password_hash),
                    profiles::updated_at.eq(Utc::now()),
                ))
                .execute(&mut conn)
                .unwrap_or_else(|e| fail(&format!("Failed to promote profile: {e}")));
            println!("Promoted existing profile {} to admin.", profile.id);
            profile.id
        }
        None => {
            let id = Profile::generate();
            diesel::insert_into(profiles::table)
                .values(NewProfile {
                    id: &id,
                    email: &email,
                    username: &username,
                    full_name: None,
                    role: ROLE_ADMIN,
                    status: STATUS_ACTIVE,
                    password_hash: &password_hash,
                })
                .execute(&mut conn)
                .unwrap_or_else(|e| fail(&format!("Failed to create admin: {e}")));
            println!("Created admin profile {id}.");
            id
        }
    };

    let updates = [
        ("DATABASE_URL", database_url),
        ("PORT", port.clone()),
        ("STORAGE_ROOT", storage_root),
    ];
    if let Err(e) = write_env_file(&env_path, &updates) {
        fail(&format!("Failed to write {}: {e}", env_path.display()));
    }

    println!("\n=== Setup complete ===");
    println!("  Admin:   {email} ({admin_id})");
    println!("  Config:  {}", env_path.display());
    println!("\nStart the server with `cargo run -p netcafe-api` (port {port}).");
}
