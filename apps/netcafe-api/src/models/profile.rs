use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::AsyncPgConnection;
use netcafe_common::id::{prefix, PrefixedId};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::profiles;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_CUSTOMER: &str = "customer";
pub const ROLES: [&str; 2] = [ROLE_ADMIN, ROLE_CUSTOMER];

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_SUSPENDED: &str = "suspended";
pub const STATUS_INACTIVE: &str = "inactive";
pub const STATUSES: [&str; 3] = [STATUS_ACTIVE, STATUS_SUSPENDED, STATUS_INACTIVE];

#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    /// `admin` or `customer`.
    pub role: String,
    /// `active`, `suspended` or `inactive`.
    pub status: String,
    pub avatar_url: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

impl PrefixedId for Profile {
    const PREFIX: &'static str = prefix::USER;
}

#[derive(Debug, Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub username: &'a str,
    pub full_name: Option<&'a str>,
    pub role: &'a str,
    pub status: &'a str,
    pub password_hash: &'a str,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = profiles)]
pub struct UpdateProfile {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Look up a profile by (case-insensitive) email.
pub async fn find_by_email(
    conn: &mut AsyncPgConnection,
    email: &str,
) -> Result<Option<Profile>, diesel::result::Error> {
    diesel_async::RunQueryDsl::get_result(
        profiles::table
            .filter(profiles::email.eq(email.trim().to_lowercase()))
            .select(Profile::as_select()),
        conn,
    )
    .await
    .optional()
}

pub async fn find(
    conn: &mut AsyncPgConnection,
    id: &str,
) -> Result<Option<Profile>, diesel::result::Error> {
    diesel_async::RunQueryDsl::get_result(
        profiles::table.find(id).select(Profile::as_select()),
        conn,
    )
    .await
    .optional()
}
