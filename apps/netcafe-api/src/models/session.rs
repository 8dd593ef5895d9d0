use chrono::{DateTime, Utc};
use diesel::prelude::*;
use netcafe_common::id::{prefix, PrefixedId};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::sessions;

pub const EVENT_LOGIN: &str = "login";
pub const EVENT_LOGOUT: &str = "logout";
pub const EVENT_ACTIVITY: &str = "activity";

/// A workstation login. `ended_at == None` means the session is open.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = sessions)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub workstation_id: Option<String>,
    /// `login`, `logout` or `activity`.
    pub event: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

impl PrefixedId for Session {
    const PREFIX: &'static str = prefix::SESSION;
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub workstation_id: Option<&'a str>,
    pub event: &'a str,
    pub started_at: DateTime<Utc>,
}

/// An open session joined with the owning profile's display fields.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActiveSession {
    pub id: String,
    pub user_id: String,
    pub workstation_id: Option<String>,
    pub event: String,
    pub started_at: DateTime<Utc>,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}
