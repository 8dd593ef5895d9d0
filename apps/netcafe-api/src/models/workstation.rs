use chrono::{DateTime, Utc};
use diesel::prelude::*;
use netcafe_common::id::{prefix, PrefixedId};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::workstations;

pub const STATUS_AVAILABLE: &str = "available";
pub const STATUS_OCCUPIED: &str = "occupied";
pub const STATUS_MAINTENANCE: &str = "maintenance";
pub const STATUSES: [&str; 3] = [STATUS_AVAILABLE, STATUS_OCCUPIED, STATUS_MAINTENANCE];

#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = workstations)]
pub struct Workstation {
    pub id: String,
    /// Human-facing name, e.g. `PC-07`.
    pub label: String,
    /// Section or floor of the cafe.
    pub section: String,
    pub status: String,
    pub ip_address: Option<String>,
    pub current_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrefixedId for Workstation {
    const PREFIX: &'static str = prefix::WORKSTATION;
}

#[derive(Debug, Insertable)]
#[diesel(table_name = workstations)]
pub struct NewWorkstation<'a> {
    pub id: &'a str,
    pub label: &'a str,
    pub section: &'a str,
    pub status: &'a str,
    pub ip_address: Option<&'a str>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = workstations)]
pub struct UpdateWorkstation {
    pub section: Option<String>,
    pub ip_address: Option<String>,
    pub status: Option<String>,
    pub updated_at: DateTime<Utc>,
}
