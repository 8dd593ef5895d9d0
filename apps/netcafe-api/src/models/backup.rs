use chrono::{DateTime, Utc};
use diesel::prelude::*;
use netcafe_common::id::{prefix, PrefixedId};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::backups;

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = backups)]
pub struct Backup {
    pub id: String,
    /// `in_progress`, `completed` or `failed`.
    pub status: String,
    pub backup_size: i64,
    pub file_count: i32,
    pub created_by: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PrefixedId for Backup {
    const PREFIX: &'static str = prefix::BACKUP;
}

#[derive(Debug, Insertable)]
#[diesel(table_name = backups)]
pub struct NewBackup<'a> {
    pub id: &'a str,
    pub status: &'a str,
    pub backup_size: i64,
    pub file_count: i32,
    pub created_by: Option<&'a str>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = backups)]
pub struct FinishBackup<'a> {
    pub status: &'a str,
    pub backup_size: i64,
    pub file_count: i32,
    pub completed_at: DateTime<Utc>,
}
