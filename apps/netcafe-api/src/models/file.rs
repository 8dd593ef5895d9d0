use chrono::{DateTime, Utc};
use diesel::prelude::*;
use netcafe_common::id::{prefix, PrefixedId};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::files;

/// Metadata row for an object in the `user-files` bucket.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = files)]
pub struct FileRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Object key inside the bucket.
    pub path: String,
    pub size: i64,
    #[serde(rename = "type")]
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

impl PrefixedId for FileRecord {
    const PREFIX: &'static str = prefix::FILE;
}

#[derive(Debug, Insertable)]
#[diesel(table_name = files)]
pub struct NewFileRecord<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub name: &'a str,
    pub path: &'a str,
    pub size: i64,
    pub content_type: &'a str,
}
