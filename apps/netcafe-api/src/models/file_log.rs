use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::AsyncPgConnection;
use netcafe_common::id::{prefix, PrefixedId};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::file_logs;

pub const ACTION_UPLOAD: &str = "upload";
pub const ACTION_DOWNLOAD: &str = "download";
pub const ACTION_DELETE: &str = "delete";

#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = file_logs)]
pub struct FileLog {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    /// `upload`, `download` or `delete`.
    pub action: String,
    pub created_at: DateTime<Utc>,
}

impl PrefixedId for FileLog {
    const PREFIX: &'static str = prefix::FILE_LOG;
}

#[derive(Debug, Insertable)]
#[diesel(table_name = file_logs)]
pub struct NewFileLog<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub file_name: &'a str,
    pub action: &'a str,
}

/// Append an activity row for a file operation.
pub async fn record(
    conn: &mut AsyncPgConnection,
    user_id: &str,
    file_name: &str,
    action: &str,
) -> Result<FileLog, diesel::result::Error> {
    let id = FileLog::generate();
    diesel_async::RunQueryDsl::get_result(
        diesel::insert_into(file_logs::table)
            .values(NewFileLog {
                id: &id,
                user_id,
                file_name,
                action,
            })
            .returning(FileLog::as_returning()),
        conn,
    )
    .await
}
