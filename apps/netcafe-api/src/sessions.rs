//! Workstation session lifecycle: open, close, stale sweep, and the
//! de-duplicated active view.
//!
//! Opening a session never checks for an existing open one, so a user may
//! hold several open rows at once. Readers reconcile them with
//! [`latest_per_user`].

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::{AsyncConnection, AsyncPgConnection};
use netcafe_common::PrefixedId;
use scoped_futures::ScopedFutureExt;

use crate::db::schema::{profiles, sessions, workstations};
use crate::error::ApiError;
use crate::models::session::{
    ActiveSession, NewSession, Session, EVENT_ACTIVITY, EVENT_LOGIN, EVENT_LOGOUT,
};
use crate::models::workstation::{Workstation, STATUS_AVAILABLE, STATUS_OCCUPIED};
use crate::realtime::events::{ChangeKind, Table};
use crate::realtime::fanout::RealtimeBroadcast;

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Keep one row per user: the one with the latest `started_at` (ties go to
/// the greater id). Output is ordered by `started_at` descending.
pub fn latest_per_user(rows: Vec<ActiveSession>) -> Vec<ActiveSession> {
    let mut latest: HashMap<String, ActiveSession> = HashMap::new();
    for row in rows {
        match latest.get(&row.user_id) {
            Some(kept) if (kept.started_at, &kept.id) >= (row.started_at, &row.id) => {}
            _ => {
                latest.insert(row.user_id.clone(), row);
            }
        }
    }
    let mut out: Vec<ActiveSession> = latest.into_values().collect();
    out.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
    out
}

/// Sessions started before the returned instant are stale. `None` when
/// `hours` is not positive or reaches past the representable range.
pub fn stale_cutoff(now: DateTime<Utc>, hours: i64) -> Option<DateTime<Utc>> {
    if hours < 1 {
        return None;
    }
    now.checked_sub_signed(Duration::try_hours(hours)?)
}

pub fn is_stale(session: &Session, cutoff: DateTime<Utc>) -> bool {
    session.is_open() && session.started_at < cutoff
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// All open sessions joined with their profiles, newest first, without
/// de-duplication.
pub async fn load_open_sessions(
    conn: &mut AsyncPgConnection,
) -> Result<Vec<ActiveSession>, diesel::result::Error> {
    let rows: Vec<(Session, (String, Option<String>, Option<String>))> =
        diesel_async::RunQueryDsl::load(
            sessions::table
                .inner_join(profiles::table)
                .filter(sessions::ended_at.is_null())
                .order(sessions::started_at.desc())
                .select((
                    Session::as_select(),
                    (profiles::username, profiles::full_name, profiles::avatar_url),
                )),
            conn,
        )
        .await?;

    Ok(rows
        .into_iter()
        .map(|(s, (username, full_name, avatar_url))| ActiveSession {
            id: s.id,
            user_id: s.user_id,
            workstation_id: s.workstation_id,
            event: s.event,
            started_at: s.started_at,
            username,
            full_name,
            avatar_url,
        })
        .collect())
}

/// Open sessions started before `cutoff`, oldest first.
pub async fn find_stale(
    conn: &mut AsyncPgConnection,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Session>, diesel::result::Error> {
    diesel_async::RunQueryDsl::load(
        sessions::table
            .filter(sessions::ended_at.is_null())
            .filter(sessions::started_at.lt(cutoff))
            .order(sessions::started_at.asc())
            .select(Session::as_select()),
        conn,
    )
    .await
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Result of a write that may also have changed a workstation.
#[derive(Debug)]
pub struct SessionChange {
    pub session: Session,
    pub workstation: Option<Workstation>,
}

impl SessionChange {
    /// Publish the session row and any workstation it claimed or released.
    pub fn publish(&self, broadcast: &RealtimeBroadcast, kind: ChangeKind) {
        broadcast.publish(
            Table::Sessions,
            kind,
            Some(self.session.user_id.as_str()),
            &self.session,
        );
        if let Some(ref ws) = self.workstation {
            broadcast.publish(Table::Workstations, ChangeKind::Update, None, ws);
        }
    }
}

/// Open a session for `user_id`, claiming `workstation_id` when given.
///
/// The workstation must exist and be `available`. Insert and claim happen in
/// one transaction.
pub async fn open_session(
    conn: &mut AsyncPgConnection,
    user_id: &str,
    workstation_id: Option<&str>,
) -> Result<SessionChange, ApiError> {
    let user_id = user_id.to_string();
    let workstation_id = workstation_id.map(str::to_string);

    conn.transaction::<_, ApiError, _>(|conn| {
        async move {
            if let Some(ref ws_id) = workstation_id {
                let ws: Workstation = diesel_async::RunQueryDsl::get_result(
                    workstations::table
                        .find(ws_id)
                        .for_update()
                        .select(Workstation::as_select()),
                    conn,
                )
                .await
                .optional()?
                .ok_or_else(|| ApiError::not_found("Workstation not found"))?;

                if ws.status != STATUS_AVAILABLE {
                    return Err(ApiError::conflict(format!(
                        "Workstation {} is {}",
                        ws.label, ws.status
                    )));
                }
            }

            let session_id = Session::generate();
            let session: Session = diesel_async::RunQueryDsl::get_result(
                diesel::insert_into(sessions::table)
                    .values(NewSession {
                        id: &session_id,
                        user_id: &user_id,
                        workstation_id: workstation_id.as_deref(),
                        event: EVENT_LOGIN,
                        started_at: Utc::now(),
                    })
                    .returning(Session::as_returning()),
                conn,
            )
            .await?;

            let workstation = match workstation_id {
                Some(ref ws_id) => Some(
                    diesel_async::RunQueryDsl::get_result(
                        diesel::update(workstations::table.find(ws_id))
                            .set((
                                workstations::status.eq(STATUS_OCCUPIED),
                                workstations::current_session_id.eq(Some(session.id.as_str())),
                                workstations::updated_at.eq(Utc::now()),
                            ))
                            .returning(Workstation::as_returning()),
                        conn,
                    )
                    .await?,
                ),
                None => None,
            };

            Ok(SessionChange {
                session,
                workstation,
            })
        }
        .scope_boxed()
    })
    .await
}

/// Close an open session and release the workstation it holds.
///
/// Returns `not_found` for unknown ids and `conflict` if already closed.
pub async fn close_session(
    conn: &mut AsyncPgConnection,
    session_id: &str,
) -> Result<SessionChange, ApiError> {
    let session_id = session_id.to_string();

    conn.transaction::<_, ApiError, _>(|conn| {
        async move {
            let existing: Session = diesel_async::RunQueryDsl::get_result(
                sessions::table
                    .find(&session_id)
                    .for_update()
                    .select(Session::as_select()),
                conn,
            )
            .await
            .optional()?
            .ok_or_else(|| ApiError::not_found("Session not found"))?;

            if !existing.is_open() {
                return Err(ApiError::conflict("Session already ended"));
            }

            let session: Session = diesel_async::RunQueryDsl::get_result(
                diesel::update(sessions::table.find(&session_id))
                    .set((
                        sessions::ended_at.eq(Some(Utc::now())),
                        sessions::event.eq(EVENT_LOGOUT),
                    ))
                    .returning(Session::as_returning()),
                conn,
            )
            .await?;

            let mut released = release_workstations(conn, &[session_id.clone()]).await?;

            Ok(SessionChange {
                session,
                workstation: released.pop(),
            })
        }
        .scope_boxed()
    })
    .await
}

/// Mark an open session as recently active.
pub async fn touch_session(
    conn: &mut AsyncPgConnection,
    session_id: &str,
) -> Result<Session, ApiError> {
    let updated: Option<Session> = diesel_async::RunQueryDsl::get_result(
        diesel::update(
            sessions::table
                .find(session_id)
                .filter(sessions::ended_at.is_null()),
        )
        .set(sessions::event.eq(EVENT_ACTIVITY))
        .returning(Session::as_returning()),
        conn,
    )
    .await
    .optional()?;

    match updated {
        Some(session) => Ok(session),
        None => {
            let exists: Option<String> = diesel_async::RunQueryDsl::get_result(
                sessions::table.find(session_id).select(sessions::id),
                conn,
            )
            .await
            .optional()?;
            Err(match exists {
                Some(_) => ApiError::conflict("Session already ended"),
                None => ApiError::not_found("Session not found"),
            })
        }
    }
}

/// Outcome of a stale-session sweep.
#[derive(Debug)]
pub struct SweepResult {
    pub closed: Vec<Session>,
    pub released: Vec<Workstation>,
}

impl SweepResult {
    pub fn publish(&self, broadcast: &RealtimeBroadcast) {
        for session in &self.closed {
            broadcast.publish(
                Table::Sessions,
                ChangeKind::Update,
                Some(session.user_id.as_str()),
                session,
            );
        }
        for ws in &self.released {
            broadcast.publish(Table::Workstations, ChangeKind::Update, None, ws);
        }
    }
}

/// Close every open session started before `cutoff` in one transaction.
pub async fn close_stale_sessions(
    conn: &mut AsyncPgConnection,
    cutoff: DateTime<Utc>,
) -> Result<SweepResult, ApiError> {
    conn.transaction::<_, ApiError, _>(|conn| {
        async move {
            let closed: Vec<Session> = diesel_async::RunQueryDsl::get_results(
                diesel::update(
                    sessions::table
                        .filter(sessions::ended_at.is_null())
                        .filter(sessions::started_at.lt(cutoff)),
                )
                .set((
                    sessions::ended_at.eq(Some(Utc::now())),
                    sessions::event.eq(EVENT_LOGOUT),
                ))
                .returning(Session::as_returning()),
                conn,
            )
            .await?;

            let ids: Vec<String> = closed.iter().map(|s| s.id.clone()).collect();
            let released = release_workstations(conn, &ids).await?;

            Ok(SweepResult { closed, released })
        }
        .scope_boxed()
    })
    .await
}

/// Free every workstation whose current session is in `session_ids`.
pub async fn release_workstations(
    conn: &mut AsyncPgConnection,
    session_ids: &[String],
) -> Result<Vec<Workstation>, diesel::result::Error> {
    if session_ids.is_empty() {
        return Ok(Vec::new());
    }
    diesel_async::RunQueryDsl::get_results(
        diesel::update(workstations::table.filter(workstations::current_session_id.eq_any(session_ids)))
            .set((
                workstations::status.eq(STATUS_AVAILABLE),
                workstations::current_session_id.eq(None::<String>),
                workstations::updated_at.eq(Utc::now()),
            ))
            .returning(Workstation::as_returning()),
        conn,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(id: &str, user: &str, minute: u32) -> ActiveSession {
        ActiveSession {
            id: id.to_string(),
            user_id: user.to_string(),
            workstation_id: None,
            event: EVENT_LOGIN.to_string(),
            started_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, minute, 0).unwrap(),
            username: user.to_string(),
            full_name: None,
            avatar_url: None,
        }
    }

    #[test]
    fn keeps_latest_session_per_user() {
        let rows = vec![
            row("ses_1", "alice", 0),
            row("ses_2", "bob", 5),
            row("ses_3", "alice", 30),
            row("ses_4", "alice", 10),
        ];
        let deduped = latest_per_user(rows);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, "ses_3");
        assert_eq!(deduped[1].id, "ses_2");
    }

    #[test]
    fn equal_start_times_prefer_greater_id() {
        let rows = vec![row("ses_b", "alice", 0), row("ses_a", "alice", 0)];
        let deduped = latest_per_user(rows);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].id, "ses_b");
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(latest_per_user(Vec::new()).is_empty());
    }

    #[test]
    fn stale_cutoff_counts_back_whole_hours() {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 12, 0, 0).unwrap();
        assert_eq!(
            stale_cutoff(now, 12),
            Some(Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(
            stale_cutoff(now, 36),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn stale_cutoff_rejects_out_of_range_hours() {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 12, 0, 0).unwrap();
        assert_eq!(stale_cutoff(now, 0), None);
        assert_eq!(stale_cutoff(now, -5), None);
        assert_eq!(stale_cutoff(now, 10_000_000_000), None);
        assert_eq!(stale_cutoff(now, i64::MAX), None);
    }

    #[test]
    fn only_open_sessions_before_cutoff_are_stale() {
        let cutoff = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
        let mut session = Session {
            id: "ses_1".to_string(),
            user_id: "usr_1".to_string(),
            workstation_id: None,
            event: EVENT_LOGIN.to_string(),
            started_at: Utc.with_ymd_and_hms(2025, 3, 1, 23, 0, 0).unwrap(),
            ended_at: None,
        };
        assert!(is_stale(&session, cutoff));

        session.started_at = cutoff;
        assert!(!is_stale(&session, cutoff));

        session.started_at = Utc.with_ymd_and_hms(2025, 3, 1, 1, 0, 0).unwrap();
        session.ended_at = Some(cutoff);
        assert!(!is_stale(&session, cutoff));
    }
}
