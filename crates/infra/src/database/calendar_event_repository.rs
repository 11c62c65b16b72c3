//! SQLCipher-backed calendar event storage.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Row, ToSql};
use tidemark_core::{CalendarEventRepository, ConflictGraph};
use tidemark_domain::{CalendarEvent, EventStatus, Result, SyncWindow};
use tracing::{debug, instrument};

use super::manager::DbManager;
use super::support::{
    from_millis, json_column, map_sql_error, map_storage_error, parse_column, run_blocking,
    to_json, to_millis,
};

// Conflict columns are only written by the conflict flag update. A cancelled
// tombstone carries no times, so the stored ones are kept.
const UPSERT_SQL: &str = "INSERT INTO calendar_events (
        user_id, event_id, title, description, start_time_ms, end_time_ms, is_all_day,
        location, attendees, status, dlp_verified, updated_at_ms
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
    ON CONFLICT(user_id, event_id) DO UPDATE SET
        title = excluded.title,
        description = excluded.description,
        start_time_ms = CASE WHEN excluded.status = 'cancelled'
            THEN calendar_events.start_time_ms ELSE excluded.start_time_ms END,
        end_time_ms = CASE WHEN excluded.status = 'cancelled'
            THEN calendar_events.end_time_ms ELSE excluded.end_time_ms END,
        is_all_day = excluded.is_all_day,
        location = excluded.location,
        attendees = excluded.attendees,
        status = excluded.status,
        dlp_verified = excluded.dlp_verified,
        updated_at_ms = excluded.updated_at_ms";

const SELECT_COLUMNS: &str = "SELECT user_id, event_id, title, description, start_time_ms,
        end_time_ms, is_all_day, location, attendees, status, has_conflict, conflict_with,
        dlp_verified
    FROM calendar_events";

pub struct SqlCipherCalendarEventRepository {
    db: Arc<DbManager>,
}

impl SqlCipherCalendarEventRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CalendarEventRepository for SqlCipherCalendarEventRepository {
    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn upsert_events(&self, events: &[CalendarEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let rows = events
            .iter()
            .map(|event| Ok((event.clone(), to_json(&event.attendees)?)))
            .collect::<Result<Vec<_>>>()?;

        run_blocking(&self.db, move |conn| {
            let now = to_millis(Utc::now());
            let tx = conn.transaction().map_err(map_storage_error)?;
            let mut written = 0;
            {
                let mut stmt = tx.prepare_cached(UPSERT_SQL).map_err(map_sql_error)?;
                for (event, attendees) in &rows {
                    written += stmt
                        .execute(rusqlite::params![
                            event.user_id,
                            event.event_id,
                            event.title,
                            event.description,
                            to_millis(event.start_time),
                            to_millis(event.end_time),
                            event.is_all_day,
                            event.location,
                            attendees,
                            event.status.to_string(),
                            event.dlp_verified,
                            now,
                        ])
                        .map_err(map_sql_error)?;
                }
            }
            tx.commit().map_err(map_sql_error)?;
            debug!(written, "calendar events upserted");
            Ok(written)
        })
        .await
    }

    async fn events_in_window(
        &self,
        user_id: &str,
        window: &SyncWindow,
    ) -> Result<Vec<CalendarEvent>> {
        let user_id = user_id.to_string();
        let window = window.clone();
        run_blocking(&self.db, move |conn| {
            let min = to_millis(window.time_min);
            let max = window.time_max.map_or(i64::MAX, to_millis);
            let sql = format!(
                "{SELECT_COLUMNS} WHERE user_id = ?1 AND start_time_ms < ?2 AND end_time_ms >= ?3
                 ORDER BY start_time_ms ASC, event_id ASC"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_storage_error)?;
            stmt.query_map(&[&user_id as &dyn ToSql, &max, &min], map_event_row)
                .map_err(map_storage_error)
        })
        .await
    }

    async fn find_event(&self, user_id: &str, event_id: &str) -> Result<Option<CalendarEvent>> {
        let key = (user_id.to_string(), event_id.to_string());
        run_blocking(&self.db, move |conn| {
            let sql = format!("{SELECT_COLUMNS} WHERE user_id = ?1 AND event_id = ?2");
            conn.query_optional(&sql, &[&key.0 as &dyn ToSql, &key.1], map_event_row)
                .map_err(map_storage_error)
        })
        .await
    }

    #[instrument(skip(self, window, graph), fields(graph_size = graph.len()))]
    async fn update_conflict_flags(
        &self,
        user_id: &str,
        window: &SyncWindow,
        graph: &ConflictGraph,
    ) -> Result<usize> {
        let user_id = user_id.to_string();
        let window = window.clone();
        let flagged = graph
            .iter()
            .filter(|(_, conflicts)| !conflicts.is_empty())
            .map(|(event_id, conflicts)| Ok((event_id.clone(), to_json(conflicts)?)))
            .collect::<Result<Vec<_>>>()?;

        run_blocking(&self.db, move |conn| {
            let min = to_millis(window.time_min);
            let max = window.time_max.map_or(i64::MAX, to_millis);
            let tx = conn.transaction().map_err(map_storage_error)?;

            let in_window: BTreeSet<String> = {
                let mut stmt = tx
                    .prepare_cached(
                        "SELECT event_id FROM calendar_events
                         WHERE user_id = ?1 AND start_time_ms < ?2 AND end_time_ms >= ?3",
                    )
                    .map_err(map_sql_error)?;
                let ids = stmt
                    .query_map(rusqlite::params![user_id, max, min], |row| row.get::<_, String>(0))
                    .map_err(map_sql_error)?;
                ids.collect::<rusqlite::Result<_>>().map_err(map_sql_error)?
            };

            // Reset the whole window, then flag the events that still conflict
            let reset = tx
                .execute(
                    "UPDATE calendar_events SET has_conflict = 0, conflict_with = '[]'
                     WHERE user_id = ?1 AND start_time_ms < ?2 AND end_time_ms >= ?3",
                    rusqlite::params![user_id, max, min],
                )
                .map_err(map_sql_error)?;
            {
                let mut stmt = tx
                    .prepare_cached(
                        "UPDATE calendar_events SET has_conflict = 1, conflict_with = ?3
                         WHERE user_id = ?1 AND event_id = ?2",
                    )
                    .map_err(map_sql_error)?;
                for (event_id, conflicts) in &flagged {
                    stmt.execute(rusqlite::params![user_id, event_id, conflicts])
                        .map_err(map_sql_error)?;
                }
            }
            let unlinked = unlink_outside_window(&tx, &user_id, &in_window, max, min)?;
            tx.commit().map_err(map_sql_error)?;
            debug!(reset, flagged = flagged.len(), unlinked, "conflict flags updated");
            Ok(reset)
        })
        .await
    }

    async fn delete_event(&self, user_id: &str, event_id: &str) -> Result<bool> {
        let key = (user_id.to_string(), event_id.to_string());
        run_blocking(&self.db, move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM calendar_events WHERE user_id = ?1 AND event_id = ?2",
                    &[&key.0 as &dyn ToSql, &key.1],
                )
                .map_err(map_storage_error)?;
            Ok(removed > 0)
        })
        .await
    }
}

/// Drop references from rows outside the window to rows inside it
///
/// The window was just recomputed from scratch, so any pair that crosses its
/// edge is no longer backed by a flag on the inside row.
fn unlink_outside_window(
    tx: &rusqlite::Transaction<'_>,
    user_id: &str,
    in_window: &BTreeSet<String>,
    max: i64,
    min: i64,
) -> Result<usize> {
    let outside: Vec<(String, BTreeSet<String>)> = {
        let mut stmt = tx
            .prepare_cached(
                "SELECT event_id, conflict_with FROM calendar_events
                 WHERE user_id = ?1 AND has_conflict = 1
                   AND NOT (start_time_ms < ?2 AND end_time_ms >= ?3)",
            )
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map(rusqlite::params![user_id, max, min], |row| {
                let conflicts: String = row.get(1)?;
                Ok((row.get::<_, String>(0)?, json_column::<BTreeSet<String>>(1, &conflicts)?))
            })
            .map_err(map_sql_error)?;
        rows.collect::<rusqlite::Result<_>>().map_err(map_sql_error)?
    };

    let mut unlinked = 0;
    for (event_id, conflicts) in outside {
        let kept: BTreeSet<String> = conflicts.difference(in_window).cloned().collect();
        if kept.len() == conflicts.len() {
            continue;
        }
        tx.execute(
            "UPDATE calendar_events SET has_conflict = ?3, conflict_with = ?4
             WHERE user_id = ?1 AND event_id = ?2",
            rusqlite::params![user_id, event_id, !kept.is_empty(), to_json(&kept)?],
        )
        .map_err(map_sql_error)?;
        unlinked += 1;
    }
    Ok(unlinked)
}

fn map_event_row(row: &Row<'_>) -> rusqlite::Result<CalendarEvent> {
    let attendees: String = row.get(8)?;
    let status: String = row.get(9)?;
    let conflict_with: String = row.get(11)?;
    Ok(CalendarEvent {
        user_id: row.get(0)?,
        event_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        start_time: from_millis(row.get(4)?)?,
        end_time: from_millis(row.get(5)?)?,
        is_all_day: row.get(6)?,
        location: row.get(7)?,
        attendees: json_column(8, &attendees)?,
        status: parse_column::<EventStatus>(9, &status)?,
        has_conflict: row.get(10)?,
        conflict_with: json_column::<BTreeSet<String>>(11, &conflict_with)?,
        dlp_verified: row.get(12)?,
    })
}
