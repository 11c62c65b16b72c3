//! Durable outbox for sync-completed notifications.
//!
//! The orchestrator publishes into this table; the briefing collaborator
//! drains it with [`SqlCipherBriefingOutbox::pending`] and acknowledges with
//! [`SqlCipherBriefingOutbox::mark_delivered`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Row, ToSql};
use tidemark_core::BriefingNotifier;
use tidemark_domain::{Result, SyncCompleted, TidemarkError};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::manager::DbManager;
use super::support::{
    from_millis, json_column, map_storage_error, run_blocking, to_json, to_millis,
};

/// One undelivered notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BriefingOutboxEntry {
    pub id: String,
    pub event: SyncCompleted,
    pub created_at: DateTime<Utc>,
}

pub struct SqlCipherBriefingOutbox {
    db: Arc<DbManager>,
}

impl SqlCipherBriefingOutbox {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Oldest undelivered entries first
    pub async fn pending(&self, limit: usize) -> Result<Vec<BriefingOutboxEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        run_blocking(&self.db, move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, payload, created_at_ms FROM briefing_outbox
                     WHERE delivered_at_ms IS NULL
                     ORDER BY created_at_ms ASC, id ASC
                     LIMIT ?1",
                )
                .map_err(map_storage_error)?;
            stmt.query_map(&[&limit as &dyn ToSql], map_entry_row).map_err(map_storage_error)
        })
        .await
    }

    pub async fn mark_delivered(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        run_blocking(&self.db, move |conn| {
            let now = to_millis(Utc::now());
            let updated = conn
                .execute(
                    "UPDATE briefing_outbox SET delivered_at_ms = ?1
                     WHERE id = ?2 AND delivered_at_ms IS NULL",
                    &[&now as &dyn ToSql, &id],
                )
                .map_err(map_storage_error)?;
            if updated == 0 {
                return Err(TidemarkError::NotFound(format!("pending briefing entry {id}")));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl BriefingNotifier for SqlCipherBriefingOutbox {
    #[instrument(skip(self, event), fields(user_id = %event.user_id, provider = %event.provider))]
    async fn publish(&self, event: &SyncCompleted) -> Result<()> {
        let id = Uuid::now_v7().to_string();
        let payload = to_json(event)?;
        let user_id = event.user_id.clone();
        let provider = event.provider.to_string();
        let created_at = to_millis(event.timestamp);
        run_blocking(&self.db, move |conn| {
            conn.execute(
                "INSERT INTO briefing_outbox (id, user_id, provider, payload, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                &[&id as &dyn ToSql, &user_id, &provider, &payload, &created_at],
            )
            .map_err(map_storage_error)?;
            debug!(entry_id = %id, "briefing.outbox.enqueued");
            Ok(())
        })
        .await
    }
}

fn map_entry_row(row: &Row<'_>) -> rusqlite::Result<BriefingOutboxEntry> {
    let payload: String = row.get(1)?;
    Ok(BriefingOutboxEntry {
        id: row.get(0)?,
        event: json_column(1, &payload)?,
        created_at: from_millis(row.get(2)?)?,
    })
}
