//! Last-write-wins progress rows, one per user.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Row, ToSql};
use tidemark_core::SyncStatusRepository;
use tidemark_domain::{Provider, Result, SyncState, SyncStatus};

use super::manager::DbManager;
use super::support::{from_millis, map_storage_error, parse_column, run_blocking, to_millis};

pub struct SqlCipherSyncStatusRepository {
    db: Arc<DbManager>,
}

impl SqlCipherSyncStatusRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncStatusRepository for SqlCipherSyncStatusRepository {
    async fn save(&self, status: &SyncStatus) -> Result<()> {
        let status = status.clone();
        run_blocking(&self.db, move |conn| {
            let provider = status.current_provider.map(|provider| provider.to_string());
            let state = status.state.to_string();
            let updated_at = to_millis(status.updated_at);
            conn.execute(
                "INSERT INTO sync_status (user_id, state, current_provider, error_message, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                    state = excluded.state,
                    current_provider = excluded.current_provider,
                    error_message = excluded.error_message,
                    updated_at_ms = excluded.updated_at_ms",
                &[&status.user_id as &dyn ToSql, &state, &provider, &status.error_message, &updated_at],
            )
            .map_err(map_storage_error)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, user_id: &str) -> Result<Option<SyncStatus>> {
        let user_id = user_id.to_string();
        run_blocking(&self.db, move |conn| {
            conn.query_optional(
                "SELECT user_id, state, current_provider, error_message, updated_at_ms
                 FROM sync_status WHERE user_id = ?1",
                &[&user_id as &dyn ToSql],
                map_status_row,
            )
            .map_err(map_storage_error)
        })
        .await
    }
}

fn map_status_row(row: &Row<'_>) -> rusqlite::Result<SyncStatus> {
    let state: String = row.get(1)?;
    let provider: Option<String> = row.get(2)?;
    Ok(SyncStatus {
        user_id: row.get(0)?,
        state: parse_column::<SyncState>(1, &state)?,
        current_provider: provider.as_deref().map(|raw| parse_column::<Provider>(2, raw)).transpose()?,
        error_message: row.get(3)?,
        updated_at: from_millis(row.get(4)?)?,
    })
}
