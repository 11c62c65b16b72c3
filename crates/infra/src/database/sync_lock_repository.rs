//! Expiring mutual exclusion rows for sync cycles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::ToSql;
use tidemark_core::SyncLockRepository;
use tidemark_domain::Result;
use tracing::{debug, instrument};

use super::manager::DbManager;
use super::support::{map_storage_error, run_blocking, to_millis};

pub struct SqlCipherSyncLockRepository {
    db: Arc<DbManager>,
}

impl SqlCipherSyncLockRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncLockRepository for SqlCipherSyncLockRepository {
    #[instrument(skip(self))]
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let key = key.to_string();
        let owner = owner.to_string();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        run_blocking(&self.db, move |conn| {
            let now = to_millis(Utc::now());
            let expires_at = now.saturating_add(ttl_ms);
            // The upsert only lands when the row is absent or expired
            let changed = conn
                .execute(
                    "INSERT INTO sync_locks (lock_key, owner, expires_at_ms) VALUES (?1, ?2, ?3)
                     ON CONFLICT(lock_key) DO UPDATE SET
                        owner = excluded.owner,
                        expires_at_ms = excluded.expires_at_ms
                     WHERE sync_locks.expires_at_ms <= ?4",
                    &[&key as &dyn ToSql, &owner, &expires_at, &now],
                )
                .map_err(map_storage_error)?;
            let acquired = changed > 0;
            debug!(acquired, "sync lock attempt");
            Ok(acquired)
        })
        .await
    }

    async fn release(&self, key: &str, owner: &str) -> Result<()> {
        let key = key.to_string();
        let owner = owner.to_string();
        run_blocking(&self.db, move |conn| {
            conn.execute(
                "DELETE FROM sync_locks WHERE lock_key = ?1 AND owner = ?2",
                &[&key as &dyn ToSql, &owner],
            )
            .map_err(map_storage_error)?;
            Ok(())
        })
        .await
    }
}
