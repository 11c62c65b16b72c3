//! SQLCipher-backed mail message storage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Row, ToSql};
use tidemark_core::MailMessageRepository;
use tidemark_domain::{MailMessage, Result};
use tracing::{debug, instrument};

use super::manager::DbManager;
use super::support::{from_millis, map_sql_error, map_storage_error, run_blocking, to_millis};

const UPSERT_SQL: &str = "INSERT INTO mail_messages (
        user_id, message_id, subject, sender, snippet, body, received_at_ms, dlp_verified,
        updated_at_ms
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(user_id, message_id) DO UPDATE SET
        subject = excluded.subject,
        sender = excluded.sender,
        snippet = excluded.snippet,
        body = excluded.body,
        received_at_ms = excluded.received_at_ms,
        dlp_verified = excluded.dlp_verified,
        updated_at_ms = excluded.updated_at_ms";

pub struct SqlCipherMailMessageRepository {
    db: Arc<DbManager>,
}

impl SqlCipherMailMessageRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MailMessageRepository for SqlCipherMailMessageRepository {
    #[instrument(skip(self, messages), fields(count = messages.len()))]
    async fn upsert_messages(&self, messages: &[MailMessage]) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }
        let messages = messages.to_vec();
        run_blocking(&self.db, move |conn| {
            let now = to_millis(Utc::now());
            let tx = conn.transaction().map_err(map_storage_error)?;
            let mut written = 0;
            {
                let mut stmt = tx.prepare_cached(UPSERT_SQL).map_err(map_sql_error)?;
                for message in &messages {
                    written += stmt
                        .execute(rusqlite::params![
                            message.user_id,
                            message.message_id,
                            message.subject,
                            message.sender,
                            message.snippet,
                            message.body,
                            to_millis(message.received_at),
                            message.dlp_verified,
                            now,
                        ])
                        .map_err(map_sql_error)?;
                }
            }
            tx.commit().map_err(map_sql_error)?;
            debug!(written, "mail messages upserted");
            Ok(written)
        })
        .await
    }

    async fn find_message(&self, user_id: &str, message_id: &str) -> Result<Option<MailMessage>> {
        let key = (user_id.to_string(), message_id.to_string());
        run_blocking(&self.db, move |conn| {
            conn.query_optional(
                "SELECT user_id, message_id, subject, sender, snippet, body, received_at_ms, dlp_verified
                 FROM mail_messages WHERE user_id = ?1 AND message_id = ?2",
                &[&key.0 as &dyn ToSql, &key.1],
                map_message_row,
            )
            .map_err(map_storage_error)
        })
        .await
    }
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MailMessage> {
    Ok(MailMessage {
        user_id: row.get(0)?,
        message_id: row.get(1)?,
        subject: row.get(2)?,
        sender: row.get(3)?,
        snippet: row.get(4)?,
        body: row.get(5)?,
        received_at: from_millis(row.get(6)?)?,
        dlp_verified: row.get(7)?,
    })
}
