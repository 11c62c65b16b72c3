//! SQLCipher-backed connection rows and sync checkpoints.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{OptionalExtension, Row, ToSql};
use tidemark_common::storage::sqlcipher::SqlCipherConnection;
use tidemark_core::ConnectionRepository;
use tidemark_domain::{
    Connection, ConnectionMetadata, ConnectionStatus, Provider, Result, SyncCheckpoint,
    TidemarkError,
};
use tracing::{debug, instrument};

use super::manager::DbManager;
use super::support::{
    from_millis, json_column, map_sql_error, map_storage_error, parse_column, run_blocking,
    to_json, to_millis,
};

const SELECT_COLUMNS: &str = "SELECT connection_id, user_id, provider, status, last_sync_at_ms, metadata, created_at_ms FROM connections";

pub struct SqlCipherConnectionRepository {
    db: Arc<DbManager>,
}

impl SqlCipherConnectionRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Every row for a user, newest first, disconnected ones included
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Connection>> {
        let user_id = user_id.to_string();
        run_blocking(&self.db, move |conn| {
            let sql = format!("{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY created_at_ms DESC");
            query_connections(conn, &sql, &[&user_id])
        })
        .await
    }

    pub async fn find_by_id(&self, connection_id: &str) -> Result<Option<Connection>> {
        let connection_id = connection_id.to_string();
        run_blocking(&self.db, move |conn| {
            let sql = format!("{SELECT_COLUMNS} WHERE connection_id = ?1");
            conn.query_optional(&sql, &[&connection_id], map_connection_row)
                .map_err(map_storage_error)
        })
        .await
    }
}

#[async_trait]
impl ConnectionRepository for SqlCipherConnectionRepository {
    async fn find_connected(&self, user_id: &str, provider: Provider) -> Result<Option<Connection>> {
        let user_id = user_id.to_string();
        run_blocking(&self.db, move |conn| {
            let sql = format!(
                "{SELECT_COLUMNS} WHERE user_id = ?1 AND provider = ?2 AND status = 'connected'"
            );
            conn.query_optional(&sql, &[&user_id, &provider.to_string()], map_connection_row)
                .map_err(map_storage_error)
        })
        .await
    }

    async fn list_connected(&self) -> Result<Vec<Connection>> {
        run_blocking(&self.db, |conn| {
            let sql =
                format!("{SELECT_COLUMNS} WHERE status = 'connected' ORDER BY created_at_ms ASC");
            query_connections(conn, &sql, &[])
        })
        .await
    }

    #[instrument(skip(self, connection), fields(user_id = %connection.user_id, provider = %connection.provider))]
    async fn register(&self, connection: &Connection) -> Result<()> {
        let connection = connection.clone();
        let metadata = to_json(&connection.metadata)?;
        run_blocking(&self.db, move |conn| {
            let tx = conn.transaction().map_err(map_storage_error)?;
            let replaced = tx
                .execute(
                    "UPDATE connections SET status = 'disconnected'
                     WHERE user_id = ?1 AND provider = ?2 AND status = 'connected'",
                    rusqlite::params![connection.user_id, connection.provider.to_string()],
                )
                .map_err(map_sql_error)?;
            tx.execute(
                "INSERT INTO connections
                    (connection_id, user_id, provider, status, last_sync_at_ms, metadata, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    connection.connection_id,
                    connection.user_id,
                    connection.provider.to_string(),
                    connection.status.to_string(),
                    connection.last_sync_at.map(to_millis),
                    metadata,
                    to_millis(connection.created_at),
                ],
            )
            .map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)?;
            debug!(replaced, "connection registered");
            Ok(())
        })
        .await
    }

    async fn mark_disconnected(&self, connection_id: &str) -> Result<()> {
        let connection_id = connection_id.to_string();
        run_blocking(&self.db, move |conn| {
            let updated = conn
                .execute(
                    "UPDATE connections SET status = 'disconnected' WHERE connection_id = ?1",
                    &[&connection_id],
                )
                .map_err(map_storage_error)?;
            if updated == 0 {
                return Err(TidemarkError::NotFound(format!("connection {connection_id}")));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, checkpoint), fields(full_token = checkpoint.delta_token.is_some()))]
    async fn commit_sync(&self, connection_id: &str, checkpoint: &SyncCheckpoint) -> Result<()> {
        let connection_id = connection_id.to_string();
        let checkpoint = checkpoint.clone();
        run_blocking(&self.db, move |conn| {
            let tx = conn.transaction().map_err(map_storage_error)?;
            let raw: Option<String> = tx
                .query_row(
                    "SELECT metadata FROM connections WHERE connection_id = ?1",
                    [&connection_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(map_sql_error)?;
            let raw =
                raw.ok_or_else(|| TidemarkError::NotFound(format!("connection {connection_id}")))?;

            let mut metadata: ConnectionMetadata = json_column(0, &raw).map_err(map_sql_error)?;
            metadata.delta_token.clone_from(&checkpoint.delta_token);
            metadata.calendar_id.clone_from(&checkpoint.calendar_id);

            tx.execute(
                "UPDATE connections SET last_sync_at_ms = ?1, metadata = ?2 WHERE connection_id = ?3",
                rusqlite::params![to_millis(checkpoint.synced_at), to_json(&metadata)?, connection_id],
            )
            .map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)
        })
        .await
    }
}

fn query_connections(
    conn: &SqlCipherConnection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<Connection>> {
    let mut stmt = conn.prepare(sql).map_err(map_storage_error)?;
    stmt.query_map(params, map_connection_row).map_err(map_storage_error)
}

fn map_connection_row(row: &Row<'_>) -> rusqlite::Result<Connection> {
    let provider: String = row.get(2)?;
    let status: String = row.get(3)?;
    let metadata: String = row.get(5)?;
    Ok(Connection {
        connection_id: row.get(0)?,
        user_id: row.get(1)?,
        provider: parse_column(2, &provider)?,
        status: parse_column::<ConnectionStatus>(3, &status)?,
        last_sync_at: row.get::<_, Option<i64>>(4)?.map(from_millis).transpose()?,
        metadata: json_column(5, &metadata)?,
        created_at: from_millis(row.get(6)?)?,
    })
}
