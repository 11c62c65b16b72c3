//! Database connection manager backed by the shared SQLCipher pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tidemark_common::storage::sqlcipher::{
    SqlCipherConnection, SqlCipherPool, SqlCipherPoolConfig,
};
use tidemark_domain::{Result, TidemarkError};
use tracing::info;

use super::support::{map_sql_error, map_storage_error};

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Owns the SQLCipher pool every repository borrows connections from.
pub struct DbManager {
    pool: Arc<SqlCipherPool>,
    path: PathBuf,
}

impl DbManager {
    /// Open (or create) the encrypted database at `db_path`.
    ///
    /// # Errors
    /// `TidemarkError::Security` when no key is supplied or the key does not
    /// decrypt an existing file.
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        pool_size: u32,
        encryption_key: Option<&str>,
    ) -> Result<Self> {
        let key = encryption_key
            .filter(|key| !key.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| TidemarkError::Security("database encryption key not provided".into()))?;

        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                TidemarkError::Database(format!("cannot create {}: {err}", parent.display()))
            })?;
        }

        let config = SqlCipherPoolConfig::default().with_max_size(pool_size.max(1));
        let pool = SqlCipherPool::new(&path, key, config).map(Arc::new).map_err(map_storage_error)?;

        info!(db_path = %path.display(), max_connections = pool.max_size(), "sqlcipher pool initialised");

        Ok(Self { pool, path })
    }

    /// Acquire a SQLCipher connection from the pool.
    pub fn get_connection(&self) -> Result<SqlCipherConnection> {
        self.pool.get_sqlcipher_connection().map_err(map_storage_error)
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, CAST(strftime('%s','now') AS INTEGER))",
            rusqlite::params![SCHEMA_VERSION],
        )
        .map_err(map_storage_error)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn health_check(&self) -> Result<()> {
        let status = self.pool.health_check();
        if status.healthy {
            Ok(())
        } else {
            Err(TidemarkError::Database(
                status.message.unwrap_or_else(|| "database pool unhealthy".into()),
            ))
        }
    }
}
