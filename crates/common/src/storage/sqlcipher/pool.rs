//! SQLCipher connection pool
//!
//! Provides r2d2-based connection pooling for SQLCipher databases.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info, instrument, warn};

use super::cipher::{prepare_connection, verify_encryption};
use super::config::SqlCipherPoolConfig;
use super::connection::SqlCipherConnection;
use crate::storage::error::{looks_like_wrong_key, StorageError, StorageResult};
use crate::storage::secret::SecretKey;

/// Pool health snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub healthy: bool,
    pub connections: u32,
    pub idle_connections: u32,
    pub max_size: u32,
    pub message: Option<String>,
}

/// SQLCipher connection pool
///
/// Every connection handed out has had the encryption key and the
/// connection pragmas applied by the manager's init hook.
#[derive(Debug)]
pub struct SqlCipherPool {
    pool: Pool<SqliteConnectionManager>,
    config: SqlCipherPoolConfig,
}

impl SqlCipherPool {
    /// Create a new SQLCipher connection pool
    ///
    /// Builds the pool, then checks one connection out to verify that the
    /// key actually decrypts the file.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Database file can't be accessed
    /// - Encryption key is wrong
    /// - Pool creation fails
    #[instrument(skip(encryption_key), fields(db_path = ?path, pool_size = config.max_size))]
    pub fn new(
        path: &Path,
        encryption_key: impl Into<SecretKey>,
        config: SqlCipherPoolConfig,
    ) -> StorageResult<Self> {
        info!("creating sqlcipher connection pool");

        let key: SecretKey = encryption_key.into();
        let busy_timeout = config.busy_timeout;

        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            prepare_connection(conn, &key, busy_timeout)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                warn!(error = %e, "failed to create connection pool");
                if looks_like_wrong_key(&e.to_string()) {
                    StorageError::WrongKeyOrNotEncrypted
                } else {
                    StorageError::Connection(format!("Failed to create pool: {e}"))
                }
            })?;

        {
            let conn = pool.get().map_err(|e| {
                if looks_like_wrong_key(&e.to_string()) {
                    StorageError::WrongKeyOrNotEncrypted
                } else {
                    StorageError::Connection(format!("Failed to get test connection: {e}"))
                }
            })?;
            verify_encryption(&conn)?;
            debug!("encryption verified");
        }

        info!(max_size = config.max_size, "sqlcipher pool ready");
        Ok(Self { pool, config })
    }

    /// Check a connection out of the pool
    ///
    /// # Errors
    /// `StorageError::Timeout` when no connection frees up within the
    /// configured timeout, `StorageError::Connection` otherwise.
    #[instrument(skip(self), fields(pool_size = self.config.max_size))]
    pub fn get_sqlcipher_connection(&self) -> StorageResult<SqlCipherConnection> {
        let start = std::time::Instant::now();

        match self.pool.get() {
            Ok(conn) => {
                debug!(duration_ms = start.elapsed().as_millis() as u64, "connection acquired");
                Ok(SqlCipherConnection::new(conn))
            }
            Err(e) => {
                if e.to_string().to_lowercase().contains("timed out") {
                    warn!(timeout = ?self.config.connection_timeout, "connection timeout");
                    Err(StorageError::Timeout(self.config.connection_timeout.as_secs()))
                } else {
                    warn!(error = %e, "connection error");
                    Err(StorageError::Connection(format!("Failed to get connection: {e}")))
                }
            }
        }
    }

    /// Report pool occupancy and whether a connection can be checked out
    pub fn health_check(&self) -> HealthStatus {
        let state = self.pool.state();
        match self.pool.get() {
            Ok(_conn) => HealthStatus {
                healthy: true,
                connections: state.connections,
                idle_connections: state.idle_connections,
                max_size: self.config.max_size,
                message: None,
            },
            Err(e) => HealthStatus {
                healthy: false,
                connections: state.connections,
                idle_connections: state.idle_connections,
                max_size: self.config.max_size,
                message: Some(format!("Pool unhealthy: {e}")),
            },
        }
    }

    pub fn max_size(&self) -> u32 {
        self.config.max_size
    }
}
