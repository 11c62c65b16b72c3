//! Per-connection SQLCipher setup
//!
//! Every pooled connection is keyed, pinned to the SQLCipher 4 format and
//! switched to WAL before any repository touches it.

use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, error};

use crate::storage::error::{looks_like_wrong_key, StorageError, StorageResult};
use crate::storage::secret::SecretKey;

const CIPHER_COMPATIBILITY: i32 = 4;
const KDF_ITERATIONS: i32 = 256_000;

/// Key the connection and apply the pragmas the repositories rely on
///
/// `PRAGMA key` has to be the first statement SQLCipher sees, so this runs
/// as the pool's init hook. Decrypted temp pages stay in memory.
///
/// # Errors
/// `WrongKeyOrNotEncrypted` when the key cannot decrypt the file, `Encryption`
/// or `Query` when a pragma is refused.
pub fn prepare_connection(
    conn: &Connection,
    key: &SecretKey,
    busy_timeout: Duration,
) -> StorageResult<()> {
    let start = std::time::Instant::now();

    conn.pragma_update(None, "key", key.expose()).map_err(|e| {
        error!(error = %e, "sqlcipher.key_setup_failed");
        if looks_like_wrong_key(&e.to_string()) {
            StorageError::WrongKeyOrNotEncrypted
        } else {
            StorageError::Encryption(format!("key rejected: {e}"))
        }
    })?;

    for (name, value) in [
        ("cipher_compatibility", CIPHER_COMPATIBILITY),
        ("kdf_iter", KDF_ITERATIONS),
    ] {
        conn.pragma_update(None, name, value)
            .map_err(|e| StorageError::Encryption(format!("{name}: {e}")))?;
    }

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;",
    )
    .map_err(|e| {
        // First statement that touches a page; a wrong key surfaces here
        if looks_like_wrong_key(&e.to_string()) {
            StorageError::WrongKeyOrNotEncrypted
        } else {
            StorageError::Query(format!("connection pragmas: {e}"))
        }
    })?;

    conn.busy_timeout(busy_timeout)
        .map_err(|e| StorageError::Query(format!("busy timeout: {e}")))?;

    debug!(duration_ms = start.elapsed().as_millis() as u64, "sqlcipher.connection_ready");
    Ok(())
}

/// Read the schema so a wrong key fails here instead of on the first query
///
/// # Errors
/// `WrongKeyOrNotEncrypted` if the page cannot be decrypted
pub fn verify_encryption(conn: &Connection) -> StorageResult<()> {
    let result = conn
        .query_row("SELECT count(*) FROM sqlite_master", [], |_| Ok(()))
        .map_err(|e| {
            if looks_like_wrong_key(&e.to_string()) {
                StorageError::WrongKeyOrNotEncrypted
            } else {
                StorageError::from(e)
            }
        });

    if let Err(e) = &result {
        error!(error = %e, "sqlcipher.verification_failed");
    }
    result
}
