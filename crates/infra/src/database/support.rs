//! Shared plumbing for the SQLCipher repositories

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tidemark_common::storage::sqlcipher::SqlCipherConnection;
use tidemark_common::storage::StorageError;
use tidemark_domain::{Result, TidemarkError};
use tokio::task;
use tracing::warn;

use super::manager::DbManager;
use crate::errors::InfraError;

/// Run `work` against a pooled connection on the blocking thread pool
pub(crate) async fn run_blocking<T, F>(db: &Arc<DbManager>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut SqlCipherConnection) -> Result<T> + Send + 'static,
{
    let db = Arc::clone(db);
    task::spawn_blocking(move || {
        let mut conn = db.get_connection()?;
        work(&mut conn)
    })
    .await
    .map_err(map_join_error)?
}

pub(crate) fn map_storage_error(err: StorageError) -> TidemarkError {
    if err.is_retryable() {
        warn!(error = %err, "database.transient_failure");
    }
    InfraError::from(err).into()
}

pub(crate) fn map_sql_error(err: rusqlite::Error) -> TidemarkError {
    InfraError::from(err).into()
}

fn map_join_error(err: task::JoinError) -> TidemarkError {
    if err.is_cancelled() {
        TidemarkError::Internal("database task cancelled".into())
    } else {
        TidemarkError::Internal(format!("database task panic: {err}"))
    }
}

pub(crate) fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

/// Column decoder for `*_ms` columns
pub(crate) fn from_millis(value: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(value).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(0, value)
    })
}

/// Parse a text column through `FromStr`, surfacing bad values as a
/// conversion error on `column`
pub(crate) fn parse_column<T>(column: usize, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            err.into(),
        )
    })
}

/// Decode a JSON text column
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    column: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
    })
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|err| TidemarkError::Internal(format!("cannot encode column: {err}")))
}
