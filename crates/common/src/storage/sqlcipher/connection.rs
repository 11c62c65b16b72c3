//! SQLCipher connection wrapper
//!
//! Thin wrapper over a pooled rusqlite connection that maps every failure
//! into [`StorageError`] and returns collected rows from `query_map`.

use std::ops::{Deref, DerefMut};

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection as RusqliteConnection, Row, Statement as RusqliteStatement, ToSql};
use tracing::instrument;

use crate::storage::error::{StorageError, StorageResult};

/// Pooled SQLCipher connection
pub struct SqlCipherConnection {
    inner: PooledConnection<SqliteConnectionManager>,
}

impl SqlCipherConnection {
    pub fn new(conn: PooledConnection<SqliteConnectionManager>) -> Self {
        Self { inner: conn }
    }

    pub fn inner(&self) -> &RusqliteConnection {
        &self.inner
    }

    #[instrument(skip(self, params), fields(sql = %sql))]
    pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> StorageResult<usize> {
        self.inner.execute(sql, params).map_err(StorageError::from)
    }

    #[instrument(skip(self, params, f), fields(sql = %sql))]
    pub fn query_row<T, F>(&self, sql: &str, params: &[&dyn ToSql], f: F) -> StorageResult<T>
    where
        F: FnOnce(&Row<'_>) -> Result<T, rusqlite::Error>,
    {
        self.inner.query_row(sql, params, f).map_err(StorageError::from)
    }

    /// Like [`Self::query_row`] but maps "no rows" to `None`
    pub fn query_optional<T, F>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        f: F,
    ) -> StorageResult<Option<T>>
    where
        F: FnOnce(&Row<'_>) -> Result<T, rusqlite::Error>,
    {
        match self.inner.query_row(sql, params, f) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::from(e)),
        }
    }

    #[instrument(skip(self), fields(sql = %sql))]
    pub fn prepare(&self, sql: &str) -> StorageResult<SqlCipherStatement<'_>> {
        let stmt = self.inner.prepare(sql).map_err(StorageError::from)?;
        Ok(SqlCipherStatement::new(stmt))
    }

    #[instrument(skip(self))]
    pub fn transaction(&mut self) -> StorageResult<rusqlite::Transaction<'_>> {
        self.inner.transaction().map_err(StorageError::from)
    }
}

impl Deref for SqlCipherConnection {
    type Target = RusqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for SqlCipherConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// Prepared statement bound to a pooled connection
pub struct SqlCipherStatement<'conn> {
    inner: RusqliteStatement<'conn>,
}

impl<'conn> SqlCipherStatement<'conn> {
    pub fn new(stmt: RusqliteStatement<'conn>) -> Self {
        Self { inner: stmt }
    }

    pub fn execute(&mut self, params: &[&dyn ToSql]) -> StorageResult<usize> {
        self.inner.execute(params).map_err(StorageError::from)
    }

    /// Run the query and collect every mapped row
    pub fn query_map<T, F>(&mut self, params: &[&dyn ToSql], mut f: F) -> StorageResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> Result<T, rusqlite::Error>,
    {
        let rows = self.inner.query_map(params, |row| f(row)).map_err(StorageError::from)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }
}
