//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use tidemark_common::storage::StorageError;
use tidemark_domain::TidemarkError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TidemarkError);

impl From<InfraError> for TidemarkError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TidemarkError> for InfraError {
    fn from(value: TidemarkError) -> Self {
        InfraError(value)
    }
}

trait IntoTidemarkError {
    fn into_tidemark(self) -> TidemarkError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → TidemarkError */
/* -------------------------------------------------------------------------- */

impl IntoTidemarkError for SqlError {
    fn into_tidemark(self) -> TidemarkError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        TidemarkError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        TidemarkError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        TidemarkError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        TidemarkError::Database("foreign key constraint violation".into())
                    }
                    (ErrorCode::NotADatabase, _) => TidemarkError::Security(
                        "SQLCipher key rejected or database not encrypted".into(),
                    ),
                    _ => TidemarkError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => TidemarkError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                TidemarkError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                TidemarkError::Database(format!("invalid column type for {name}: {ty}"))
            }
            RE::InvalidQuery => TidemarkError::Database("invalid SQL query".into()),
            other => TidemarkError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_tidemark())
    }
}

/* -------------------------------------------------------------------------- */
/* StorageError → TidemarkError */
/* -------------------------------------------------------------------------- */

impl IntoTidemarkError for StorageError {
    fn into_tidemark(self) -> TidemarkError {
        match self {
            StorageError::Rusqlite(sql_err) => sql_err.into_tidemark(),
            StorageError::WrongKeyOrNotEncrypted | StorageError::Encryption(_) => {
                TidemarkError::Security(self.to_string())
            }
            StorageError::Timeout(_) => {
                TidemarkError::Timeout(self.to_string())
            }
            other => TidemarkError::Database(other.to_string()),
        }
    }
}

impl From<StorageError> for InfraError {
    fn from(value: StorageError) -> Self {
        InfraError(value.into_tidemark())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TidemarkError */
/* -------------------------------------------------------------------------- */

impl IntoTidemarkError for HttpError {
    fn into_tidemark(self) -> TidemarkError {
        if self.is_timeout() {
            return TidemarkError::Timeout("HTTP request timed out".into());
        }

        if self.is_connect() {
            return TidemarkError::Network("HTTP connection failure".into());
        }

        if self.is_decode() {
            return TidemarkError::Network(format!("malformed HTTP response body: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => TidemarkError::Auth(message),
                404 => TidemarkError::NotFound(message),
                400..=499 if code != 429 => TidemarkError::InvalidInput(message),
                _ => TidemarkError::Network(message),
            };
        }

        TidemarkError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_tidemark())
    }
}

/* -------------------------------------------------------------------------- */
/* tokio::task::JoinError → TidemarkError */
/* -------------------------------------------------------------------------- */

impl From<JoinError> for InfraError {
    fn from(value: JoinError) -> Self {
        let err = if value.is_cancelled() {
            TidemarkError::Internal("blocking task cancelled".into())
        } else {
            TidemarkError::Internal(format!("blocking task panicked: {value}"))
        };
        InfraError(err)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Client;
    use rusqlite::ffi::{Error as FfiError, ErrorCode};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn sqlite_busy_maps_to_database_error() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::DatabaseBusy, extended_code: 5 },
            Some("database is locked".into()),
        );

        let mapped: TidemarkError = InfraError::from(err).into();
        match mapped {
            TidemarkError::Database(msg) => assert!(msg.contains("busy")),
            other => panic!("expected database error, got {other:?}"),
        }
    }

    #[test]
    fn unique_violation_is_named() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::ConstraintViolation, extended_code: 2067 },
            None,
        );
        let mapped: TidemarkError = InfraError::from(err).into();
        assert_eq!(mapped, TidemarkError::Database("unique constraint violation".into()));
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let mapped: TidemarkError = InfraError::from(SqlError::QueryReturnedNoRows).into();
        assert!(matches!(mapped, TidemarkError::NotFound(_)));
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        let mapped: TidemarkError = InfraError::from(StorageError::Timeout(5)).into();
        assert!(matches!(mapped, TidemarkError::Timeout(_)));
        assert!(mapped.is_retryable());
    }

    #[tokio::test]
    async fn http_status_errors_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(403)).mount(&server).await;

        let err = Client::new()
            .get(server.uri())
            .send()
            .await
            .unwrap()
            .error_for_status()
            .unwrap_err();

        let mapped: TidemarkError = InfraError::from(err).into();
        assert!(matches!(mapped, TidemarkError::Auth(msg) if msg.contains("403")));
    }
}
