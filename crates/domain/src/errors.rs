//! Error types used throughout the pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Tidemark
///
/// The first block mirrors the usual infrastructure categories; the second is
/// the sync pipeline taxonomy. Every variant carries a human readable message
/// that ends up in `SyncStatus::error_message`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TidemarkError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// No connected account for the requested (user, provider)
    #[error("Connection missing: {0}")]
    ConnectionMissing(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Stored delta token was rejected by the provider
    #[error("Sync token expired: {0}")]
    TokenExpired(String),

    #[error("DLP configuration missing: {0}")]
    DlpConfigMissing(String),

    #[error("DLP scan failed: {0}")]
    DlpScanFailed(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Sync already in progress: {0}")]
    SyncInProgress(String),
}

impl TidemarkError {
    /// Whether a scheduler may re-enqueue the work that produced this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_)
                | Self::Network(_)
                | Self::Database(_)
                | Self::Timeout(_)
                | Self::SyncInProgress(_)
        )
    }

    /// Whether the redaction gate's failure policy applies to this error
    pub fn is_dlp_failure(&self) -> bool {
        matches!(self, Self::DlpConfigMissing(_) | Self::DlpScanFailed(_))
    }

    /// Stable snake_case label for logs and metrics fields
    pub fn label(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Config(_) => "config",
            Self::Network(_) => "network",
            Self::Auth(_) => "auth",
            Self::Security(_) => "security",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Internal(_) => "internal",
            Self::ConnectionMissing(_) => "connection_missing",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::TokenExpired(_) => "token_expired",
            Self::DlpConfigMissing(_) => "dlp_config_missing",
            Self::DlpScanFailed(_) => "dlp_scan_failed",
            Self::Persistence(_) => "persistence",
            Self::Timeout(_) => "timeout",
            Self::SyncInProgress(_) => "sync_in_progress",
        }
    }
}

/// Result type alias for Tidemark operations
pub type Result<T> = std::result::Result<T, TidemarkError>;
