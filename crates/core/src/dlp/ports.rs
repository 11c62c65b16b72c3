//! Port interfaces for the DLP scanner and PII vault

use async_trait::async_trait;
use tidemark_domain::{Result, ScanResult, TokenMap};

/// Black-box DLP scan service
#[async_trait]
pub trait DlpScanner: Send + Sync {
    /// Validate endpoint and credentials without touching the network
    ///
    /// # Errors
    /// `TidemarkError::DlpConfigMissing` when the key or URL is absent or
    /// malformed.
    fn check_config(&self) -> Result<()>;

    /// Scan an ordered batch; the response is parallel to `texts`
    async fn scan(&self, texts: &[String]) -> Result<Vec<ScanResult>>;
}

/// Append-only token vault, scoped per user
#[async_trait]
pub trait VaultClient: Send + Sync {
    fn check_config(&self) -> Result<()>;

    async fn upsert(&self, user_id: &str, tokens: &TokenMap) -> Result<()>;
}
