//! Redaction gate
//!
//! Every item's free-text fields are joined into one scan input, scanned in
//! fixed-size batches, split back by position and the discovered tokens are
//! written to the vault before the caller persists anything.

use std::sync::Arc;

use tidemark_domain::constants::REDACTION_FIELD_DELIMITER;
use tidemark_domain::{FailurePolicy, ProviderItem, Redacted, Result, TidemarkError, TokenMap};
use tracing::{debug, error, instrument, warn};

use super::ports::{DlpScanner, VaultClient};

/// Output of one gate pass
#[derive(Debug)]
pub struct Screened {
    pub items: Vec<Redacted<ProviderItem>>,
    /// DLP failure tolerated under `FailOpen`
    pub bypassed: Option<TidemarkError>,
}

/// Mandatory scan step in front of durable storage
pub struct RedactionGate {
    scanner: Arc<dyn DlpScanner>,
    vault: Arc<dyn VaultClient>,
    batch_size: usize,
}

impl RedactionGate {
    pub fn new(
        scanner: Arc<dyn DlpScanner>,
        vault: Arc<dyn VaultClient>,
        batch_size: usize,
    ) -> Self {
        Self { scanner, vault, batch_size: batch_size.max(1) }
    }

    /// Redact `items` for `user_id`
    ///
    /// Under `FailOpen` a scanner/vault failure returns the originals with
    /// `dlp_verified = false`; under `FailClosed` it returns the error and
    /// nothing may be stored.
    pub async fn sanitize(
        &self,
        user_id: &str,
        items: Vec<ProviderItem>,
        policy: FailurePolicy,
    ) -> Result<Vec<Redacted<ProviderItem>>> {
        Ok(self.screen(user_id, items, policy).await?.items)
    }

    /// [`Self::sanitize`], also returning the failure a fail-open pass
    /// swallowed
    #[instrument(skip(self, items), fields(items = items.len(), policy = %policy))]
    pub async fn screen(
        &self,
        user_id: &str,
        items: Vec<ProviderItem>,
        policy: FailurePolicy,
    ) -> Result<Screened> {
        if items.is_empty() {
            return Ok(Screened { items: Vec::new(), bypassed: None });
        }

        match self.redact_all(user_id, &items).await {
            Ok(redacted) => Ok(Screened {
                items: redacted
                    .into_iter()
                    .map(|item| Redacted { item, dlp_verified: true })
                    .collect(),
                bypassed: None,
            }),
            Err(err) if err.is_dlp_failure() => match policy {
                FailurePolicy::FailOpen => {
                    warn!(
                        error = %err,
                        error_kind = err.label(),
                        "dlp unavailable, storing unverified records"
                    );
                    Ok(Screened {
                        items: items
                            .into_iter()
                            .map(|item| Redacted { item, dlp_verified: false })
                            .collect(),
                        bypassed: Some(err),
                    })
                }
                FailurePolicy::FailClosed => {
                    error!(
                        error = %err,
                        error_kind = err.label(),
                        "dlp unavailable, refusing to store"
                    );
                    Err(err)
                }
            },
            Err(err) => Err(err),
        }
    }

    /// Single-record variant of [`Self::sanitize`]
    pub async fn sanitize_one(
        &self,
        user_id: &str,
        item: ProviderItem,
        policy: FailurePolicy,
    ) -> Result<Redacted<ProviderItem>> {
        self.sanitize(user_id, vec![item], policy)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TidemarkError::Internal("redaction gate dropped the item".into()))
    }

    async fn redact_all(
        &self,
        user_id: &str,
        items: &[ProviderItem],
    ) -> Result<Vec<ProviderItem>> {
        self.scanner.check_config()?;
        self.vault.check_config()?;

        let mut redacted = Vec::with_capacity(items.len());
        for chunk in items.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(compose_scan_input).collect();
            let results = self.scanner.scan(&texts).await.map_err(as_scan_failure)?;
            if results.len() != chunk.len() {
                return Err(TidemarkError::DlpScanFailed(format!(
                    "scanner returned {} results for {} inputs",
                    results.len(),
                    chunk.len()
                )));
            }

            let mut tokens = TokenMap::new();
            for (item, result) in chunk.iter().zip(results) {
                redacted.push(apply_redaction(item, &result.redacted_text));
                tokens.extend(result.token_to_value);
            }

            if !tokens.is_empty() {
                self.vault.upsert(user_id, &tokens).await.map_err(as_scan_failure)?;
            }
            debug!(batch = chunk.len(), tokens = tokens.len(), "dlp batch redacted");
        }
        Ok(redacted)
    }
}

/// Text fields in scan order
fn scan_fields(item: &ProviderItem) -> [Option<&str>; 5] {
    [
        item.title.as_deref(),
        item.description.as_deref(),
        item.location.as_deref(),
        item.sender.as_deref(),
        item.snippet.as_deref(),
    ]
}

/// Join the item's text fields in a stable order
pub(crate) fn compose_scan_input(item: &ProviderItem) -> String {
    scan_fields(item).map(|field| field.unwrap_or_default()).join(REDACTION_FIELD_DELIMITER)
}

/// Copy `item` with each field replaced by its slice of `redacted_text`
///
/// A missing or empty slice keeps the original value; absent fields stay
/// absent.
pub(crate) fn apply_redaction(item: &ProviderItem, redacted_text: &str) -> ProviderItem {
    let parts: Vec<&str> = redacted_text.split(REDACTION_FIELD_DELIMITER).collect();
    let pick = |index: usize, original: &Option<String>| -> Option<String> {
        original.as_ref().map(|value| match parts.get(index) {
            Some(part) if !part.is_empty() => (*part).to_string(),
            _ => value.clone(),
        })
    };

    ProviderItem {
        title: pick(0, &item.title),
        description: pick(1, &item.description),
        location: pick(2, &item.location),
        sender: pick(3, &item.sender),
        snippet: pick(4, &item.snippet),
        ..item.clone()
    }
}

fn as_scan_failure(err: TidemarkError) -> TidemarkError {
    if err.is_dlp_failure() {
        err
    } else {
        TidemarkError::DlpScanFailed(err.to_string())
    }
}
