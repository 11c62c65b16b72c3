use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use tidemark_core::VaultClient;
use tidemark_domain::{DlpConfig, Result, TidemarkError, TokenMap, VaultToken};
use tracing::{debug, instrument};

use super::ServiceEndpoint;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertRequest<'a> {
    user_id: &'a str,
    tokens: Vec<VaultToken>,
}

/// PII vault reached over HTTP: `POST {vault_url}` with `{userId, tokens}`
pub struct HttpVaultClient {
    endpoint: ServiceEndpoint,
}

impl HttpVaultClient {
    pub fn new(config: &DlpConfig) -> Self {
        Self {
            endpoint: ServiceEndpoint::new(
                "pii vault",
                config.vault_url.as_deref(),
                config.vault_key.as_deref(),
                Duration::from_secs(config.timeout_secs),
            ),
        }
    }
}

#[async_trait]
impl VaultClient for HttpVaultClient {
    fn check_config(&self) -> Result<()> {
        self.endpoint.check().map(|_| ())
    }

    #[instrument(skip(self, tokens), fields(tokens = tokens.len()))]
    async fn upsert(&self, user_id: &str, tokens: &TokenMap) -> Result<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        let (http, url) = self.endpoint.check()?;
        let request = UpsertRequest { user_id, tokens: VaultToken::from_map(user_id, tokens) };
        let response = http.send(http.request(Method::POST, url.clone()).json(&request)).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TidemarkError::Network(format!("vault answered {status}")));
        }
        debug!("vault.upsert.completed");
        Ok(())
    }
}
