use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tidemark_core::DlpScanner;
use tidemark_domain::{DlpConfig, Result, ScanResult, TidemarkError};
use tracing::{debug, instrument};

use super::ServiceEndpoint;

#[derive(Serialize)]
struct ScanRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct ScanResponse {
    results: Vec<ScanResult>,
}

/// DLP scanner reached over HTTP: `POST {scanner_url}` with `{texts}`
pub struct HttpDlpScanner {
    endpoint: ServiceEndpoint,
}

impl HttpDlpScanner {
    pub fn new(config: &DlpConfig) -> Self {
        Self {
            endpoint: ServiceEndpoint::new(
                "dlp scanner",
                config.scanner_url.as_deref(),
                config.scanner_key.as_deref(),
                Duration::from_secs(config.timeout_secs),
            ),
        }
    }
}

#[async_trait]
impl DlpScanner for HttpDlpScanner {
    fn check_config(&self) -> Result<()> {
        self.endpoint.check().map(|_| ())
    }

    #[instrument(skip_all, fields(batch = texts.len()))]
    async fn scan(&self, texts: &[String]) -> Result<Vec<ScanResult>> {
        let (http, url) = self.endpoint.check()?;
        let builder = http.request(Method::POST, url.clone()).json(&ScanRequest { texts });
        let response = http
            .send(builder)
            .await
            .map_err(|err| TidemarkError::DlpScanFailed(format!("scan request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TidemarkError::DlpScanFailed(format!("scanner answered {status}")));
        }

        let body: ScanResponse = response
            .json()
            .await
            .map_err(|err| TidemarkError::DlpScanFailed(format!("malformed scan response: {err}")))?;
        if body.results.len() != texts.len() {
            return Err(TidemarkError::DlpScanFailed(format!(
                "scanner returned {} results for {} texts",
                body.results.len(),
                texts.len()
            )));
        }

        debug!("dlp.scan.completed");
        Ok(body.results)
    }
}
