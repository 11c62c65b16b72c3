//! DLP scanner and PII vault adapters

mod scanner;
mod vault;

pub use scanner::HttpDlpScanner;
pub use vault::HttpVaultClient;

use std::time::Duration;

use tidemark_domain::{Result, TidemarkError};
use url::Url;

use crate::http::HttpClient;

/// A keyed HTTP service whose settings are validated lazily
///
/// Construction never fails on missing settings; `check` reports them as
/// `DlpConfigMissing` so the caller's failure policy decides what happens.
struct ServiceEndpoint {
    service: &'static str,
    url: Option<Url>,
    problem: Option<String>,
    http: Option<HttpClient>,
}

impl ServiceEndpoint {
    fn new(
        service: &'static str,
        url: Option<&str>,
        key: Option<&str>,
        timeout: Duration,
    ) -> Self {
        let url = url.map(str::trim).filter(|raw| !raw.is_empty());
        let key = key.map(str::trim).filter(|raw| !raw.is_empty());

        let (url, problem) = match (url, key) {
            (None, _) => (None, Some(format!("{service} url is not configured"))),
            (_, None) => (None, Some(format!("{service} key is not configured"))),
            (Some(raw), Some(_)) => match Url::parse(raw) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => (Some(parsed), None),
                Ok(parsed) => {
                    (None, Some(format!("{service} url has unsupported scheme {}", parsed.scheme())))
                }
                Err(err) => (None, Some(format!("{service} url is invalid: {err}"))),
            },
        };

        let http = match (&url, key) {
            (Some(_), Some(key)) => {
                match HttpClient::builder().timeout(timeout).bearer_token(key).build() {
                    Ok(http) => Some(http),
                    Err(err) => {
                        return Self {
                            service,
                            url: None,
                            problem: Some(format!("{service} client: {err}")),
                            http: None,
                        }
                    }
                }
            }
            _ => None,
        };

        Self { service, url, problem, http }
    }

    fn check(&self) -> Result<(&HttpClient, &Url)> {
        match (&self.http, &self.url) {
            (Some(http), Some(url)) => Ok((http, url)),
            _ => Err(TidemarkError::DlpConfigMissing(
                self.problem.clone().unwrap_or_else(|| format!("{} is not configured", self.service)),
            )),
        }
    }
}
