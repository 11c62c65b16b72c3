//! Retrying JSON-over-HTTP client
//!
//! Server errors, `429 Too Many Requests`, timeouts and connect failures are
//! retried with exponential backoff plus a little jitter. Every other status
//! is handed back to the caller, which owns the mapping into domain errors.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use tidemark_domain::{Result, TidemarkError};
use tracing::{debug, warn};

use crate::errors::InfraError;

#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    max_attempts: usize,
    base_backoff: Duration,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute `builder`, retrying transient failures
    ///
    /// The body must be buffered (e.g. `.json(..)`) so it can be replayed.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let attempts = self.max_attempts.max(1);

        for attempt in 1..=attempts {
            let request = builder
                .try_clone()
                .ok_or_else(|| {
                    TidemarkError::Internal("streaming request bodies cannot be retried".into())
                })?
                .build()
                .map_err(InfraError::from)?;

            let method = request.method().clone();
            let url = request.url().clone();
            let last_attempt = attempt == attempts;
            debug!(attempt, %method, path = url.path(), "http.request");

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    if is_retryable_status(status) && !last_attempt {
                        warn!(attempt, %status, path = url.path(), "http.retrying_status");
                        self.sleep_with_backoff(attempt).await;
                        continue;
                    }
                    debug!(attempt, %status, path = url.path(), "http.response");
                    return Ok(response);
                }
                Err(err) if should_retry_error(&err) && !last_attempt => {
                    warn!(attempt, error = %err, path = url.path(), "http.retrying_error");
                    self.sleep_with_backoff(attempt).await;
                }
                Err(err) => return Err(InfraError::from(err).into()),
            }
        }

        Err(TidemarkError::Internal("http client exhausted retries".into()))
    }

    fn backoff_delay(&self, retry_number: usize) -> Duration {
        let shift = u32::try_from(retry_number.saturating_sub(1).min(8)).unwrap_or(8);
        let base = self.base_backoff.saturating_mul(1u32 << shift);
        let jitter_cap = u64::try_from(base.as_millis() / 4).unwrap_or(0);
        if jitter_cap == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_cap))
    }

    async fn sleep_with_backoff(&self, retry_number: usize) {
        let delay = self.backoff_delay(retry_number);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: usize,
    base_backoff: Duration,
    bearer_token: Option<String>,
    user_agent: String,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            bearer_token: None,
            user_agent: concat!("tidemark/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total number of attempts (initial try + retries)
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// Send `Authorization: Bearer <token>` on every request
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                TidemarkError::Config("API key contains invalid header characters".into())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = ReqwestClient::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .default_headers(headers)
            .build()
            .map_err(InfraError::from)?;

        Ok(HttpClient { client, max_attempts: self.max_attempts, base_backoff: self.base_backoff })
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
