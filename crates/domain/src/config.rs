//! Configuration structures
//!
//! Every section implements `Default` and is `#[serde(default)]`, so a partial
//! TOML/JSON file only needs to name what it overrides.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CALENDAR_FALLBACK_LIMIT, DEFAULT_CONFLICT_SLACK_SECS, DEFAULT_DLP_BATCH_SIZE,
    DEFAULT_PAGE_SIZE,
};
use crate::types::SyncWindow;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub proxy: ProxyConfig,
    pub dlp: DlpConfig,
    pub sync: SyncSettings,
    pub logging: LoggingConfig,
}

/// Encrypted database settings
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
    /// Required at startup; may come from the environment instead of the file
    pub encryption_key: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "tidemark.db".to_string(), pool_size: 8, encryption_key: None }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("path", &self.path)
            .field("pool_size", &self.pool_size)
            .field("encryption_key", &redacted(self.encryption_key.as_deref()))
            .finish()
    }
}

/// Provider proxy (the third-party integration gateway)
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8787".to_string(),
            api_key: None,
            timeout_secs: 30,
            max_attempts: 3,
        }
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redacted(self.api_key.as_deref()))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// What the redaction gate does when the scanner or vault cannot be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Continue with the unredacted text, flagged as unverified
    FailOpen,
    /// Abort the operation; nothing is stored unredacted
    FailClosed,
}

crate::impl_domain_status_conversions!(FailurePolicy {
    FailOpen => "fail_open",
    FailClosed => "fail_closed",
});

/// DLP scanner and PII vault endpoints plus the per-call-site policies
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DlpConfig {
    pub scanner_url: Option<String>,
    pub scanner_key: Option<String>,
    pub vault_url: Option<String>,
    pub vault_key: Option<String>,
    pub timeout_secs: u64,
    pub batch_size: usize,
    pub bulk_sync_policy: FailurePolicy,
    pub single_create_policy: FailurePolicy,
}

impl Default for DlpConfig {
    fn default() -> Self {
        Self {
            scanner_url: None,
            scanner_key: None,
            vault_url: None,
            vault_key: None,
            timeout_secs: 20,
            batch_size: DEFAULT_DLP_BATCH_SIZE,
            bulk_sync_policy: FailurePolicy::FailOpen,
            single_create_policy: FailurePolicy::FailClosed,
        }
    }
}

impl fmt::Debug for DlpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DlpConfig")
            .field("scanner_url", &self.scanner_url)
            .field("scanner_key", &redacted(self.scanner_key.as_deref()))
            .field("vault_url", &self.vault_url)
            .field("vault_key", &redacted(self.vault_key.as_deref()))
            .field("timeout_secs", &self.timeout_secs)
            .field("batch_size", &self.batch_size)
            .field("bulk_sync_policy", &self.bulk_sync_policy)
            .field("single_create_policy", &self.single_create_policy)
            .finish()
    }
}

/// Relative time window, resolved against "now" at fetch time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub days_back: i64,
    /// `None` leaves the window open-ended (mail)
    #[serde(default)]
    pub days_ahead: Option<i64>,
}

impl WindowConfig {
    pub const fn new(days_back: i64, days_ahead: Option<i64>) -> Self {
        Self { days_back, days_ahead }
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> SyncWindow {
        SyncWindow {
            time_min: now - Duration::days(self.days_back),
            time_max: self.days_ahead.map(|days| now + Duration::days(days)),
        }
    }
}

/// Sync pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    pub page_size: u32,
    pub calendar_initial_window: WindowConfig,
    pub calendar_fallback_window: WindowConfig,
    pub mail_initial_window: WindowConfig,
    pub mail_fallback_window: WindowConfig,
    /// Window over which conflicts are recomputed after every write
    pub analysis_window: WindowConfig,
    pub calendar_fallback_limit: usize,
    pub hydration_concurrency: usize,
    pub conflict_slack_secs: i64,
    pub lock_ttl_secs: u64,
    /// Upper bound on one cycle; kept below `lock_ttl_secs`
    pub cycle_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
    pub schedule_interval_secs: u64,
    pub scheduler_enabled: bool,
    pub max_task_attempts: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            calendar_initial_window: WindowConfig::new(7, Some(30)),
            calendar_fallback_window: WindowConfig::new(1, Some(14)),
            mail_initial_window: WindowConfig::new(7, None),
            mail_fallback_window: WindowConfig::new(2, None),
            analysis_window: WindowConfig::new(1, Some(30)),
            calendar_fallback_limit: DEFAULT_CALENDAR_FALLBACK_LIMIT,
            hydration_concurrency: 8,
            conflict_slack_secs: DEFAULT_CONFLICT_SLACK_SECS,
            lock_ttl_secs: 600,
            cycle_timeout_secs: 300,
            poll_interval_ms: 1000,
            poll_timeout_secs: 30,
            schedule_interval_secs: 900,
            scheduler_enabled: true,
            max_task_attempts: 3,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { json: false, level: "info".to_string() }
    }
}

fn redacted(value: Option<&str>) -> &'static str {
    match value {
        Some(_) => "***",
        None => "<unset>",
    }
}
