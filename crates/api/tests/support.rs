#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;
use tidemark_app::AppContext;
use tidemark_domain::{AppConfig, DatabaseConfig, DlpConfig, ProxyConfig, SyncSettings};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const TEST_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// App context over a temp database, a mock proxy and a mock DLP service
pub struct TestApp {
    pub ctx: Arc<AppContext>,
    pub proxy: MockServer,
    pub dlp: MockServer,
    _temp_dir: TempDir,
}

impl TestApp {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temporary directory");
        let proxy = MockServer::start().await;
        let dlp = MockServer::start().await;

        let mut config = AppConfig {
            database: DatabaseConfig {
                path: temp_dir.path().join("tidemark.db").to_string_lossy().to_string(),
                pool_size: 4,
                encryption_key: Some(TEST_KEY.into()),
            },
            proxy: ProxyConfig {
                base_url: proxy.uri(),
                api_key: None,
                timeout_secs: 5,
                max_attempts: 1,
            },
            dlp: DlpConfig {
                scanner_url: Some(format!("{}/scan", dlp.uri())),
                scanner_key: Some("scanner-key".into()),
                vault_url: Some(format!("{}/vault", dlp.uri())),
                vault_key: Some("vault-key".into()),
                timeout_secs: 5,
                ..DlpConfig::default()
            },
            sync: SyncSettings {
                poll_interval_ms: 20,
                poll_timeout_secs: 5,
                scheduler_enabled: false,
                ..SyncSettings::default()
            },
            ..AppConfig::default()
        };
        customize(&mut config);

        let ctx = AppContext::new_with_config(config).expect("failed to create app context");
        Self { ctx: Arc::new(ctx), proxy, dlp, _temp_dir: temp_dir }
    }

    /// Scanner that echoes its input and vault that accepts everything
    pub async fn mount_passthrough_dlp(&self) {
        Mock::given(method("POST"))
            .and(path("/scan"))
            .respond_with(|request: &Request| {
                let body: Value = request.body_json().unwrap();
                let results: Vec<Value> = body["texts"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|text| json!({"redactedText": text, "tokenToValue": {}}))
                    .collect();
                ResponseTemplate::new(200).set_body_json(json!({"results": results}))
            })
            .mount(&self.dlp)
            .await;
        Mock::given(method("POST"))
            .and(path("/vault"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.dlp)
            .await;
    }
}

pub fn tomorrow_at(hour: u32) -> DateTime<Utc> {
    let day = Utc::now().date_naive() + Duration::days(1);
    Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).expect("valid hour"))
}

pub fn event_json(id: &str, title: &str, start_hour: u32, end_hour: u32) -> Value {
    json!({
        "id": id,
        "status": "confirmed",
        "summary": title,
        "start": {"dateTime": tomorrow_at(start_hour)},
        "end": {"dateTime": tomorrow_at(end_hour)}
    })
}
