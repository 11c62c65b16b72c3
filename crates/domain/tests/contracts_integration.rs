//! Wire and config contracts shared with collaborators outside this service.

use chrono::{TimeZone, Utc};
use serde_json::json;
use tidemark_domain::{
    AppConfig, ConnectionMetadata, FailurePolicy, Provider, SyncCompleted, SyncOutcome,
    SyncReport, SyncState, SyncStatus,
};

#[test]
fn briefing_trigger_uses_camel_case() {
    let event = SyncCompleted {
        user_id: "u1".into(),
        provider: Provider::Calendar,
        timestamp: Utc.with_ymd_and_hms(2024, 3, 11, 9, 0, 0).unwrap(),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["userId"], "u1");
    assert_eq!(value["provider"], "calendar");
    assert_eq!(value["timestamp"], "2024-03-11T09:00:00Z");
}

#[test]
fn status_exposes_state_as_status_field() {
    let status = SyncStatus::started("u1", Provider::Mail, Utc::now());
    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["status"], "fetching");
    assert_eq!(value["current_provider"], "mail");

    let parsed: SyncStatus = serde_json::from_value(value).unwrap();
    assert_eq!(parsed.state, SyncState::Fetching);
}

#[test]
fn metadata_keeps_fields_written_by_the_auth_layer() {
    let raw = json!({
        "deltaToken": "abc",
        "scope": "calendar.readonly",
        "account": {"email": "u1@example.com"}
    });
    let metadata: ConnectionMetadata = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(metadata.delta_token.as_deref(), Some("abc"));
    assert_eq!(metadata.calendar_id, None);
    assert_eq!(metadata.extra.len(), 2);

    assert_eq!(serde_json::to_value(&metadata).unwrap(), raw);
}

#[test]
fn sync_outcome_is_tagged() {
    let outcome = SyncOutcome::Completed(SyncReport {
        provider: Provider::Calendar,
        items_fetched: 3,
        items_stored: 3,
        conflicting_events: 2,
        full_sync: true,
        dlp_verified: true,
    });
    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["outcome"], "completed");
    assert_eq!(value["conflicting_events"], 2);

    let value = serde_json::to_value(SyncOutcome::NotConnected).unwrap();
    assert_eq!(value, json!({"outcome": "not_connected"}));
}

#[test]
fn partial_config_fills_defaults() {
    let config: AppConfig = serde_json::from_value(json!({
        "database": {"path": "/var/lib/tidemark/tidemark.db"},
        "dlp": {"bulk_sync_policy": "fail_closed"},
        "sync": {"page_size": 100}
    }))
    .unwrap();

    assert_eq!(config.database.path, "/var/lib/tidemark/tidemark.db");
    assert_eq!(config.database.pool_size, 8);
    assert_eq!(config.dlp.bulk_sync_policy, FailurePolicy::FailClosed);
    assert_eq!(config.dlp.single_create_policy, FailurePolicy::FailClosed);
    assert_eq!(config.sync.page_size, 100);
    assert_eq!(config.sync.lock_ttl_secs, 600);
    assert_eq!(config.proxy.max_attempts, 3);
    assert!(!config.logging.json);
}

#[test]
fn dlp_debug_output_hides_keys() {
    let config: AppConfig = serde_json::from_value(json!({
        "dlp": {"scanner_key": "super-secret-scanner", "vault_key": "super-secret-vault"}
    }))
    .unwrap();
    let rendered = format!("{:?}", config.dlp);
    assert!(!rendered.contains("super-secret"));
}
