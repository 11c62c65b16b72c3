#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use tidemark_domain::{CalendarEvent, Connection, Provider, ProviderItem};
use tidemark_infra::database::DbManager;

const TEST_DB_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// Migrated SQLCipher database in a temp dir that lives as long as the value
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("tidemark-test.db");

        let manager =
            DbManager::new(&db_path, 4, Some(TEST_DB_KEY)).expect("db manager should be created");
        manager.run_migrations().expect("schema migrations should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    pub fn count(&self, table: &str) -> i64 {
        let conn = self.manager.get_connection().expect("connection should be available");
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), &[], |row| row.get(0))
            .expect("count query should succeed")
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Tomorrow at `hour:00` UTC
pub fn tomorrow_at(hour: u32) -> DateTime<Utc> {
    let day = Utc::now().date_naive() + Duration::days(1);
    Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).expect("valid hour"))
}

pub fn event(user_id: &str, event_id: &str, start_hour: u32, end_hour: u32) -> CalendarEvent {
    let item = ProviderItem {
        title: Some(format!("Meeting {event_id}")),
        end_time: Some(tomorrow_at(end_hour)),
        attendees: vec!["a@example.com".into()],
        provider_status: Some("confirmed".into()),
        ..ProviderItem::new(event_id.to_string(), tomorrow_at(start_hour))
    };
    CalendarEvent::from_item(user_id, item, true)
}

pub fn connection(user_id: &str, provider: Provider) -> Connection {
    Connection::connected(user_id, provider, Utc::now())
}
