//! Normalized provider payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Absolute fetch window; `time_max = None` means open-ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub time_min: DateTime<Utc>,
    pub time_max: Option<DateTime<Utc>>,
}

/// One calendar event or mail message in provider-neutral shape
///
/// Mail messages use `title` for the subject and `start_time` for the
/// received timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderItem {
    pub external_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_all_day: bool,
    pub location: Option<String>,
    pub attendees: Vec<String>,
    pub sender: Option<String>,
    pub snippet: Option<String>,
    pub provider_status: Option<String>,
}

impl ProviderItem {
    /// Bare item with only identity and start time set
    pub fn new(external_id: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            external_id: external_id.into(),
            title: None,
            description: None,
            start_time,
            end_time: None,
            is_all_day: false,
            location: None,
            attendees: Vec::new(),
            sender: None,
            snippet: None,
            provider_status: None,
        }
    }
}

/// Mail summary returned by a listing call; hydrated separately
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: Option<String>,
}

/// Visible calendar returned by the calendar-list call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRef {
    pub id: String,
    pub summary: Option<String>,
    pub primary: bool,
}

/// Result of a full or delta fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub items: Vec<ProviderItem>,
    /// Token to commit once the items are durable
    pub delta_token: Option<String>,
    /// True when a full-window query produced the items
    pub full_sync: bool,
    /// Set when the items came from a secondary calendar
    pub calendar_id: Option<String>,
}
