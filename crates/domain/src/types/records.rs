//! Persisted calendar and mail records

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::items::ProviderItem;
use crate::impl_domain_status_conversions;

/// Event status as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

impl_domain_status_conversions!(EventStatus {
    Confirmed => "confirmed",
    Tentative => "tentative",
    Cancelled => "cancelled",
});

impl EventStatus {
    /// Lenient parse of a provider status string; unknown values are treated
    /// as confirmed
    pub fn from_provider(raw: Option<&str>) -> Self {
        raw.and_then(|value| value.parse().ok()).unwrap_or_default()
    }
}

/// Stored calendar event, unique on `(user_id, event_id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub user_id: String,
    pub event_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    pub location: Option<String>,
    pub attendees: Vec<String>,
    pub status: EventStatus,
    pub has_conflict: bool,
    pub conflict_with: BTreeSet<String>,
    /// False when the record was stored under the fail-open policy
    pub dlp_verified: bool,
}

impl CalendarEvent {
    /// Build a record from a (redacted) provider item
    ///
    /// Items without an end time become zero-length events. Conflict fields
    /// start empty; they are only ever written by the conflict flag update.
    pub fn from_item(user_id: &str, item: ProviderItem, dlp_verified: bool) -> Self {
        let end_time = item.end_time.unwrap_or(item.start_time);
        Self {
            user_id: user_id.to_string(),
            event_id: item.external_id,
            title: item.title,
            description: item.description,
            start_time: item.start_time,
            end_time,
            is_all_day: item.is_all_day,
            location: item.location,
            attendees: item.attendees,
            status: EventStatus::from_provider(item.provider_status.as_deref()),
            has_conflict: false,
            conflict_with: BTreeSet::new(),
            dlp_verified,
        }
    }

    /// Replace the conflict set, keeping `has_conflict` consistent with it
    pub fn set_conflicts(&mut self, conflicts: BTreeSet<String>) {
        self.has_conflict = !conflicts.is_empty();
        self.conflict_with = conflicts;
    }
}

/// Stored mail message, unique on `(user_id, message_id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub user_id: String,
    pub message_id: String,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub snippet: Option<String>,
    pub body: Option<String>,
    pub received_at: DateTime<Utc>,
    pub dlp_verified: bool,
}

impl MailMessage {
    pub fn from_item(user_id: &str, item: ProviderItem, dlp_verified: bool) -> Self {
        Self {
            user_id: user_id.to_string(),
            message_id: item.external_id,
            subject: item.title,
            sender: item.sender,
            snippet: item.snippet,
            body: item.description,
            received_at: item.start_time,
            dlp_verified,
        }
    }
}

/// User-supplied event to create at the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

impl EventDraft {
    /// Draft as a provider item, ready for the redaction gate
    pub fn to_item(&self) -> ProviderItem {
        ProviderItem {
            title: Some(self.title.clone()),
            description: self.description.clone(),
            end_time: Some(self.end_time),
            location: self.location.clone(),
            attendees: self.attendees.clone(),
            ..ProviderItem::new(String::new(), self.start_time)
        }
    }
}

/// Result of a single event creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CreateEventOutcome {
    Created { event: CalendarEvent },
    /// The provider accepted the event but the local write failed; do not
    /// retry blindly or the provider ends up with a duplicate
    PartialSuccess { external_id: String, error: String },
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn item() -> ProviderItem {
        let start = Utc.with_ymd_and_hms(2024, 3, 11, 9, 0, 0).unwrap();
        ProviderItem {
            title: Some("Standup".into()),
            end_time: Some(start + Duration::minutes(15)),
            provider_status: Some("tentative".into()),
            ..ProviderItem::new("evt-1", start)
        }
    }

    #[test]
    fn event_from_item_maps_status_and_leaves_conflicts_empty() {
        let event = CalendarEvent::from_item("u1", item(), true);
        assert_eq!(event.event_id, "evt-1");
        assert_eq!(event.status, EventStatus::Tentative);
        assert!(!event.has_conflict);
        assert!(event.conflict_with.is_empty());
    }

    #[test]
    fn missing_end_time_becomes_zero_length() {
        let mut raw = item();
        raw.end_time = None;
        let event = CalendarEvent::from_item("u1", raw, true);
        assert_eq!(event.start_time, event.end_time);
    }

    #[test]
    fn unknown_provider_status_defaults_to_confirmed() {
        assert_eq!(EventStatus::from_provider(Some("needsAction")), EventStatus::Confirmed);
        assert_eq!(EventStatus::from_provider(None), EventStatus::Confirmed);
        assert_eq!(EventStatus::from_provider(Some("CANCELLED")), EventStatus::Cancelled);
    }

    #[test]
    fn set_conflicts_keeps_flag_in_sync() {
        let mut event = CalendarEvent::from_item("u1", item(), true);
        event.set_conflicts(BTreeSet::from(["evt-2".to_string()]));
        assert!(event.has_conflict);
        event.set_conflicts(BTreeSet::new());
        assert!(!event.has_conflict);
    }
}
