//! Provider payloads as relayed by the proxy

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tidemark_domain::{CalendarRef, MessageRef, ProviderItem};
use tracing::warn;

/// Envelope sent to the proxy
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProxyRequest<'a> {
    pub connection_id: &'a str,
    pub method: &'static str,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Envelope returned by the proxy
#[derive(Debug, Deserialize)]
pub(crate) struct ProxyResponse<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventList {
    #[serde(default)]
    pub items: Vec<EventResource>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl EventTime {
    fn resolve(&self) -> Option<(DateTime<Utc>, bool)> {
        match (self.date_time, self.date) {
            (Some(at), _) => Some((at, false)),
            (None, Some(day)) => day.and_hms_opt(0, 0, 0).map(|at| (at.and_utc(), true)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct Attendee {
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct EventResource {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start: Option<EventTime>,
    #[serde(default)]
    pub end: Option<EventTime>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

impl EventResource {
    /// Normalize; `None` for live events without usable times
    ///
    /// Delta responses carry cancelled events as bare tombstones. Those keep
    /// their status with epoch times, which the store never lets overwrite
    /// the times it already has.
    pub fn into_item(self) -> Option<ProviderItem> {
        let cancelled = self.status.as_deref() == Some("cancelled");
        let start = self.start.as_ref().and_then(EventTime::resolve);
        let (start_time, is_all_day) = match start {
            Some(resolved) => resolved,
            None if cancelled => (DateTime::<Utc>::UNIX_EPOCH, false),
            None => {
                warn!(event_id = %self.id, "event without start time skipped");
                return None;
            }
        };
        let end_time = self.end.as_ref().and_then(EventTime::resolve).map(|(at, _)| at);

        Some(ProviderItem {
            title: self.summary,
            description: self.description,
            end_time,
            is_all_day,
            location: self.location,
            attendees: self
                .attendees
                .into_iter()
                .map(|a| a.email.trim().to_string())
                .filter(|email| !email.is_empty())
                .collect(),
            provider_status: self.status,
            ..ProviderItem::new(self.id, start_time)
        })
    }

    /// Insert payload for a new event
    pub fn for_insert(item: &ProviderItem) -> serde_json::Value {
        let time = |at: DateTime<Utc>| {
            if item.is_all_day {
                EventTime { date: Some(at.date_naive()), date_time: None }
            } else {
                EventTime { date_time: Some(at), date: None }
            }
        };
        serde_json::json!({
            "summary": item.title,
            "description": item.description,
            "location": item.location,
            "start": time(item.start_time),
            "end": time(item.end_time.unwrap_or(item.start_time)),
            "attendees": item.attendees.iter().map(|email| Attendee { email: email.clone() })
                .collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CalendarList {
    #[serde(default)]
    pub items: Vec<CalendarListEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CalendarListEntry {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

impl From<CalendarListEntry> for CalendarRef {
    fn from(entry: CalendarListEntry) -> Self {
        Self { id: entry.id, summary: entry.summary, primary: entry.primary }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageSummary {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl From<MessageSummary> for MessageRef {
    fn from(summary: MessageSummary) -> Self {
        Self { id: summary.id, thread_id: summary.thread_id }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageSummary>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Profile {
    pub history_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryList {
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
    pub next_page_token: Option<String>,
    pub history_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryRecord {
    #[serde(default)]
    pub messages_added: Vec<AddedMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddedMessage {
    pub message: MessageSummary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageResource {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<String>,
    /// Milliseconds since the epoch, as a decimal string
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagePayload {
    #[serde(default)]
    pub headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Header {
    pub name: String,
    pub value: String,
}

impl MessageResource {
    pub fn into_item(self) -> ProviderItem {
        let header = |wanted: &str| {
            self.payload.as_ref().and_then(|payload| {
                payload
                    .headers
                    .iter()
                    .find(|h| h.name.eq_ignore_ascii_case(wanted))
                    .map(|h| h.value.clone())
            })
        };
        let subject = header("Subject");
        let sender = header("From");
        let received_at = self
            .internal_date
            .as_deref()
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        ProviderItem {
            title: subject,
            sender,
            snippet: self.snippet,
            ..ProviderItem::new(self.id, received_at)
        }
    }
}
