//! Linked provider accounts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// External data source a connection points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Calendar,
    Mail,
}

impl_domain_status_conversions!(Provider {
    Calendar => "calendar",
    Mail => "mail",
});

/// Lifecycle of a connection row; rows are never hard-deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

impl_domain_status_conversions!(ConnectionStatus {
    Connected => "connected",
    Disconnected => "disconnected",
    Error => "error",
});

/// Free-form metadata map stored as JSON next to the connection
///
/// Only `delta_token` is interpreted by the pipeline; anything else the
/// auth layer writes is preserved on round-trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    #[serde(default, rename = "deltaToken", skip_serializing_if = "Option::is_none")]
    pub delta_token: Option<String>,
    /// Calendar the delta token belongs to when it is not the primary one
    #[serde(default, rename = "calendarId", skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One linked account for a (user, provider) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub connection_id: String,
    pub user_id: String,
    pub provider: Provider,
    pub status: ConnectionStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub metadata: ConnectionMetadata,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    /// New connected row with a fresh UUIDv7 id
    pub fn connected(user_id: impl Into<String>, provider: Provider, now: DateTime<Utc>) -> Self {
        Self {
            connection_id: uuid::Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            provider,
            status: ConnectionStatus::Connected,
            last_sync_at: None,
            metadata: ConnectionMetadata::default(),
            created_at: now,
        }
    }

    pub fn delta_token(&self) -> Option<&str> {
        self.metadata.delta_token.as_deref().filter(|token| !token.is_empty())
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Cross-cycle state committed once a cycle's data is durable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub synced_at: DateTime<Utc>,
    /// Replaces the stored delta token; `None` clears it
    pub delta_token: Option<String>,
    /// Calendar the token belongs to; `None` means the primary calendar
    pub calendar_id: Option<String>,
}
