//! Sync cycle state machine, tasks and outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::Provider;
use crate::errors::{Result, TidemarkError};
use crate::impl_domain_status_conversions;

/// Progress of one user's sync cycle
///
/// `idle -> fetching -> securing -> (analyzing) -> complete`, with `error`
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Fetching,
    Securing,
    Analyzing,
    Complete,
    Error,
}

impl_domain_status_conversions!(SyncState {
    Idle => "idle",
    Fetching => "fetching",
    Securing => "securing",
    Analyzing => "analyzing",
    Complete => "complete",
    Error => "error",
});

impl SyncState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use SyncState::{Analyzing, Complete, Error, Fetching, Idle, Securing};
        match (self, next) {
            (Idle, Fetching)
            | (Fetching, Securing)
            | (Securing, Analyzing)
            | (Securing, Complete)
            | (Analyzing, Complete) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Volatile per-user progress record read by polling callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub user_id: String,
    #[serde(rename = "status")]
    pub state: SyncState,
    pub current_provider: Option<Provider>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SyncStatus {
    /// Status written when a task is enqueued but not yet picked up
    pub fn queued(user_id: impl Into<String>, provider: Provider, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            state: SyncState::Idle,
            current_provider: Some(provider),
            error_message: None,
            updated_at: now,
        }
    }

    /// Fresh status for the start of an attempt; overwrites whatever the
    /// previous attempt left behind
    pub fn started(user_id: impl Into<String>, provider: Provider, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            state: SyncState::Fetching,
            current_provider: Some(provider),
            error_message: None,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn advance(&self, next: SyncState, now: DateTime<Utc>) -> Result<Self> {
        if !self.state.can_transition_to(next) {
            return Err(TidemarkError::Internal(format!(
                "invalid sync transition {} -> {}",
                self.state, next
            )));
        }
        Ok(Self { state: next, updated_at: now, ..self.clone() })
    }

    /// Terminal error status carrying the failure message
    pub fn failed(&self, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            state: SyncState::Error,
            error_message: Some(message.into()),
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// What caused a sync cycle to be requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Manual,
    ConnectEvent,
    Scheduled,
}

impl_domain_status_conversions!(SyncTrigger {
    Manual => "manual",
    ConnectEvent => "connect_event",
    Scheduled => "scheduled",
});

/// Payload carried by the at-least-once task queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub task_id: String,
    pub user_id: String,
    pub provider: Provider,
    pub trigger: SyncTrigger,
    /// 1-based delivery attempt
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl SyncTask {
    pub fn new(
        user_id: impl Into<String>,
        provider: Provider,
        trigger: SyncTrigger,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: uuid::Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            provider,
            trigger,
            attempt: 1,
            enqueued_at: now,
        }
    }

    /// Same task, next delivery attempt
    pub fn retry(&self, now: DateTime<Utc>) -> Self {
        Self { attempt: self.attempt + 1, enqueued_at: now, ..self.clone() }
    }
}

/// Counters reported by a completed cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub provider: Provider,
    pub items_fetched: usize,
    pub items_stored: usize,
    /// Events flagged as conflicting after analysis (calendar only)
    pub conflicting_events: usize,
    /// Whether the cycle ran a full-window fetch instead of a delta
    pub full_sync: bool,
    /// False when fail-open stored any unverified record
    pub dlp_verified: bool,
}

/// Result of asking the orchestrator to run one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// No connected account; a soft no-op
    NotConnected,
    /// Another cycle holds the connection's lock
    AlreadyRunning,
    Completed(SyncReport),
}

/// What a polling caller observed before giving up or seeing a terminal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Finished(SyncStatus),
    /// Poll timeout elapsed; the cycle continues in the background
    StillRunning(Option<SyncStatus>),
}

/// Outbound trigger for the briefing collaborator, emitted after `complete`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCompleted {
    pub user_id: String,
    pub provider: Provider,
    pub timestamp: DateTime<Utc>,
}
