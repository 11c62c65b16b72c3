//! Port interfaces for sync operations

use std::time::Duration;

use async_trait::async_trait;
use tidemark_domain::{
    CalendarRef, Connection, MessageRef, Provider, ProviderItem, Result, SyncCheckpoint,
    SyncCompleted, SyncOutcome, SyncStatus, SyncTask, SyncWindow,
};

/// How a listing call selects items
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageQuery {
    /// Full query over a time window
    Window(SyncWindow),
    /// Changes since the given delta token
    Delta(String),
}

/// One page request against the provider proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: PageQuery,
    pub page_token: Option<String>,
    pub page_size: u32,
}

/// One page of provider results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPage<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
    /// Present on the last page of a listing
    pub next_sync_token: Option<String>,
}

impl<T> ProviderPage<T> {
    pub fn last(items: Vec<T>, next_sync_token: Option<String>) -> Self {
        Self { items, next_page_token: None, next_sync_token }
    }
}

/// Calendar and mail operations exposed by the provider proxy
///
/// A rejected delta token is reported as `TidemarkError::TokenExpired`;
/// every other transport or auth failure as `ProviderUnavailable`.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn list_events(
        &self,
        connection: &Connection,
        calendar_id: &str,
        request: &PageRequest,
    ) -> Result<ProviderPage<ProviderItem>>;

    async fn list_calendars(&self, connection: &Connection) -> Result<Vec<CalendarRef>>;

    async fn list_messages(
        &self,
        connection: &Connection,
        request: &PageRequest,
    ) -> Result<ProviderPage<MessageRef>>;

    /// Fetch the full message behind a listing summary
    async fn get_message(&self, connection: &Connection, message_id: &str)
        -> Result<ProviderItem>;

    /// Create an event on the primary calendar, returning the provider's copy
    async fn create_event(
        &self,
        connection: &Connection,
        item: &ProviderItem,
    ) -> Result<ProviderItem>;

    async fn delete_event(&self, connection: &Connection, event_id: &str) -> Result<()>;
}

/// Connection rows and the per-connection sync checkpoint
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn find_connected(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<Connection>>;

    async fn list_connected(&self) -> Result<Vec<Connection>>;

    /// Insert a connected row, marking any older connected row for the same
    /// (user, provider) as disconnected
    async fn register(&self, connection: &Connection) -> Result<()>;

    async fn mark_disconnected(&self, connection_id: &str) -> Result<()>;

    /// Commit `lastSyncAt` and the delta token after a cycle completes
    async fn commit_sync(&self, connection_id: &str, checkpoint: &SyncCheckpoint) -> Result<()>;
}

/// Last-write-wins store for the per-user progress record
#[async_trait]
pub trait SyncStatusRepository: Send + Sync {
    async fn save(&self, status: &SyncStatus) -> Result<()>;

    async fn get(&self, user_id: &str) -> Result<Option<SyncStatus>>;
}

/// Short-lived mutual exclusion rows keyed by connection
#[async_trait]
pub trait SyncLockRepository: Send + Sync {
    /// Take the lock unless another owner holds an unexpired one
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Release the lock if `owner` still holds it
    async fn release(&self, key: &str, owner: &str) -> Result<()>;
}

/// At-least-once task queue; `task.task_id` identifies redeliveries
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: SyncTask) -> Result<()>;
}

/// Consumer side of the task queue
#[async_trait]
pub trait SyncTaskHandler: Send + Sync {
    async fn handle(&self, task: &SyncTask) -> Result<SyncOutcome>;
}

/// Outbound notification for the briefing collaborator
#[async_trait]
pub trait BriefingNotifier: Send + Sync {
    async fn publish(&self, event: &SyncCompleted) -> Result<()>;
}
