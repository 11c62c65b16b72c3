//! Port interfaces for calendar event storage

use async_trait::async_trait;
use tidemark_domain::{CalendarEvent, Result, SyncWindow};

use super::conflict::ConflictGraph;

/// Calendar event persistence, keyed by `(user_id, event_id)`
#[async_trait]
pub trait CalendarEventRepository: Send + Sync {
    /// Idempotent insert-or-update; never touches the conflict fields of an
    /// existing row
    async fn upsert_events(&self, events: &[CalendarEvent]) -> Result<usize>;

    /// Events overlapping `window`, cancelled ones included
    async fn events_in_window(
        &self,
        user_id: &str,
        window: &SyncWindow,
    ) -> Result<Vec<CalendarEvent>>;

    async fn find_event(&self, user_id: &str, event_id: &str) -> Result<Option<CalendarEvent>>;

    /// Replace conflict flags for every event in `window`
    ///
    /// Events missing from `graph` are reset to no conflicts, so stale
    /// values never survive a recomputation.
    async fn update_conflict_flags(
        &self,
        user_id: &str,
        window: &SyncWindow,
        graph: &ConflictGraph,
    ) -> Result<usize>;

    /// Returns whether a row was removed
    async fn delete_event(&self, user_id: &str, event_id: &str) -> Result<bool>;
}
