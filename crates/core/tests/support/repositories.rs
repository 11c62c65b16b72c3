//! In-memory repositories, queue and notifier

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tidemark_core::{
    BriefingNotifier, CalendarEventRepository, ConflictGraph, ConnectionRepository,
    MailMessageRepository, SyncLockRepository, SyncStatusRepository, TaskQueue,
};
use tidemark_domain::{
    CalendarEvent, Connection, ConnectionStatus, MailMessage, Provider, Result as DomainResult,
    SyncCheckpoint, SyncCompleted, SyncState, SyncStatus, SyncTask, SyncWindow, TidemarkError,
};

#[derive(Default)]
pub struct InMemoryConnections {
    rows: Mutex<Vec<Connection>>,
    commits: Mutex<Vec<(String, SyncCheckpoint)>>,
}

impl InMemoryConnections {
    pub fn insert(&self, connection: Connection) {
        self.rows.lock().unwrap().push(connection);
    }

    pub fn get(&self, connection_id: &str) -> Option<Connection> {
        self.rows.lock().unwrap().iter().find(|c| c.connection_id == connection_id).cloned()
    }

    pub fn set_delta_token(&self, connection_id: &str, token: &str) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|c| c.connection_id == connection_id) {
            row.metadata.delta_token = Some(token.to_string());
        }
    }

    pub fn commits(&self) -> Vec<(String, SyncCheckpoint)> {
        self.commits.lock().unwrap().clone()
    }

    pub fn all(&self) -> Vec<Connection> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnections {
    async fn find_connected(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> DomainResult<Option<Connection>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == user_id && c.provider == provider && c.is_connected())
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn list_connected(&self) -> DomainResult<Vec<Connection>> {
        Ok(self.rows.lock().unwrap().iter().filter(|c| c.is_connected()).cloned().collect())
    }

    async fn register(&self, connection: &Connection) -> DomainResult<()> {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut().filter(|row| {
            row.user_id == connection.user_id && row.provider == connection.provider
        }) {
            row.status = ConnectionStatus::Disconnected;
        }
        rows.push(connection.clone());
        Ok(())
    }

    async fn mark_disconnected(&self, connection_id: &str) -> DomainResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|c| c.connection_id == connection_id)
            .ok_or_else(|| TidemarkError::NotFound(connection_id.to_string()))?;
        row.status = ConnectionStatus::Disconnected;
        Ok(())
    }

    async fn commit_sync(
        &self,
        connection_id: &str,
        checkpoint: &SyncCheckpoint,
    ) -> DomainResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|c| c.connection_id == connection_id)
            .ok_or_else(|| TidemarkError::NotFound(connection_id.to_string()))?;
        row.last_sync_at = Some(checkpoint.synced_at);
        row.metadata.delta_token.clone_from(&checkpoint.delta_token);
        row.metadata.calendar_id.clone_from(&checkpoint.calendar_id);
        self.commits.lock().unwrap().push((connection_id.to_string(), checkpoint.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEvents {
    rows: Mutex<BTreeMap<(String, String), CalendarEvent>>,
    fail_upserts: Mutex<bool>,
    upsert_calls: Mutex<usize>,
}

impl InMemoryEvents {
    pub fn fail_upserts(&self) {
        *self.fail_upserts.lock().unwrap() = true;
    }

    pub fn all(&self) -> Vec<CalendarEvent> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, event_id: &str) -> Option<CalendarEvent> {
        self.rows.lock().unwrap().values().find(|e| e.event_id == event_id).cloned()
    }

    pub fn upsert_calls(&self) -> usize {
        *self.upsert_calls.lock().unwrap()
    }
}

#[async_trait]
impl CalendarEventRepository for InMemoryEvents {
    async fn upsert_events(&self, events: &[CalendarEvent]) -> DomainResult<usize> {
        *self.upsert_calls.lock().unwrap() += 1;
        if *self.fail_upserts.lock().unwrap() {
            return Err(TidemarkError::Database("disk I/O error".into()));
        }

        let mut rows = self.rows.lock().unwrap();
        for event in events {
            let key = (event.user_id.clone(), event.event_id.clone());
            let mut stored = event.clone();
            if let Some(existing) = rows.get(&key) {
                stored.has_conflict = existing.has_conflict;
                stored.conflict_with.clone_from(&existing.conflict_with);
            }
            rows.insert(key, stored);
        }
        Ok(events.len())
    }

    async fn events_in_window(
        &self,
        user_id: &str,
        window: &SyncWindow,
    ) -> DomainResult<Vec<CalendarEvent>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.user_id == user_id && in_window(e, window))
            .cloned()
            .collect())
    }

    async fn find_event(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> DomainResult<Option<CalendarEvent>> {
        Ok(self.rows.lock().unwrap().get(&(user_id.to_string(), event_id.to_string())).cloned())
    }

    async fn update_conflict_flags(
        &self,
        user_id: &str,
        window: &SyncWindow,
        graph: &ConflictGraph,
    ) -> DomainResult<usize> {
        let mut rows = self.rows.lock().unwrap();
        let mut reset = BTreeSet::new();
        for event in rows.values_mut().filter(|e| e.user_id == user_id && in_window(e, window)) {
            let conflicts = graph.get(&event.event_id).cloned().unwrap_or_else(BTreeSet::new);
            event.set_conflicts(conflicts);
            reset.insert(event.event_id.clone());
        }
        for event in rows.values_mut().filter(|e| e.user_id == user_id && !in_window(e, window)) {
            let kept: BTreeSet<String> = event.conflict_with.difference(&reset).cloned().collect();
            event.set_conflicts(kept);
        }
        Ok(reset.len())
    }

    async fn delete_event(&self, user_id: &str, event_id: &str) -> DomainResult<bool> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .remove(&(user_id.to_string(), event_id.to_string()))
            .is_some())
    }
}

fn in_window(event: &CalendarEvent, window: &SyncWindow) -> bool {
    let before_max = window.time_max.map_or(true, |max| event.start_time < max);
    before_max && event.end_time >= window.time_min
}

#[derive(Default)]
pub struct InMemoryMessages {
    rows: Mutex<BTreeMap<(String, String), MailMessage>>,
}

impl InMemoryMessages {
    pub fn all(&self) -> Vec<MailMessage> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl MailMessageRepository for InMemoryMessages {
    async fn upsert_messages(&self, messages: &[MailMessage]) -> DomainResult<usize> {
        let mut rows = self.rows.lock().unwrap();
        for message in messages {
            rows.insert((message.user_id.clone(), message.message_id.clone()), message.clone());
        }
        Ok(messages.len())
    }

    async fn find_message(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> DomainResult<Option<MailMessage>> {
        Ok(self.rows.lock().unwrap().get(&(user_id.to_string(), message_id.to_string())).cloned())
    }
}

/// Last-write-wins statuses plus the full write history
#[derive(Default)]
pub struct InMemoryStatuses {
    current: Mutex<HashMap<String, SyncStatus>>,
    history: Mutex<Vec<SyncStatus>>,
}

impl InMemoryStatuses {
    pub fn put(&self, status: SyncStatus) {
        self.current.lock().unwrap().insert(status.user_id.clone(), status);
    }

    pub fn states(&self) -> Vec<SyncState> {
        self.history.lock().unwrap().iter().map(|s| s.state).collect()
    }

    pub fn latest(&self, user_id: &str) -> Option<SyncStatus> {
        self.current.lock().unwrap().get(user_id).cloned()
    }
}

#[async_trait]
impl SyncStatusRepository for InMemoryStatuses {
    async fn save(&self, status: &SyncStatus) -> DomainResult<()> {
        self.history.lock().unwrap().push(status.clone());
        self.put(status.clone());
        Ok(())
    }

    async fn get(&self, user_id: &str) -> DomainResult<Option<SyncStatus>> {
        Ok(self.latest(user_id))
    }
}

/// Lock table ignoring expiry; `hold` simulates another worker
#[derive(Default)]
pub struct InMemoryLocks {
    held: Mutex<HashMap<String, String>>,
    released: Mutex<Vec<String>>,
}

impl InMemoryLocks {
    pub fn hold(&self, key: &str, owner: &str) {
        self.held.lock().unwrap().insert(key.to_string(), owner.to_string());
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.lock().unwrap().contains_key(key)
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncLockRepository for InMemoryLocks {
    async fn try_acquire(&self, key: &str, owner: &str, _ttl: Duration) -> DomainResult<bool> {
        let mut held = self.held.lock().unwrap();
        if held.contains_key(key) {
            return Ok(false);
        }
        held.insert(key.to_string(), owner.to_string());
        Ok(true)
    }

    async fn release(&self, key: &str, owner: &str) -> DomainResult<()> {
        let mut held = self.held.lock().unwrap();
        if held.get(key).is_some_and(|current| current == owner) {
            held.remove(key);
            self.released.lock().unwrap().push(key.to_string());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    tasks: Mutex<Vec<SyncTask>>,
}

impl RecordingQueue {
    pub fn tasks(&self) -> Vec<SyncTask> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn enqueue(&self, task: SyncTask) -> DomainResult<()> {
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<SyncCompleted>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }

    pub fn published(&self) -> Vec<SyncCompleted> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl BriefingNotifier for RecordingNotifier {
    async fn publish(&self, event: &SyncCompleted) -> DomainResult<()> {
        if *self.failing.lock().unwrap() {
            return Err(TidemarkError::Database("outbox table locked".into()));
        }
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }
}
