//! Sync trigger dispatch
//!
//! Turns a manual, connect or scheduled trigger into a queued task, writing
//! an `idle` status first so pollers see the request immediately.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tidemark_domain::{Provider, Result, SyncState, SyncStatus, SyncTask, SyncTrigger};
use tracing::{debug, info, instrument};

use super::ports::{ConnectionRepository, SyncStatusRepository, TaskQueue};

/// Result of a dispatch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    NotConnected,
    Enqueued(SyncTask),
}

/// Producer side of the sync task queue
pub struct SyncDispatcher {
    queue: Arc<dyn TaskQueue>,
    statuses: Arc<dyn SyncStatusRepository>,
    connections: Arc<dyn ConnectionRepository>,
    /// A non-terminal status older than this is treated as abandoned
    stale_after: Duration,
}

impl SyncDispatcher {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        statuses: Arc<dyn SyncStatusRepository>,
        connections: Arc<dyn ConnectionRepository>,
        lock_ttl_secs: u64,
    ) -> Self {
        let stale_after = Duration::seconds(i64::try_from(lock_ttl_secs).unwrap_or(i64::MAX));
        Self { queue, statuses, connections, stale_after }
    }

    #[instrument(skip(self), fields(user_id = %user_id, provider = %provider, trigger = %trigger))]
    pub async fn dispatch(
        &self,
        user_id: &str,
        provider: Provider,
        trigger: SyncTrigger,
    ) -> Result<DispatchOutcome> {
        if self.connections.find_connected(user_id, provider).await?.is_none() {
            info!("sync.not_connected");
            return Ok(DispatchOutcome::NotConnected);
        }

        let now = Utc::now();
        // Keep an in-flight cycle's progress visible instead of resetting it
        let in_flight = self.statuses.get(user_id).await?.is_some_and(|status| {
            !status.is_terminal()
                && status.state != SyncState::Idle
                && now - status.updated_at < self.stale_after
        });
        if in_flight {
            debug!("cycle in flight, leaving status untouched");
        } else {
            self.statuses.save(&SyncStatus::queued(user_id, provider, now)).await?;
        }

        let task = SyncTask::new(user_id, provider, trigger, now);
        self.queue.enqueue(task.clone()).await?;
        info!(task_id = %task.task_id, "sync task enqueued");
        Ok(DispatchOutcome::Enqueued(task))
    }
}
