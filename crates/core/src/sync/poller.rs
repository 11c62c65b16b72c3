//! Bounded wait on a user's sync status
//!
//! Polling callers get a terminal status or, once the timeout elapses,
//! "still running". The timeout only abandons the wait; the cycle itself
//! keeps going and updates the status for the next poll.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tidemark_domain::{PollOutcome, Provider, Result, SyncStatus, TidemarkError};
use tracing::{debug, instrument};

use super::ports::SyncStatusRepository;

/// Fixed-interval poller over [`SyncStatusRepository`]
pub struct SyncStatusPoller {
    statuses: Arc<dyn SyncStatusRepository>,
    interval: Duration,
    timeout: Duration,
}

impl SyncStatusPoller {
    pub fn new(
        statuses: Arc<dyn SyncStatusRepository>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self { statuses, interval, timeout }
    }

    /// Wait for a terminal `provider` status written at or after `since`
    ///
    /// The status row is per user, so terminal statuses older than `since` or
    /// written by another provider's cycle are ignored.
    #[instrument(skip(self))]
    pub async fn wait_for_terminal(
        &self,
        user_id: &str,
        provider: Provider,
        since: DateTime<Utc>,
    ) -> Result<PollOutcome> {
        let mut last_seen: Option<SyncStatus> = None;

        let waited = tokio::time::timeout(self.timeout, async {
            loop {
                let current = self.statuses.get(user_id).await?;
                if let Some(status) = &current {
                    if status.is_terminal()
                        && status.updated_at >= since
                        && status.current_provider == Some(provider)
                    {
                        return Ok::<SyncStatus, TidemarkError>(status.clone());
                    }
                }
                last_seen = current;
                tokio::time::sleep(self.interval).await;
            }
        })
        .await;

        match waited {
            Ok(Ok(status)) => Ok(PollOutcome::Finished(status)),
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => {
                debug!(
                    timeout_secs = self.timeout.as_secs(),
                    "poll timed out, cycle still running"
                );
                Ok(PollOutcome::StillRunning(last_seen))
            }
        }
    }
}
