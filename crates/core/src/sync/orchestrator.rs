//! Sync orchestrator
//!
//! Drives one (user, provider) cycle through the status state machine:
//! `fetching -> securing -> (analyzing) -> complete`, or `error`. The
//! connection's checkpoint is committed only after every earlier stage has
//! succeeded, and the briefing notification goes out only after `complete`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tidemark_domain::constants::sync_lock_key;
use tidemark_domain::{
    CalendarEvent, Connection, FailurePolicy, MailMessage, Provider, ProviderItem, Redacted,
    Result, SyncCheckpoint, SyncCompleted, SyncOutcome, SyncReport, SyncSettings, SyncState,
    SyncStatus, SyncTask, TidemarkError,
};
use tracing::{error, info, instrument, warn};

use super::fetcher::ProviderFetcher;
use super::ports::{
    BriefingNotifier, ConnectionRepository, SyncLockRepository, SyncStatusRepository,
    SyncTaskHandler,
};
use crate::calendar::conflict::ConflictAnalyzer;
use crate::calendar::ports::CalendarEventRepository;
use crate::dlp::gate::RedactionGate;
use crate::mail_ports::MailMessageRepository;

/// Collaborators of the orchestrator, wired by the composition root
pub struct SyncDependencies {
    pub fetcher: Arc<ProviderFetcher>,
    pub gate: Arc<RedactionGate>,
    pub analyzer: Arc<ConflictAnalyzer>,
    pub connections: Arc<dyn ConnectionRepository>,
    pub events: Arc<dyn CalendarEventRepository>,
    pub messages: Arc<dyn MailMessageRepository>,
    pub statuses: Arc<dyn SyncStatusRepository>,
    pub locks: Arc<dyn SyncLockRepository>,
    pub notifier: Arc<dyn BriefingNotifier>,
}

/// Runs sync cycles; one instance may serve many connections concurrently
pub struct SyncOrchestrator {
    deps: SyncDependencies,
    settings: SyncSettings,
    policy: FailurePolicy,
}

impl SyncOrchestrator {
    /// `policy` is the redaction gate's policy for bulk sync
    pub fn new(deps: SyncDependencies, settings: SyncSettings, policy: FailurePolicy) -> Self {
        Self { deps, settings, policy }
    }

    /// Run one cycle for `user_id`'s `provider` connection
    ///
    /// A missing connection is the soft [`SyncOutcome::NotConnected`]; a held
    /// lock is [`SyncOutcome::AlreadyRunning`], including a lock held by
    /// another cycle of this same instance. Any other failure is written to
    /// the user's status and returned.
    #[instrument(skip(self), fields(user_id = %user_id, provider = %provider))]
    pub async fn run(&self, user_id: &str, provider: Provider) -> Result<SyncOutcome> {
        let Some(connection) = self.deps.connections.find_connected(user_id, provider).await?
        else {
            info!("sync.not_connected");
            return Ok(SyncOutcome::NotConnected);
        };

        let lock_key = sync_lock_key(&connection.connection_id);
        let owner = uuid::Uuid::now_v7().to_string();
        let ttl = Duration::from_secs(self.settings.lock_ttl_secs);
        if !self.deps.locks.try_acquire(&lock_key, &owner, ttl).await? {
            info!(connection_id = %connection.connection_id, "sync_lock.busy");
            return Ok(SyncOutcome::AlreadyRunning);
        }
        info!(connection_id = %connection.connection_id, "sync_lock.acquired");

        let result = self.run_locked(&connection).await;

        if let Err(err) = self.deps.locks.release(&lock_key, &owner).await {
            warn!(error = %err, "sync_lock.release_failed");
        }
        result
    }

    async fn run_locked(&self, connection: &Connection) -> Result<SyncOutcome> {
        let mut status =
            SyncStatus::started(&connection.user_id, connection.provider, Utc::now());
        self.deps.statuses.save(&status).await?;

        let limit = Duration::from_secs(self.settings.cycle_timeout_secs.max(1));
        let result = tokio::time::timeout(limit, self.execute(connection, &mut status))
            .await
            .unwrap_or_else(|_| {
                Err(TidemarkError::Timeout(format!("sync cycle exceeded {}s", limit.as_secs())))
            });

        match result {
            Ok(report) => {
                info!(
                    items_fetched = report.items_fetched,
                    items_stored = report.items_stored,
                    conflicting_events = report.conflicting_events,
                    full_sync = report.full_sync,
                    dlp_verified = report.dlp_verified,
                    "sync.complete"
                );
                self.notify(connection).await;
                Ok(SyncOutcome::Completed(report))
            }
            Err(err) => {
                error!(
                    error = %err,
                    error_kind = err.label(),
                    state = %status.state,
                    "sync.error"
                );
                let failed = status.failed(err.to_string(), Utc::now());
                if let Err(save_err) = self.deps.statuses.save(&failed).await {
                    error!(error = %save_err, "failed to record sync error status");
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        connection: &Connection,
        status: &mut SyncStatus,
    ) -> Result<SyncReport> {
        let fetched = self.deps.fetcher.fetch(connection).await?;
        self.transition(status, SyncState::Securing).await?;

        // Degradations the cycle tolerated, surfaced on the complete status
        let mut notes = Vec::new();
        if fetched.full_sync && connection.delta_token().is_some() {
            notes.push(
                "token_expired: stored delta token rejected, refetched fallback window".to_string(),
            );
        }

        let mut report = SyncReport {
            provider: connection.provider,
            items_fetched: fetched.items.len(),
            items_stored: 0,
            conflicting_events: 0,
            full_sync: fetched.full_sync,
            dlp_verified: true,
        };

        if !fetched.items.is_empty() {
            let screened =
                self.deps.gate.screen(&connection.user_id, fetched.items, self.policy).await?;
            if let Some(err) = &screened.bypassed {
                notes.push(format!(
                    "{}: {} records stored unverified ({err})",
                    err.label(),
                    screened.items.len()
                ));
            }
            report.dlp_verified = screened.bypassed.is_none();
            report.items_stored = self.persist(connection, screened.items).await?;

            if connection.provider == Provider::Calendar {
                self.transition(status, SyncState::Analyzing).await?;
                report.conflicting_events = self
                    .deps
                    .analyzer
                    .analyze(&connection.user_id)
                    .await
                    .map_err(as_persistence_failure)?;
            }
        }

        let checkpoint = SyncCheckpoint {
            synced_at: Utc::now(),
            delta_token: fetched.delta_token,
            calendar_id: fetched.calendar_id,
        };
        self.deps
            .connections
            .commit_sync(&connection.connection_id, &checkpoint)
            .await
            .map_err(as_persistence_failure)?;
        if !notes.is_empty() {
            status.error_message = Some(notes.join("; "));
        }
        self.transition(status, SyncState::Complete).await?;

        Ok(report)
    }

    async fn persist(
        &self,
        connection: &Connection,
        redacted: Vec<Redacted<ProviderItem>>,
    ) -> Result<usize> {
        let user_id = connection.user_id.as_str();
        let stored = match connection.provider {
            Provider::Calendar => {
                let events: Vec<CalendarEvent> = redacted
                    .into_iter()
                    .map(|entry| CalendarEvent::from_item(user_id, entry.item, entry.dlp_verified))
                    .collect();
                self.deps.events.upsert_events(&events).await
            }
            Provider::Mail => {
                let messages: Vec<MailMessage> = redacted
                    .into_iter()
                    .map(|entry| MailMessage::from_item(user_id, entry.item, entry.dlp_verified))
                    .collect();
                self.deps.messages.upsert_messages(&messages).await
            }
        };
        stored.map_err(as_persistence_failure)
    }

    async fn transition(&self, status: &mut SyncStatus, next: SyncState) -> Result<()> {
        *status = status.advance(next, Utc::now())?;
        self.deps.statuses.save(status).await
    }

    /// Publish the completion trigger; failures never undo `complete`
    async fn notify(&self, connection: &Connection) {
        let event = SyncCompleted {
            user_id: connection.user_id.clone(),
            provider: connection.provider,
            timestamp: Utc::now(),
        };
        if let Err(err) = self.deps.notifier.publish(&event).await {
            warn!(error = %err, "briefing notification failed");
        }
    }
}

#[async_trait]
impl SyncTaskHandler for SyncOrchestrator {
    async fn handle(&self, task: &SyncTask) -> Result<SyncOutcome> {
        info!(
            task_id = %task.task_id,
            trigger = %task.trigger,
            attempt = task.attempt,
            "sync task received"
        );
        self.run(&task.user_id, task.provider).await
    }
}

fn as_persistence_failure(err: TidemarkError) -> TidemarkError {
    match err {
        TidemarkError::Persistence(_) => err,
        other => TidemarkError::Persistence(other.to_string()),
    }
}
