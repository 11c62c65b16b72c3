//! Interval trigger for scheduled sync cycles.
//!
//! Every tick lists the connected connections and dispatches a `scheduled`
//! task for each one. The worker does the actual sync; this loop only
//! produces tasks, so a slow provider never delays the next tick.

use std::sync::Arc;
use std::time::Duration;

use tidemark_core::{ConnectionRepository, DispatchOutcome, SyncDispatcher};
use tidemark_domain::{Result, SyncTrigger};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::lifecycle::{join_stopped, SchedulerError, SchedulerResult};

const COMPONENT: &str = "sync scheduler";

#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    pub interval: Duration,
    /// Upper bound for one tick's listing and dispatching
    pub tick_timeout: Duration,
    pub join_timeout: Duration,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(900),
            tick_timeout: Duration::from_secs(60),
            join_timeout: Duration::from_secs(5),
        }
    }
}

pub struct SyncScheduler {
    connections: Arc<dyn ConnectionRepository>,
    dispatcher: Arc<SyncDispatcher>,
    config: SyncSchedulerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        dispatcher: Arc<SyncDispatcher>,
        config: SyncSchedulerConfig,
    ) -> Self {
        Self {
            connections,
            dispatcher,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// # Errors
    /// `SchedulerError::AlreadyRunning` if the loop is active.
    #[instrument(skip(self), fields(interval_secs = self.config.interval.as_secs()))]
    pub fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning { component: COMPONENT });
        }

        self.cancellation = CancellationToken::new();
        let connections = Arc::clone(&self.connections);
        let dispatcher = Arc::clone(&self.dispatcher);
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        self.task_handle = Some(tokio::spawn(async move {
            Self::tick_loop(&connections, &dispatcher, &config, &cancel).await;
        }));

        info!("scheduler.sync.started");
        Ok(())
    }

    /// # Errors
    /// `SchedulerError::NotRunning` if the loop was never started, or a
    /// `StopTimeout`/`Panicked` if it does not wind down cleanly.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let handle = self
            .task_handle
            .take()
            .ok_or(SchedulerError::NotRunning { component: COMPONENT })?;
        self.cancellation.cancel();

        join_stopped(COMPONENT, handle, self.config.join_timeout).await?;

        info!("scheduler.sync.stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Dispatch one scheduled task per connected connection
    ///
    /// Returns how many tasks were enqueued. A failure for one connection is
    /// logged and does not stop the others.
    pub async fn run_once(&self) -> Result<usize> {
        Self::dispatch_all(&self.connections, &self.dispatcher).await
    }

    async fn tick_loop(
        connections: &Arc<dyn ConnectionRepository>,
        dispatcher: &Arc<SyncDispatcher>,
        config: &SyncSchedulerConfig,
        cancel: &CancellationToken,
    ) {
        let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("sync scheduler loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    match tokio::time::timeout(
                        config.tick_timeout,
                        Self::dispatch_all(connections, dispatcher),
                    )
                    .await
                    {
                        Ok(Ok(enqueued)) => debug!(enqueued, "scheduler.sync.tick"),
                        Ok(Err(err)) => warn!(error = %err, "scheduler.sync.tick_failed"),
                        Err(_) => warn!(
                            timeout_secs = config.tick_timeout.as_secs(),
                            "scheduler.sync.tick_timeout"
                        ),
                    }
                }
            }
        }
    }

    async fn dispatch_all(
        connections: &Arc<dyn ConnectionRepository>,
        dispatcher: &Arc<SyncDispatcher>,
    ) -> Result<usize> {
        let connected = connections.list_connected().await?;
        let mut enqueued = 0;
        for connection in connected {
            match dispatcher
                .dispatch(&connection.user_id, connection.provider, SyncTrigger::Scheduled)
                .await
            {
                Ok(DispatchOutcome::Enqueued(_)) => enqueued += 1,
                Ok(DispatchOutcome::NotConnected) => {}
                Err(err) => warn!(
                    connection_id = %connection.connection_id,
                    error = %err,
                    "scheduled dispatch failed"
                ),
            }
        }
        Ok(enqueued)
    }
}
