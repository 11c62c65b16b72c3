//! Consumer loop for the sync task queue.
//!
//! Tasks are handed to the [`SyncTaskHandler`] (the orchestrator) with a
//! bounded number in flight. A retryable failure is re-enqueued as the next
//! attempt after an exponential backoff until `max_attempts` is reached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tidemark_core::{SyncTaskHandler, TaskQueue};
use tidemark_domain::{SyncOutcome, SyncTask, TidemarkError};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

use super::queue::TaskReceiver;
use crate::scheduling::lifecycle::{join_stopped, SchedulerError, SchedulerResult};

const COMPONENT: &str = "sync worker";

#[derive(Debug, Clone)]
pub struct SyncTaskWorkerConfig {
    /// Upper bound for a single cycle
    pub processing_timeout: Duration,
    /// Total deliveries per task, first one included
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub max_concurrent_tasks: usize,
    pub join_timeout: Duration,
}

impl Default for SyncTaskWorkerConfig {
    fn default() -> Self {
        Self {
            processing_timeout: Duration::from_secs(300),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(5),
            max_concurrent_tasks: 4,
            join_timeout: Duration::from_secs(10),
        }
    }
}

/// Running totals, readable while the worker is active
#[derive(Debug, Default)]
pub struct WorkerStats {
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

impl WorkerStats {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
struct TaskContext {
    handler: Arc<dyn SyncTaskHandler>,
    queue: Arc<dyn TaskQueue>,
    config: SyncTaskWorkerConfig,
    stats: Arc<WorkerStats>,
    cancel: CancellationToken,
}

pub struct SyncTaskWorker {
    context: TaskContext,
    receiver: Option<TaskReceiver>,
    task_handle: Option<JoinHandle<TaskReceiver>>,
}

impl SyncTaskWorker {
    /// `queue` must feed `receiver`; retries are pushed back through it
    pub fn new(
        handler: Arc<dyn SyncTaskHandler>,
        queue: Arc<dyn TaskQueue>,
        receiver: TaskReceiver,
        config: SyncTaskWorkerConfig,
    ) -> Self {
        Self {
            context: TaskContext {
                handler,
                queue,
                config,
                stats: Arc::new(WorkerStats::default()),
                cancel: CancellationToken::new(),
            },
            receiver: Some(receiver),
            task_handle: None,
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.context.stats)
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    #[instrument(skip(self))]
    pub fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning { component: COMPONENT });
        }
        let receiver =
            self.receiver.take().ok_or(SchedulerError::AlreadyRunning { component: COMPONENT })?;

        self.context.cancel = CancellationToken::new();
        let context = self.context.clone();
        self.task_handle = Some(tokio::spawn(Self::consume(context, receiver)));

        info!(
            max_concurrent = self.context.config.max_concurrent_tasks,
            "sync_worker.started"
        );
        Ok(())
    }

    /// Stop taking tasks and wait for in-flight ones
    ///
    /// Cycles still running when the join timeout expires are aborted; their
    /// lock rows expire on their own.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let handle = self
            .task_handle
            .take()
            .ok_or(SchedulerError::NotRunning { component: COMPONENT })?;
        self.context.cancel.cancel();

        // The consume loop spends up to one join timeout draining, then aborts
        let join_timeout = self.context.config.join_timeout.saturating_mul(2);
        let receiver = join_stopped(COMPONENT, handle, join_timeout).await?;
        self.receiver = Some(receiver);

        info!("sync_worker.stopped");
        Ok(())
    }

    async fn consume(context: TaskContext, mut receiver: TaskReceiver) -> TaskReceiver {
        let permits = Arc::new(Semaphore::new(context.config.max_concurrent_tasks.max(1)));
        let mut in_flight = JoinSet::new();

        loop {
            let permit = tokio::select! {
                () = context.cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let task = tokio::select! {
                () = context.cancel.cancelled() => break,
                task = receiver.recv() => match task {
                    Some(task) => task,
                    None => {
                        debug!("task queue closed");
                        break;
                    }
                },
            };

            let span = tracing::info_span!(
                "sync_task",
                task_id = %task.task_id,
                user_id = %task.user_id,
                provider = %task.provider,
                attempt = task.attempt,
            );
            let context = context.clone();
            in_flight.spawn(
                async move {
                    let retry = Self::run_task(&context, &task).await;
                    drop(permit);
                    if let Some(retry) = retry {
                        Self::schedule_retry(&context, retry).await;
                    }
                }
                .instrument(span),
            );

            // Reap finished tasks so the set does not grow unbounded
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(err) = joined {
                    error!(error = %err, "sync task panicked");
                }
            }
        }

        let drain = async {
            while let Some(joined) = in_flight.join_next().await {
                if let Err(err) = joined {
                    error!(error = %err, "sync task panicked");
                }
            }
        };
        if tokio::time::timeout(context.config.join_timeout, drain).await.is_err() {
            warn!(aborted = in_flight.len(), "in-flight sync tasks aborted on shutdown");
            in_flight.shutdown().await;
        }
        receiver
    }

    /// Run one delivery; returns the follow-up task when it should be retried
    async fn run_task(context: &TaskContext, task: &SyncTask) -> Option<SyncTask> {
        let timeout = context.config.processing_timeout;
        let result = match tokio::time::timeout(timeout, context.handler.handle(task)).await {
            Ok(result) => result,
            Err(_) => Err(TidemarkError::Timeout(format!(
                "sync task exceeded {}s",
                timeout.as_secs()
            ))),
        };

        match result {
            Ok(SyncOutcome::Completed(report)) => {
                context.stats.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    items_stored = report.items_stored,
                    full_sync = report.full_sync,
                    "sync_worker.task_completed"
                );
                None
            }
            Ok(outcome) => {
                context.stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(?outcome, "sync_worker.task_skipped");
                None
            }
            Err(err) if err.is_retryable() && task.attempt < context.config.max_attempts => {
                warn!(error = %err, kind = err.label(), "sync_worker.task_retrying");
                Some(task.retry(Utc::now()))
            }
            Err(err) => {
                context.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %err, kind = err.label(), "sync_worker.task_failed");
                None
            }
        }
    }

    async fn schedule_retry(context: &TaskContext, task: SyncTask) {
        let delay = backoff_delay(context.config.retry_base_delay, task.attempt);
        tokio::select! {
            () = context.cancel.cancelled() => {
                warn!(task_id = %task.task_id, "worker stopping, retry dropped");
            }
            () = tokio::time::sleep(delay) => {
                match context.queue.enqueue(task).await {
                    Ok(()) => {
                        context.stats.retried.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        context.stats.failed.fetch_add(1, Ordering::Relaxed);
                        error!(error = %err, "retry could not be enqueued");
                    }
                }
            }
        }
    }
}

/// `base * 2^(attempt - 2)` for the given upcoming attempt, capped at 32x
fn backoff_delay(base: Duration, next_attempt: u32) -> Duration {
    let exponent = next_attempt.saturating_sub(2).min(5);
    base.saturating_mul(1 << exponent)
}
