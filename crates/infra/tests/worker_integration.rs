//! Task worker retry/shutdown behavior and the interval scheduler.

mod support;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use support::{connection, TestDatabase};
use tidemark_core::{
    ConnectionRepository, SyncDispatcher, SyncStatusRepository, SyncTaskHandler, TaskQueue,
};
use tidemark_domain::{
    Provider, Result, SyncOutcome, SyncReport, SyncState, SyncTask, SyncTrigger, TidemarkError,
};
use tidemark_infra::sync::WorkerStats;
use tidemark_infra::{
    ChannelTaskQueue, SchedulerError, SqlCipherConnectionRepository,
    SqlCipherSyncStatusRepository, SyncScheduler, SyncSchedulerConfig, SyncTaskWorker,
    SyncTaskWorkerConfig,
};

/// Fails with `error` for the first `failures` deliveries, then completes
struct FlakyHandler {
    failures: u32,
    error: fn() -> TidemarkError,
    calls: AtomicU32,
    attempts_seen: std::sync::Mutex<Vec<u32>>,
}

impl FlakyHandler {
    fn new(failures: u32, error: fn() -> TidemarkError) -> Arc<Self> {
        Arc::new(Self {
            failures,
            error,
            calls: AtomicU32::new(0),
            attempts_seen: std::sync::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SyncTaskHandler for FlakyHandler {
    async fn handle(&self, task: &SyncTask) -> Result<SyncOutcome> {
        self.attempts_seen.lock().unwrap().push(task.attempt);
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err((self.error)());
        }
        Ok(SyncOutcome::Completed(SyncReport {
            provider: task.provider,
            items_fetched: 1,
            items_stored: 1,
            conflicting_events: 0,
            full_sync: true,
            dlp_verified: true,
        }))
    }
}

/// Never finishes on its own
struct HangingHandler;

#[async_trait]
impl SyncTaskHandler for HangingHandler {
    async fn handle(&self, _task: &SyncTask) -> Result<SyncOutcome> {
        std::future::pending().await
    }
}

fn fast_config() -> SyncTaskWorkerConfig {
    SyncTaskWorkerConfig {
        processing_timeout: Duration::from_secs(5),
        max_attempts: 3,
        retry_base_delay: Duration::from_millis(10),
        max_concurrent_tasks: 2,
        join_timeout: Duration::from_millis(200),
    }
}

fn worker_with(
    handler: Arc<dyn SyncTaskHandler>,
    config: SyncTaskWorkerConfig,
) -> (SyncTaskWorker, Arc<ChannelTaskQueue>) {
    let (queue, receiver) = ChannelTaskQueue::channel();
    let queue = Arc::new(queue);
    let worker = SyncTaskWorker::new(handler, queue.clone(), receiver, config);
    (worker, queue)
}

async fn wait_for(stats: &WorkerStats, done: impl Fn(&WorkerStats) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(stats) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("worker should reach the expected state");
}

fn task(user_id: &str) -> SyncTask {
    SyncTask::new(user_id, Provider::Calendar, SyncTrigger::Manual, Utc::now())
}

#[tokio::test]
async fn retryable_failure_is_redelivered_with_next_attempt() {
    let handler = FlakyHandler::new(2, || TidemarkError::ProviderUnavailable("503".into()));
    let (mut worker, queue) = worker_with(handler.clone(), fast_config());
    worker.start().unwrap();

    queue.enqueue(task("u1")).await.unwrap();
    let stats = worker.stats();
    wait_for(&stats, |s| s.completed() == 1).await;

    assert_eq!(stats.retried(), 2);
    assert_eq!(stats.failed(), 0);
    assert_eq!(*handler.attempts_seen.lock().unwrap(), vec![1, 2, 3]);

    worker.stop().await.unwrap();
}

#[tokio::test]
async fn retries_stop_at_max_attempts() {
    let handler = FlakyHandler::new(10, || TidemarkError::Timeout("slow".into()));
    let (mut worker, queue) = worker_with(handler.clone(), fast_config());
    worker.start().unwrap();

    queue.enqueue(task("u1")).await.unwrap();
    let stats = worker.stats();
    wait_for(&stats, |s| s.failed() == 1).await;

    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    assert_eq!(stats.completed(), 0);
    worker.stop().await.unwrap();
}

#[tokio::test]
async fn non_retryable_failure_fails_immediately() {
    let handler = FlakyHandler::new(1, || TidemarkError::DlpConfigMissing("no key".into()));
    let (mut worker, queue) = worker_with(handler.clone(), fast_config());
    worker.start().unwrap();

    queue.enqueue(task("u1")).await.unwrap();
    let stats = worker.stats();
    wait_for(&stats, |s| s.failed() == 1).await;

    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(stats.retried(), 0);
    worker.stop().await.unwrap();
}

#[tokio::test]
async fn skipped_outcomes_count_as_completed() {
    struct Skipping;

    #[async_trait]
    impl SyncTaskHandler for Skipping {
        async fn handle(&self, _task: &SyncTask) -> Result<SyncOutcome> {
            Ok(SyncOutcome::AlreadyRunning)
        }
    }

    let (mut worker, queue) = worker_with(Arc::new(Skipping), fast_config());
    worker.start().unwrap();
    queue.enqueue(task("u1")).await.unwrap();
    queue.enqueue(task("u2")).await.unwrap();

    let stats = worker.stats();
    wait_for(&stats, |s| s.completed() == 2).await;
    worker.stop().await.unwrap();
}

#[tokio::test]
async fn processing_timeout_counts_as_retryable() {
    let config = SyncTaskWorkerConfig {
        processing_timeout: Duration::from_millis(20),
        max_attempts: 2,
        ..fast_config()
    };
    let (mut worker, queue) = worker_with(Arc::new(HangingHandler), config);
    worker.start().unwrap();

    queue.enqueue(task("u1")).await.unwrap();
    let stats = worker.stats();
    wait_for(&stats, |s| s.failed() == 1).await;
    assert_eq!(stats.retried(), 1);
    worker.stop().await.unwrap();
}

#[tokio::test]
async fn worker_can_restart_after_stop() {
    let handler = FlakyHandler::new(0, || TidemarkError::Internal("unused".into()));
    let (mut worker, queue) = worker_with(handler.clone(), fast_config());

    worker.start().unwrap();
    assert!(matches!(worker.start(), Err(SchedulerError::AlreadyRunning { .. })));
    worker.stop().await.unwrap();
    assert!(!worker.is_running());
    assert!(matches!(worker.stop().await, Err(SchedulerError::NotRunning { .. })));

    // Tasks queued while stopped are picked up after restart
    queue.enqueue(task("u1")).await.unwrap();
    worker.start().unwrap();
    let stats = worker.stats();
    wait_for(&stats, |s| s.completed() == 1).await;
    worker.stop().await.unwrap();
}

#[tokio::test]
async fn stop_aborts_hanging_tasks_after_join_timeout() {
    let config = SyncTaskWorkerConfig { processing_timeout: Duration::from_secs(60), ..fast_config() };
    let (mut worker, queue) = worker_with(Arc::new(HangingHandler), config);
    worker.start().unwrap();
    queue.enqueue(task("u1")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), worker.stop())
        .await
        .expect("stop should not hang")
        .unwrap();
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct SchedulerFixture {
    _db: TestDatabase,
    connections: Arc<SqlCipherConnectionRepository>,
    statuses: Arc<SqlCipherSyncStatusRepository>,
    dispatcher: Arc<SyncDispatcher>,
    receiver: tidemark_infra::TaskReceiver,
}

fn scheduler_fixture() -> SchedulerFixture {
    let db = TestDatabase::new();
    let connections = Arc::new(SqlCipherConnectionRepository::new(db.manager.clone()));
    let statuses = Arc::new(SqlCipherSyncStatusRepository::new(db.manager.clone()));
    let (queue, receiver) = ChannelTaskQueue::channel();
    let dispatcher = Arc::new(SyncDispatcher::new(
        Arc::new(queue),
        statuses.clone(),
        connections.clone(),
        900,
    ));
    SchedulerFixture { _db: db, connections, statuses, dispatcher, receiver }
}

#[tokio::test]
async fn run_once_dispatches_every_connected_connection() {
    let mut fixture = scheduler_fixture();
    fixture.connections.register(&connection("u1", Provider::Calendar)).await.unwrap();
    fixture.connections.register(&connection("u2", Provider::Mail)).await.unwrap();
    let dropped = connection("u3", Provider::Calendar);
    fixture.connections.register(&dropped).await.unwrap();
    fixture.connections.mark_disconnected(&dropped.connection_id).await.unwrap();

    let scheduler = SyncScheduler::new(
        fixture.connections.clone(),
        fixture.dispatcher.clone(),
        SyncSchedulerConfig::default(),
    );
    assert_eq!(scheduler.run_once().await.unwrap(), 2);

    let mut users = Vec::new();
    for _ in 0..2 {
        let queued = fixture.receiver.recv().await.unwrap();
        assert_eq!(queued.trigger, SyncTrigger::Scheduled);
        users.push(queued.user_id);
    }
    users.sort();
    assert_eq!(users, vec!["u1".to_string(), "u2".to_string()]);

    let status = fixture.statuses.get("u1").await.unwrap().unwrap();
    assert_eq!(status.state, SyncState::Idle);
    assert!(fixture.statuses.get("u3").await.unwrap().is_none());
}

#[tokio::test]
async fn scheduler_loop_ticks_until_stopped() {
    let mut fixture = scheduler_fixture();
    fixture.connections.register(&connection("u1", Provider::Calendar)).await.unwrap();

    let mut scheduler = SyncScheduler::new(
        fixture.connections.clone(),
        fixture.dispatcher.clone(),
        SyncSchedulerConfig {
            interval: Duration::from_millis(30),
            tick_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(2),
        },
    );
    scheduler.start().unwrap();
    assert!(scheduler.is_running());
    assert!(matches!(scheduler.start(), Err(SchedulerError::AlreadyRunning { .. })));

    let queued = tokio::time::timeout(Duration::from_secs(5), fixture.receiver.recv())
        .await
        .expect("a scheduled task should arrive")
        .unwrap();
    assert_eq!(queued.user_id, "u1");

    scheduler.stop().await.unwrap();
    assert!(!scheduler.is_running());
    assert!(matches!(scheduler.stop().await, Err(SchedulerError::NotRunning { .. })));
}
