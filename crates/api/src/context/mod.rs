//! Application context - dependency injection container

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tidemark_core::{
    ConflictAnalyzer, EventCommandService, ProviderFetcher, ProviderGateway, RedactionGate,
    SyncDependencies, SyncDispatcher, SyncOrchestrator, SyncStatusPoller,
};
use tidemark_domain::{AppConfig, Result, TidemarkError};
use tidemark_infra::{
    ChannelTaskQueue, DbManager, HttpDlpScanner, HttpVaultClient, ProviderProxyClient,
    SqlCipherBriefingOutbox, SqlCipherCalendarEventRepository, SqlCipherConnectionRepository,
    SqlCipherMailMessageRepository, SqlCipherSyncLockRepository, SqlCipherSyncStatusRepository,
    SyncScheduler, SyncSchedulerConfig, SyncTaskWorker, SyncTaskWorkerConfig,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: AppConfig,
    pub db: Arc<DbManager>,

    // Repositories
    pub connections: Arc<SqlCipherConnectionRepository>,
    pub statuses: Arc<SqlCipherSyncStatusRepository>,
    pub events: Arc<SqlCipherCalendarEventRepository>,
    pub messages: Arc<SqlCipherMailMessageRepository>,
    pub briefing_outbox: Arc<SqlCipherBriefingOutbox>,

    // Services
    pub orchestrator: Arc<SyncOrchestrator>,
    pub dispatcher: Arc<SyncDispatcher>,
    pub poller: Arc<SyncStatusPoller>,
    pub event_commands: Arc<EventCommandService>,

    // Background processing, started by `start_background`
    worker: Mutex<SyncTaskWorker>,
    scheduler: Mutex<SyncScheduler>,
}

impl AppContext {
    /// Load configuration from the environment or a config file and wire
    /// everything up
    pub fn new() -> Result<Self> {
        let config = tidemark_infra::config::load()?;
        Self::new_with_config(config)
    }

    /// Wire the application from an explicit configuration
    ///
    /// Opens the encrypted database and applies migrations. Background
    /// processing stays stopped until [`Self::start_background`].
    pub fn new_with_config(config: AppConfig) -> Result<Self> {
        let db = Arc::new(open_database(&config)?);

        let connections = Arc::new(SqlCipherConnectionRepository::new(Arc::clone(&db)));
        let statuses = Arc::new(SqlCipherSyncStatusRepository::new(Arc::clone(&db)));
        let events = Arc::new(SqlCipherCalendarEventRepository::new(Arc::clone(&db)));
        let messages = Arc::new(SqlCipherMailMessageRepository::new(Arc::clone(&db)));
        let briefing_outbox = Arc::new(SqlCipherBriefingOutbox::new(Arc::clone(&db)));
        let locks = Arc::new(SqlCipherSyncLockRepository::new(Arc::clone(&db)));

        let gateway: Arc<dyn ProviderGateway> = Arc::new(ProviderProxyClient::new(&config.proxy)?);
        let gate = Arc::new(RedactionGate::new(
            Arc::new(HttpDlpScanner::new(&config.dlp)),
            Arc::new(HttpVaultClient::new(&config.dlp)),
            config.dlp.batch_size,
        ));
        let analyzer = Arc::new(ConflictAnalyzer::new(
            events.clone(),
            config.sync.analysis_window,
            config.sync.conflict_slack_secs,
        ));

        let orchestrator = Arc::new(SyncOrchestrator::new(
            SyncDependencies {
                fetcher: Arc::new(ProviderFetcher::new(
                    Arc::clone(&gateway),
                    config.sync.clone(),
                )),
                gate: Arc::clone(&gate),
                analyzer: Arc::clone(&analyzer),
                connections: connections.clone(),
                events: events.clone(),
                messages: messages.clone(),
                statuses: statuses.clone(),
                locks,
                notifier: briefing_outbox.clone(),
            },
            config.sync.clone(),
            config.dlp.bulk_sync_policy,
        ));

        let (queue, receiver) = ChannelTaskQueue::channel();
        let queue = Arc::new(queue);
        let dispatcher = Arc::new(SyncDispatcher::new(
            queue.clone(),
            statuses.clone(),
            connections.clone(),
            config.sync.lock_ttl_secs,
        ));
        let poller = Arc::new(SyncStatusPoller::new(
            statuses.clone(),
            Duration::from_millis(config.sync.poll_interval_ms.max(1)),
            Duration::from_secs(config.sync.poll_timeout_secs),
        ));
        let event_commands = Arc::new(EventCommandService::new(
            gateway,
            gate,
            connections.clone(),
            events.clone(),
            analyzer,
            config.dlp.single_create_policy,
        ));

        let worker = SyncTaskWorker::new(
            orchestrator.clone(),
            queue,
            receiver,
            SyncTaskWorkerConfig {
                max_attempts: config.sync.max_task_attempts.max(1),
                // Backstop only; the orchestrator times the cycle out first
                processing_timeout: Duration::from_secs(config.sync.cycle_timeout_secs.max(1) + 30),
                ..SyncTaskWorkerConfig::default()
            },
        );
        let scheduler = SyncScheduler::new(
            connections.clone(),
            Arc::clone(&dispatcher),
            SyncSchedulerConfig {
                interval: Duration::from_secs(config.sync.schedule_interval_secs.max(1)),
                ..SyncSchedulerConfig::default()
            },
        );

        info!(db_path = %db.path().display(), "app context initialized");

        Ok(Self {
            config,
            db,
            connections,
            statuses,
            events,
            messages,
            briefing_outbox,
            orchestrator,
            dispatcher,
            poller,
            event_commands,
            worker: Mutex::new(worker),
            scheduler: Mutex::new(scheduler),
        })
    }

    /// Start the task worker, and the interval scheduler when enabled
    pub async fn start_background(&self) -> Result<()> {
        self.worker.lock().await.start()?;

        if self.config.sync.scheduler_enabled {
            self.scheduler.lock().await.start()?;
        } else {
            info!("interval scheduler disabled by configuration");
        }
        Ok(())
    }

    /// Stop the scheduler first so nothing new is enqueued, then the worker
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_running() {
            if let Err(err) = scheduler.stop().await {
                warn!(error = %err, "scheduler did not stop cleanly");
            }
        }
        drop(scheduler);

        let mut worker = self.worker.lock().await;
        if worker.is_running() {
            worker.stop().await?;
        }
        info!("app context shut down");
        Ok(())
    }

    pub async fn is_worker_running(&self) -> bool {
        self.worker.lock().await.is_running()
    }

    /// Verify the database is reachable
    pub fn health_check(&self) -> Result<()> {
        self.db.health_check()
    }
}

fn open_database(config: &AppConfig) -> Result<DbManager> {
    let key = config.database.encryption_key.as_deref().ok_or_else(|| {
        TidemarkError::Config(
            "database encryption key missing (set TIDEMARK_DB_ENCRYPTION_KEY)".into(),
        )
    })?;
    let db =
        DbManager::new(Path::new(&config.database.path), config.database.pool_size, Some(key))?;
    db.run_migrations()?;
    Ok(db)
}
