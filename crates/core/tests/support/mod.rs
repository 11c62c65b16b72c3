//! Shared test helpers for `tidemark-core` integration tests.
//!
//! In-memory fakes for every port plus a [`Harness`] that wires them into
//! the services under test.

#![allow(dead_code)]

pub mod dlp;
pub mod provider;
pub mod repositories;

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tidemark_core::{
    ConflictAnalyzer, EventCommandService, ProviderFetcher, RedactionGate, SyncDependencies,
    SyncOrchestrator,
};
use tidemark_domain::{Connection, FailurePolicy, Provider, ProviderItem, SyncSettings};

pub use self::dlp::{FakeScanner, FakeVault};
pub use self::provider::FakeGateway;
pub use self::repositories::{
    InMemoryConnections, InMemoryEvents, InMemoryLocks, InMemoryMessages, InMemoryStatuses,
    RecordingNotifier, RecordingQueue,
};

pub const USER: &str = "user-1";

/// Tomorrow at `hour:minute` UTC, inside every default window.
pub fn today_at(hour: u32, minute: u32) -> DateTime<Utc> {
    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(hour, minute, 0).unwrap())
}

pub fn event_item(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ProviderItem {
    ProviderItem {
        title: Some(format!("Meeting {id}")),
        end_time: Some(end),
        provider_status: Some("confirmed".into()),
        ..ProviderItem::new(id, start)
    }
}

pub fn mail_item(id: &str, subject: &str) -> ProviderItem {
    ProviderItem {
        title: Some(subject.to_string()),
        sender: Some("alice@example.com".into()),
        snippet: Some(format!("snippet for {id}")),
        ..ProviderItem::new(id, Utc::now() - Duration::hours(1))
    }
}

pub fn settings() -> SyncSettings {
    SyncSettings { page_size: 2, hydration_concurrency: 3, ..SyncSettings::default() }
}

/// All fakes plus the settings used to build services
pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub scanner: Arc<FakeScanner>,
    pub vault: Arc<FakeVault>,
    pub connections: Arc<InMemoryConnections>,
    pub events: Arc<InMemoryEvents>,
    pub messages: Arc<InMemoryMessages>,
    pub statuses: Arc<InMemoryStatuses>,
    pub locks: Arc<InMemoryLocks>,
    pub notifier: Arc<RecordingNotifier>,
    pub queue: Arc<RecordingQueue>,
    pub settings: SyncSettings,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            gateway: Arc::new(FakeGateway::default()),
            scanner: Arc::new(FakeScanner::default()),
            vault: Arc::new(FakeVault::default()),
            connections: Arc::new(InMemoryConnections::default()),
            events: Arc::new(InMemoryEvents::default()),
            messages: Arc::new(InMemoryMessages::default()),
            statuses: Arc::new(InMemoryStatuses::default()),
            locks: Arc::new(InMemoryLocks::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            queue: Arc::new(RecordingQueue::default()),
            settings: settings(),
        }
    }

    /// Register a connected row and return it
    pub fn connect(&self, provider: Provider) -> Connection {
        let connection = Connection::connected(USER, provider, Utc::now());
        self.connections.insert(connection.clone());
        connection
    }

    pub fn gate(&self) -> Arc<RedactionGate> {
        Arc::new(RedactionGate::new(self.scanner.clone(), self.vault.clone(), 2))
    }

    pub fn fetcher(&self) -> ProviderFetcher {
        ProviderFetcher::new(self.gateway.clone(), self.settings.clone())
    }

    pub fn analyzer(&self) -> Arc<ConflictAnalyzer> {
        Arc::new(ConflictAnalyzer::new(
            self.events.clone(),
            self.settings.analysis_window,
            self.settings.conflict_slack_secs,
        ))
    }

    pub fn orchestrator(&self, policy: FailurePolicy) -> SyncOrchestrator {
        let deps = SyncDependencies {
            fetcher: Arc::new(self.fetcher()),
            gate: self.gate(),
            analyzer: self.analyzer(),
            connections: self.connections.clone(),
            events: self.events.clone(),
            messages: self.messages.clone(),
            statuses: self.statuses.clone(),
            locks: self.locks.clone(),
            notifier: self.notifier.clone(),
        };
        SyncOrchestrator::new(deps, self.settings.clone(), policy)
    }

    pub fn commands(&self, policy: FailurePolicy) -> EventCommandService {
        EventCommandService::new(
            self.gateway.clone(),
            self.gate(),
            self.connections.clone(),
            self.events.clone(),
            self.analyzer(),
            policy,
        )
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
