//! # Tidemark Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for the provider proxy, DLP scanner,
//!   PII vault, repositories, task queue and briefing notifier
//! - The sync pipeline: provider fetcher, redaction gate, conflict detector
//!   and the orchestrator state machine
//! - Event commands and status polling
//!
//! ## Architecture Principles
//! - Only depends on `tidemark-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod calendar;
pub mod dlp;
pub mod mail_ports;
pub mod sync;

pub use calendar::commands::EventCommandService;
pub use calendar::conflict::{detect_conflicts, ConflictAnalyzer, ConflictGraph};
pub use calendar::ports::CalendarEventRepository;
pub use dlp::gate::{RedactionGate, Screened};
pub use dlp::ports::{DlpScanner, VaultClient};
pub use mail_ports::MailMessageRepository;
pub use sync::dispatcher::{DispatchOutcome, SyncDispatcher};
pub use sync::fetcher::ProviderFetcher;
pub use sync::orchestrator::{SyncDependencies, SyncOrchestrator};
pub use sync::poller::SyncStatusPoller;
pub use sync::ports::{
    BriefingNotifier, ConnectionRepository, PageQuery, PageRequest, ProviderGateway,
    ProviderPage, SyncLockRepository, SyncStatusRepository, SyncTaskHandler, TaskQueue,
};
