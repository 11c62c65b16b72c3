//! # Tidemark Infrastructure
//!
//! Adapters for the ports defined in `tidemark-core`.
//!
//! This crate contains:
//! - SQLCipher repositories and the database manager
//! - The provider proxy client and DLP scanner / PII vault clients
//! - HTTP client with retries
//! - Configuration loading and tracing setup
//! - The sync task queue, worker and interval scheduler
//!
//! ## Architecture
//! - Implements traits defined in `tidemark-core`
//! - Depends on `tidemark-common` for encrypted storage
//! - Contains all "impure" code (I/O, network, timers)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod observability;
pub mod scheduling;
pub mod sync;

pub use database::*;
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use integrations::dlp::{HttpDlpScanner, HttpVaultClient};
pub use integrations::proxy::ProviderProxyClient;
pub use scheduling::{SchedulerError, SyncScheduler, SyncSchedulerConfig};
pub use sync::{ChannelTaskQueue, SyncTaskWorker, SyncTaskWorkerConfig, TaskReceiver};
