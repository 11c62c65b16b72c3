//! Scheduled sync triggers
//!
//! Schedulers own a cancellation token and the join handle of their loop;
//! `start`/`stop` are explicit and `stop` waits for the loop with a timeout.

pub mod lifecycle;
pub mod sync_scheduler;

pub use lifecycle::{SchedulerError, SchedulerResult};
pub use sync_scheduler::{SyncScheduler, SyncSchedulerConfig};
