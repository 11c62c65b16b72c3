//! Sync task queue and worker
//!
//! The dispatcher enqueues into [`ChannelTaskQueue`]; [`SyncTaskWorker`]
//! drains it into the orchestrator with explicit start/stop lifecycle,
//! cancellation and a processing timeout per task.

mod queue;
mod worker;

pub use queue::{ChannelTaskQueue, TaskReceiver};
pub use worker::{SyncTaskWorker, SyncTaskWorkerConfig, WorkerStats};
