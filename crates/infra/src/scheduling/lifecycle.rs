//! Start/stop bookkeeping shared by the sync worker and the scheduler

use std::time::Duration;

use thiserror::Error;
use tidemark_domain::TidemarkError;
use tokio::task::JoinHandle;

/// Misuse or failed shutdown of a background loop; `component` names it
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{component} already running")]
    AlreadyRunning { component: &'static str },

    #[error("{component} not running")]
    NotRunning { component: &'static str },

    #[error("{component} did not stop within {seconds}s")]
    StopTimeout { component: &'static str, seconds: u64 },

    #[error("{component} loop panicked: {reason}")]
    Panicked { component: &'static str, reason: String },
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl From<SchedulerError> for TidemarkError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::AlreadyRunning { .. } | SchedulerError::NotRunning { .. } => {
                TidemarkError::InvalidInput(err.to_string())
            }
            SchedulerError::StopTimeout { .. } => TidemarkError::Timeout(err.to_string()),
            SchedulerError::Panicked { .. } => TidemarkError::Internal(err.to_string()),
        }
    }
}

/// Wait up to `limit` for a cancelled loop to return its output
///
/// On timeout the handle is dropped and the task keeps running detached.
pub(crate) async fn join_stopped<T>(
    component: &'static str,
    handle: JoinHandle<T>,
    limit: Duration,
) -> SchedulerResult<T> {
    match tokio::time::timeout(limit, handle).await {
        Err(_) => Err(SchedulerError::StopTimeout { component, seconds: limit.as_secs() }),
        Ok(Err(err)) => Err(SchedulerError::Panicked { component, reason: err.to_string() }),
        Ok(Ok(output)) => Ok(output),
    }
}
