//! Manual sync and status commands

use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tidemark_core::{DispatchOutcome, SyncStatusRepository};
use tidemark_domain::{PollOutcome, Provider, Result, SyncState, SyncStatus, SyncTrigger};
use tracing::info;

use crate::utils::logging::log_command_execution;
use crate::AppContext;

/// What a manual sync request observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncNowState {
    Complete,
    Error,
    /// The poll timed out; the cycle keeps going in the background
    Running,
    NotConnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncNowResponse {
    pub state: SyncNowState,
    pub message: Option<String>,
    pub sync_status: Option<SyncStatus>,
}

impl SyncNowResponse {
    fn not_connected() -> Self {
        Self {
            state: SyncNowState::NotConnected,
            message: Some("no connected account for this provider".into()),
            sync_status: None,
        }
    }

    fn from_poll(outcome: PollOutcome) -> Self {
        match outcome {
            PollOutcome::Finished(status) => {
                let (state, message) = if status.state == SyncState::Complete {
                    (SyncNowState::Complete, None)
                } else {
                    (SyncNowState::Error, status.error_message.clone())
                };
                Self { state, message, sync_status: Some(status) }
            }
            PollOutcome::StillRunning(last_seen) => Self {
                state: SyncNowState::Running,
                message: Some("sync is still running in the background".into()),
                sync_status: last_seen,
            },
        }
    }
}

/// Enqueue a sync for `user_id`'s `provider` connection and wait for it
///
/// Waits up to the configured poll timeout; the cycle is never cancelled by
/// the wait ending.
pub async fn sync_now(
    ctx: &AppContext,
    user_id: &str,
    provider: Provider,
) -> Result<SyncNowResponse> {
    let command_name = "sync::sync_now";
    let start = Instant::now();

    let result = dispatch_and_wait(ctx, user_id, provider).await;

    log_command_execution(command_name, start.elapsed(), result.as_ref().err());
    result
}

async fn dispatch_and_wait(
    ctx: &AppContext,
    user_id: &str,
    provider: Provider,
) -> Result<SyncNowResponse> {
    let since = Utc::now();
    match ctx.dispatcher.dispatch(user_id, provider, SyncTrigger::Manual).await? {
        DispatchOutcome::NotConnected => Ok(SyncNowResponse::not_connected()),
        DispatchOutcome::Enqueued(task) => {
            info!(task_id = %task.task_id, "waiting for sync");
            let outcome = ctx.poller.wait_for_terminal(user_id, provider, since).await?;
            Ok(SyncNowResponse::from_poll(outcome))
        }
    }
}

/// Latest sync status for `user_id`, if any cycle was ever requested
pub async fn sync_status(ctx: &AppContext, user_id: &str) -> Result<Option<SyncStatus>> {
    let start = Instant::now();
    let result = ctx.statuses.get(user_id).await;
    log_command_execution("sync::sync_status", start.elapsed(), result.as_ref().err());
    result
}
