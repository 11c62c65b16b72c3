//! Connection lifecycle commands
//!
//! The OAuth flow itself lives outside this service; it reports a finished
//! connect here, which registers the connection and queues its first sync.

use std::time::Instant;

use chrono::Utc;
use tidemark_core::{ConnectionRepository, DispatchOutcome};
use tidemark_domain::{Connection, ConnectionMetadata, Provider, Result, SyncTrigger};
use tracing::info;

use crate::utils::logging::log_command_execution;
use crate::AppContext;

/// Register a freshly authorized connection and enqueue its initial sync
///
/// An older connected row for the same user and provider is disconnected.
pub async fn connect(
    ctx: &AppContext,
    user_id: &str,
    provider: Provider,
    metadata: ConnectionMetadata,
) -> Result<Connection> {
    let start = Instant::now();
    let result = register_and_dispatch(ctx, user_id, provider, metadata).await;
    log_command_execution("connections::connect", start.elapsed(), result.as_ref().err());
    result
}

async fn register_and_dispatch(
    ctx: &AppContext,
    user_id: &str,
    provider: Provider,
    metadata: ConnectionMetadata,
) -> Result<Connection> {
    let connection =
        Connection { metadata, ..Connection::connected(user_id, provider, Utc::now()) };
    ctx.connections.register(&connection).await?;

    if let DispatchOutcome::Enqueued(task) =
        ctx.dispatcher.dispatch(user_id, provider, SyncTrigger::ConnectEvent).await?
    {
        info!(
            connection_id = %connection.connection_id,
            task_id = %task.task_id,
            "initial sync queued"
        );
    }
    Ok(connection)
}

/// Mark a connection disconnected; its synced data stays in place
pub async fn disconnect(ctx: &AppContext, connection_id: &str) -> Result<()> {
    let start = Instant::now();
    let result = ctx.connections.mark_disconnected(connection_id).await;
    log_command_execution("connections::disconnect", start.elapsed(), result.as_ref().err());
    result
}

/// Every connection row for `user_id`, connected or not
pub async fn list_connections(ctx: &AppContext, user_id: &str) -> Result<Vec<Connection>> {
    let start = Instant::now();
    let result = ctx.connections.list_for_user(user_id).await;
    log_command_execution("connections::list_connections", start.elapsed(), result.as_ref().err());
    result
}
