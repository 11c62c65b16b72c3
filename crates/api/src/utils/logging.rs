use std::time::Duration;

use tidemark_domain::TidemarkError;
use tracing::{info, warn};

/// Log the outcome of a command execution with structured fields.
///
/// `command` is a stable identifier such as `"sync::sync_now"`; never pass
/// user content through it.
#[inline]
pub fn log_command_execution(command: &str, elapsed: Duration, error: Option<&TidemarkError>) {
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    match error {
        None => info!(command, duration_ms, "command_execution_success"),
        Some(err) => warn!(
            command,
            duration_ms,
            error_kind = err.label(),
            "command_execution_failure"
        ),
    }
}
