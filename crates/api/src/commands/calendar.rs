//! Single event commands

use std::time::Instant;

use tidemark_domain::{CreateEventOutcome, EventDraft, Result};

use crate::utils::logging::log_command_execution;
use crate::AppContext;

/// Create an event on the user's primary calendar
///
/// The draft is redacted under the single-create policy before anything is
/// written. A `PartialSuccess` outcome means the provider has the event but
/// the local copy is missing; callers must not resubmit the draft.
pub async fn create_event(
    ctx: &AppContext,
    user_id: &str,
    draft: EventDraft,
) -> Result<CreateEventOutcome> {
    let start = Instant::now();
    let result = ctx.event_commands.create_event(user_id, draft).await;
    log_command_execution("calendar::create_event", start.elapsed(), result.as_ref().err());
    result
}

/// Delete an event at the provider and locally
pub async fn delete_event(ctx: &AppContext, user_id: &str, event_id: &str) -> Result<()> {
    let start = Instant::now();
    let result = ctx.event_commands.delete_event(user_id, event_id).await;
    log_command_execution("calendar::delete_event", start.elapsed(), result.as_ref().err());
    result
}
