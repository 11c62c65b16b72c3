//! Single-event commands: create and delete
//!
//! Both write to the provider first and then mirror the change locally,
//! followed by a conflict recomputation over the analysis window.

use std::sync::Arc;

use tidemark_domain::{
    CalendarEvent, Connection, CreateEventOutcome, EventDraft, FailurePolicy, Provider,
    ProviderItem, Result, TidemarkError,
};
use tracing::{error, info, instrument, warn};

use super::conflict::ConflictAnalyzer;
use super::ports::CalendarEventRepository;
use crate::dlp::gate::RedactionGate;
use crate::sync::ports::{ConnectionRepository, ProviderGateway};

/// Create/delete calendar events on behalf of a user
pub struct EventCommandService {
    gateway: Arc<dyn ProviderGateway>,
    gate: Arc<RedactionGate>,
    connections: Arc<dyn ConnectionRepository>,
    events: Arc<dyn CalendarEventRepository>,
    analyzer: Arc<ConflictAnalyzer>,
    policy: FailurePolicy,
}

impl EventCommandService {
    pub fn new(
        gateway: Arc<dyn ProviderGateway>,
        gate: Arc<RedactionGate>,
        connections: Arc<dyn ConnectionRepository>,
        events: Arc<dyn CalendarEventRepository>,
        analyzer: Arc<ConflictAnalyzer>,
        policy: FailurePolicy,
    ) -> Self {
        Self { gateway, gate, connections, events, analyzer, policy }
    }

    /// Create an event at the provider and store its redacted copy
    ///
    /// The draft is scanned before anything is written anywhere, so under
    /// fail-closed a DLP outage aborts the command with no side effects. A
    /// local write failure after the provider accepted the event is reported
    /// as [`CreateEventOutcome::PartialSuccess`].
    #[instrument(skip(self, draft), fields(policy = %self.policy))]
    pub async fn create_event(
        &self,
        user_id: &str,
        draft: EventDraft,
    ) -> Result<CreateEventOutcome> {
        if draft.title.trim().is_empty() {
            return Err(TidemarkError::InvalidInput("event title is required".into()));
        }
        if draft.end_time <= draft.start_time {
            return Err(TidemarkError::InvalidInput("event must end after it starts".into()));
        }

        let connection = self.calendar_connection(user_id).await?;
        let redacted = self.gate.sanitize_one(user_id, draft.to_item(), self.policy).await?;

        let created = self.gateway.create_event(&connection, &draft.to_item()).await?;
        let external_id = created.external_id.clone();
        info!(event_id = %external_id, "event created at provider");

        let stored = ProviderItem {
            external_id: created.external_id,
            provider_status: created.provider_status,
            start_time: created.start_time,
            end_time: created.end_time.or(redacted.item.end_time),
            is_all_day: created.is_all_day,
            ..redacted.item
        };
        let event = CalendarEvent::from_item(user_id, stored, redacted.dlp_verified);

        if let Err(err) = self.events.upsert_events(std::slice::from_ref(&event)).await {
            error!(
                event_id = %external_id,
                error = %err,
                "local write failed after provider create"
            );
            return Ok(CreateEventOutcome::PartialSuccess {
                external_id,
                error: TidemarkError::Persistence(err.to_string()).to_string(),
            });
        }

        if let Err(err) = self.analyzer.analyze(user_id).await {
            warn!(error = %err, "conflict recomputation failed after create");
        }

        let event = match self.events.find_event(user_id, &external_id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => event,
            Err(err) => {
                warn!(error = %err, "re-reading created event failed");
                event
            }
        };
        Ok(CreateEventOutcome::Created { event })
    }

    /// Delete an event at the provider, then locally, then recompute
    #[instrument(skip(self))]
    pub async fn delete_event(&self, user_id: &str, event_id: &str) -> Result<()> {
        let connection = self.calendar_connection(user_id).await?;

        match self.gateway.delete_event(&connection, event_id).await {
            Ok(()) => {}
            // Already gone at the provider; still clean up locally
            Err(TidemarkError::NotFound(_)) => warn!("event already deleted at provider"),
            Err(err) => return Err(err),
        }

        let removed = self
            .events
            .delete_event(user_id, event_id)
            .await
            .map_err(|err| TidemarkError::Persistence(err.to_string()))?;
        info!(removed, "event deleted");

        self.analyzer.analyze(user_id).await?;
        Ok(())
    }

    async fn calendar_connection(&self, user_id: &str) -> Result<Connection> {
        self.connections
            .find_connected(user_id, Provider::Calendar)
            .await?
            .ok_or_else(|| TidemarkError::ConnectionMissing(format!("{user_id}/calendar")))
    }
}
