//! Scriptable in-memory provider proxy

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tidemark_core::{PageQuery, PageRequest, ProviderGateway, ProviderPage};
use tidemark_domain::{
    CalendarRef, Connection, MessageRef, ProviderItem, Result as DomainResult, TidemarkError,
};

/// Scripted answer to a delta listing
#[derive(Debug, Clone)]
pub enum DeltaScript {
    Expired,
    Changes { items: Vec<String>, next_token: Option<String> },
}

#[derive(Default)]
struct State {
    calendars: Vec<CalendarRef>,
    /// calendar id -> events returned for window queries
    events: HashMap<String, Vec<ProviderItem>>,
    /// token -> scripted delta answer; `items` name events/messages by id
    delta: HashMap<String, DeltaScript>,
    /// Token attached to the last page of a window listing
    full_token: Option<String>,
    messages: Vec<MessageRef>,
    message_details: HashMap<String, ProviderItem>,
    list_error: Option<TidemarkError>,
    create_error: Option<TidemarkError>,
    created: Vec<ProviderItem>,
    deleted: Vec<String>,
    calls: Vec<String>,
}

/// Provider fake that paginates by `page_size` and records every call
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    listing_delay_ms: AtomicU64,
}

impl FakeGateway {
    pub fn with_events(&self, calendar_id: &str, items: Vec<ProviderItem>) -> &Self {
        self.state.lock().unwrap().events.insert(calendar_id.to_string(), items);
        self
    }

    pub fn with_calendars(&self, calendars: Vec<CalendarRef>) -> &Self {
        self.state.lock().unwrap().calendars = calendars;
        self
    }

    pub fn with_full_token(&self, token: &str) -> &Self {
        self.state.lock().unwrap().full_token = Some(token.to_string());
        self
    }

    pub fn with_delta(&self, token: &str, script: DeltaScript) -> &Self {
        self.state.lock().unwrap().delta.insert(token.to_string(), script);
        self
    }

    pub fn with_messages(&self, items: Vec<ProviderItem>) -> &Self {
        let mut state = self.state.lock().unwrap();
        for item in items {
            state.messages.push(MessageRef { id: item.external_id.clone(), thread_id: None });
            state.message_details.insert(item.external_id.clone(), item);
        }
        self
    }

    /// Listed but not hydratable (deleted between the two calls)
    pub fn with_vanished_message(&self, id: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .messages
            .push(MessageRef { id: id.to_string(), thread_id: None });
        self
    }

    /// Every event/message listing sleeps this long before answering
    pub fn slow_listing(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.listing_delay_ms.store(millis, Ordering::SeqCst);
    }

    async fn listing_pause(&self) {
        let millis = self.listing_delay_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    pub fn fail_listing(&self, err: TidemarkError) {
        self.state.lock().unwrap().list_error = Some(err);
    }

    pub fn fail_create(&self, err: TidemarkError) {
        self.state.lock().unwrap().create_error = Some(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn created(&self) -> Vec<ProviderItem> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn max_concurrent_hydrations(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn page<T: Clone>(
        all: &[T],
        request: &PageRequest,
        sync_token: Option<String>,
    ) -> ProviderPage<T> {
        let start: usize =
            request.page_token.as_deref().and_then(|token| token.parse().ok()).unwrap_or(0);
        let end = (start + request.page_size as usize).min(all.len());
        let items = all.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
        if end < all.len() {
            ProviderPage { items, next_page_token: Some(end.to_string()), next_sync_token: None }
        } else {
            ProviderPage::last(items, sync_token)
        }
    }

    fn describe(request: &PageRequest) -> String {
        match &request.query {
            PageQuery::Window(_) => "window".to_string(),
            PageQuery::Delta(token) => format!("delta:{token}"),
        }
    }
}

#[async_trait]
impl ProviderGateway for FakeGateway {
    async fn list_events(
        &self,
        _connection: &Connection,
        calendar_id: &str,
        request: &PageRequest,
    ) -> DomainResult<ProviderPage<ProviderItem>> {
        self.listing_pause().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("list_events:{calendar_id}:{}", Self::describe(request)));
        if let Some(err) = state.list_error.clone() {
            return Err(err);
        }

        let calendar = state.events.get(calendar_id).cloned().unwrap_or_default();
        let (items, token) = match &request.query {
            PageQuery::Window(_) => (calendar, state.full_token.clone()),
            PageQuery::Delta(token) => match state.delta.get(token) {
                Some(DeltaScript::Expired) | None => {
                    return Err(TidemarkError::TokenExpired(format!("410 for {token}")))
                }
                Some(DeltaScript::Changes { items, next_token }) => {
                    let changed = calendar
                        .into_iter()
                        .filter(|item| items.contains(&item.external_id))
                        .collect();
                    (changed, next_token.clone())
                }
            },
        };
        Ok(Self::page(&items, request, token))
    }

    async fn list_calendars(&self, _connection: &Connection) -> DomainResult<Vec<CalendarRef>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list_calendars".to_string());
        Ok(state.calendars.clone())
    }

    async fn list_messages(
        &self,
        _connection: &Connection,
        request: &PageRequest,
    ) -> DomainResult<ProviderPage<MessageRef>> {
        self.listing_pause().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("list_messages:{}", Self::describe(request)));
        if let Some(err) = state.list_error.clone() {
            return Err(err);
        }

        let (refs, token) = match &request.query {
            PageQuery::Window(_) => (state.messages.clone(), state.full_token.clone()),
            PageQuery::Delta(token) => match state.delta.get(token) {
                Some(DeltaScript::Expired) | None => {
                    return Err(TidemarkError::TokenExpired(format!("404 for {token}")))
                }
                Some(DeltaScript::Changes { items, next_token }) => {
                    let changed = state
                        .messages
                        .iter()
                        .filter(|message| items.contains(&message.id))
                        .cloned()
                        .collect();
                    (changed, next_token.clone())
                }
            },
        };
        Ok(Self::page(&refs, request, token))
    }

    async fn get_message(
        &self,
        _connection: &Connection,
        message_id: &str,
    ) -> DomainResult<ProviderItem> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        // Later messages answer first so arrival order differs from listing order
        let delay = {
            let state = self.state.lock().unwrap();
            let position = state.messages.iter().position(|m| m.id == message_id).unwrap_or(0);
            state.messages.len().saturating_sub(position) as u64
        };
        tokio::time::sleep(Duration::from_millis(delay * 5)).await;

        let detail = self.state.lock().unwrap().message_details.get(message_id).cloned();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut item = detail.ok_or_else(|| TidemarkError::NotFound(message_id.to_string()))?;
        // Providers do not always echo the id in the detail payload
        item.external_id = String::new();
        Ok(item)
    }

    async fn create_event(
        &self,
        _connection: &Connection,
        item: &ProviderItem,
    ) -> DomainResult<ProviderItem> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.create_error.clone() {
            return Err(err);
        }
        let created = ProviderItem {
            external_id: format!("created-{}", state.created.len() + 1),
            provider_status: Some("confirmed".into()),
            ..item.clone()
        };
        state.created.push(created.clone());
        Ok(created)
    }

    async fn delete_event(&self, _connection: &Connection, event_id: &str) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        state.deleted.push(event_id.to_string());
        for events in state.events.values_mut() {
            events.retain(|event| event.external_id != event_id);
        }
        Ok(())
    }
}
