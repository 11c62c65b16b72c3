//! Provider fetch strategy
//!
//! Chooses between a full time-window listing and a delta listing, follows
//! pagination to the end, and falls back to a full fetch over the shorter
//! fallback window when the provider rejects a stored delta token.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tidemark_domain::constants::PRIMARY_CALENDAR_ID;
use tidemark_domain::{
    Connection, FetchResult, MessageRef, Provider, ProviderItem, Result, SyncSettings,
    SyncWindow, TidemarkError,
};
use tracing::{debug, info, instrument, warn};

use super::ports::{PageQuery, PageRequest, ProviderGateway, ProviderPage};

/// Anything with a provider-assigned identity
trait ExternalId {
    fn external_id(&self) -> &str;
}

impl ExternalId for ProviderItem {
    fn external_id(&self) -> &str {
        &self.external_id
    }
}

impl ExternalId for MessageRef {
    fn external_id(&self) -> &str {
        &self.id
    }
}

/// Retrieves provider collections for one connection
pub struct ProviderFetcher {
    gateway: Arc<dyn ProviderGateway>,
    settings: SyncSettings,
}

impl ProviderFetcher {
    pub fn new(gateway: Arc<dyn ProviderGateway>, settings: SyncSettings) -> Self {
        Self { gateway, settings }
    }

    /// Fetch everything that changed for `connection`
    ///
    /// Without a stored token this is an initial sync over the configured
    /// initial window. With one it is a delta sync; an expired token falls
    /// back to a full fetch over the fallback window and yields a new token.
    #[instrument(
        skip(self, connection),
        fields(connection_id = %connection.connection_id, provider = %connection.provider)
    )]
    pub async fn fetch(&self, connection: &Connection) -> Result<FetchResult> {
        let Some(token) = connection.delta_token() else {
            let window = self.initial_window(connection.provider).resolve(Utc::now());
            return self.fetch_all(connection, window).await;
        };

        match self.fetch_delta(connection, token).await {
            Err(TidemarkError::TokenExpired(reason)) => {
                warn!(reason = %reason, "delta token expired, falling back to full fetch");
                let window = self.fallback_window(connection.provider).resolve(Utc::now());
                match connection.provider {
                    // Stay on the calendar the expired token belonged to
                    Provider::Calendar => self.refetch_stored_calendar(connection, window).await,
                    Provider::Mail => self.fetch_window(connection, window).await,
                }
            }
            other => other,
        }
    }

    /// Full listing over `window`, including the secondary-calendar probe
    /// when the primary calendar is empty
    pub async fn fetch_all(
        &self,
        connection: &Connection,
        window: SyncWindow,
    ) -> Result<FetchResult> {
        self.fetch_window(connection, window).await
    }

    /// Delta listing; `Err(TokenExpired)` signals the caller to refetch
    pub async fn fetch_delta(&self, connection: &Connection, token: &str) -> Result<FetchResult> {
        let query = PageQuery::Delta(token.to_string());
        let (items, next_token) = match connection.provider {
            Provider::Calendar => {
                let calendar_id =
                    connection.metadata.calendar_id.as_deref().unwrap_or(PRIMARY_CALENDAR_ID);
                self.collect_events(connection, calendar_id, query).await?
            }
            Provider::Mail => {
                let (refs, next_token) = self.collect_messages(connection, query).await?;
                (self.hydrate(connection, refs).await?, next_token)
            }
        };

        debug!(items = items.len(), "delta fetch complete");
        Ok(FetchResult {
            items,
            // Providers may omit the token when nothing changed
            delta_token: next_token.or_else(|| Some(token.to_string())),
            full_sync: false,
            calendar_id: connection.metadata.calendar_id.clone(),
        })
    }

    async fn fetch_window(
        &self,
        connection: &Connection,
        window: SyncWindow,
    ) -> Result<FetchResult> {
        match connection.provider {
            Provider::Calendar => self.fetch_calendar_window(connection, window).await,
            Provider::Mail => {
                let (refs, delta_token) =
                    self.collect_messages(connection, PageQuery::Window(window)).await?;
                let items = self.hydrate(connection, refs).await?;
                info!(items = items.len(), "mail full fetch complete");
                Ok(FetchResult { items, delta_token, full_sync: true, calendar_id: None })
            }
        }
    }

    /// Window listing of the calendar the connection already syncs
    ///
    /// No secondary probe here: the stored calendar id is kept so a
    /// connection that moved off an empty primary calendar stays moved.
    async fn refetch_stored_calendar(
        &self,
        connection: &Connection,
        window: SyncWindow,
    ) -> Result<FetchResult> {
        let calendar_id = connection.metadata.calendar_id.as_deref().unwrap_or(PRIMARY_CALENDAR_ID);
        let (items, delta_token) =
            self.collect_events(connection, calendar_id, PageQuery::Window(window)).await?;

        info!(calendar_id = %calendar_id, items = items.len(), "calendar refetch complete");
        Ok(FetchResult {
            items,
            delta_token,
            full_sync: true,
            calendar_id: connection.metadata.calendar_id.clone(),
        })
    }

    async fn fetch_calendar_window(
        &self,
        connection: &Connection,
        window: SyncWindow,
    ) -> Result<FetchResult> {
        let (items, delta_token) = self
            .collect_events(connection, PRIMARY_CALENDAR_ID, PageQuery::Window(window))
            .await?;

        if !items.is_empty() {
            info!(items = items.len(), "calendar full fetch complete");
            return Ok(FetchResult { items, delta_token, full_sync: true, calendar_id: None });
        }

        let calendars = self.gateway.list_calendars(connection).await?;
        let candidates = calendars
            .into_iter()
            .filter(|calendar| !calendar.primary && calendar.id != PRIMARY_CALENDAR_ID)
            .take(self.settings.calendar_fallback_limit);

        for calendar in candidates {
            let (items, calendar_token) = self
                .collect_events(connection, &calendar.id, PageQuery::Window(window))
                .await?;
            if !items.is_empty() {
                info!(
                    calendar_id = %calendar.id,
                    items = items.len(),
                    "primary calendar empty, using secondary calendar"
                );
                return Ok(FetchResult {
                    items,
                    delta_token: calendar_token,
                    full_sync: true,
                    calendar_id: Some(calendar.id),
                });
            }
        }

        debug!("no visible calendar returned events");
        Ok(FetchResult { items: Vec::new(), delta_token, full_sync: true, calendar_id: None })
    }

    async fn collect_events(
        &self,
        connection: &Connection,
        calendar_id: &str,
        query: PageQuery,
    ) -> Result<(Vec<ProviderItem>, Option<String>)> {
        let gateway = &self.gateway;
        collect_pages(query, self.settings.page_size, |request| async move {
            gateway.list_events(connection, calendar_id, &request).await
        })
        .await
    }

    async fn collect_messages(
        &self,
        connection: &Connection,
        query: PageQuery,
    ) -> Result<(Vec<MessageRef>, Option<String>)> {
        let gateway = &self.gateway;
        collect_pages(query, self.settings.page_size, |request| async move {
            gateway.list_messages(connection, &request).await
        })
        .await
    }

    /// Fetch message details with bounded concurrency, preserving listing order
    async fn hydrate(
        &self,
        connection: &Connection,
        refs: Vec<MessageRef>,
    ) -> Result<Vec<ProviderItem>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }

        let gateway = &self.gateway;
        let concurrency = self.settings.hydration_concurrency.max(1);
        let lookups: Vec<_> = refs
            .iter()
            .map(|message| {
                let id = message.id.clone();
                async move {
                    let result = gateway.get_message(connection, &id).await;
                    (id, result)
                }
            })
            .collect();
        let results: Vec<(String, Result<ProviderItem>)> =
            stream::iter(lookups).buffer_unordered(concurrency).collect().await;

        let mut by_id = HashMap::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(mut item) => {
                    item.external_id.clone_from(&id);
                    by_id.insert(id, item);
                }
                // Deleted between listing and hydration
                Err(TidemarkError::NotFound(_)) => debug!(message_id = %id, "message vanished"),
                Err(err) => return Err(err),
            }
        }

        Ok(refs.iter().filter_map(|message| by_id.remove(&message.id)).collect())
    }

    fn initial_window(&self, provider: Provider) -> tidemark_domain::WindowConfig {
        match provider {
            Provider::Calendar => self.settings.calendar_initial_window,
            Provider::Mail => self.settings.mail_initial_window,
        }
    }

    fn fallback_window(&self, provider: Provider) -> tidemark_domain::WindowConfig {
        match provider {
            Provider::Calendar => self.settings.calendar_fallback_window,
            Provider::Mail => self.settings.mail_fallback_window,
        }
    }
}

/// Follow `next_page_token` until exhausted
///
/// Items are de-duplicated by external id; a later page's copy replaces an
/// earlier one in place. The delta token comes from the last page.
async fn collect_pages<T, F, Fut>(
    query: PageQuery,
    page_size: u32,
    mut fetch_page: F,
) -> Result<(Vec<T>, Option<String>)>
where
    T: ExternalId,
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<ProviderPage<T>>>,
{
    let mut items: Vec<T> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut page_token: Option<String> = None;
    let mut delta_token = None;
    let mut pages = 0usize;

    loop {
        let request =
            PageRequest { query: query.clone(), page_token: page_token.clone(), page_size };
        let page = fetch_page(request).await?;
        pages += 1;

        for item in page.items {
            match positions.get(item.external_id()) {
                Some(&index) => items[index] = item,
                None => {
                    positions.insert(item.external_id().to_string(), items.len());
                    items.push(item);
                }
            }
        }

        if page.next_sync_token.is_some() {
            delta_token = page.next_sync_token;
        }

        match page.next_page_token {
            Some(next) if page_token.as_deref() == Some(next.as_str()) => {
                return Err(TidemarkError::ProviderUnavailable(format!(
                    "pagination cursor did not advance after {pages} pages"
                )));
            }
            Some(next) => page_token = Some(next),
            None => break,
        }
    }

    debug!(pages, items = items.len(), "pagination complete");
    Ok((items, delta_token))
}
