//! Provider proxy adapter
//!
//! Every provider call is a `POST {base_url}/proxy` carrying
//! `{connectionId, method, endpoint, params|data}`; the proxy attaches the
//! user's OAuth credentials, forwards the call and relays the provider's
//! status code with the body wrapped as `{data}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tidemark_core::{PageQuery, PageRequest, ProviderGateway, ProviderPage};
use tidemark_domain::constants::PRIMARY_CALENDAR_ID;
use tidemark_domain::{
    CalendarRef, Connection, MessageRef, ProviderItem, ProxyConfig, Result, SyncWindow,
    TidemarkError,
};
use tracing::{debug, instrument, warn};
use url::Url;

use super::wire::{
    CalendarList, EventList, EventResource, HistoryList, MessageList, MessageResource, Profile,
    ProxyRequest, ProxyResponse,
};
use crate::http::HttpClient;

/// How a non-success status is interpreted for a given call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Listing,
    /// 410 Gone means the sync token is no longer valid
    CalendarDelta,
    /// 404 means the start history id is too old
    MailHistory,
    /// 404/410 means the item no longer exists
    Item,
}

pub struct ProviderProxyClient {
    http: HttpClient,
    endpoint: Url,
}

impl ProviderProxyClient {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let mut base = Url::parse(&config.base_url).map_err(|err| {
            TidemarkError::Config(format!("invalid proxy base_url {}: {err}", config.base_url))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("proxy")
            .map_err(|err| TidemarkError::Config(format!("invalid proxy endpoint: {err}")))?;

        let mut builder = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .max_attempts(usize::try_from(config.max_attempts).unwrap_or(1));
        if let Some(key) = config.api_key.as_deref().filter(|key| !key.trim().is_empty()) {
            builder = builder.bearer_token(key);
        }

        Ok(Self { http: builder.build()?, endpoint })
    }

    async fn dispatch(&self, request: ProxyRequest<'_>, kind: CallKind) -> Result<Response> {
        let endpoint = request.endpoint.clone();
        let builder = self.http.request(Method::POST, self.endpoint.clone()).json(&request);
        let response = self.http.send(builder).await.map_err(|err| match err {
            TidemarkError::Internal(_) | TidemarkError::Config(_) => err,
            other => TidemarkError::ProviderUnavailable(format!("{endpoint}: {other}")),
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(map_status(kind, status, &endpoint))
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: ProxyRequest<'_>,
        kind: CallKind,
    ) -> Result<T> {
        let endpoint = request.endpoint.clone();
        let response = self.dispatch(request, kind).await?;
        let envelope: ProxyResponse<T> = response.json().await.map_err(|err| {
            TidemarkError::ProviderUnavailable(format!("malformed response for {endpoint}: {err}"))
        })?;
        Ok(envelope.data)
    }

    async fn history_id(&self, connection: &Connection) -> Result<String> {
        let request = get(connection, "/gmail/v1/users/me/profile".into(), Map::new());
        let profile: Profile = self.call(request, CallKind::Listing).await?;
        Ok(profile.history_id)
    }

    async fn list_message_window(
        &self,
        connection: &Connection,
        window: &SyncWindow,
        request: &PageRequest,
    ) -> Result<ProviderPage<MessageRef>> {
        // Capture the history id before listing so nothing added meanwhile
        // is missed by the next delta
        let history_id = if request.page_token.is_none() {
            Some(self.history_id(connection).await?)
        } else {
            None
        };

        let mut query = format!("after:{}", window.time_min.timestamp());
        if let Some(max) = window.time_max {
            query.push_str(&format!(" before:{}", max.timestamp()));
        }
        let mut params = page_params(request);
        params.insert("q".into(), Value::String(query));

        let list: MessageList = self
            .call(get(connection, "/gmail/v1/users/me/messages".into(), params), CallKind::Listing)
            .await?;
        Ok(ProviderPage {
            items: list.messages.into_iter().map(MessageRef::from).collect(),
            next_page_token: list.next_page_token,
            next_sync_token: history_id,
        })
    }

    async fn list_message_history(
        &self,
        connection: &Connection,
        start_history_id: &str,
        request: &PageRequest,
    ) -> Result<ProviderPage<MessageRef>> {
        let mut params = page_params(request);
        params.insert("startHistoryId".into(), Value::String(start_history_id.to_string()));
        params.insert("historyTypes".into(), Value::String("messageAdded".into()));

        let list: HistoryList = self
            .call(get(connection, "/gmail/v1/users/me/history".into(), params), CallKind::MailHistory)
            .await?;
        let items = list
            .history
            .into_iter()
            .flat_map(|record| record.messages_added)
            .map(|added| MessageRef::from(added.message))
            .collect();
        Ok(ProviderPage {
            items,
            next_page_token: list.next_page_token,
            next_sync_token: list.history_id,
        })
    }
}

#[async_trait]
impl ProviderGateway for ProviderProxyClient {
    #[instrument(skip(self, connection, request), fields(connection_id = %connection.connection_id))]
    async fn list_events(
        &self,
        connection: &Connection,
        calendar_id: &str,
        request: &PageRequest,
    ) -> Result<ProviderPage<ProviderItem>> {
        let mut params = page_params(request);
        params.insert("singleEvents".into(), Value::Bool(true));
        let kind = match &request.query {
            PageQuery::Window(window) => {
                params.insert("timeMin".into(), Value::String(window.time_min.to_rfc3339()));
                if let Some(max) = window.time_max {
                    params.insert("timeMax".into(), Value::String(max.to_rfc3339()));
                }
                CallKind::Listing
            }
            PageQuery::Delta(token) => {
                params.insert("syncToken".into(), Value::String(token.clone()));
                CallKind::CalendarDelta
            }
        };

        let endpoint = format!("/calendar/v3/calendars/{}/events", encode(calendar_id));
        let list: EventList = self.call(get(connection, endpoint, params), kind).await?;
        let received = list.items.len();
        let items: Vec<ProviderItem> =
            list.items.into_iter().filter_map(EventResource::into_item).collect();
        debug!(received, kept = items.len(), "events page");

        Ok(ProviderPage {
            items,
            next_page_token: list.next_page_token,
            next_sync_token: list.next_sync_token,
        })
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.connection_id))]
    async fn list_calendars(&self, connection: &Connection) -> Result<Vec<CalendarRef>> {
        let request = get(connection, "/calendar/v3/users/me/calendarList".into(), Map::new());
        let list: CalendarList = self.call(request, CallKind::Listing).await?;
        Ok(list.items.into_iter().map(CalendarRef::from).collect())
    }

    #[instrument(skip(self, connection, request), fields(connection_id = %connection.connection_id))]
    async fn list_messages(
        &self,
        connection: &Connection,
        request: &PageRequest,
    ) -> Result<ProviderPage<MessageRef>> {
        match &request.query {
            PageQuery::Window(window) => self.list_message_window(connection, window, request).await,
            PageQuery::Delta(history_id) => {
                self.list_message_history(connection, history_id, request).await
            }
        }
    }

    async fn get_message(&self, connection: &Connection, message_id: &str) -> Result<ProviderItem> {
        let mut params = Map::new();
        params.insert("format".into(), Value::String("metadata".into()));
        params.insert(
            "metadataHeaders".into(),
            Value::Array(vec![Value::String("Subject".into()), Value::String("From".into())]),
        );
        let endpoint = format!("/gmail/v1/users/me/messages/{}", encode(message_id));
        let message: MessageResource =
            self.call(get(connection, endpoint, params), CallKind::Item).await?;
        Ok(message.into_item())
    }

    #[instrument(skip(self, connection, item), fields(connection_id = %connection.connection_id))]
    async fn create_event(
        &self,
        connection: &Connection,
        item: &ProviderItem,
    ) -> Result<ProviderItem> {
        let request = ProxyRequest {
            connection_id: &connection.connection_id,
            method: "POST",
            endpoint: format!("/calendar/v3/calendars/{PRIMARY_CALENDAR_ID}/events"),
            params: None,
            data: Some(EventResource::for_insert(item)),
        };
        let created: EventResource = self.call(request, CallKind::Listing).await?;
        created.into_item().ok_or_else(|| {
            TidemarkError::ProviderUnavailable("provider returned an event without times".into())
        })
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.connection_id))]
    async fn delete_event(&self, connection: &Connection, event_id: &str) -> Result<()> {
        let calendar_id = connection.metadata.calendar_id.as_deref().unwrap_or(PRIMARY_CALENDAR_ID);
        let request = ProxyRequest {
            connection_id: &connection.connection_id,
            method: "DELETE",
            endpoint: format!(
                "/calendar/v3/calendars/{}/events/{}",
                encode(calendar_id),
                encode(event_id)
            ),
            params: None,
            data: None,
        };
        // Deletes answer 204 with no envelope
        self.dispatch(request, CallKind::Item).await?;
        Ok(())
    }
}

fn get(connection: &Connection, endpoint: String, params: Map<String, Value>) -> ProxyRequest<'_> {
    ProxyRequest {
        connection_id: &connection.connection_id,
        method: "GET",
        endpoint,
        params: Some(params),
        data: None,
    }
}

fn page_params(request: &PageRequest) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("maxResults".into(), Value::from(request.page_size));
    if let Some(token) = &request.page_token {
        params.insert("pageToken".into(), Value::String(token.clone()));
    }
    params
}

fn encode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

fn map_status(kind: CallKind, status: StatusCode, endpoint: &str) -> TidemarkError {
    match (kind, status) {
        (CallKind::CalendarDelta, StatusCode::GONE)
        | (CallKind::MailHistory, StatusCode::NOT_FOUND) => {
            TidemarkError::TokenExpired(format!("{endpoint} answered {status}"))
        }
        (CallKind::Item, StatusCode::NOT_FOUND | StatusCode::GONE) => {
            TidemarkError::NotFound(format!("{endpoint} answered {status}"))
        }
        _ => {
            warn!(%status, endpoint, "provider call rejected");
            TidemarkError::ProviderUnavailable(format!("{endpoint} answered {status}"))
        }
    }
}
