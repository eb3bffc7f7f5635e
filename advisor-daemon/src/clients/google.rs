//! Gmail and Google Calendar client.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use advisor_core::{
    CalendarConnector, CalendarEvent, ConnectorError, CreatedEvent, MailHeader, MailMessage,
    MailboxConnector, MimePart, NewCalendarEvent, OutgoingEmail, RefreshedToken, TokenRefresh,
};

use super::{check, invalid_response, network_error, TokenResponse};

/// Largest page Gmail serves for `messages.list`.
const GMAIL_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub gmail: String,
    pub calendar: String,
    pub token: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            gmail: "https://gmail.googleapis.com/gmail/v1".to_string(),
            calendar: "https://www.googleapis.com/calendar/v3".to_string(),
            token: "https://oauth2.googleapis.com/token".to_string(),
        }
    }
}

impl GoogleEndpoints {
    /// Every API under one base URL (used against a mock server).
    pub fn at(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            gmail: format!("{}/gmail/v1", base),
            calendar: format!("{}/calendar/v3", base),
            token: format!("{}/token", base),
        }
    }
}

/// One client serves both the mailbox and the calendar connector; they
/// share the Google credentials.
pub struct GoogleClient {
    http: Client,
    client_id: String,
    client_secret: String,
    endpoints: GoogleEndpoints,
}

impl GoogleClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            http: Client::builder().build().unwrap_or_default(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            endpoints: GoogleEndpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Ids of the oldest `limit` messages after `since`.
    ///
    /// Gmail lists newest first, so every page is read and the tail kept;
    /// otherwise a backlog larger than `limit` would leave a gap behind the
    /// cursor.
    async fn message_ids(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, ConnectorError> {
        let url = format!("{}/users/me/messages", self.endpoints.gmail);
        let query = format!("after:{}", since.timestamp());
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("q", query.clone()), ("maxResults", GMAIL_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&params)
                .send()
                .await
                .map_err(network_error)?;
            let page: MessageList = check(response).await?.json().await.map_err(invalid_response)?;

            ids.extend(page.messages.into_iter().map(|m| m.id));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        let oldest = ids.split_off(ids.len().saturating_sub(limit));
        Ok(oldest.into_iter().rev().collect())
    }

    async fn message(&self, access_token: &str, id: &str) -> Result<MailMessage, ConnectorError> {
        let url = format!("{}/users/me/messages/{}", self.endpoints.gmail, id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(network_error)?;
        let wire: WireMessage = check(response).await?.json().await.map_err(invalid_response)?;
        wire.into_message()
    }
}

#[async_trait]
impl TokenRefresh for GoogleClient {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ConnectorError> {
        let response = self
            .http
            .post(&self.endpoints.token)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(network_error)?;
        let token: TokenResponse = check(response).await?.json().await.map_err(invalid_response)?;
        Ok(token.into())
    }
}

#[async_trait]
impl MailboxConnector for GoogleClient {
    async fn list_since(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MailMessage>, ConnectorError> {
        let ids = self.message_ids(access_token, since, limit).await?;
        debug!(count = ids.len(), since = %since, "Listed Gmail messages");

        let mut messages = Vec::with_capacity(ids.len());
        for id in &ids {
            messages.push(self.message(access_token, id).await?);
        }
        Ok(messages)
    }

    async fn send(&self, access_token: &str, email: &OutgoingEmail) -> Result<String, ConnectorError> {
        let url = format!("{}/users/me/messages/send", self.endpoints.gmail);
        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&SendRequest {
                raw: encode_raw_message(email),
            })
            .send()
            .await
            .map_err(network_error)?;
        let sent: MessageRef = check(response).await?.json().await.map_err(invalid_response)?;
        Ok(sent.id)
    }
}

#[async_trait]
impl CalendarConnector for GoogleClient {
    async fn list_since(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CalendarEvent>, ConnectorError> {
        let url = format!("{}/calendars/primary/events", self.endpoints.calendar);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("updatedMin", since.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "updated".to_string()),
                ("maxResults", limit.to_string()),
            ])
            .send()
            .await
            .map_err(network_error)?;
        let list: EventList = check(response).await?.json().await.map_err(invalid_response)?;

        Ok(list
            .items
            .into_iter()
            .filter(|item| item.status.as_deref() != Some("cancelled"))
            .filter_map(|item| {
                let id = item.id.clone();
                let event = item.into_event();
                if event.is_none() {
                    warn!(event_id = %id, "Skipping calendar event without a usable start time");
                }
                event
            })
            .collect())
    }

    async fn create_event(
        &self,
        access_token: &str,
        event: &NewCalendarEvent,
    ) -> Result<CreatedEvent, ConnectorError> {
        let url = format!("{}/calendars/primary/events", self.endpoints.calendar);
        let body = NewEventRequest {
            summary: &event.title,
            description: event.description.as_deref(),
            start: WireTimeOut {
                date_time: event.start.to_rfc3339(),
                time_zone: "UTC",
            },
            end: WireTimeOut {
                date_time: event.end.to_rfc3339(),
                time_zone: "UTC",
            },
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        let created: CreatedEventResponse =
            check(response).await?.json().await.map_err(invalid_response)?;
        Ok(CreatedEvent {
            id: created.id,
            html_link: created.html_link,
        })
    }
}

/// RFC 2822 plain-text message, base64url encoded as Gmail expects.
pub fn encode_raw_message(email: &OutgoingEmail) -> String {
    let raw = format!(
        "To: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
        email.to, email.subject, email.body
    );
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

// Wire types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Serialize)]
struct SendRequest {
    raw: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    id: String,
    /// Milliseconds since the epoch, as a string
    internal_date: String,
    payload: WirePart,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<MailHeader>,
    #[serde(default)]
    body: WireBody,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Deserialize)]
struct WireBody {
    data: Option<String>,
}

impl WirePart {
    fn into_mime(self) -> MimePart {
        MimePart {
            mime_type: self.mime_type,
            body_data: self.body.data,
            parts: self.parts.into_iter().map(WirePart::into_mime).collect(),
        }
    }
}

impl WireMessage {
    fn into_message(self) -> Result<MailMessage, ConnectorError> {
        let millis: i64 = self.internal_date.parse().map_err(|_| {
            ConnectorError::InvalidResponse(format!("bad internalDate '{}'", self.internal_date))
        })?;
        let internal_date = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| ConnectorError::InvalidResponse(format!("bad internalDate {}", millis)))?;

        let mut payload = self.payload;
        let headers = std::mem::take(&mut payload.headers);
        Ok(MailMessage {
            id: self.id,
            internal_date,
            headers,
            payload: payload.into_mime(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    start: Option<WireTime>,
    end: Option<WireTime>,
    updated: Option<DateTime<Utc>>,
    created: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTime {
    date_time: Option<DateTime<Utc>>,
    /// All-day events carry only a date
    date: Option<NaiveDate>,
}

impl WireTime {
    fn instant(&self) -> Option<DateTime<Utc>> {
        self.date_time.or_else(|| {
            self.date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
    }
}

impl WireEvent {
    fn into_event(self) -> Option<CalendarEvent> {
        let start = self.start.as_ref().and_then(WireTime::instant)?;
        let end = self.end.as_ref().and_then(WireTime::instant).unwrap_or(start);
        Some(CalendarEvent {
            id: self.id,
            title: self.summary,
            start,
            end,
            description: self.description,
            updated: self.updated.or(self.created).unwrap_or(start),
        })
    }
}

#[derive(Debug, Serialize)]
struct NewEventRequest<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    start: WireTimeOut,
    end: WireTimeOut,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTimeOut {
    date_time: String,
    time_zone: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedEventResponse {
    id: String,
    html_link: Option<String>,
}
