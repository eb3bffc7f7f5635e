//! Source adapters: raw provider records to normalized records.
//!
//! Each adapter wraps one connector and turns what it returns into
//! [`SourceRecord`]s carrying the external id, display metadata, the origin
//! timestamp and the text to embed.

use std::sync::Arc;

use advisor_core::{
    CalendarConnector, CalendarEvent, ConnectorError, CrmConnector, CrmContact, CrmNote,
    MailMessage, MailboxConnector, RefreshedToken, Source, TokenRefresh,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::mime::extract_body;

/// Text to store for a record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordBody {
    /// Free text (possibly with markup) that goes through the chunker.
    Document(String),
    /// Pre-rendered summary stored as a single chunk.
    Summary(String),
}

/// A provider record normalized for ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub external_id: String,
    pub kind: &'static str,
    pub subject: Option<String>,
    pub client_identity: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub body: RecordBody,
}

/// Uniform fetch interface the orchestrator drives.
#[async_trait]
pub trait SourceConnector: TokenRefresh {
    fn source(&self) -> Source;

    /// Records created or modified after `since`, in provider order.
    async fn fetch_since(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, ConnectorError>;
}

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

pub struct MailboxSource {
    inner: Arc<dyn MailboxConnector>,
}

impl MailboxSource {
    pub fn new(inner: Arc<dyn MailboxConnector>) -> Self {
        Self { inner }
    }

    pub fn normalize(message: &MailMessage) -> SourceRecord {
        let subject = message
            .header("Subject")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("No Subject");
        let from = message
            .header("From")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("Unknown");

        SourceRecord {
            external_id: message.id.clone(),
            kind: "email_chunk",
            subject: Some(subject.to_string()),
            client_identity: Some(from.to_string()),
            timestamp: message.internal_date,
            body: RecordBody::Document(extract_body(&message.payload).unwrap_or_default()),
        }
    }
}

#[async_trait]
impl TokenRefresh for MailboxSource {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ConnectorError> {
        self.inner.refresh(refresh_token).await
    }
}

#[async_trait]
impl SourceConnector for MailboxSource {
    fn source(&self) -> Source {
        Source::Mailbox
    }

    async fn fetch_since(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, ConnectorError> {
        let messages = self.inner.list_since(access_token, since, limit).await?;
        Ok(messages.iter().map(Self::normalize).collect())
    }
}

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

pub struct CalendarSource {
    inner: Arc<dyn CalendarConnector>,
}

impl CalendarSource {
    pub fn new(inner: Arc<dyn CalendarConnector>) -> Self {
        Self { inner }
    }

    pub fn render(event: &CalendarEvent) -> String {
        format!(
            "CALENDAR EVENT:\n[TITLE:{}]\n[START:{}]\n[END:{}]\n[DESCRIPTION:{}]",
            Self::title(event),
            event.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            event.end.to_rfc3339_opts(SecondsFormat::Millis, true),
            event.description.as_deref().unwrap_or_default(),
        )
    }

    fn title(event: &CalendarEvent) -> &str {
        event
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("(No Title)")
    }

    pub fn normalize(event: &CalendarEvent) -> SourceRecord {
        SourceRecord {
            external_id: event.id.clone(),
            kind: "calendar_event",
            subject: Some(Self::title(event).to_string()),
            client_identity: None,
            timestamp: event.updated,
            body: RecordBody::Summary(Self::render(event)),
        }
    }
}

#[async_trait]
impl TokenRefresh for CalendarSource {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ConnectorError> {
        self.inner.refresh(refresh_token).await
    }
}

#[async_trait]
impl SourceConnector for CalendarSource {
    fn source(&self) -> Source {
        Source::Calendar
    }

    async fn fetch_since(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, ConnectorError> {
        let events = self.inner.list_since(access_token, since, limit).await?;
        Ok(events.iter().map(Self::normalize).collect())
    }
}

// ---------------------------------------------------------------------------
// CRM
// ---------------------------------------------------------------------------

const NOTE_SUBJECT_CHARS: usize = 50;

pub struct CrmSource {
    inner: Arc<dyn CrmConnector>,
}

impl CrmSource {
    pub fn new(inner: Arc<dyn CrmConnector>) -> Self {
        Self { inner }
    }

    pub fn normalize_note(note: &CrmNote) -> SourceRecord {
        let first_line = note.body.lines().next().unwrap_or_default();
        let subject: String = first_line.chars().take(NOTE_SUBJECT_CHARS).collect();

        SourceRecord {
            external_id: note.id.clone(),
            kind: "note_chunk",
            subject: Some(format!("{}...", subject)),
            client_identity: note.contact_email.clone(),
            timestamp: note.modified_at,
            body: RecordBody::Document(note.body.clone()),
        }
    }

    pub fn render_contact(contact: &CrmContact) -> String {
        format!(
            "Contact: {} ({}). Job Title: {}. Company: {}. Status: {}. Location: {}.",
            Self::full_name(contact),
            contact.email.as_deref().unwrap_or("No Email"),
            contact.job_title.as_deref().unwrap_or("N/A"),
            contact.company.as_deref().unwrap_or("N/A"),
            contact.lifecycle_stage.as_deref().unwrap_or("Unknown"),
            contact.city.as_deref().unwrap_or("Unknown"),
        )
    }

    fn full_name(contact: &CrmContact) -> String {
        [contact.first_name.as_deref(), contact.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn normalize_contact(contact: &CrmContact) -> SourceRecord {
        let name = Self::full_name(contact);
        SourceRecord {
            external_id: contact.id.clone(),
            kind: "contact",
            subject: (!name.is_empty()).then_some(name),
            client_identity: contact.email.clone(),
            timestamp: contact.modified_at,
            body: RecordBody::Summary(Self::render_contact(contact)),
        }
    }
}

#[async_trait]
impl TokenRefresh for CrmSource {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ConnectorError> {
        self.inner.refresh(refresh_token).await
    }
}

#[async_trait]
impl SourceConnector for CrmSource {
    fn source(&self) -> Source {
        Source::Crm
    }

    /// Notes and contacts share one cursor, so the merged list is ordered
    /// oldest first before it is capped at `limit`. Whatever is cut off is
    /// newer than everything kept and comes back on the next run.
    async fn fetch_since(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, ConnectorError> {
        let changes = self
            .inner
            .search_modified_since(access_token, since, limit)
            .await?;

        let mut records: Vec<SourceRecord> = changes
            .notes
            .iter()
            .map(Self::normalize_note)
            .chain(changes.contacts.iter().map(Self::normalize_contact))
            .collect();
        records.sort_by_key(|r| r.timestamp);
        records.truncate(limit);
        Ok(records)
    }
}
