//! Provider connector contracts.
//!
//! Connectors are thin transports: they list raw records changed since a
//! point in time and perform the outbound actions the agent's tools need.
//! Normalization into chunk text happens in the sync crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;

/// New access token obtained from a refresh token.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Exchange a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresh: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ConnectorError>;
}

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailHeader {
    pub name: String,
    pub value: String,
}

/// One node of a MIME tree. `body_data` is base64url as delivered by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MimePart {
    pub mime_type: String,
    pub body_data: Option<String>,
    #[serde(default)]
    pub parts: Vec<MimePart>,
}

impl MimePart {
    pub fn leaf(mime_type: impl Into<String>, body_data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            body_data: Some(body_data.into()),
            parts: Vec::new(),
        }
    }

    pub fn multipart(mime_type: impl Into<String>, parts: Vec<MimePart>) -> Self {
        Self {
            mime_type: mime_type.into(),
            body_data: None,
            parts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: String,
    pub internal_date: DateTime<Utc>,
    pub headers: Vec<MailHeader>,
    pub payload: MimePart,
}

impl MailMessage {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailboxConnector: TokenRefresh {
    /// The oldest `limit` messages received after `since`.
    async fn list_since(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MailMessage>, ConnectorError>;

    /// Send a plain-text message. Returns the provider's message id.
    async fn send(&self, access_token: &str, email: &OutgoingEmail)
        -> Result<String, ConnectorError>;
}

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: Option<String>,
    /// Last modification; the ingestion cursor for calendars.
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCalendarEvent {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub id: String,
    pub html_link: Option<String>,
}

#[async_trait]
pub trait CalendarConnector: TokenRefresh {
    /// Events created or modified at or after `since`, least recently
    /// updated first, whatever their start time.
    async fn list_since(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CalendarEvent>, ConnectorError>;

    async fn create_event(
        &self,
        access_token: &str,
        event: &NewCalendarEvent,
    ) -> Result<CreatedEvent, ConnectorError>;
}

// ---------------------------------------------------------------------------
// CRM
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmNote {
    pub id: String,
    pub body: String,
    pub modified_at: DateTime<Utc>,
    /// Email of the first associated contact, if any.
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrmContact {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub lifecycle_stage: Option<String>,
    pub city: Option<String>,
    pub modified_at: DateTime<Utc>,
}

/// Records modified since a cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrmChanges {
    pub notes: Vec<CrmNote>,
    pub contacts: Vec<CrmContact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactInput {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[async_trait]
pub trait CrmConnector: TokenRefresh {
    /// Up to `limit` notes and `limit` contacts modified at or after `since`,
    /// each list oldest first.
    async fn search_modified_since(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<CrmChanges, ConnectorError>;

    /// Create a contact. Fails with [`ConnectorError::Conflict`] if the email exists.
    async fn create_contact(
        &self,
        access_token: &str,
        contact: &ContactInput,
    ) -> Result<String, ConnectorError>;

    /// Look up a contact id by email.
    async fn find_contact(
        &self,
        access_token: &str,
        email: &str,
    ) -> Result<Option<String>, ConnectorError>;

    /// Attach a note to a contact. Returns the note id.
    async fn add_note(
        &self,
        access_token: &str,
        contact_id: &str,
        content: &str,
    ) -> Result<String, ConnectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let msg = MailMessage {
            id: "m1".into(),
            internal_date: Utc::now(),
            headers: vec![
                MailHeader { name: "Subject".into(), value: "Hello".into() },
                MailHeader { name: "FROM".into(), value: "a@b.com".into() },
            ],
            payload: MimePart::default(),
        };
        assert_eq!(msg.header("subject"), Some("Hello"));
        assert_eq!(msg.header("From"), Some("a@b.com"));
        assert_eq!(msg.header("To"), None);
    }
}
