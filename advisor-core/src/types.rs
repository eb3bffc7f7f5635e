//! Domain entities shared by the sync pipeline and the agent.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Access tokens are treated as expired this long before their stated expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Identifier of an authenticated user. Every entity is scoped to one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// External data source a chunk was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Mailbox,
    Calendar,
    Crm,
}

impl Source {
    /// All sources, in the order a full sync launches them.
    pub const ALL: [Source; 3] = [Source::Mailbox, Source::Calendar, Source::Crm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Mailbox => "mailbox",
            Source::Calendar => "calendar",
            Source::Crm => "crm",
        }
    }

    /// The credential provider whose tokens this source uses.
    pub fn provider(&self) -> Provider {
        match self {
            Source::Mailbox | Source::Calendar => Provider::Google,
            Source::Crm => Provider::Hubspot,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mailbox" | "gmail" | "mail" => Ok(Source::Mailbox),
            "calendar" => Ok(Source::Calendar),
            "crm" | "hubspot" => Ok(Source::Crm),
            other => Err(format!("unknown source '{}'", other)),
        }
    }
}

/// OAuth provider holding a user's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Hubspot,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Google => f.write_str("google"),
            Provider::Hubspot => f.write_str("hubspot"),
        }
    }
}

/// Access/refresh token pair for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthTokens {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the access token must be refreshed before use at `now`.
    ///
    /// Tokens without an expiry are assumed valid.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|at| at <= now + Duration::seconds(EXPIRY_SKEW_SECS))
            .unwrap_or(false)
    }
}

/// Per-source sync latches. A `true` flag means a sync is in flight (or a
/// crashed one left it behind).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFlags {
    #[serde(default)]
    pub mailbox: bool,
    #[serde(default)]
    pub calendar: bool,
    #[serde(default)]
    pub crm: bool,
}

impl SyncFlags {
    pub fn get(&self, source: Source) -> bool {
        match source {
            Source::Mailbox => self.mailbox,
            Source::Calendar => self.calendar,
            Source::Crm => self.crm,
        }
    }

    pub fn set(&mut self, source: Source, value: bool) {
        match source {
            Source::Mailbox => self.mailbox = value,
            Source::Calendar => self.calendar = value,
            Source::Crm => self.crm = value,
        }
    }

    pub fn any(&self) -> bool {
        self.mailbox || self.calendar || self.crm
    }
}

/// An authenticated user and the credentials the pipeline acts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub google: Option<OAuthTokens>,
    pub hubspot: Option<OAuthTokens>,
    pub syncing: SyncFlags,
}

impl User {
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            google: None,
            hubspot: None,
            syncing: SyncFlags::default(),
        }
    }

    pub fn tokens(&self, provider: Provider) -> Option<&OAuthTokens> {
        match provider {
            Provider::Google => self.google.as_ref(),
            Provider::Hubspot => self.hubspot.as_ref(),
        }
    }

    pub fn set_tokens(&mut self, provider: Provider, tokens: OAuthTokens) {
        match provider {
            Provider::Google => self.google = Some(tokens),
            Provider::Hubspot => self.hubspot = Some(tokens),
        }
    }

    /// Whether credentials exist for the provider backing `source`.
    pub fn is_connected(&self, source: Source) -> bool {
        self.tokens(source.provider()).is_some()
    }
}

/// Display metadata carried by every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: Source,
    pub external_id: String,
    /// Record kind, e.g. `email_chunk`, `calendar_event`, `note_chunk`, `contact`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Counterparty of the record (sender address, contact email).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_identity: Option<String>,
    /// Position of the chunk within its record.
    pub sequence: u32,
}

/// A bounded text segment with its embedding. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub unique_id: String,
    pub user_id: UserId,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
    /// Origin event time (mail send time, event start, CRM modification).
    pub timestamp: DateTime<Utc>,
    /// Storage time; never used for cursoring.
    pub created_at: DateTime<Utc>,
}

impl KnowledgeChunk {
    /// Build a chunk, deriving its unique id from the record identity.
    pub fn new(
        user_id: UserId,
        content: impl Into<String>,
        embedding: Vec<f32>,
        metadata: ChunkMetadata,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let unique_id = Self::derive_unique_id(
            &user_id,
            metadata.source,
            &metadata.kind,
            &metadata.external_id,
            metadata.sequence,
        );
        Self {
            unique_id,
            user_id,
            content: content.into(),
            embedding,
            metadata,
            timestamp,
            created_at: Utc::now(),
        }
    }

    /// Deterministic identity of a chunk.
    ///
    /// The user id is part of the key so two users ingesting the same
    /// external record (a shared calendar invite) never collide.
    pub fn derive_unique_id(
        user_id: &UserId,
        source: Source,
        kind: &str,
        external_id: &str,
        sequence: u32,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_str().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(source.as_str().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(kind.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(external_id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(sequence.to_be_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

/// Category of a standing instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionCategory {
    Compliance,
    Workflow,
    Personal,
}

impl InstructionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionCategory::Compliance => "compliance",
            InstructionCategory::Workflow => "workflow",
            InstructionCategory::Personal => "personal",
        }
    }
}

impl FromStr for InstructionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compliance" => Ok(InstructionCategory::Compliance),
            "workflow" => Ok(InstructionCategory::Workflow),
            "personal" => Ok(InstructionCategory::Personal),
            other => Err(format!(
                "unknown category '{}' (expected compliance, workflow or personal)",
                other
            )),
        }
    }
}

/// A standing rule the agent must respect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: String,
    pub user_id: UserId,
    pub content: String,
    pub category: InstructionCategory,
    pub created_at: DateTime<Utc>,
}

impl Instruction {
    pub fn new(user_id: UserId, content: impl Into<String>, category: InstructionCategory) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            content: content.into(),
            category,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

/// Where a task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    Email,
    Calendar,
    Hubspot,
    Manual,
}

impl From<Source> for TaskSource {
    fn from(source: Source) -> Self {
        match source {
            Source::Mailbox => TaskSource::Email,
            Source::Calendar => TaskSource::Calendar,
            Source::Crm => TaskSource::Hubspot,
        }
    }
}

/// A follow-up item recorded by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: UserId,
    pub title: String,
    pub details: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub source: TaskSource,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// New pending task with medium priority.
    pub fn pending(user_id: UserId, title: impl Into<String>, source: TaskSource) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            title: title.into(),
            details: None,
            due_date: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::default(),
            source,
            created_at: Utc::now(),
        }
    }

    pub fn with_due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Parse a model-supplied date: RFC 3339 or a plain `YYYY-MM-DD` (midnight UTC).
pub fn parse_loose_datetime(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta(external_id: &str, sequence: u32) -> ChunkMetadata {
        ChunkMetadata {
            source: Source::Mailbox,
            external_id: external_id.to_string(),
            kind: "email_chunk".to_string(),
            subject: None,
            client_identity: None,
            sequence,
        }
    }

    #[test]
    fn test_unique_id_is_deterministic() {
        let user = UserId::new("u1");
        let a = KnowledgeChunk::new(user.clone(), "a", vec![], meta("m1", 0), Utc::now());
        let b = KnowledgeChunk::new(user.clone(), "b", vec![], meta("m1", 0), Utc::now());
        let c = KnowledgeChunk::new(user, "a", vec![], meta("m1", 1), Utc::now());

        assert_eq!(a.unique_id, b.unique_id);
        assert_ne!(a.unique_id, c.unique_id);
    }

    #[test]
    fn test_unique_id_scoped_per_user() {
        let a = KnowledgeChunk::derive_unique_id(&"u1".into(), Source::Calendar, "calendar_event", "ev", 0);
        let b = KnowledgeChunk::derive_unique_id(&"u2".into(), Source::Calendar, "calendar_event", "ev", 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let fresh = OAuthTokens::new("t").with_expiry(now + Duration::hours(1));
        let stale = OAuthTokens::new("t").with_expiry(now - Duration::minutes(1));
        let almost = OAuthTokens::new("t").with_expiry(now + Duration::seconds(30));

        assert!(!fresh.is_expired(now));
        assert!(stale.is_expired(now));
        assert!(almost.is_expired(now));
        assert!(!OAuthTokens::new("t").is_expired(now));
    }

    #[test]
    fn test_sync_flags() {
        let mut flags = SyncFlags::default();
        assert!(!flags.any());
        flags.set(Source::Crm, true);
        assert!(flags.get(Source::Crm));
        assert!(!flags.get(Source::Mailbox));
        assert!(flags.any());
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!("gmail".parse::<Source>().unwrap(), Source::Mailbox);
        assert_eq!("HubSpot".parse::<Source>().unwrap(), Source::Crm);
        assert!("fax".parse::<Source>().is_err());
        assert_eq!(Source::Calendar.provider(), Provider::Google);
    }

    #[test]
    fn test_parse_loose_datetime() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_loose_datetime("2025-06-01"), Some(expected));
        assert_eq!(
            parse_loose_datetime("2025-06-01T10:00:00Z"),
            Some(Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(parse_loose_datetime("next tuesday"), None);
    }
}
