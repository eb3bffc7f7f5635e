//! End-to-end ingestion through the real source adapters and the in-memory store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use advisor_core::{
    CalendarConnector, CalendarEvent, ContactInput, ConnectorError, CreatedEvent, CrmChanges,
    CrmConnector, CrmContact, CrmNote, Embedder, HashingEmbedder, KnowledgeStore, MailHeader,
    MailMessage, MailboxConnector, MemoryStore, MimePart, NewCalendarEvent, OAuthTokens,
    OutgoingEmail, RefreshedToken, Source, SyncFlags, TokenRefresh, User, UserId, UserStore,
};
use advisor_sync::{CalendarSource, CrmSource, MailboxSource, SyncConfig, SyncOrchestrator};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::{Mutex, Notify};

/// Mailbox that returns every message newer than the cursor, like a real provider.
#[derive(Default)]
struct FakeMailbox {
    messages: Mutex<Vec<MailMessage>>,
    cursors: Mutex<Vec<DateTime<Utc>>>,
    list_calls: AtomicU32,
    gate: Option<Arc<Notify>>,
}

impl FakeMailbox {
    fn with_messages(messages: Vec<MailMessage>) -> Self {
        Self {
            messages: Mutex::new(messages),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TokenRefresh for FakeMailbox {
    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedToken, ConnectorError> {
        Ok(RefreshedToken {
            access_token: "refreshed".into(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        })
    }
}

#[async_trait]
impl MailboxConnector for FakeMailbox {
    async fn list_since(
        &self,
        _access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MailMessage>, ConnectorError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.cursors.lock().await.push(since);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self
            .messages
            .lock()
            .await
            .iter()
            .filter(|m| m.internal_date >= since)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn send(&self, _access_token: &str, _email: &OutgoingEmail) -> Result<String, ConnectorError> {
        Ok("sent".into())
    }
}

/// Calendar that filters on modification time, like `updatedMin`.
#[derive(Default)]
struct FakeCalendar {
    events: Mutex<Vec<CalendarEvent>>,
}

#[async_trait]
impl TokenRefresh for FakeCalendar {
    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedToken, ConnectorError> {
        Err(ConnectorError::Unauthorized("revoked".into()))
    }
}

#[async_trait]
impl CalendarConnector for FakeCalendar {
    async fn list_since(
        &self,
        _access_token: &str,
        since: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<CalendarEvent>, ConnectorError> {
        let mut events: Vec<CalendarEvent> = self
            .events
            .lock()
            .await
            .iter()
            .filter(|e| e.updated >= since)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.updated);
        Ok(events)
    }

    async fn create_event(
        &self,
        _access_token: &str,
        _event: &NewCalendarEvent,
    ) -> Result<CreatedEvent, ConnectorError> {
        Err(ConnectorError::InsufficientScope("calendar".into()))
    }
}

fn mail(id: &str, body: &str, at: DateTime<Utc>) -> MailMessage {
    MailMessage {
        id: id.to_string(),
        internal_date: at,
        headers: vec![
            MailHeader { name: "Subject".into(), value: format!("Re: {}", id) },
            MailHeader { name: "From".into(), value: "client@example.com".into() },
        ],
        payload: MimePart::leaf("text/plain", URL_SAFE_NO_PAD.encode(body)),
    }
}

fn connected_user(store: &MemoryStore, id: &str) -> UserId {
    let mut user = User::new(UserId::new(id), format!("{}@example.com", id));
    user.google = Some(OAuthTokens::new("token"));
    store.put_user(user);
    UserId::new(id)
}

fn orchestrator(store: &Arc<MemoryStore>, mailbox: Arc<FakeMailbox>) -> SyncOrchestrator {
    SyncOrchestrator::new(
        store.clone(),
        store.clone(),
        Arc::new(HashingEmbedder::new(64)),
        SyncConfig::default(),
    )
    .with_connector(Arc::new(MailboxSource::new(mailbox)))
}

#[tokio::test]
async fn test_idempotent_ingestion() {
    let store = Arc::new(MemoryStore::new());
    let user = connected_user(&store, "alice");
    let now = Utc::now();
    let mailbox = Arc::new(FakeMailbox::with_messages(vec![
        mail("m1", "Please review the contract draft.", now - Duration::hours(2)),
        mail("m2", &"Long update. ".repeat(200), now - Duration::hours(1)),
    ]));
    let orchestrator = orchestrator(&store, mailbox);

    let first = orchestrator.sync_source(&user, Source::Mailbox).await.unwrap().unwrap();
    let stored_after_first = store.chunk_count();
    assert!(first.stored >= 3, "long body should yield several chunks");
    assert_eq!(stored_after_first, first.stored);

    let second = orchestrator.sync_source(&user, Source::Mailbox).await.unwrap().unwrap();
    assert_eq!(second.stored, 0);
    assert_eq!(store.chunk_count(), stored_after_first);
}

#[tokio::test]
async fn test_lock_exclusivity() {
    let store = Arc::new(MemoryStore::new());
    let user = connected_user(&store, "alice");
    let gate = Arc::new(Notify::new());
    let mailbox = Arc::new(FakeMailbox {
        gate: Some(gate.clone()),
        ..FakeMailbox::with_messages(vec![mail("m1", "hello", Utc::now())])
    });
    let orchestrator = orchestrator(&store, mailbox.clone());

    let first = orchestrator.sync_source(&user, Source::Mailbox);
    let second = async {
        // Let the first call take the latch and park inside the connector.
        while mailbox.list_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        let outcome = orchestrator.sync_source(&user, Source::Mailbox).await;
        gate.notify_one();
        outcome
    };

    let (first, second) = tokio::join!(first, second);
    assert!(first.unwrap().is_some());
    assert!(second.unwrap().is_none());
    assert_eq!(mailbox.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.get(&user).await.unwrap().unwrap().syncing, SyncFlags::default());
}

#[tokio::test]
async fn test_zombie_lock_recovery() {
    let store = Arc::new(MemoryStore::new());
    let mut user = User::new(UserId::new("crashed"), "crashed@example.com");
    user.google = Some(OAuthTokens::new("token"));
    user.syncing.mailbox = true;
    user.syncing.calendar = true;
    store.put_user(user);
    let user = UserId::new("crashed");

    let mailbox = Arc::new(FakeMailbox::with_messages(vec![mail("m1", "hi", Utc::now())]));
    let orchestrator = orchestrator(&store, mailbox);

    // Wedged until the sweep runs.
    assert!(orchestrator.sync_source(&user, Source::Mailbox).await.unwrap().is_none());

    assert_eq!(orchestrator.sweep_zombie_locks().await.unwrap(), 1);
    assert!(!store.get(&user).await.unwrap().unwrap().syncing.any());
    assert!(orchestrator.sync_source(&user, Source::Mailbox).await.unwrap().is_some());
}

#[tokio::test]
async fn test_high_water_mark_monotonic() {
    let store = Arc::new(MemoryStore::new());
    let user = connected_user(&store, "alice");
    let t1 = Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2030, 1, 2, 9, 0, 0).unwrap();
    let mailbox = Arc::new(FakeMailbox::with_messages(vec![
        mail("m1", "first", t1),
        mail("m2", "second", t2),
    ]));
    let orchestrator = orchestrator(&store, mailbox.clone());

    orchestrator.sync_source(&user, Source::Mailbox).await.unwrap();
    let max_stored = store.chunks_for(&user).iter().map(|c| c.timestamp).max().unwrap();
    assert_eq!(max_stored, t2);

    mailbox
        .messages
        .lock()
        .await
        .push(mail("m3", "third", t2 + Duration::hours(1)));
    orchestrator.sync_source(&user, Source::Mailbox).await.unwrap();

    let cursors = mailbox.cursors.lock().await.clone();
    assert_eq!(cursors.len(), 2);
    assert!(cursors[1] >= max_stored);
    assert_eq!(
        store.latest_timestamp(&user, Source::Mailbox).await.unwrap(),
        Some(t2 + Duration::hours(1))
    );
}

#[tokio::test]
async fn test_failed_run_does_not_advance_cursor() {
    let store = Arc::new(MemoryStore::new());
    let user = connected_user(&store, "alice");
    let mailbox = Arc::new(FakeMailbox::with_messages(vec![]));
    let calendar = Arc::new(FakeCalendar::default());

    // Expired token with no refresh token stored: the run fails before fetching.
    store
        .set_tokens(
            &user,
            advisor_core::Provider::Google,
            OAuthTokens::new("old").with_expiry(Utc::now() - Duration::hours(1)),
        )
        .await
        .unwrap();

    let orchestrator = orchestrator(&store, mailbox.clone())
        .with_connector(Arc::new(CalendarSource::new(calendar)));
    let report = orchestrator.sync_all(&user).await.unwrap();

    assert_eq!(report.stored, 0);
    assert_eq!(mailbox.list_calls.load(Ordering::SeqCst), 0);
    assert!(store.latest_timestamp(&user, Source::Mailbox).await.unwrap().is_none());
    assert!(!store.get(&user).await.unwrap().unwrap().syncing.any());
}

#[tokio::test]
async fn test_retrieval_scoping() {
    let store = Arc::new(MemoryStore::new());
    let alice = connected_user(&store, "alice");
    let bob = connected_user(&store, "bob");
    let now = Utc::now();

    let shared = vec![mail("shared", "The contract renewal terms look fine.", now)];
    let alice_sync = orchestrator(&store, Arc::new(FakeMailbox::with_messages(shared.clone())));
    let bob_sync = orchestrator(&store, Arc::new(FakeMailbox::with_messages(shared)));

    alice_sync.sync_source(&alice, Source::Mailbox).await.unwrap();
    bob_sync.sync_source(&bob, Source::Mailbox).await.unwrap();
    assert_eq!(store.chunk_count(), 2, "same external record is stored per user");

    let query = HashingEmbedder::new(64).embed("contract renewal").await.unwrap();
    let results = store.query(&alice, &query, 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results.iter().all(|r| r.chunk.user_id == alice));
}

fn event(id: &str, start: DateTime<Utc>, updated: DateTime<Utc>) -> CalendarEvent {
    CalendarEvent {
        id: id.into(),
        title: Some("Portfolio review".into()),
        start,
        end: start + Duration::minutes(45),
        description: Some("Discuss allocation".into()),
        updated,
    }
}

fn calendar_orchestrator(store: &Arc<MemoryStore>, calendar: Arc<FakeCalendar>) -> SyncOrchestrator {
    SyncOrchestrator::new(
        store.clone(),
        store.clone(),
        Arc::new(HashingEmbedder::new(64)),
        SyncConfig::default(),
    )
    .with_connector(Arc::new(CalendarSource::new(calendar)))
}

#[tokio::test]
async fn test_calendar_events_stored_as_single_chunks() {
    let store = Arc::new(MemoryStore::new());
    let user = connected_user(&store, "alice");
    let start = Utc::now() + Duration::days(1);
    let updated = Utc::now() - Duration::minutes(10);
    let calendar = Arc::new(FakeCalendar {
        events: Mutex::new(vec![event("ev1", start, updated)]),
    });
    let orchestrator = calendar_orchestrator(&store, calendar);

    let report = orchestrator.sync_source(&user, Source::Calendar).await.unwrap().unwrap();
    assert_eq!(report.stored, 1);

    let chunk = &store.chunks_for(&user)[0];
    assert!(chunk.content.starts_with("CALENDAR EVENT:\n[TITLE:Portfolio review]"));
    assert_eq!(chunk.metadata.kind, "calendar_event");
    assert_eq!(chunk.timestamp, updated);
}

#[tokio::test]
async fn test_event_booked_for_earlier_date_is_ingested() {
    let store = Arc::new(MemoryStore::new());
    let user = connected_user(&store, "alice");
    let now = Utc::now();
    let calendar = Arc::new(FakeCalendar {
        events: Mutex::new(vec![event(
            "next-month",
            now + Duration::days(30),
            now - Duration::hours(1),
        )]),
    });
    let orchestrator = calendar_orchestrator(&store, calendar.clone());
    orchestrator.sync_source(&user, Source::Calendar).await.unwrap();

    // Created after the first sync, for a date before the stored event.
    calendar
        .events
        .lock()
        .await
        .push(event("tomorrow", now + Duration::days(1), now));
    orchestrator.sync_source(&user, Source::Calendar).await.unwrap();

    let mut ids: Vec<String> = store
        .chunks_for(&user)
        .into_iter()
        .map(|c| c.metadata.external_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["next-month", "tomorrow"]);
}

/// CRM returning up to `limit` of each kind, oldest first.
struct FakeCrm {
    notes: Vec<CrmNote>,
    contacts: Vec<CrmContact>,
}

#[async_trait]
impl TokenRefresh for FakeCrm {
    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedToken, ConnectorError> {
        Err(ConnectorError::Unauthorized("revoked".into()))
    }
}

#[async_trait]
impl CrmConnector for FakeCrm {
    async fn search_modified_since(
        &self,
        _access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<CrmChanges, ConnectorError> {
        let mut notes: Vec<CrmNote> =
            self.notes.iter().filter(|n| n.modified_at >= since).cloned().collect();
        notes.sort_by_key(|n| n.modified_at);
        notes.truncate(limit);
        let mut contacts: Vec<CrmContact> =
            self.contacts.iter().filter(|c| c.modified_at >= since).cloned().collect();
        contacts.sort_by_key(|c| c.modified_at);
        contacts.truncate(limit);
        Ok(CrmChanges { notes, contacts })
    }

    async fn create_contact(
        &self,
        _access_token: &str,
        _contact: &ContactInput,
    ) -> Result<String, ConnectorError> {
        Ok("c-new".into())
    }

    async fn find_contact(
        &self,
        _access_token: &str,
        _email: &str,
    ) -> Result<Option<String>, ConnectorError> {
        Ok(None)
    }

    async fn add_note(
        &self,
        _access_token: &str,
        _contact_id: &str,
        _content: &str,
    ) -> Result<String, ConnectorError> {
        Ok("note-new".into())
    }
}

#[tokio::test]
async fn test_crm_contacts_survive_note_backlog() {
    let store = Arc::new(MemoryStore::new());
    let mut user = User::new(UserId::new("alice"), "alice@example.com");
    user.hubspot = Some(OAuthTokens::new("token"));
    store.put_user(user);
    let user = UserId::new("alice");

    let now = Utc::now();
    let crm = Arc::new(FakeCrm {
        notes: (0..3)
            .map(|i| CrmNote {
                id: format!("n{}", i),
                body: format!("Call notes number {}", i),
                modified_at: now - Duration::minutes(1),
                contact_email: None,
            })
            .collect(),
        contacts: vec![CrmContact {
            id: "c1".into(),
            first_name: Some("Ada".into()),
            email: Some("ada@example.com".into()),
            modified_at: now - Duration::hours(1),
            ..CrmContact::default()
        }],
    });

    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        store.clone(),
        Arc::new(HashingEmbedder::new(64)),
        SyncConfig {
            max_fetch_records: 3,
            ..SyncConfig::default()
        },
    )
    .with_connector(Arc::new(CrmSource::new(crm)));

    for _ in 0..3 {
        orchestrator.sync_source(&user, Source::Crm).await.unwrap();
    }

    let mut ids: Vec<String> = store
        .chunks_for(&user)
        .into_iter()
        .map(|c| c.metadata.external_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["c1", "n0", "n1", "n2"]);
}
