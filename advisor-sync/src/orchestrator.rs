//! Sync orchestrator.
//!
//! Drives `connector -> chunker -> embedder -> knowledge store` for one
//! `(user, source)` pair at a time. Mutual exclusion comes from the user's
//! durable `syncing` latch, taken with an atomic compare-and-set and released
//! after every run whatever its outcome.
//!
//! Newly stored chunks are handed to the reaction worker over a bounded
//! channel; progress goes out on a broadcast channel.

use std::collections::HashMap;
use std::sync::Arc;

use advisor_core::{
    fresh_access_token, ChunkMetadata, Embedder, InsertOutcome, KnowledgeChunk, KnowledgeStore,
    ReactionJob, Source, SyncEvent, SyncReport, UserId, UserStore,
};
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::chunker::{Chunker, ChunkerConfig};
use crate::error::SyncError;
use crate::sources::{RecordBody, SourceConnector, SourceRecord};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Look-back window when nothing has been stored yet
    pub max_fetch_days: u32,
    /// Cap on records requested per run
    pub max_fetch_records: usize,
    pub chunker: ChunkerConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_fetch_days: 10,
            max_fetch_records: 200,
            chunker: ChunkerConfig::default(),
        }
    }
}

pub struct SyncOrchestrator {
    users: Arc<dyn UserStore>,
    knowledge: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    connectors: HashMap<Source, Arc<dyn SourceConnector>>,
    chunker: Chunker,
    config: SyncConfig,
    reactions: Option<mpsc::Sender<ReactionJob>>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncOrchestrator {
    pub fn new(
        users: Arc<dyn UserStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            users,
            knowledge,
            embedder,
            connectors: HashMap::new(),
            chunker: Chunker::new(config.chunker),
            config,
            reactions: None,
            events,
        }
    }

    /// Register the connector for its source, replacing any previous one.
    pub fn with_connector(mut self, connector: Arc<dyn SourceConnector>) -> Self {
        self.connectors.insert(connector.source(), connector);
        self
    }

    /// Hand every newly stored chunk to this queue.
    pub fn with_reactions(mut self, sender: mpsc::Sender<ReactionJob>) -> Self {
        self.reactions = Some(sender);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Reset every latch left set by a crashed process. Run once at startup.
    pub async fn sweep_zombie_locks(&self) -> Result<u64, SyncError> {
        let reset = self.users.reset_sync_flags().await?;
        if reset > 0 {
            warn!(users = reset, "Reset sync flags left behind by a previous run");
        } else {
            debug!("No stale sync flags found");
        }
        Ok(reset)
    }

    /// Where the next fetch for `(user, source)` resumes.
    pub async fn high_water_mark(
        &self,
        user_id: &UserId,
        source: Source,
    ) -> Result<DateTime<Utc>, SyncError> {
        let latest = self.knowledge.latest_timestamp(user_id, source).await?;
        Ok(latest.unwrap_or_else(|| {
            Utc::now() - Duration::days(i64::from(self.config.max_fetch_days))
        }))
    }

    /// Sync one source for one user.
    ///
    /// Returns `Ok(None)` without doing anything when another sync already
    /// holds the latch for this pair.
    pub async fn sync_source(
        &self,
        user_id: &UserId,
        source: Source,
    ) -> Result<Option<SyncReport>, SyncError> {
        let connector = self
            .connectors
            .get(&source)
            .cloned()
            .ok_or(SyncError::NotConfigured(source))?;

        if !self.users.try_begin_sync(user_id, source).await? {
            debug!(user_id = %user_id, source = %source, "Sync already in progress, skipping");
            self.emit(SyncEvent::SourceSkipped {
                user_id: user_id.clone(),
                source,
            });
            return Ok(None);
        }

        let result = self.run_pipeline(user_id, connector.as_ref()).await;

        if let Err(e) = self.users.finish_sync(user_id, source).await {
            warn!(user_id = %user_id, source = %source, error = %e, "Failed to release sync flag");
        }

        match result {
            Ok(report) => {
                info!(
                    user_id = %user_id,
                    source = %source,
                    fetched = report.fetched,
                    stored = report.stored,
                    skipped = report.skipped,
                    failed = report.failed,
                    "Source sync finished"
                );
                self.emit(SyncEvent::SourceFinished {
                    user_id: user_id.clone(),
                    source,
                    report,
                });
                Ok(Some(report))
            }
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    source = %source,
                    error = %e,
                    reauth = e.needs_reauth(),
                    "Source sync failed"
                );
                self.emit(SyncEvent::SourceFailed {
                    user_id: user_id.clone(),
                    source,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Sync every connected source of a user concurrently, then announce
    /// completion. Per-source failures are logged and do not affect the others.
    pub async fn sync_all(&self, user_id: &UserId) -> Result<SyncReport, SyncError> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| advisor_core::CredentialError::UserNotFound(user_id.clone()))?;

        let sources: Vec<Source> = Source::ALL
            .into_iter()
            .filter(|s| self.connectors.contains_key(s) && user.is_connected(*s))
            .collect();

        let results = join_all(sources.iter().map(|s| self.sync_source(user_id, *s))).await;

        let mut total = SyncReport::default();
        for report in results.into_iter().flatten().flatten() {
            total.merge(&report);
        }

        info!(user_id = %user_id, stored = total.stored, "Fetching data finished");
        self.emit(SyncEvent::BatchFinished {
            user_id: user_id.clone(),
            report: total,
        });
        Ok(total)
    }

    /// Run [`Self::sync_all`] for every known user concurrently.
    pub async fn sync_everyone(&self) -> Result<usize, SyncError> {
        let ids = self.users.list_user_ids().await?;
        let results = join_all(ids.iter().map(|id| self.sync_all(id))).await;
        for (id, result) in ids.iter().zip(&results) {
            if let Err(e) = result {
                warn!(user_id = %id, error = %e, "User sync failed");
            }
        }
        Ok(ids.len())
    }

    async fn run_pipeline(
        &self,
        user_id: &UserId,
        connector: &dyn SourceConnector,
    ) -> Result<SyncReport, SyncError> {
        let source = connector.source();
        let access_token =
            fresh_access_token(self.users.as_ref(), user_id, source.provider(), connector).await?;

        let since = self.high_water_mark(user_id, source).await?;
        debug!(user_id = %user_id, source = %source, since = %since, "Fetching records");

        let mut records = connector
            .fetch_since(&access_token, since, self.config.max_fetch_records)
            .await?;
        // The cursor is the newest stored timestamp, so records are stored
        // oldest first and a run stops at its first failure.
        records.sort_by_key(|r| r.timestamp);

        let mut report = SyncReport {
            fetched: records.len(),
            ..SyncReport::default()
        };

        for (position, record) in records.iter().enumerate() {
            if self
                .knowledge
                .contains_external(user_id, source, &record.external_id)
                .await?
            {
                report.skipped += 1;
                continue;
            }

            let segments = self.segments(record);
            if segments.is_empty() {
                report.skipped += 1;
                continue;
            }

            let stored = match self.embed_record(user_id, source, record, segments).await {
                Ok(chunks) => self.store_chunks(user_id, source, chunks, &mut report).await,
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        source = %source,
                        external_id = %record.external_id,
                        error = %e,
                        "Embedding failed"
                    );
                    false
                }
            };

            if !stored {
                report.failed += 1;
                let deferred = records.len() - position - 1;
                warn!(
                    user_id = %user_id,
                    source = %source,
                    external_id = %record.external_id,
                    deferred,
                    "Stopping run; record and newer ones retried on the next sync"
                );
                break;
            }
        }

        Ok(report)
    }

    /// Insert a record's chunks and queue the new ones for review. Returns
    /// false if any insert failed.
    async fn store_chunks(
        &self,
        user_id: &UserId,
        source: Source,
        chunks: Vec<KnowledgeChunk>,
        report: &mut SyncReport,
    ) -> bool {
        for chunk in chunks {
            match self.knowledge.insert(chunk.clone()).await {
                Ok(InsertOutcome::Inserted) => {
                    report.stored += 1;
                    self.hand_off(ReactionJob {
                        user_id: user_id.clone(),
                        chunk,
                    })
                    .await;
                }
                Ok(InsertOutcome::Duplicate) => {}
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        source = %source,
                        unique_id = %chunk.unique_id,
                        error = %e,
                        "Failed to store chunk"
                    );
                    return false;
                }
            }
        }
        true
    }

    fn segments(&self, record: &SourceRecord) -> Vec<String> {
        match &record.body {
            RecordBody::Document(text) => self.chunker.split(text),
            RecordBody::Summary(text) if !text.trim().is_empty() => vec![text.clone()],
            RecordBody::Summary(_) => Vec::new(),
        }
    }

    /// Embed every segment before anything is stored, so a record is either
    /// fully ingested or not at all.
    async fn embed_record(
        &self,
        user_id: &UserId,
        source: Source,
        record: &SourceRecord,
        segments: Vec<String>,
    ) -> Result<Vec<KnowledgeChunk>, advisor_core::EmbedError> {
        let mut chunks = Vec::with_capacity(segments.len());
        for (sequence, content) in segments.into_iter().enumerate() {
            let embedding = self.embedder.embed(&content).await?;
            let metadata = ChunkMetadata {
                source,
                external_id: record.external_id.clone(),
                kind: record.kind.to_string(),
                subject: record.subject.clone(),
                client_identity: record.client_identity.clone(),
                sequence: sequence as u32,
            };
            chunks.push(KnowledgeChunk::new(
                user_id.clone(),
                content,
                embedding,
                metadata,
                record.timestamp,
            ));
        }
        Ok(chunks)
    }

    async fn hand_off(&self, job: ReactionJob) {
        if let Some(sender) = &self.reactions {
            if sender.send(job).await.is_err() {
                warn!("Reaction worker has stopped; chunk will not be reviewed");
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
