//! Messages passed between the sync pipeline, the reaction worker and observers.

use serde::{Deserialize, Serialize};

use crate::types::{KnowledgeChunk, Source, UserId};

/// Counters for one source sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Records returned by the provider
    pub fetched: usize,
    /// Records skipped (empty after normalization or already stored)
    pub skipped: usize,
    /// Chunks newly inserted
    pub stored: usize,
    /// Records dropped because embedding or storage failed
    pub failed: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: &SyncReport) {
        self.fetched += other.fetched;
        self.skipped += other.skipped;
        self.stored += other.stored;
        self.failed += other.failed;
    }
}

/// Progress broadcast by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Another sync held the latch; nothing was done.
    SourceSkipped { user_id: UserId, source: Source },
    SourceFinished {
        user_id: UserId,
        source: Source,
        report: SyncReport,
    },
    SourceFailed {
        user_id: UserId,
        source: Source,
        error: String,
    },
    /// All sources of a full sync have completed.
    BatchFinished { user_id: UserId, report: SyncReport },
}

/// A newly stored chunk handed to the reaction worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionJob {
    pub user_id: UserId,
    pub chunk: KnowledgeChunk,
}
