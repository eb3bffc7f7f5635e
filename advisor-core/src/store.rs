//! Persistence contracts.
//!
//! Implementations: [`crate::memory::MemoryStore`] for tests and dev mode,
//! and the MongoDB-backed stores in the daemon.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{
    Instruction, KnowledgeChunk, OAuthTokens, Provider, ScoredChunk, Source, Task, TaskStatus,
    User, UserId,
};

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A chunk with the same unique id was already stored; nothing changed.
    Duplicate,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, user_id: &UserId) -> Result<Option<User>, StoreError>;

    /// Create or update the user identified by `email` with fresh Google tokens.
    async fn upsert_google(&self, email: &str, tokens: OAuthTokens) -> Result<User, StoreError>;

    /// Replace the stored tokens for one provider.
    async fn set_tokens(
        &self,
        user_id: &UserId,
        provider: Provider,
        tokens: OAuthTokens,
    ) -> Result<(), StoreError>;

    /// Atomically flip `syncing[source]` from false to true.
    ///
    /// Returns `false` when a sync already holds the latch.
    async fn try_begin_sync(&self, user_id: &UserId, source: Source) -> Result<bool, StoreError>;

    /// Release the latch taken by [`UserStore::try_begin_sync`].
    async fn finish_sync(&self, user_id: &UserId, source: Source) -> Result<(), StoreError>;

    /// Clear every user's latches. Returns the number of users that had one set.
    async fn reset_sync_flags(&self) -> Result<u64, StoreError>;

    async fn list_user_ids(&self) -> Result<Vec<UserId>, StoreError>;
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Store a chunk; a duplicate unique id is a no-op.
    async fn insert(&self, chunk: KnowledgeChunk) -> Result<InsertOutcome, StoreError>;

    /// Nearest neighbours of `vector` among `user_id`'s chunks, best first,
    /// ties broken by unique id, at most `k` results.
    async fn query(
        &self,
        user_id: &UserId,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Latest origin timestamp stored for `(user_id, source)`.
    async fn latest_timestamp(
        &self,
        user_id: &UserId,
        source: Source,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Whether any chunk of the external record is already stored.
    async fn contains_external(
        &self,
        user_id: &UserId,
        source: Source,
        external_id: &str,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: Task) -> Result<Task, StoreError>;

    /// Pending tasks, oldest first, capped at `limit`.
    async fn pending(&self, user_id: &UserId, limit: usize) -> Result<Vec<Task>, StoreError>;

    /// Returns `false` when the task does not exist for this user.
    async fn set_status(
        &self,
        user_id: &UserId,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait InstructionStore: Send + Sync {
    async fn add(&self, instruction: Instruction) -> Result<Instruction, StoreError>;

    /// All instructions for the user, oldest first.
    async fn list(&self, user_id: &UserId) -> Result<Vec<Instruction>, StoreError>;
}
