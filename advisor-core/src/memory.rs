//! In-memory implementation of every store trait.
//!
//! Used by tests and by the daemon's dev mode. Similarity search is a brute
//! force cosine scan, which is fine for the volumes a single user produces
//! in a test or a local session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::store::{InsertOutcome, InstructionStore, KnowledgeStore, TaskStore, UserStore};
use crate::types::{
    Instruction, KnowledgeChunk, OAuthTokens, Provider, ScoredChunk, Source, Task, TaskStatus,
    User, UserId,
};

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<UserId, User>,
    emails: DashMap<String, UserId>,
    chunks: DashMap<String, KnowledgeChunk>,
    tasks: DashMap<String, Task>,
    instructions: DashMap<String, Instruction>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user record as-is (flags included).
    pub fn put_user(&self, user: User) {
        self.emails.insert(user.email.to_lowercase(), user.id.clone());
        self.users.insert(user.id.clone(), user);
    }

    /// All chunks stored for a user, in unique-id order.
    pub fn chunks_for(&self, user_id: &UserId) -> Vec<KnowledgeChunk> {
        let mut chunks: Vec<KnowledgeChunk> = self
            .chunks
            .iter()
            .filter(|c| &c.user_id == user_id)
            .map(|c| c.value().clone())
            .collect();
        chunks.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// All tasks for a user regardless of status.
    pub fn tasks_for(&self, user_id: &UserId) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| &t.user_id == user_id)
            .map(|t| t.value().clone())
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(user_id).map(|u| u.value().clone()))
    }

    async fn upsert_google(&self, email: &str, tokens: OAuthTokens) -> Result<User, StoreError> {
        let key = email.trim().to_lowercase();
        let id = self
            .emails
            .entry(key.clone())
            .or_insert_with(|| UserId::new(uuid::Uuid::new_v4().simple().to_string()))
            .value()
            .clone();

        let mut entry = self
            .users
            .entry(id.clone())
            .or_insert_with(|| User::new(id, key));
        entry.google = Some(tokens);
        Ok(entry.value().clone())
    }

    async fn set_tokens(
        &self,
        user_id: &UserId,
        provider: Provider,
        tokens: OAuthTokens,
    ) -> Result<(), StoreError> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        user.set_tokens(provider, tokens);
        Ok(())
    }

    async fn try_begin_sync(&self, user_id: &UserId, source: Source) -> Result<bool, StoreError> {
        // The shard write lock held by get_mut makes check-and-set atomic.
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        if user.syncing.get(source) {
            return Ok(false);
        }
        user.syncing.set(source, true);
        Ok(true)
    }

    async fn finish_sync(&self, user_id: &UserId, source: Source) -> Result<(), StoreError> {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.syncing.set(source, false);
        }
        Ok(())
    }

    async fn reset_sync_flags(&self) -> Result<u64, StoreError> {
        let mut reset = 0;
        for mut user in self.users.iter_mut() {
            if user.syncing.any() {
                user.syncing = Default::default();
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn list_user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        let mut ids: Vec<UserId> = self.users.iter().map(|u| u.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn insert(&self, chunk: KnowledgeChunk) -> Result<InsertOutcome, StoreError> {
        match self.chunks.entry(chunk.unique_id.clone()) {
            Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(chunk);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn query(
        &self,
        user_id: &UserId,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .filter(|c| &c.user_id == user_id)
            .map(|c| ScoredChunk {
                score: cosine_similarity(vector, &c.embedding),
                chunk: c.value().clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.unique_id.cmp(&b.chunk.unique_id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn latest_timestamp(
        &self,
        user_id: &UserId,
        source: Source,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| &c.user_id == user_id && c.metadata.source == source)
            .map(|c| c.timestamp)
            .max())
    }

    async fn contains_external(
        &self,
        user_id: &UserId,
        source: Source,
        external_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.chunks.iter().any(|c| {
            &c.user_id == user_id
                && c.metadata.source == source
                && c.metadata.external_id == external_id
        }))
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, task: Task) -> Result<Task, StoreError> {
        match self.tasks.entry(task.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(task.id)),
            Entry::Vacant(slot) => {
                slot.insert(task.clone());
                Ok(task)
            }
        }
    }

    async fn pending(&self, user_id: &UserId, limit: usize) -> Result<Vec<Task>, StoreError> {
        let mut tasks = self.tasks_for(user_id);
        tasks.retain(|t| t.status == TaskStatus::Pending);
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn set_status(
        &self,
        user_id: &UserId,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<bool, StoreError> {
        match self.tasks.get_mut(task_id) {
            Some(mut task) if &task.user_id == user_id => {
                task.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl InstructionStore for MemoryStore {
    async fn add(&self, instruction: Instruction) -> Result<Instruction, StoreError> {
        self.instructions
            .insert(instruction.id.clone(), instruction.clone());
        Ok(instruction)
    }

    async fn list(&self, user_id: &UserId) -> Result<Vec<Instruction>, StoreError> {
        let mut list: Vec<Instruction> = self
            .instructions
            .iter()
            .filter(|i| &i.user_id == user_id)
            .map(|i| i.value().clone())
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkMetadata, InstructionCategory, TaskSource};
    use chrono::TimeZone;

    fn chunk(user: &str, external_id: &str, embedding: Vec<f32>, ts: i64) -> KnowledgeChunk {
        KnowledgeChunk::new(
            UserId::new(user),
            format!("content of {}", external_id),
            embedding,
            ChunkMetadata {
                source: Source::Mailbox,
                external_id: external_id.to_string(),
                kind: "email_chunk".to_string(),
                subject: None,
                client_identity: None,
                sequence: 0,
            },
            Utc.timestamp_opt(ts, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = MemoryStore::new();
        let c = chunk("u1", "m1", vec![1.0, 0.0], 100);

        assert_eq!(store.insert(c.clone()).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert(c).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.chunk_count(), 1);
    }

    #[tokio::test]
    async fn test_query_scoped_and_capped() {
        let store = MemoryStore::new();
        for i in 0..8 {
            store
                .insert(chunk("alice", &format!("a{}", i), vec![1.0, i as f32 * 0.1], 10))
                .await
                .unwrap();
        }
        store
            .insert(chunk("bob", "b0", vec![1.0, 0.0], 10))
            .await
            .unwrap();

        let results = store.query(&"alice".into(), &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.chunk.user_id.as_str() == "alice"));
        assert_eq!(results[0].chunk.metadata.external_id, "a0");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_query_ties_broken_by_unique_id() {
        let store = MemoryStore::new();
        for id in ["x", "y", "z"] {
            store.insert(chunk("u", id, vec![0.5, 0.5], 1)).await.unwrap();
        }
        let first = store.query(&"u".into(), &[1.0, 1.0], 3).await.unwrap();
        let second = store.query(&"u".into(), &[1.0, 1.0], 3).await.unwrap();
        let ids: Vec<_> = first.iter().map(|r| r.chunk.unique_id.clone()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_latest_timestamp_and_contains() {
        let store = MemoryStore::new();
        let user = UserId::new("u");
        assert!(store.latest_timestamp(&user, Source::Mailbox).await.unwrap().is_none());

        store.insert(chunk("u", "m1", vec![1.0], 100)).await.unwrap();
        store.insert(chunk("u", "m2", vec![1.0], 300)).await.unwrap();

        let latest = store.latest_timestamp(&user, Source::Mailbox).await.unwrap();
        assert_eq!(latest, Some(Utc.timestamp_opt(300, 0).unwrap()));
        assert!(store.latest_timestamp(&user, Source::Crm).await.unwrap().is_none());
        assert!(store.contains_external(&user, Source::Mailbox, "m2").await.unwrap());
        assert!(!store.contains_external(&user, Source::Calendar, "m2").await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_latch() {
        let store = MemoryStore::new();
        let user = store
            .upsert_google("a@example.com", OAuthTokens::new("tok"))
            .await
            .unwrap();

        assert!(store.try_begin_sync(&user.id, Source::Mailbox).await.unwrap());
        assert!(!store.try_begin_sync(&user.id, Source::Mailbox).await.unwrap());
        assert!(store.try_begin_sync(&user.id, Source::Crm).await.unwrap());

        assert_eq!(store.reset_sync_flags().await.unwrap(), 1);
        assert!(store.try_begin_sync(&user.id, Source::Mailbox).await.unwrap());
        store.finish_sync(&user.id, Source::Mailbox).await.unwrap();

        let reloaded = store.get(&user.id).await.unwrap().unwrap();
        assert!(!reloaded.syncing.any());
    }

    #[tokio::test]
    async fn test_upsert_google_reuses_user() {
        let store = MemoryStore::new();
        let first = store.upsert_google("A@example.com", OAuthTokens::new("one")).await.unwrap();
        let second = store.upsert_google("a@example.com", OAuthTokens::new("two")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.google.unwrap().access_token, "two");
        assert_eq!(store.list_user_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tasks_and_instructions() {
        let store = MemoryStore::new();
        let user = UserId::new("u");
        let task = store
            .create(Task::pending(user.clone(), "Call Bob", TaskSource::Manual))
            .await
            .unwrap();

        assert_eq!(store.pending(&user, 10).await.unwrap().len(), 1);
        assert!(store.set_status(&user, &task.id, TaskStatus::Completed).await.unwrap());
        assert!(!store.set_status(&"other".into(), &task.id, TaskStatus::Pending).await.unwrap());
        assert!(store.pending(&user, 10).await.unwrap().is_empty());

        store
            .add(Instruction::new(user.clone(), "Be brief", InstructionCategory::Personal))
            .await
            .unwrap();
        assert_eq!(store.list(&user).await.unwrap().len(), 1);
        assert!(store.list(&"other".into()).await.unwrap().is_empty());
    }
}
