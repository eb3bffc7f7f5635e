//! MongoDB implementations of the persistence contracts.

use async_trait::async_trait;
use bson::{doc, Bson, DateTime, Document};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::options::ReturnDocument;
use tracing::debug;

use advisor_core::{
    InsertOutcome, Instruction, InstructionStore, KnowledgeChunk, KnowledgeStore, OAuthTokens,
    Provider, ScoredChunk, Source, StoreError, Task, TaskStatus, TaskStore, User, UserId,
    UserStore,
};

use crate::db::mongo::{db_error, MongoClient, MongoCollection};
use crate::db::schemas::{
    sync_flag_path, InstructionDoc, KnowledgeDoc, TaskDoc, TokenDoc, UserDoc,
    INSTRUCTION_COLLECTION, KNOWLEDGE_COLLECTION, TASK_COLLECTION, USER_COLLECTION,
};

/// Candidates the vector index scans per requested result.
const CANDIDATES_PER_RESULT: usize = 20;
const MIN_CANDIDATES: usize = 100;

fn to_bson<T: serde::Serialize>(value: &T) -> Result<Bson, StoreError> {
    bson::to_bson(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn provider_field(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => "google",
        Provider::Hubspot => "hubspot",
    }
}

/// All four stores over one database.
#[derive(Clone)]
pub struct MongoStore {
    users: MongoCollection<UserDoc>,
    knowledge: MongoCollection<KnowledgeDoc>,
    tasks: MongoCollection<TaskDoc>,
    instructions: MongoCollection<InstructionDoc>,
    vector_index: String,
}

impl MongoStore {
    /// Open the collections and apply their indexes.
    pub async fn open(client: &MongoClient, vector_index: &str) -> Result<Self, StoreError> {
        Ok(Self {
            users: client.collection(USER_COLLECTION).await?,
            knowledge: client.collection(KNOWLEDGE_COLLECTION).await?,
            tasks: client.collection(TASK_COLLECTION).await?,
            instructions: client.collection(INSTRUCTION_COLLECTION).await?,
            vector_index: vector_index.to_string(),
        })
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .find_one(doc! { "user_id": user_id.as_str() })
            .await?
            .map(User::from))
    }

    async fn upsert_google(&self, email: &str, tokens: OAuthTokens) -> Result<User, StoreError> {
        let email = email.trim().to_lowercase();
        let now = DateTime::now();
        let update = doc! {
            "$set": {
                "google": to_bson(&TokenDoc::from(tokens))?,
                "updated_at": now,
            },
            "$setOnInsert": {
                "user_id": uuid::Uuid::new_v4().simple().to_string(),
                "syncing": to_bson(&advisor_core::SyncFlags::default())?,
                "created_at": now,
            },
        };

        self.users
            .inner()
            .find_one_and_update(doc! { "email": &email }, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| db_error("Upsert failed", e))?
            .map(User::from)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", email)))
    }

    async fn set_tokens(
        &self,
        user_id: &UserId,
        provider: Provider,
        tokens: OAuthTokens,
    ) -> Result<(), StoreError> {
        let result = self
            .users
            .inner()
            .update_one(
                doc! { "user_id": user_id.as_str() },
                doc! { "$set": {
                    provider_field(provider): to_bson(&TokenDoc::from(tokens))?,
                    "updated_at": DateTime::now(),
                } },
            )
            .await
            .map_err(|e| db_error("Update failed", e))?;

        if result.matched_count == 0 {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }

    async fn try_begin_sync(&self, user_id: &UserId, source: Source) -> Result<bool, StoreError> {
        let flag = sync_flag_path(source);
        // The filter only matches while the latch is free, so the update is
        // the compare-and-set.
        let result = self
            .users
            .inner()
            .update_one(
                doc! { "user_id": user_id.as_str(), &flag: { "$ne": true } },
                doc! { "$set": { &flag: true } },
            )
            .await
            .map_err(|e| db_error("Update failed", e))?;

        if result.modified_count == 1 {
            return Ok(true);
        }
        match self.get(user_id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("user {}", user_id))),
        }
    }

    async fn finish_sync(&self, user_id: &UserId, source: Source) -> Result<(), StoreError> {
        self.users
            .inner()
            .update_one(
                doc! { "user_id": user_id.as_str() },
                doc! { "$set": { sync_flag_path(source): false } },
            )
            .await
            .map_err(|e| db_error("Update failed", e))?;
        Ok(())
    }

    async fn reset_sync_flags(&self) -> Result<u64, StoreError> {
        let any_set: Vec<Document> = Source::ALL
            .iter()
            .map(|s| doc! { sync_flag_path(*s): true })
            .collect();

        let result = self
            .users
            .inner()
            .update_many(
                doc! { "$or": any_set },
                doc! { "$set": { "syncing": to_bson(&advisor_core::SyncFlags::default())? } },
            )
            .await
            .map_err(|e| db_error("Update failed", e))?;
        Ok(result.modified_count)
    }

    async fn list_user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        Ok(self
            .users
            .find_many(doc! {}, doc! { "user_id": 1 }, None)
            .await?
            .into_iter()
            .map(|u| UserId::new(u.user_id))
            .collect())
    }
}

#[async_trait]
impl KnowledgeStore for MongoStore {
    async fn insert(&self, chunk: KnowledgeChunk) -> Result<InsertOutcome, StoreError> {
        match self.knowledge.insert_one(&KnowledgeDoc::from(&chunk)).await {
            Ok(()) => Ok(InsertOutcome::Inserted),
            Err(StoreError::Duplicate(_)) => {
                debug!(unique_id = %chunk.unique_id, "Chunk already stored");
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }

    async fn query(
        &self,
        user_id: &UserId,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vector: Vec<Bson> = vector.iter().map(|v| Bson::Double(f64::from(*v))).collect();
        let candidates = (k * CANDIDATES_PER_RESULT).max(MIN_CANDIDATES);

        let pipeline = vec![
            doc! {
                "$vectorSearch": {
                    "index": &self.vector_index,
                    "path": "embedding",
                    "queryVector": query_vector,
                    "numCandidates": candidates as i64,
                    "limit": k as i64,
                    "filter": { "user_id": user_id.as_str() },
                }
            },
            doc! { "$addFields": { "score": { "$meta": "vectorSearchScore" } } },
            doc! { "$sort": { "score": -1, "unique_id": 1 } },
        ];

        let documents: Vec<Document> = self
            .knowledge
            .inner()
            .aggregate(pipeline)
            .await
            .map_err(|e| db_error("Vector search failed", e))?
            .try_collect()
            .await
            .map_err(|e| db_error("Error reading search results", e))?;

        documents
            .into_iter()
            .map(|mut document| {
                let score = document.get_f64("score").unwrap_or(0.0) as f32;
                document.remove("score");
                let chunk: KnowledgeDoc = bson::from_document(document)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(ScoredChunk {
                    chunk: chunk.into(),
                    score,
                })
            })
            .collect()
    }

    async fn latest_timestamp(
        &self,
        user_id: &UserId,
        source: Source,
    ) -> Result<Option<chrono::DateTime<Utc>>, StoreError> {
        let latest = self
            .knowledge
            .inner()
            .find_one(doc! { "user_id": user_id.as_str(), "metadata.source": source.as_str() })
            .sort(doc! { "timestamp": -1 })
            .await
            .map_err(|e| db_error("Find failed", e))?;
        Ok(latest.map(|doc| doc.timestamp.to_chrono()))
    }

    async fn contains_external(
        &self,
        user_id: &UserId,
        source: Source,
        external_id: &str,
    ) -> Result<bool, StoreError> {
        let count = self
            .knowledge
            .inner()
            .count_documents(doc! {
                "user_id": user_id.as_str(),
                "metadata.source": source.as_str(),
                "metadata.external_id": external_id,
            })
            .limit(1)
            .await
            .map_err(|e| db_error("Count failed", e))?;
        Ok(count > 0)
    }
}

#[async_trait]
impl TaskStore for MongoStore {
    async fn create(&self, task: Task) -> Result<Task, StoreError> {
        self.tasks.insert_one(&TaskDoc::from(&task)).await?;
        Ok(task)
    }

    async fn pending(&self, user_id: &UserId, limit: usize) -> Result<Vec<Task>, StoreError> {
        let status = to_bson(&TaskStatus::Pending)?;
        Ok(self
            .tasks
            .find_many(
                doc! { "user_id": user_id.as_str(), "status": status },
                doc! { "created_at": 1, "task_id": 1 },
                Some(limit as i64),
            )
            .await?
            .into_iter()
            .map(Task::from)
            .collect())
    }

    async fn set_status(
        &self,
        user_id: &UserId,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<bool, StoreError> {
        let result = self
            .tasks
            .inner()
            .update_one(
                doc! { "user_id": user_id.as_str(), "task_id": task_id },
                doc! { "$set": { "status": to_bson(&status)? } },
            )
            .await
            .map_err(|e| db_error("Update failed", e))?;
        Ok(result.matched_count > 0)
    }
}

#[async_trait]
impl InstructionStore for MongoStore {
    async fn add(&self, instruction: Instruction) -> Result<Instruction, StoreError> {
        self.instructions
            .insert_one(&InstructionDoc::from(&instruction))
            .await?;
        Ok(instruction)
    }

    async fn list(&self, user_id: &UserId) -> Result<Vec<Instruction>, StoreError> {
        Ok(self
            .instructions
            .find_many(
                doc! { "user_id": user_id.as_str() },
                doc! { "created_at": 1 },
                None,
            )
            .await?
            .into_iter()
            .map(Instruction::from)
            .collect())
    }
}
