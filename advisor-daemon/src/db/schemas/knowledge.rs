//! Knowledge chunk document schema
//!
//! Similarity search runs through an Atlas Vector Search index that has to
//! be created outside the driver:
//!
//! ```json
//! {
//!   "fields": [
//!     { "type": "vector", "path": "embedding", "numDimensions": 1536, "similarity": "cosine" },
//!     { "type": "filter", "path": "user_id" }
//!   ]
//! }
//! ```

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use advisor_core::{ChunkMetadata, KnowledgeChunk, UserId};

use crate::db::mongo::IntoIndexes;

/// Collection name for knowledge chunks
pub const KNOWLEDGE_COLLECTION: &str = "knowledge";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct KnowledgeDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub unique_id: String,
    pub user_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,

    /// Origin event time; the high-water mark is the max of this field
    pub timestamp: DateTime,
    pub created_at: DateTime,
}

impl From<&KnowledgeChunk> for KnowledgeDoc {
    fn from(chunk: &KnowledgeChunk) -> Self {
        Self {
            _id: None,
            unique_id: chunk.unique_id.clone(),
            user_id: chunk.user_id.as_str().to_string(),
            content: chunk.content.clone(),
            embedding: chunk.embedding.clone(),
            metadata: chunk.metadata.clone(),
            timestamp: DateTime::from_chrono(chunk.timestamp),
            created_at: DateTime::from_chrono(chunk.created_at),
        }
    }
}

impl From<KnowledgeDoc> for KnowledgeChunk {
    fn from(doc: KnowledgeDoc) -> Self {
        Self {
            unique_id: doc.unique_id,
            user_id: UserId::new(doc.user_id),
            content: doc.content,
            embedding: doc.embedding,
            metadata: doc.metadata,
            timestamp: doc.timestamp.to_chrono(),
            created_at: doc.created_at.to_chrono(),
        }
    }
}

impl IntoIndexes for KnowledgeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Idempotency guard
            (
                doc! { "unique_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("unique_id_unique".to_string())
                        .build(),
                ),
            ),
            // High-water mark aggregation
            (
                doc! { "user_id": 1, "metadata.source": 1, "timestamp": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_source_timestamp".to_string())
                        .build(),
                ),
            ),
            // Already-ingested check
            (
                doc! { "user_id": 1, "metadata.source": 1, "metadata.external_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_source_external".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
