//! Task and instruction document schemas

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use advisor_core::{
    Instruction, InstructionCategory, Task, TaskPriority, TaskSource, TaskStatus, UserId,
};

use crate::db::mongo::IntoIndexes;

/// Collection name for tasks
pub const TASK_COLLECTION: &str = "tasks";

/// Collection name for standing instructions
pub const INSTRUCTION_COLLECTION: &str = "instructions";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaskDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Id the agent refers to in `complete_task`
    pub task_id: String,
    pub user_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub source: TaskSource,
    pub created_at: DateTime,
}

impl From<&Task> for TaskDoc {
    fn from(task: &Task) -> Self {
        Self {
            _id: None,
            task_id: task.id.clone(),
            user_id: task.user_id.as_str().to_string(),
            title: task.title.clone(),
            details: task.details.clone(),
            due_date: task.due_date.map(DateTime::from_chrono),
            status: task.status,
            priority: task.priority,
            source: task.source,
            created_at: DateTime::from_chrono(task.created_at),
        }
    }
}

impl From<TaskDoc> for Task {
    fn from(doc: TaskDoc) -> Self {
        Self {
            id: doc.task_id,
            user_id: UserId::new(doc.user_id),
            title: doc.title,
            details: doc.details,
            due_date: doc.due_date.map(|d| d.to_chrono()),
            status: doc.status,
            priority: doc.priority,
            source: doc.source,
            created_at: doc.created_at.to_chrono(),
        }
    }
}

impl IntoIndexes for TaskDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "task_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("task_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_id": 1, "status": 1, "created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_status_created".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InstructionDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub instruction_id: String,
    pub user_id: String,
    pub content: String,
    pub category: InstructionCategory,
    pub created_at: DateTime,
}

impl From<&Instruction> for InstructionDoc {
    fn from(instruction: &Instruction) -> Self {
        Self {
            _id: None,
            instruction_id: instruction.id.clone(),
            user_id: instruction.user_id.as_str().to_string(),
            content: instruction.content.clone(),
            category: instruction.category,
            created_at: DateTime::from_chrono(instruction.created_at),
        }
    }
}

impl From<InstructionDoc> for Instruction {
    fn from(doc: InstructionDoc) -> Self {
        Self {
            id: doc.instruction_id,
            user_id: UserId::new(doc.user_id),
            content: doc.content,
            category: doc.category,
            created_at: doc.created_at.to_chrono(),
        }
    }
}

impl IntoIndexes for InstructionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1, "created_at": 1 },
            Some(
                IndexOptions::builder()
                    .name("user_created".to_string())
                    .build(),
            ),
        )]
    }
}
