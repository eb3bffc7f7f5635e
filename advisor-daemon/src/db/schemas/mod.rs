//! Database schemas for advisord
//!
//! MongoDB document structures for users, knowledge chunks, tasks and
//! standing instructions.

mod knowledge;
mod task;
mod user;

pub use knowledge::{KnowledgeDoc, KNOWLEDGE_COLLECTION};
pub use task::{InstructionDoc, TaskDoc, INSTRUCTION_COLLECTION, TASK_COLLECTION};
pub use user::{sync_flag_path, TokenDoc, UserDoc, USER_COLLECTION};
