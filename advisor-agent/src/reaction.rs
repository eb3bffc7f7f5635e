//! Proactive reactions to freshly ingested chunks.
//!
//! The sync pipeline hands every stored chunk to a bounded channel; a single
//! [`ReactionWorker`] drains it and runs one agent pass per chunk, in arrival
//! order. A failed reaction is logged and the worker moves on.

use std::sync::Arc;

use advisor_core::{KnowledgeChunk, ReactionJob, TaskSource, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::agent::{AgentError, AgentLoop, AgentOutcome};
use crate::backend::Message;
use crate::tools::ToolScope;

/// Pending tasks shown to the model.
pub const PENDING_TASKS_SHOWN: usize = 10;

/// Default capacity of the reaction queue.
pub const DEFAULT_QUEUE_SIZE: usize = 256;

/// Bounded queue between the sync pipeline and the worker.
pub fn reaction_channel(capacity: usize) -> (mpsc::Sender<ReactionJob>, mpsc::Receiver<ReactionJob>) {
    mpsc::channel(capacity.max(1))
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReactionOutcome {
    /// The model decided nothing needs doing.
    NoAction,
    /// At least one tool ran.
    Acted { tools: Vec<String> },
    /// The round cap was reached.
    Inconclusive,
}

pub struct ReactionEngine {
    agent: Arc<AgentLoop>,
}

impl ReactionEngine {
    pub fn new(agent: Arc<AgentLoop>) -> Self {
        Self { agent }
    }

    async fn prompt(&self, user_id: &UserId, chunk: &KnowledgeChunk) -> Result<String, AgentError> {
        let tasks = self
            .agent
            .tools()
            .tasks()
            .pending(user_id, PENDING_TASKS_SHOWN)
            .await?;

        let meta = &chunk.metadata;
        let mut prompt = String::from("New data has arrived from the advisor's accounts.\n\n");
        prompt.push_str("ORIGIN:\n");
        prompt.push_str(&format!("- source: {}\n", meta.source));
        prompt.push_str(&format!("- type: {}\n", meta.kind));
        prompt.push_str(&format!("- date: {}\n", chunk.timestamp.to_rfc3339()));
        if let Some(from) = &meta.client_identity {
            prompt.push_str(&format!("- from: {}\n", from));
        }
        if let Some(subject) = &meta.subject {
            prompt.push_str(&format!("- subject: {}\n", subject));
        }

        prompt.push_str("\nCONTENT:\n");
        prompt.push_str(&chunk.content);

        prompt.push_str("\n\nPENDING TASKS:\n");
        if tasks.is_empty() {
            prompt.push_str("(none)\n");
        }
        for task in &tasks {
            prompt.push_str(&format!("- [{}] {}", task.id, task.title));
            if let Some(due) = task.due_date {
                prompt.push_str(&format!(" (due {})", due.to_rfc3339()));
            }
            prompt.push('\n');
        }

        prompt.push_str(
            "\nFollowing the standing instructions, decide whether this data requires action. \
             If it creates a follow-up, call create_task. If it resolves one of the pending \
             tasks, call complete_task with its ID. Otherwise reply exactly \"No action\".",
        );
        Ok(prompt)
    }

    /// Run one agent pass over a stored chunk.
    pub async fn react(
        &self,
        user_id: &UserId,
        chunk: &KnowledgeChunk,
    ) -> Result<ReactionOutcome, AgentError> {
        let prompt = self.prompt(user_id, chunk).await?;
        let scope = ToolScope::new(user_id.clone(), TaskSource::from(chunk.metadata.source));

        let outcome = self
            .agent
            .run(&scope, "", &[Message::user(prompt)])
            .await?;

        Ok(match outcome {
            AgentOutcome::Answered { tool_calls, .. } if tool_calls.is_empty() => {
                ReactionOutcome::NoAction
            }
            AgentOutcome::Answered { tool_calls, .. } => ReactionOutcome::Acted {
                tools: tool_calls.into_iter().map(|t| t.name).collect(),
            },
            AgentOutcome::Inconclusive { .. } => ReactionOutcome::Inconclusive,
        })
    }
}

/// Counters returned when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionStats {
    pub processed: usize,
    pub acted: usize,
    pub no_action: usize,
    pub inconclusive: usize,
    pub failed: usize,
}

/// Single consumer of the reaction queue.
pub struct ReactionWorker {
    engine: Arc<ReactionEngine>,
    receiver: mpsc::Receiver<ReactionJob>,
}

impl ReactionWorker {
    pub fn new(engine: Arc<ReactionEngine>, receiver: mpsc::Receiver<ReactionJob>) -> Self {
        Self { engine, receiver }
    }

    /// Process jobs one at a time until every sender is dropped.
    pub async fn run(mut self) -> ReactionStats {
        let mut stats = ReactionStats::default();
        info!("Reaction worker started");

        while let Some(job) = self.receiver.recv().await {
            stats.processed += 1;
            let unique_id = job.chunk.unique_id.clone();

            match self.engine.react(&job.user_id, &job.chunk).await {
                Ok(ReactionOutcome::NoAction) => {
                    stats.no_action += 1;
                    debug!(user_id = %job.user_id, chunk = %unique_id, "No action");
                }
                Ok(ReactionOutcome::Acted { tools }) => {
                    stats.acted += 1;
                    info!(
                        user_id = %job.user_id,
                        chunk = %unique_id,
                        tools = ?tools,
                        "Reaction acted"
                    );
                }
                Ok(ReactionOutcome::Inconclusive) => {
                    stats.inconclusive += 1;
                    warn!(user_id = %job.user_id, chunk = %unique_id, "Reaction inconclusive");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(user_id = %job.user_id, chunk = %unique_id, error = %e, "Reaction failed");
                }
            }
        }

        info!(
            processed = stats.processed,
            acted = stats.acted,
            failed = stats.failed,
            "Reaction worker stopped"
        );
        stats
    }
}
