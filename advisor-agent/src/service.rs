//! The chat entry point: retrieve, then run the agent.

use std::sync::Arc;

use advisor_core::{EmbedError, StoreError, TaskSource, UserId};
use tracing::{info, warn};

use crate::agent::{AgentError, AgentLoop, AgentOutcome};
use crate::backend::{LlmError, Message, MessageRole};
use crate::context::format_context;
use crate::tools::{ToolScope, SEARCH_RESULTS};

/// Answer given when the model provider is rate limiting us.
pub const RATE_LIMITED_ANSWER: &str =
    "The AI service is receiving too many requests right now. Please try again later.";

/// Answer given when the agent ran out of rounds.
pub const INCONCLUSIVE_ANSWER: &str =
    "I wasn't able to finish that request. Please try rephrasing it or breaking it into smaller steps.";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

pub struct AskService {
    agent: Arc<AgentLoop>,
}

impl AskService {
    pub fn new(agent: Arc<AgentLoop>) -> Self {
        Self { agent }
    }

    /// Answer `message` for `user_id`, given the prior conversation.
    ///
    /// The retrieval query is the latest user message; an empty conversation
    /// yields an empty answer.
    pub async fn ask(
        &self,
        user_id: &UserId,
        message: &str,
        history: &[Message],
    ) -> Result<String, ServiceError> {
        let mut conversation = history.to_vec();
        if !message.trim().is_empty() {
            conversation.push(Message::user(message));
        }

        let question = match conversation
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
        {
            Some(m) => m.content.clone(),
            None => return Ok(String::new()),
        };

        let tools = self.agent.tools();
        let vector = tools.embedder().embed(&question).await?;
        let results = tools
            .knowledge()
            .query(user_id, &vector, SEARCH_RESULTS)
            .await?;
        info!(user_id = %user_id, hits = results.len(), "Retrieved context");
        let context = format_context(&results);

        let scope = ToolScope::new(user_id.clone(), TaskSource::Manual);
        match self.agent.run(&scope, &context, &conversation).await {
            Ok(AgentOutcome::Answered { text, .. }) => Ok(text),
            Ok(AgentOutcome::Inconclusive { .. }) => Ok(INCONCLUSIVE_ANSWER.to_string()),
            Err(AgentError::Llm(LlmError::RateLimited { retry_after_ms })) => {
                warn!(user_id = %user_id, retry_after_ms = ?retry_after_ms, "Model rate limited");
                Ok(RATE_LIMITED_ANSWER.to_string())
            }
            Err(e) => Err(e.into()),
        }
    }
}
