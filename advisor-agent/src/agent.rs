//! Bounded tool-calling loop.
//!
//! ```text
//! AwaitingModel ──text──────► Done
//!      ▲  │
//!      │  └──tool calls──► ExecutingTools
//!      └──────results──────────┘
//! ```
//!
//! Tool rounds run strictly one after another and each round's results are
//! appended in call order before the model is asked again. The number of
//! model rounds is capped; hitting the cap yields [`AgentOutcome::Inconclusive`].

use std::sync::Arc;

use advisor_core::StoreError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{CompletionRequest, LlmBackend, LlmError, Message, MessageRole};
use crate::tools::{definitions, ToolExecutor, ToolInvocation, ToolScope};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a proactive Financial Advisor AI. \
Answer using the context from the advisor's Gmail, Calendar and HubSpot data, and use the \
available tools when the advisor asks you to act.";

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Model error: {0}")]
    Llm(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Nothing to answer: history has no user message")]
    NoQuestion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model calls per run
    pub max_rounds: usize,
    /// Most recent history entries kept
    pub history_window: usize,
    pub system_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: 8,
            history_window: 5,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: Some(0.2),
            max_tokens: None,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    /// The model produced a plain answer.
    Answered {
        text: String,
        tool_calls: Vec<ToolInvocation>,
        rounds: usize,
    },
    /// The round cap was reached while the model was still calling tools.
    Inconclusive {
        tool_calls: Vec<ToolInvocation>,
        rounds: usize,
    },
}

impl AgentOutcome {
    pub fn tool_calls(&self) -> &[ToolInvocation] {
        match self {
            AgentOutcome::Answered { tool_calls, .. } | AgentOutcome::Inconclusive { tool_calls, .. } => {
                tool_calls
            }
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            AgentOutcome::Answered { text, .. } => Some(text),
            AgentOutcome::Inconclusive { .. } => None,
        }
    }
}

/// Keep the last `window` user/assistant entries, oldest dropped first.
pub fn window_history(history: &[Message], window: usize) -> Vec<Message> {
    let conversational: Vec<&Message> = history
        .iter()
        .filter(|m| matches!(m.role, MessageRole::User | MessageRole::Assistant))
        .collect();
    let skip = conversational.len().saturating_sub(window);
    conversational
        .into_iter()
        .skip(skip)
        .map(|m| Message {
            role: m.role,
            content: m.content.clone(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        })
        .collect()
}

pub struct AgentLoop {
    backend: Arc<dyn LlmBackend>,
    tools: Arc<ToolExecutor>,
    config: AgentConfig,
}

impl AgentLoop {
    pub fn new(backend: Arc<dyn LlmBackend>, tools: Arc<ToolExecutor>) -> Self {
        if !backend.capabilities().supports_function_calling {
            warn!(model = backend.id(), "Model does not advertise tool calling; no actions will run");
        }
        Self {
            backend,
            tools,
            config: AgentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &Arc<ToolExecutor> {
        &self.tools
    }

    /// System prompt with the user's standing instructions appended.
    async fn system_prompt(&self, scope: &ToolScope) -> Result<String, AgentError> {
        let instructions = self.tools.instructions().list(&scope.user_id).await?;
        if instructions.is_empty() {
            return Ok(self.config.system_prompt.clone());
        }

        let mut prompt = self.config.system_prompt.clone();
        prompt.push_str("\n\nStanding instructions you must follow:");
        for instruction in &instructions {
            prompt.push_str(&format!(
                "\n- [{}] {}",
                instruction.category.as_str(),
                instruction.content
            ));
        }
        Ok(prompt)
    }

    /// Run the loop for one request.
    ///
    /// `context` is injected as a system message when non-empty; `history`
    /// is cut to the configured window.
    pub async fn run(
        &self,
        scope: &ToolScope,
        context: &str,
        history: &[Message],
    ) -> Result<AgentOutcome, AgentError> {
        let mut messages = Vec::new();
        if !context.trim().is_empty() {
            messages.push(Message::system(format!(
                "Context from HubSpot/Gmail/Calendar:\n{}",
                context
            )));
        }
        messages.extend(window_history(history, self.config.history_window));

        let system_prompt = self.system_prompt(scope).await?;
        let tool_definitions = definitions();
        let mut invocations = Vec::new();

        for round in 1..=self.config.max_rounds {
            let mut request = CompletionRequest::new(messages.clone())
                .with_system(system_prompt.clone())
                .with_tools(tool_definitions.clone());
            request.max_tokens = self.config.max_tokens;
            if let Some(t) = self.config.temperature {
                request = request.with_temperature(t);
            }

            let response = self.backend.complete(request).await?;

            if response.tool_calls.is_empty() {
                info!(
                    user_id = %scope.user_id,
                    rounds = round,
                    tools = invocations.len(),
                    "Agent answered"
                );
                return Ok(AgentOutcome::Answered {
                    text: response.content,
                    tool_calls: invocations,
                    rounds: round,
                });
            }

            debug!(
                user_id = %scope.user_id,
                round,
                calls = response.tool_calls.len(),
                "Model requested tools"
            );
            messages.push(Message::assistant_tool_calls(
                response.content,
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let invocation = self.tools.dispatch(scope, call).await;
                messages.push(Message::tool_result(&invocation.call_id, &invocation.result));
                invocations.push(invocation);
            }
        }

        warn!(
            user_id = %scope.user_id,
            rounds = self.config.max_rounds,
            "Agent hit the round cap without answering"
        );
        Ok(AgentOutcome::Inconclusive {
            tool_calls: invocations,
            rounds: self.config.max_rounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_window_drops_oldest() {
        let history: Vec<Message> = (0..8)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("q{}", i))
                } else {
                    Message::assistant(format!("a{}", i))
                }
            })
            .chain(std::iter::once(Message::system("ignored")))
            .collect();

        let windowed = window_history(&history, 5);
        let contents: Vec<&str> = windowed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a3", "q4", "a5", "q6", "a7"]);
    }

    #[test]
    fn test_history_shorter_than_window() {
        let history = vec![Message::user("only")];
        assert_eq!(window_history(&history, 5).len(), 1);
        assert!(window_history(&[], 5).is_empty());
    }
}
