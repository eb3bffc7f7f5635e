//! Advisor Agent - answering questions and acting on new data
//!
//! A bounded tool-calling loop over an OpenAI-compatible chat backend.
//!
//! - [`AskService`] embeds the latest question, retrieves the closest
//!   chunks and runs the loop with them as context.
//! - [`ReactionWorker`] drains the ingestion queue and runs one loop per
//!   stored chunk, deciding whether a task should be created or completed.
//! - [`ToolExecutor`] carries out the closed set of [`ActionTool`]s against
//!   the stores and connectors.
//!
//! ```text
//!  question ──► AskService ──► retrieve ──┐
//!                                         ▼
//!  ReactionJob ──► ReactionWorker ──► AgentLoop ◄──► LlmBackend
//!                                         │
//!                                         ▼
//!                                   ToolExecutor ──► stores / connectors
//! ```

pub mod agent;
pub mod backend;
pub mod context;
pub mod reaction;
pub mod service;
pub mod tools;

pub use agent::{AgentConfig, AgentError, AgentLoop, AgentOutcome};
pub use backend::{
    CompletionRequest, CompletionResponse, LlmBackend, LlmError, Message, MessageRole,
    MockBackend, OpenAiBackend, ToolCall,
};
pub use context::{format_context, NO_CONTEXT};
pub use reaction::{
    reaction_channel, ReactionEngine, ReactionOutcome, ReactionStats, ReactionWorker,
};
pub use service::{AskService, ServiceError, INCONCLUSIVE_ANSWER, RATE_LIMITED_ANSWER};
pub use tools::{ActionTool, ToolError, ToolExecutor, ToolInvocation, ToolScope};
