//! Mock LLM backend for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::traits::*;

/// Scripted responses, consumed in order.
enum Scripted {
    Reply(CompletionResponse),
    RateLimited,
}

/// Mock backend for testing.
///
/// Replays a script of responses and records every request it receives.
/// Once the script runs out it answers with the fallback text.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    capabilities: ModelCapabilities,
    fallback: String,
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
    call_count: AtomicU32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            capabilities: ModelCapabilities::default(),
            fallback: "Mock response".to_string(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the text returned once the script is exhausted.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.fallback = content.into();
        self
    }

    /// Queue a plain text answer.
    pub fn then_text(self, content: impl Into<String>) -> Self {
        lock(&self.script).push_back(Scripted::Reply(CompletionResponse::text(content)));
        self
    }

    /// Queue a single tool call.
    pub fn then_tool(self, name: &str, arguments: serde_json::Value) -> Self {
        let id = format!("call_{}", lock(&self.script).len() + 1);
        self.then_tools(vec![ToolCall {
            id,
            name: name.to_string(),
            arguments: arguments.to_string(),
        }])
    }

    /// Queue a round with several tool calls.
    pub fn then_tools(self, calls: Vec<ToolCall>) -> Self {
        lock(&self.script).push_back(Scripted::Reply(CompletionResponse::tools(calls)));
        self
    }

    /// Queue a rate-limit error.
    pub fn then_rate_limited(self) -> Self {
        lock(&self.script).push_back(Scripted::RateLimited);
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Get the number of times complete was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable("Mock backend disabled".to_string()));
        }

        // Estimate token counts
        let prompt_tokens: u32 = request
            .messages
            .iter()
            .map(|m| m.content.len() as u32 / 4)
            .sum();
        lock(&self.requests).push(request);

        let next = lock(&self.script).pop_front();
        let mut response = match next {
            Some(Scripted::Reply(response)) => response,
            Some(Scripted::RateLimited) => {
                return Err(LlmError::RateLimited { retry_after_ms: None })
            }
            None => CompletionResponse::text(self.fallback.clone()),
        };
        response.usage = Usage {
            prompt_tokens,
            completion_tokens: response.content.len() as u32 / 4,
        };
        Ok(response)
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prompt(text: &str) -> CompletionRequest {
        CompletionRequest::new(vec![Message::user(text)])
    }

    #[tokio::test]
    async fn test_mock_backend() {
        let backend = MockBackend::new("test-model").with_response("Hello, world!");

        assert!(backend.is_available().await);
        assert_eq!(backend.call_count(), 0);

        let response = backend
            .complete(prompt("Hi"))
            .await
            .unwrap();

        assert_eq!(response.content, "Hello, world!");
        assert_eq!(backend.call_count(), 1);
        assert_eq!(backend.requests()[0].messages[0].content, "Hi");
    }

    #[tokio::test]
    async fn test_script_replayed_in_order() {
        let backend = MockBackend::default()
            .then_tool("create_task", json!({"title": "x"}))
            .then_text("done");

        let first = backend.complete(prompt("a")).await.unwrap();
        assert_eq!(first.tool_calls[0].name, "create_task");
        assert_eq!(first.tool_calls[0].id, "call_1");

        let second = backend.complete(prompt("b")).await.unwrap();
        assert_eq!(second.content, "done");

        let third = backend.complete(prompt("c")).await.unwrap();
        assert_eq!(third.content, "Mock response");
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let backend = MockBackend::new("test-model").with_available(false);

        assert!(!backend.is_available().await);

        let result = backend.complete(prompt("Hi")).await;
        assert!(result.is_err());
    }
}
