//! Completion provider seam.
//!
//! Every model call in the pipeline goes through [`CompletionProvider`]:
//! the complexity oracle, plan generation, the execution loop and error
//! analysis. The wire protocol stays behind the trait; [`openai`] is the
//! bundled OpenAI-compatible implementation.

pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use routing::router::{OracleError, TierOracle};
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

pub use openai::OpenAiProvider;

// ── Messages ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One chat message in provider-neutral form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// Calls the assistant made in this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Set on `Tool` messages: the call this result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::Assistant, content)
    }

    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::plain(MessageRole::Assistant, content)
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::plain(MessageRole::Tool, content)
        }
    }
}

/// Tool description advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// A single user message, no tools.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::user(text)])
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A finished, non-streamed reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// One piece of a streamed reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderChunk {
    Text(String),
    ToolCall(ToolCallRequest),
}

pub type ChunkStream = BoxStream<'static, Result<ProviderChunk, ProviderError>>;

// ── Trait ────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;

    /// Stream the next step. The default replays [`complete`](Self::complete)
    /// as one text chunk followed by its tool calls.
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let completion = self.complete(request).await?;
        Ok(completion_chunks(completion))
    }
}

/// Split a finished completion into stream chunks.
pub fn completion_chunks(completion: Completion) -> ChunkStream {
    let mut chunks = Vec::with_capacity(1 + completion.tool_calls.len());
    if !completion.text.is_empty() {
        chunks.push(Ok(ProviderChunk::Text(completion.text)));
    }
    chunks.extend(
        completion
            .tool_calls
            .into_iter()
            .map(|call| Ok(ProviderChunk::ToolCall(call))),
    );
    stream::iter(chunks).boxed()
}

pub type SharedProvider = Arc<dyn CompletionProvider>;

// ── Oracle adapter ───────────────────────────────────────────────────────────

/// Answers the classifier's tier question with a plain completion.
pub struct ProviderOracle {
    provider: SharedProvider,
}

impl ProviderOracle {
    pub fn new(provider: SharedProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TierOracle for ProviderOracle {
    async fn estimate(&self, prompt: &str) -> Result<String, OracleError> {
        let request = CompletionRequest::prompt(prompt).with_temperature(0.0);
        self.provider
            .complete(request)
            .await
            .map(|c| c.text)
            .map_err(|e| match e {
                ProviderError::Unavailable(msg) => OracleError::Unavailable(msg),
                other => OracleError::Request(other.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    #[async_trait]
    impl CompletionProvider for Canned {
        async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
            Ok(Completion {
                text: self.0.to_string(),
                tool_calls: vec![ToolCallRequest {
                    id: "call_1".into(),
                    name: "get_current_time".into(),
                    arguments: serde_json::json!({}),
                }],
            })
        }
    }

    #[tokio::test]
    async fn default_stream_replays_completion() {
        let chunks: Vec<_> = Canned("checking")
            .stream(CompletionRequest::prompt("time?"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &ProviderChunk::Text("checking".into())
        );
        assert!(matches!(
            chunks[1].as_ref().unwrap(),
            ProviderChunk::ToolCall(call) if call.name == "get_current_time"
        ));
    }

    #[tokio::test]
    async fn oracle_returns_reply_text() {
        let oracle = ProviderOracle::new(Arc::new(Canned("3")));
        assert_eq!(oracle.estimate("rate this").await.unwrap(), "3");
    }

    #[test]
    fn tool_result_message_carries_call_id() {
        let msg = ChatMessage::tool_result("call_9", "ok");
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_9"));
    }
}
