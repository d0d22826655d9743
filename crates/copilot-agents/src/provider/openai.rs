//! OpenAI-compatible `/chat/completions` adapter.
//!
//! Works against any server speaking the OpenAI chat protocol (OpenAI,
//! DeepSeek, llama.cpp, vLLM, Ollama's `/v1`). Streaming uses SSE; tool-call
//! fragments are reassembled before they are handed to the engine.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{
    ChatMessage, ChunkStream, Completion, CompletionProvider, CompletionRequest, MessageRole,
    ProviderChunk, ToolCallRequest,
};
use crate::config::ProviderConfig;
use crate::errors::ProviderError;

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self.client.post(self.endpoint()).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let body = request_body(&self.model, self.temperature, &request, false);
        debug!(model = %self.model, messages = request.messages.len(), "chat completion");
        let response = self.post(&body).await?;
        let reply: ChatResponse = response.json().await?;
        decode_completion(reply)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let body = request_body(&self.model, self.temperature, &request, true);
        debug!(model = %self.model, messages = request.messages.len(), "streaming chat completion");
        let response = self.post(&body).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_sse(response, tx));

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

/// Forward SSE deltas as chunks until `[DONE]`, the end of the body, or an error.
async fn pump_sse(
    response: reqwest::Response,
    tx: mpsc::UnboundedSender<Result<ProviderChunk, ProviderError>>,
) {
    let mut events = response.bytes_stream().eventsource();
    let mut calls = ToolCallAccumulator::default();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                let _ = tx.send(Err(ProviderError::Stream(e.to_string())));
                return;
            }
        };
        trace!(data = %event.data, "sse event");
        if event.data == "[DONE]" {
            break;
        }
        let chunk: StreamChunk = match serde_json::from_str(&event.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "skipping undecodable sse event");
                continue;
            }
        };
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                if tx.send(Ok(ProviderChunk::Text(text))).is_err() {
                    return;
                }
            }
            for fragment in choice.delta.tool_calls {
                calls.absorb(fragment);
            }
        }
    }

    for call in calls.finish() {
        if tx.send(Ok(ProviderChunk::ToolCall(call))).is_err() {
            return;
        }
    }
}

// ── Wire format ──────────────────────────────────────────────────────────────

fn wire_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn wire_message(message: &ChatMessage) -> Value {
    let mut wire = json!({
        "role": wire_role(message.role),
        "content": message.content,
    });
    if !message.tool_calls.is_empty() {
        wire["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    }
                })
            })
            .collect();
    }
    if let Some(id) = &message.tool_call_id {
        wire["tool_call_id"] = json!(id);
    }
    wire
}

pub(crate) fn request_body(
    model: &str,
    default_temperature: Option<f32>,
    request: &CompletionRequest,
    stream: bool,
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": request.messages.iter().map(wire_message).collect::<Vec<_>>(),
        "stream": stream,
    });
    if let Some(temperature) = request.temperature.or(default_temperature) {
        body["temperature"] = json!(temperature);
    }
    if !request.tools.is_empty() {
        body["tools"] = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect();
    }
    body
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<DeltaToolCall>,
}

#[derive(Debug, Deserialize)]
struct DeltaToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<DeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct DeltaFunction {
    name: Option<String>,
    arguments: Option<String>,
}

/// Tool arguments arrive as a JSON-encoded string; keep it as a string if it
/// does not decode.
fn decode_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub(crate) fn decode_completion(reply: ChatResponse) -> Result<Completion, ProviderError> {
    let choice = reply
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Decode("response has no choices".into()))?;
    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        tool_calls: choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolCallRequest {
                id: call.id,
                arguments: decode_arguments(&call.function.arguments),
                name: call.function.name,
            })
            .collect(),
    })
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Reassembles streamed tool-call fragments keyed by their index.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: BTreeMap<usize, PartialCall>,
}

impl ToolCallAccumulator {
    fn absorb(&mut self, fragment: DeltaToolCall) {
        let call = self.calls.entry(fragment.index).or_default();
        if let Some(id) = fragment.id {
            call.id = id;
        }
        if let Some(function) = fragment.function {
            if let Some(name) = function.name {
                call.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    fn finish(self) -> Vec<ToolCallRequest> {
        self.calls
            .into_iter()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, call)| ToolCallRequest {
                id: if call.id.is_empty() {
                    format!("call_{index}")
                } else {
                    call.id
                },
                arguments: decode_arguments(&call.arguments),
                name: call.name,
            })
            .collect()
    }
}
