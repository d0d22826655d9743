//! Execution engine: one tool-calling loop shared by every strategy.
//!
//! ## Loop
//!
//! ```text
//! messages = [system(strategy), history…, user(input [+ plan])]
//! loop (≤ max_iterations):
//!   check cancel
//!   stream provider step ── text chunks ──► raw token channel
//!                        └─ tool calls   ──► collected
//!   no tool calls → return the step's text
//!   for each call:
//!     write "[TOOL_CALL] name\nparams: {json}\n\n"
//!     invoke under timeout (errors become the result text)
//!     write "[TOOL_RESULT] name\n…\n\n"
//!     check cancel
//! budget exhausted → MaxIterations
//! ```
//!
//! The engine never interprets its own output; the stream parser downstream
//! of the raw token channel does that.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use routing::router::Strategy;
use routing::session::{ConversationTurn, Role};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::errors::{PipelineError, ProviderError};
use crate::provider::{
    ChatMessage, CompletionRequest, ProviderChunk, SharedProvider, ToolCallRequest,
};
use crate::strategies::StrategyRegistry;
use crate::tools::ToolRegistry;

// ── Request ──────────────────────────────────────────────────────────────────

/// Input to one execution attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionRequest {
    pub text: String,
    pub history: Vec<ConversationTurn>,
    /// Plan hint produced for harder tiers
    pub plan: Option<String>,
}

impl ExecutionRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    /// The user input the model sees, with the plan appended as a hint.
    pub fn effective_input(&self) -> String {
        match &self.plan {
            Some(plan) => format!("{}\n\n[Reference plan]\n{}", self.text, plan),
            None => self.text.clone(),
        }
    }
}

// ── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_iterations: u32,
    pub tool_timeout: Duration,
    pub temperature: Option<f32>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            tool_timeout: config.tool_timeout(),
            temperature: None,
        }
    }
}

/// Raw token channel the engine writes into.
pub type TokenSender = mpsc::UnboundedSender<String>;

// ── Engine ───────────────────────────────────────────────────────────────────

/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct ExecutionEngine {
    provider: SharedProvider,
    tools: Arc<ToolRegistry>,
    strategies: Arc<StrategyRegistry>,
    settings: EngineSettings,
}

impl ExecutionEngine {
    pub fn new(
        provider: SharedProvider,
        tools: Arc<ToolRegistry>,
        strategies: Arc<StrategyRegistry>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            provider,
            tools,
            strategies,
            settings,
        }
    }

    fn initial_messages(&self, strategy: Strategy, request: &ExecutionRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(ChatMessage::system(self.strategies.system_prompt(strategy)));
        messages.extend(request.history.iter().map(|turn| match turn.role {
            Role::User => ChatMessage::user(&turn.content),
            Role::Assistant => ChatMessage::assistant(&turn.content),
        }));
        messages.push(ChatMessage::user(request.effective_input()));
        messages
    }

    /// Run `request` under `strategy`, streaming raw output into `tokens`.
    ///
    /// Returns the final step's text.
    pub async fn execute(
        &self,
        strategy: Strategy,
        request: &ExecutionRequest,
        tokens: &TokenSender,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let mut messages = self.initial_messages(strategy, request);
        let tool_specs = self.tools.specs();
        let max = self.settings.max_iterations;

        info!(strategy = %strategy, max_iterations = max, "execution starting");

        for iteration in 1..=max {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let mut step = CompletionRequest::new(messages.clone()).with_tools(tool_specs.clone());
            step.temperature = self.settings.temperature;

            let mut chunks = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                stream = self.provider.stream(step) => stream?,
            };

            let mut text = String::new();
            let mut calls: Vec<ToolCallRequest> = Vec::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                    next = chunks.next() => next,
                };
                match next {
                    None => break,
                    Some(Ok(ProviderChunk::Text(chunk))) => {
                        text.push_str(&chunk);
                        let _ = tokens.send(chunk);
                    }
                    Some(Ok(ProviderChunk::ToolCall(call))) => calls.push(call),
                    Some(Err(e)) => return Err(e.into()),
                }
            }

            debug!(
                iteration,
                text_len = text.len(),
                tool_calls = calls.len(),
                "provider step finished"
            );

            if calls.is_empty() {
                if text.trim().is_empty() {
                    return Err(ProviderError::Decode("empty completion".into()).into());
                }
                info!(strategy = %strategy, iterations = iteration, "execution finished");
                return Ok(text);
            }

            messages.push(ChatMessage::assistant_with_calls(text, calls.clone()));
            for call in calls {
                let _ = tokens.send(format!(
                    "[TOOL_CALL] {}\nparams: {}\n\n",
                    call.name, call.arguments
                ));

                let result = match self
                    .tools
                    .invoke(&call.name, call.arguments.clone(), self.settings.tool_timeout)
                    .await
                {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "tool call failed");
                        format!("Error: {e}")
                    }
                };

                let _ = tokens.send(format!(
                    "[TOOL_RESULT] {}\n{}\n\n",
                    call.name,
                    frame_tool_output(&result)
                ));
                messages.push(ChatMessage::tool_result(call.id, result));

                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
            }
        }

        warn!(strategy = %strategy, max_iterations = max, "iteration budget exhausted");
        Err(PipelineError::MaxIterations(max))
    }
}

/// Drop blank lines so the result block stays one paragraph.
fn frame_tool_output(output: &str) -> String {
    let framed: Vec<&str> = output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect();
    if framed.is_empty() {
        "(no output)".to_string()
    } else {
        framed.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::provider::{Completion, CompletionProvider};

    /// Replays a fixed list of completions, one per step.
    struct Scripted {
        steps: Mutex<VecDeque<Completion>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(steps: Vec<Completion>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for Scripted {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
            self.seen.lock().unwrap().push(request);
            self.steps
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProviderError::Unavailable("script exhausted".into()))
        }
    }

    fn call(name: &str) -> Completion {
        Completion {
            text: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: format!("call_{name}"),
                name: name.into(),
                arguments: serde_json::json!({}),
            }],
        }
    }

    fn engine(provider: Arc<Scripted>, max_iterations: u32) -> ExecutionEngine {
        ExecutionEngine::new(
            provider,
            Arc::new(ToolRegistry::with_builtins()),
            Arc::new(StrategyRegistry::new()),
            EngineSettings {
                max_iterations,
                ..EngineSettings::default()
            },
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        let mut out = String::new();
        while let Ok(chunk) = rx.try_recv() {
            out.push_str(&chunk);
        }
        out
    }

    #[test]
    fn effective_input_appends_plan() {
        let request = ExecutionRequest::new("free up disk space").with_plan("1. check df");
        assert_eq!(
            request.effective_input(),
            "free up disk space\n\n[Reference plan]\n1. check df"
        );
        assert_eq!(ExecutionRequest::new("hi").effective_input(), "hi");
    }

    #[test]
    fn frame_collapses_blank_lines() {
        assert_eq!(frame_tool_output("a\n\n\nb\n  \n"), "a\nb");
        assert_eq!(frame_tool_output("\n\n"), "(no output)");
    }

    #[tokio::test]
    async fn text_only_step_returns_answer() {
        let provider = Scripted::new(vec![Completion::text("hello")]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let answer = engine(provider.clone(), 8)
            .execute(
                Strategy::Direct,
                &ExecutionRequest::new("hi").with_history(vec![
                    ConversationTurn::user("earlier"),
                    ConversationTurn::assistant("reply"),
                ]),
                &tx,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(answer, "hello");
        assert_eq!(drain(&mut rx), "hello");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].messages.len(), 4);
        assert_eq!(seen[0].tools.len(), 2);
    }

    #[tokio::test]
    async fn tool_call_is_framed_and_fed_back() {
        let provider = Scripted::new(vec![call("get_current_time"), Completion::text("It is noon.")]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let answer = engine(provider.clone(), 8)
            .execute(
                Strategy::Direct,
                &ExecutionRequest::new("time?"),
                &tx,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(answer, "It is noon.");

        let raw = drain(&mut rx);
        assert!(raw.starts_with("[TOOL_CALL] get_current_time\nparams: {}\n\n[TOOL_RESULT] get_current_time\n"));
        assert!(raw.ends_with("It is noon."));

        let seen = provider.seen.lock().unwrap();
        let last = seen[1].messages.last().unwrap();
        assert_eq!(last.tool_call_id.as_deref(), Some("call_get_current_time"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_result_text() {
        let provider = Scripted::new(vec![call("open_app"), Completion::text("Sorry.")]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let answer = engine(provider, 8)
            .execute(
                Strategy::Direct,
                &ExecutionRequest::new("open Safari"),
                &tx,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(answer, "Sorry.");
        assert!(drain(&mut rx).contains("Error: unknown tool `open_app`"));
    }

    #[tokio::test]
    async fn budget_exhaustion_is_max_iterations() {
        let provider = Scripted::new(vec![call("get_current_time"), call("get_current_time")]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = engine(provider, 2)
            .execute(
                Strategy::ReAct,
                &ExecutionRequest::new("loop"),
                &tx,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MaxIterations(2)));
    }

    #[tokio::test]
    async fn cancelled_before_first_step() {
        let provider = Scripted::new(vec![Completion::text("never")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let err = engine(provider.clone(), 8)
            .execute(Strategy::Direct, &ExecutionRequest::new("hi"), &tx, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(drain(&mut rx).is_empty());
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_completion_is_a_provider_failure() {
        let provider = Scripted::new(vec![Completion::text("  ")]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = engine(provider, 8)
            .execute(
                Strategy::Direct,
                &ExecutionRequest::new("hi"),
                &tx,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Provider(ProviderError::Decode(_))));
    }
}
