//! Integration tests for the request pipeline
//!
//! Each test drives `Assistant` end to end against a scripted provider:
//! classification, strategy selection, the execution loop, stream parsing
//! and escalation. Strategy templates are replaced with `strategy=<name>`
//! tags so the script can tell attempts apart. No network.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use copilot_agents::config::AgentConfig;
use copilot_agents::provider::{
    ChunkStream, Completion, CompletionProvider, CompletionRequest, MessageRole, ProviderChunk,
    ToolCallRequest,
};
use copilot_agents::strategies::StrategyRegistry;
use copilot_agents::tools::{Tool, ToolError, ToolRegistry};
use copilot_agents::{Assistant, PipelineOutput, ProviderError, RunOutcome};
use futures::stream::{self, StreamExt};
use mockall::mock;
use routing::events::{EventKind, EventLog};
use routing::router::{ComplexityTier, Strategy};

// ── Helpers ──────────────────────────────────────────────────────────────────

type Script = dyn Fn(&CompletionRequest) -> Result<Completion, ProviderError> + Send + Sync;

/// Answers every call through one closure and records the requests.
struct ScriptedProvider {
    script: Box<Script>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    fn new(
        script: impl Fn(&CompletionRequest) -> Result<Completion, ProviderError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn engine_calls(&self) -> Vec<CompletionRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| is_engine(r))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.calls.lock().unwrap().push(request.clone());
        (self.script)(&request)
    }
}

/// Engine steps carry tool specs; helper calls never do.
fn is_engine(request: &CompletionRequest) -> bool {
    !request.tools.is_empty()
}

/// Strategy tag of an engine step's system prompt.
fn strategy_of(request: &CompletionRequest) -> String {
    request.messages[0]
        .content
        .rsplit("strategy=")
        .next()
        .unwrap_or_default()
        .to_string()
}

fn tagged_strategies() -> StrategyRegistry {
    Strategy::ALL.into_iter().fold(
        StrategyRegistry::new().with_base("You are a test assistant."),
        |registry, s| registry.with_instructions(s, format!("strategy={s}")),
    )
}

fn assistant_with(
    config: &AgentConfig,
    provider: Arc<dyn CompletionProvider>,
    tools: ToolRegistry,
) -> Assistant {
    Assistant::with_strategies(config, provider, tools, tagged_strategies()).unwrap()
}

fn assistant(provider: Arc<dyn CompletionProvider>) -> Assistant {
    assistant_with(&AgentConfig::default(), provider, ToolRegistry::with_builtins())
}

async fn run(assistant: &Assistant, text: &str) -> (EventLog, String, RunOutcome) {
    let (outputs, outcome) = assistant.submit(text, Vec::new()).collect().await.unwrap();
    let mut log = EventLog::new();
    let mut tokens = String::new();
    for output in outputs {
        match output {
            PipelineOutput::Token(t) => tokens.push_str(&t),
            PipelineOutput::Event(e) => log.push(e),
        }
    }
    (log, tokens, outcome)
}

fn tool_call(name: &str) -> Completion {
    Completion {
        text: String::new(),
        tool_calls: vec![ToolCallRequest {
            id: format!("call_{name}"),
            name: name.into(),
            arguments: serde_json::json!({}),
        }],
    }
}

// ── Routing ──────────────────────────────────────────────────────────────────

/// Test: a time question routes Simple → Direct and yields exactly one answer
#[tokio::test]
async fn test_time_question_direct_answer() {
    let provider = ScriptedProvider::new(|request| {
        assert!(is_engine(request), "no helper call expected");
        Ok(Completion::text("现在是下午三点。"))
    });
    let assistant = assistant(provider.clone());

    let (log, tokens, outcome) = run(&assistant, "现在几点").await;

    assert_eq!(outcome.tier, ComplexityTier::Simple);
    assert_eq!(outcome.strategy, Strategy::Direct);
    assert!(outcome.success);
    assert_eq!(outcome.final_text, "现在是下午三点。");
    assert_eq!(tokens, "现在是下午三点。");

    assert_eq!(
        log.kinds(),
        vec![
            EventKind::Complexity,
            EventKind::Architecture,
            EventKind::FinalAnswer
        ]
    );
    assert_eq!(log.events()[0].content, "simple");
    assert_eq!(log.events()[1].content, "Direct");
    assert_eq!(log.events()[2].content, "现在是下午三点。");
    assert_eq!(log.count(EventKind::Thinking), 0);
    assert_eq!(log.count(EventKind::ToolCall), 0);

    assert_eq!(strategy_of(&provider.engine_calls()[0]), "direct");
    assert_eq!(assistant.metrics().succeeded, 1);
}

/// Test: the override wins over the default mapping
#[tokio::test]
async fn test_override_pins_strategy() {
    let provider = ScriptedProvider::new(|request| {
        assert_eq!(strategy_of(request), "react");
        Ok(Completion::text("done"))
    });
    let assistant = assistant(provider);
    assistant.set_override(Some(Strategy::ReAct));

    let (_, _, outcome) = run(&assistant, "现在几点").await;
    assert_eq!(outcome.strategy, Strategy::ReAct);
    assert!(outcome.success);
}

/// Test: complex requests get a plan event and the plan hint in the input
#[tokio::test]
async fn test_complex_request_is_planned() {
    let provider = ScriptedProvider::new(|request| {
        if is_engine(request) {
            let input = &request.messages.last().unwrap().content;
            assert!(input.contains("[Reference plan]\n1. Task analysis"));
            Ok(Completion::text(
                "[THINKING]compare both[/THINKING][FINAL_ANSWER]Safari uses less memory.",
            ))
        } else {
            assert!(request.messages[0].content.contains("execution plan"));
            Ok(Completion::text("1. Task analysis: compare browsers"))
        }
    });
    let assistant = assistant(provider);

    let (log, tokens, outcome) = run(&assistant, "compare Safari and Chrome memory use").await;

    assert_eq!(outcome.tier, ComplexityTier::Complex);
    assert_eq!(outcome.strategy, Strategy::FullCoT);
    assert_eq!(outcome.final_text, "Safari uses less memory.");
    assert_eq!(tokens, "Safari uses less memory.");
    assert_eq!(
        log.kinds(),
        vec![
            EventKind::Complexity,
            EventKind::Architecture,
            EventKind::Plan,
            EventKind::Thinking,
            EventKind::FinalAnswer
        ]
    );
    assert_eq!(log.of_kind(EventKind::Thinking).next().unwrap().content, "compare both");
}

/// Test: a failed plan call falls back to the unmodified input
#[tokio::test]
async fn test_plan_failure_falls_back() {
    let provider = ScriptedProvider::new(|request| {
        if is_engine(request) {
            let input = &request.messages.last().unwrap().content;
            assert!(!input.contains("[Reference plan]"));
            Ok(Completion::text("ok"))
        } else {
            Err(ProviderError::Request("connection reset".into()))
        }
    });
    let (log, _, outcome) = run(&assistant(provider), "automate my backups").await;
    assert_eq!(outcome.tier, ComplexityTier::Advanced);
    assert!(outcome.success);
    assert_eq!(log.count(EventKind::Plan), 0);
}

// ── Escalation ───────────────────────────────────────────────────────────────

/// Test: BasicCoT fails, FullCoT succeeds, and the next Medium request remembers
#[tokio::test]
async fn test_escalation_teaches_selector() {
    let provider = ScriptedProvider::new(|request| {
        if !is_engine(request) {
            return Ok(Completion::text(
                r#"{"error_type": "server", "cause": "upstream 500", "solution": "retry"}"#,
            ));
        }
        match strategy_of(request).as_str() {
            "basic_cot" => Err(ProviderError::Status {
                status: 500,
                body: "internal error".into(),
            }),
            _ => Ok(Completion::text(
                "[THINKING]look in Documents[/THINKING][FINAL_ANSWER]Found 3 files.",
            )),
        }
    });
    let assistant = assistant(provider.clone());

    let (log, _, outcome) = run(&assistant, "search for my tax documents").await;

    assert_eq!(outcome.tier, ComplexityTier::Medium);
    assert_eq!(outcome.strategy, Strategy::BasicCoT);
    assert_eq!(outcome.escalated_to, Some(Strategy::FullCoT));
    assert!(outcome.success);
    assert_eq!(outcome.final_text, "Found 3 files.");
    assert_eq!(
        log.kinds(),
        vec![
            EventKind::Complexity,
            EventKind::Architecture,
            EventKind::Error,
            EventKind::ErrorAnalysis,
            EventKind::Escalation,
            EventKind::Thinking,
            EventKind::FinalAnswer
        ]
    );
    assert!(log.events()[2].content.contains("500"));
    assert!(log.events()[3].content.starts_with("server: upstream 500"));
    assert_eq!(log.events()[4].content, "FullCoT");

    let session = assistant.session();
    assert_eq!(session.tally_count(ComplexityTier::Medium, Strategy::BasicCoT), 0);
    assert_eq!(session.tally_count(ComplexityTier::Medium, Strategy::FullCoT), 1);
    assert_eq!(session.error_history().len(), 1);

    let (_, _, second) = run(&assistant, "find the files from last week").await;
    assert_eq!(second.tier, ComplexityTier::Medium);
    assert_eq!(second.strategy, Strategy::FullCoT);
    assert_eq!(second.escalated_to, None);
    assert_eq!(session.tally_count(ComplexityTier::Medium, Strategy::FullCoT), 2);
}

/// Test: the iteration budget fails both attempts and ends in Failure
#[tokio::test]
async fn test_max_iterations_exhausts_escalation() {
    let provider = ScriptedProvider::new(|request| {
        if is_engine(request) {
            Ok(tool_call("get_current_time"))
        } else {
            Ok(Completion::text("not json"))
        }
    });
    let mut config = AgentConfig::default();
    config.engine.max_iterations = 2;
    let assistant = assistant_with(&config, provider.clone(), ToolRegistry::with_builtins());

    let (log, _, outcome) = run(&assistant, "现在几点").await;

    assert!(!outcome.success);
    assert_eq!(outcome.escalated_to, Some(Strategy::BasicCoT));
    assert_eq!(log.count(EventKind::Error), 2);
    assert_eq!(log.count(EventKind::ErrorAnalysis), 0);
    assert_eq!(log.count(EventKind::Escalation), 1);
    assert_eq!(log.count(EventKind::FinalAnswer), 0);
    assert_eq!(log.kinds().last(), Some(&EventKind::Failure));
    assert!(log
        .of_kind(EventKind::Error)
        .all(|e| e.content.contains("max iterations (2)")));
    assert_eq!(log.count(EventKind::ToolCall), 4);
    assert_eq!(provider.engine_calls().len(), 4);

    let metrics = assistant.metrics();
    assert_eq!((metrics.total, metrics.succeeded), (1, 0));
    assert_eq!(metrics.errors_recorded, 2);
    assert_eq!(metrics.tallies.len(), 2);
    assert!(metrics.tallies.iter().all(|e| e.count == 0));
}

mock! {
    pub Provider {}

    #[async_trait]
    impl CompletionProvider for Provider {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;
        async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream, ProviderError>;
    }
}

/// Test: Planner is terminal, so its failure reports without escalating
#[tokio::test]
async fn test_planner_failure_does_not_escalate() {
    let mut provider = MockProvider::new();
    provider.expect_stream().times(1).returning(|_| {
        Err(ProviderError::Status {
            status: 503,
            body: "overloaded".into(),
        })
    });
    // Error analyst; the reply is not JSON so no analysis event
    provider
        .expect_complete()
        .times(1)
        .returning(|_| Ok(Completion::text("sorry")));

    let assistant = assistant(Arc::new(provider));
    assistant.set_override(Some(Strategy::Planner));

    let (log, _, outcome) = run(&assistant, "现在几点").await;

    assert!(!outcome.success);
    assert_eq!(outcome.strategy, Strategy::Planner);
    assert_eq!(outcome.escalated_to, None);
    assert_eq!(
        log.kinds(),
        vec![
            EventKind::Complexity,
            EventKind::Architecture,
            EventKind::Error,
            EventKind::Failure
        ]
    );
    assert_eq!(
        assistant
            .session()
            .tally_count(ComplexityTier::Simple, Strategy::Planner),
        0
    );
}

/// Test: with analysis disabled a failure goes straight to escalation
#[tokio::test]
async fn test_analysis_disabled_skips_helper_call() {
    let provider = ScriptedProvider::new(|request| {
        assert!(is_engine(request), "analyst must not be called");
        Err(ProviderError::Decode("bad frame".into()))
    });
    let mut config = AgentConfig::default();
    config.error_analysis.enabled = false;
    let assistant = assistant_with(&config, provider, ToolRegistry::with_builtins());

    let (log, _, outcome) = run(&assistant, "现在几点").await;
    assert!(!outcome.success);
    assert_eq!(log.count(EventKind::ErrorAnalysis), 0);
    assert_eq!(log.count(EventKind::Escalation), 1);
}

/// Test: a reply made only of thinking is not an answer
#[tokio::test]
async fn test_thinking_only_reply_fails_without_leaking() {
    let provider = ScriptedProvider::new(|request| {
        if is_engine(request) {
            Ok(Completion::text("[THINKING]secret reasoning[/THINKING]"))
        } else {
            Ok(Completion::text("not json"))
        }
    });
    let assistant = assistant(provider.clone());

    let (log, tokens, outcome) = run(&assistant, "现在几点").await;

    assert!(!outcome.success);
    assert_eq!(outcome.final_text, "");
    assert_eq!(tokens, "");
    assert_eq!(outcome.escalated_to, Some(Strategy::BasicCoT));
    assert_eq!(log.count(EventKind::FinalAnswer), 0);
    assert_eq!(log.count(EventKind::Thinking), 2);
    assert!(log
        .of_kind(EventKind::Error)
        .all(|e| e.content.contains("no visible answer")));
    assert_eq!(log.kinds().last(), Some(&EventKind::Failure));
    assert!(log.events().iter().all(|e| e.kind == EventKind::Thinking
        || !e.content.contains("secret reasoning")));

    let asked = assistant.ask("现在几点").await;
    assert!(!asked.success);
    assert!(assistant.session().conversation().is_empty());
}

/// Test: a cued thinking fragment still leaves the answer visible
#[tokio::test]
async fn test_cued_thinking_keeps_answer() {
    let provider = ScriptedProvider::new(|_| Ok(Completion::text("Let me think... It is 3pm.")));
    let (log, tokens, outcome) = run(&assistant(provider), "现在几点").await;

    assert!(outcome.success);
    assert_eq!(outcome.final_text, "It is 3pm.");
    assert_eq!(tokens, "It is 3pm.");
    assert_eq!(
        log.kinds(),
        vec![
            EventKind::Complexity,
            EventKind::Architecture,
            EventKind::Thinking,
            EventKind::FinalAnswer
        ]
    );
    assert_eq!(
        log.of_kind(EventKind::Thinking).next().unwrap().content,
        "Let me think..."
    );
}

// ── Cancellation ─────────────────────────────────────────────────────────────

/// Streams one chunk, then never finishes.
struct Hanging;

#[async_trait]
impl CompletionProvider for Hanging {
    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
        Err(ProviderError::Unavailable("stream only".into()))
    }

    async fn stream(&self, _request: CompletionRequest) -> Result<ChunkStream, ProviderError> {
        Ok(stream::iter([Ok(ProviderChunk::Text("Checking ".into()))])
            .chain(stream::pending())
            .boxed())
    }
}

/// Test: cancelling emits Cancelled, never escalates and leaves tallies alone
#[tokio::test]
async fn test_cancellation_is_terminal() {
    let assistant = assistant(Arc::new(Hanging));
    let mut handle = assistant.submit("现在几点", Vec::new());

    while let Some(output) = handle.next().await {
        if matches!(&output, PipelineOutput::Event(e) if e.kind == EventKind::Architecture) {
            break;
        }
    }
    handle.cancel();

    let (outputs, outcome) = tokio::time::timeout(Duration::from_secs(5), handle.collect())
        .await
        .expect("cancelled request should finish")
        .unwrap();
    let mut log = EventLog::new();
    log.extend(outputs.iter().filter_map(|o| o.as_event().cloned()));

    assert!(!outcome.success);
    assert_eq!(outcome.escalated_to, None);
    assert_eq!(log.count(EventKind::Cancelled), 1);
    assert_eq!(log.count(EventKind::Error), 0);
    assert_eq!(log.count(EventKind::Escalation), 0);
    assert_eq!(log.count(EventKind::Failure), 0);
    assert_eq!(log.count(EventKind::FinalAnswer), 0);

    let metrics = assistant.metrics();
    assert!(metrics.tallies.is_empty());
    assert_eq!(metrics.errors_recorded, 0);
}

/// Engine steps fail with a 500; the analysis call never answers.
struct StalledAnalyst {
    streams: Mutex<usize>,
}

#[async_trait]
impl CompletionProvider for StalledAnalyst {
    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
        std::future::pending().await
    }

    async fn stream(&self, _request: CompletionRequest) -> Result<ChunkStream, ProviderError> {
        *self.streams.lock().unwrap() += 1;
        Err(ProviderError::Status {
            status: 500,
            body: "internal error".into(),
        })
    }
}

/// Test: a cancel during error analysis stops the request before escalation
#[tokio::test]
async fn test_cancel_during_analysis_skips_escalation() {
    let provider = Arc::new(StalledAnalyst {
        streams: Mutex::new(0),
    });
    let assistant = assistant(provider.clone());
    let mut handle = assistant.submit("现在几点", Vec::new());

    while let Some(output) = handle.next().await {
        if matches!(&output, PipelineOutput::Event(e) if e.kind == EventKind::Error) {
            break;
        }
    }
    handle.cancel();

    let (outputs, outcome) = tokio::time::timeout(Duration::from_secs(5), handle.collect())
        .await
        .expect("cancelled request should finish")
        .unwrap();
    let kinds: Vec<EventKind> = outputs
        .iter()
        .filter_map(|o| o.as_event().map(|e| e.kind))
        .collect();

    assert_eq!(kinds, vec![EventKind::Cancelled]);
    assert!(!outcome.success);
    assert_eq!(outcome.escalated_to, None);
    assert_eq!(*provider.streams.lock().unwrap(), 1);
    assert!(assistant.metrics().tallies.is_empty());
}

// ── Tools ────────────────────────────────────────────────────────────────────

struct Sleepy;

#[async_trait]
impl Tool for Sleepy {
    fn name(&self) -> &str {
        "sleepy"
    }

    fn description(&self) -> &str {
        "takes a minute"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn invoke(&self, _args: serde_json::Value) -> Result<String, ToolError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("finally".into())
    }
}

/// Test: a tool timeout becomes a ToolResult and the loop carries on
#[tokio::test(start_paused = true)]
async fn test_tool_timeout_is_a_tool_result() {
    let provider = ScriptedProvider::new(|request| {
        let answered = request
            .messages
            .iter()
            .any(|m| m.role == MessageRole::Tool);
        if answered {
            Ok(Completion::text("The tool timed out, sorry."))
        } else {
            Ok(tool_call("sleepy"))
        }
    });
    let mut config = AgentConfig::default();
    config.engine.tool_timeout_secs = 1;
    let mut tools = ToolRegistry::with_builtins();
    tools.register(Arc::new(Sleepy));
    let assistant = assistant_with(&config, provider, tools);

    let (log, tokens, outcome) = run(&assistant, "现在几点").await;

    assert!(outcome.success);
    assert_eq!(outcome.final_text, "The tool timed out, sorry.");
    assert_eq!(tokens, "The tool timed out, sorry.");
    assert_eq!(
        log.kinds(),
        vec![
            EventKind::Complexity,
            EventKind::Architecture,
            EventKind::ToolCall,
            EventKind::ToolResult,
            EventKind::FinalAnswer
        ]
    );
    let call = log.of_kind(EventKind::ToolCall).next().unwrap();
    assert_eq!(call.tool_name.as_deref(), Some("sleepy"));
    assert_eq!(call.parameters, Some(serde_json::json!({})));
    let result = log.of_kind(EventKind::ToolResult).next().unwrap();
    assert_eq!(result.tool_name.as_deref(), Some("sleepy"));
    assert_eq!(result.content, "Error: tool timed out after 1s");
}

/// Finishes after a short real delay.
struct Slow;

#[async_trait]
impl Tool for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "takes a moment"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn invoke(&self, _args: serde_json::Value) -> Result<String, ToolError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok("slow result".into())
    }
}

/// Test: a cancel mid tool call lets the call finish, then stops the loop
#[tokio::test]
async fn test_cancel_during_tool_call_finishes_call() {
    let provider = ScriptedProvider::new(|request| {
        assert!(is_engine(request), "no helper call expected");
        Ok(tool_call("slow"))
    });
    let mut tools = ToolRegistry::with_builtins();
    tools.register(Arc::new(Slow));
    let assistant = assistant_with(&AgentConfig::default(), provider.clone(), tools);
    let mut handle = assistant.submit("现在几点", Vec::new());

    while let Some(output) = handle.next().await {
        if matches!(&output, PipelineOutput::Event(e) if e.kind == EventKind::ToolCall) {
            break;
        }
    }
    handle.cancel();

    let (outputs, outcome) = tokio::time::timeout(Duration::from_secs(5), handle.collect())
        .await
        .expect("cancelled request should finish")
        .unwrap();
    let mut log = EventLog::new();
    log.extend(outputs.iter().filter_map(|o| o.as_event().cloned()));

    assert_eq!(log.kinds(), vec![EventKind::ToolResult, EventKind::Cancelled]);
    let result = log.of_kind(EventKind::ToolResult).next().unwrap();
    assert_eq!(result.tool_name.as_deref(), Some("slow"));
    assert_eq!(result.content, "slow result");
    assert!(!outcome.success);
    assert_eq!(outcome.escalated_to, None);
    assert_eq!(provider.engine_calls().len(), 1);
    assert!(assistant.metrics().tallies.is_empty());
}

// ── Conversation ─────────────────────────────────────────────────────────────

/// Test: ask() threads the session conversation through later requests
#[tokio::test]
async fn test_ask_appends_conversation() {
    let provider = ScriptedProvider::new(|request| {
        let turns = request.messages.len();
        Ok(Completion::text(format!("turns={turns}")))
    });
    let assistant = assistant(provider);

    let first = assistant.ask("现在几点").await;
    assert_eq!(first.final_text, "turns=2");
    let second = assistant.ask("现在几点了").await;
    assert_eq!(second.final_text, "turns=4");
    assert_eq!(assistant.session().conversation().len(), 4);

    assistant.reset_conversation();
    let third = assistant.ask("现在几点").await;
    assert_eq!(third.final_text, "turns=2");
}
