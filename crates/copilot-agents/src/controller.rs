//! Request pipeline with one-step failure escalation.
//!
//! ```text
//! classify ─► Complexity ─► select ─► Architecture ─► [plan ─► Plan]
//!     │
//!     ▼
//! execute(strategy) ──ok──► tally +1 ─► done
//!     │ err
//!     ├─ cancelled ─► Cancelled (no tally change)
//!     ▼
//! Error ─► [ErrorAnalysis] ─► ladder.next(strategy)?
//!     │ none ─► tally −1 ─► Failure
//!     ▼
//! Escalation(next) ─► execute(next) ──ok──► tally −1 / +1 ─► done
//!                          │ err ─► Error ─► tally −1 / −1 ─► Failure
//! ```
//!
//! Engine output is never shown raw: each attempt runs the engine in a
//! spawned task and feeds its token channel through a fresh
//! [`StreamEventParser`]. Visible text reaches the caller as
//! [`PipelineOutput::Token`], everything else as [`PipelineOutput::Event`].

use std::sync::Arc;

use routing::escalation::{tally_updates, AttemptOutcome, EscalationLadder};
use routing::events::{EventKind, StreamEvent};
use routing::memory::ArchitectureSelector;
use routing::router::{ComplexityClassifier, ComplexityTier, Strategy};
use routing::session::{ConversationTurn, SessionContext, SessionMetrics, SharedSession};
use routing::stream::{ParserConfig, ParserOutput, StreamEventParser};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::analyst::ErrorAnalyst;
use crate::config::{AgentConfig, PlanningConfig};
use crate::engine::{EngineSettings, ExecutionEngine, ExecutionRequest};
use crate::errors::{PipelineError, ProviderError};
use crate::planner::PlanGenerator;
use crate::provider::{OpenAiProvider, ProviderOracle, SharedProvider};
use crate::strategies::StrategyRegistry;
use crate::tools::ToolRegistry;

// ── Outputs ──────────────────────────────────────────────────────────────────

/// What a streaming caller receives.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutput {
    /// Visible answer text, forwarded as soon as it is known to be visible.
    ///
    /// Tokens of a failed attempt are not retracted. When the request
    /// escalates, the `Escalation` event separates them from the retry's
    /// tokens, and only the retry's answer becomes `final_text`.
    Token(String),
    Event(StreamEvent),
}

impl PipelineOutput {
    pub fn as_event(&self) -> Option<&StreamEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Token(_) => None,
        }
    }
}

/// Summary of one finished request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    /// The answer text, without any markup
    pub final_text: String,
    pub success: bool,
    pub tier: ComplexityTier,
    /// Strategy of the first attempt
    pub strategy: Strategy,
    /// Strategy of the retry, when one ran
    pub escalated_to: Option<Strategy>,
}

/// A running request.
pub struct RequestHandle {
    pub id: Uuid,
    pub outputs: mpsc::UnboundedReceiver<PipelineOutput>,
    pub cancel: CancellationToken,
    pub join: JoinHandle<RunOutcome>,
}

impl RequestHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn next(&mut self) -> Option<PipelineOutput> {
        self.outputs.recv().await
    }

    /// Drain every output, then wait for the outcome.
    pub async fn collect(mut self) -> Result<(Vec<PipelineOutput>, RunOutcome), PipelineError> {
        let mut outputs = Vec::new();
        while let Some(output) = self.outputs.recv().await {
            outputs.push(output);
        }
        let outcome = self
            .join
            .await
            .map_err(|e| PipelineError::Internal(anyhow::anyhow!("pipeline task failed: {e}")))?;
        Ok((outputs, outcome))
    }
}

type OutputSender = mpsc::UnboundedSender<PipelineOutput>;

fn emit(out: &OutputSender, event: StreamEvent) {
    let _ = out.send(PipelineOutput::Event(event));
}

// ── Assistant ────────────────────────────────────────────────────────────────

/// Entry point for callers. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct Assistant {
    pipeline: Arc<Pipeline>,
}

struct Pipeline {
    session: SharedSession,
    classifier: ComplexityClassifier,
    oracle: ProviderOracle,
    selector: ArchitectureSelector,
    ladder: EscalationLadder,
    engine: ExecutionEngine,
    planning: PlanningConfig,
    planner: PlanGenerator,
    analyst: Option<ErrorAnalyst>,
    parser: ParserConfig,
}

impl Assistant {
    /// Build a pipeline over `provider` and `tools`.
    pub fn new(
        config: &AgentConfig,
        provider: SharedProvider,
        tools: ToolRegistry,
    ) -> Result<Self, PipelineError> {
        Self::with_strategies(config, provider, tools, StrategyRegistry::new())
    }

    pub fn with_strategies(
        config: &AgentConfig,
        provider: SharedProvider,
        tools: ToolRegistry,
        strategies: StrategyRegistry,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let session = SessionContext::with_cache_limits(
            config.routing.cache_capacity,
            config.routing.similarity_threshold,
        )
        .shared();

        let mut settings = EngineSettings::from(&config.engine);
        settings.temperature = config.provider.temperature;
        let engine = ExecutionEngine::new(
            provider.clone(),
            Arc::new(tools),
            Arc::new(strategies),
            settings,
        );

        let pipeline = Pipeline {
            session,
            classifier: ComplexityClassifier::new(),
            oracle: ProviderOracle::new(provider.clone()),
            selector: config.selector(),
            ladder: config.ladder()?,
            engine,
            planning: config.planning.clone(),
            planner: PlanGenerator::new(provider.clone()),
            analyst: config
                .error_analysis
                .enabled
                .then(|| ErrorAnalyst::new(provider)),
            parser: ParserConfig::from(&config.parser),
        };
        Ok(Self {
            pipeline: Arc::new(pipeline),
        })
    }

    /// OpenAI-compatible provider from `config.provider`, built-in tools.
    pub fn from_config(config: &AgentConfig) -> Result<Self, PipelineError> {
        let provider = OpenAiProvider::new(&config.provider)?;
        info!(model = provider.model(), "using OpenAI-compatible provider");
        Self::new(config, Arc::new(provider), ToolRegistry::with_builtins())
    }

    pub fn session(&self) -> &SharedSession {
        &self.pipeline.session
    }

    /// Start a request in the background.
    pub fn submit(&self, text: impl Into<String>, history: Vec<ConversationTurn>) -> RequestHandle {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let pipeline = Arc::clone(&self.pipeline);
        let token = cancel.clone();
        let text = text.into();
        let span = info_span!("request", id = %id);
        let join = tokio::spawn(
            async move { pipeline.process(&text, history, &tx, &token).await }.instrument(span),
        );

        RequestHandle {
            id,
            outputs: rx,
            cancel,
            join,
        }
    }

    /// Run a request to completion, discarding streamed output.
    pub async fn run(&self, text: &str, history: Vec<ConversationTurn>) -> RunOutcome {
        let (tx, _rx) = mpsc::unbounded_channel();
        let span = info_span!("request", id = %Uuid::new_v4());
        self.pipeline
            .process(text, history, &tx, &CancellationToken::new())
            .instrument(span)
            .await
    }

    /// Run against the session conversation and append the exchange on success.
    pub async fn ask(&self, text: &str) -> RunOutcome {
        let history = self.pipeline.session.conversation();
        let outcome = self.run(text, history).await;
        if outcome.success {
            self.pipeline
                .session
                .append_exchange(text, &outcome.final_text);
        }
        outcome
    }

    /// Like [`submit`](Self::submit) over the session conversation.
    ///
    /// The caller appends the exchange once the outcome is known.
    pub fn submit_in_conversation(&self, text: impl Into<String>) -> RequestHandle {
        self.submit(text, self.pipeline.session.conversation())
    }

    pub fn set_override(&self, strategy: Option<Strategy>) {
        self.pipeline.session.set_override(strategy);
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.pipeline.session.metrics()
    }

    pub fn reset_conversation(&self) {
        self.pipeline.session.reset_conversation();
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("ladder", &self.pipeline.ladder)
            .field("planning", &self.pipeline.planning)
            .finish_non_exhaustive()
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

impl Pipeline {
    async fn process(
        &self,
        text: &str,
        history: Vec<ConversationTurn>,
        out: &OutputSender,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        self.session.begin_request();

        let tier = self
            .classifier
            .classify(text, self.session.cache(), &self.oracle)
            .await;
        emit(out, StreamEvent::complexity(tier));

        let strategy = self.selector.select(tier, &self.session);
        emit(out, StreamEvent::architecture(strategy));
        info!(tier = %tier, strategy = %strategy, "request routed");

        let mut request = ExecutionRequest::new(text).with_history(history);
        if self.planning.applies_to(tier) {
            let plan = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                plan = self.planner.generate(text) => plan,
            };
            if let Some(plan) = plan {
                emit(out, StreamEvent::plan(plan.clone()));
                request = request.with_plan(plan);
            }
        }

        let mut outcome = RunOutcome {
            final_text: String::new(),
            success: false,
            tier,
            strategy,
            escalated_to: None,
        };

        let first_error = match self.attempt(strategy, &request, out, cancel).await {
            Ok(answer) => {
                self.record(tier, (strategy, AttemptOutcome::Succeeded), None);
                self.session.mark_succeeded();
                info!(strategy = %strategy, "request succeeded");
                outcome.final_text = answer;
                outcome.success = true;
                return outcome;
            }
            Err(e) if e.is_cancelled() => return self.cancelled(out, outcome),
            Err(e) => e,
        };

        self.report_error(text, strategy, &first_error, out, cancel)
            .await;
        if cancel.is_cancelled() {
            return self.cancelled(out, outcome);
        }

        let next = if first_error.is_escalatable() {
            self.ladder.next(strategy)
        } else {
            None
        };
        let Some(next) = next else {
            self.record(tier, (strategy, AttemptOutcome::Failed), None);
            return self.failed(out, outcome, &first_error);
        };

        info!(from = %strategy, to = %next, "escalating");
        emit(out, StreamEvent::escalation(next));
        outcome.escalated_to = Some(next);

        match self.attempt(next, &request, out, cancel).await {
            Ok(answer) => {
                self.record(
                    tier,
                    (strategy, AttemptOutcome::Failed),
                    Some((next, AttemptOutcome::Succeeded)),
                );
                self.session.mark_succeeded();
                info!(strategy = %next, "request succeeded after escalation");
                outcome.final_text = answer;
                outcome.success = true;
                outcome
            }
            Err(e) if e.is_cancelled() => self.cancelled(out, outcome),
            Err(e) => {
                emit(out, StreamEvent::error(e.to_string()));
                self.session.record_error(text, next, &e.to_string());
                self.record(
                    tier,
                    (strategy, AttemptOutcome::Failed),
                    Some((next, AttemptOutcome::Failed)),
                );
                self.failed(out, outcome, &e)
            }
        }
    }

    /// Run one engine attempt, streaming its parsed output.
    ///
    /// Returns the last FinalAnswer segment. A reply with nothing visible,
    /// such as one made only of thinking, fails like an empty completion.
    async fn attempt(
        &self,
        strategy: Strategy,
        request: &ExecutionRequest,
        out: &OutputSender,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let engine = self.engine.clone();
        let owned = request.clone();
        let token = cancel.clone();
        let task =
            tokio::spawn(async move { engine.execute(strategy, &owned, &tx, &token).await });

        let mut parser = StreamEventParser::new(self.parser);
        let mut last_answer: Option<String> = None;
        while let Some(chunk) = rx.recv().await {
            forward(parser.push(&chunk), out, &mut last_answer);
        }
        let tail = parser.finish();

        let result = task
            .await
            .map_err(|e| PipelineError::Internal(anyhow::anyhow!("engine task failed: {e}")))?;

        match result {
            Ok(_) => {
                forward(tail, out, &mut last_answer);
                last_answer
                    .ok_or_else(|| ProviderError::Decode("no visible answer".into()).into())
            }
            Err(e) => {
                // A failed attempt does not get to close an answer segment.
                let tail = tail.into_iter().filter(|output| {
                    !matches!(output, ParserOutput::Event(ev) if ev.kind == EventKind::FinalAnswer)
                });
                forward(tail, out, &mut last_answer);
                Err(e)
            }
        }
    }

    async fn report_error(
        &self,
        text: &str,
        strategy: Strategy,
        err: &PipelineError,
        out: &OutputSender,
        cancel: &CancellationToken,
    ) {
        let message = err.to_string();
        warn!(strategy = %strategy, category = %err.category(), error = %message, "attempt failed");
        emit(out, StreamEvent::error(message.clone()));
        self.session.record_error(text, strategy, &message);

        let Some(analyst) = &self.analyst else {
            return;
        };
        let analysis = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            analysis = analyst.analyze(text, &message) => analysis,
        };
        if let Some(analysis) = analysis {
            emit(
                out,
                StreamEvent::new(EventKind::ErrorAnalysis, analysis.to_string()),
            );
        }
    }

    fn record(
        &self,
        tier: ComplexityTier,
        primary: (Strategy, AttemptOutcome),
        retry: Option<(Strategy, AttemptOutcome)>,
    ) {
        let updates = tally_updates(primary, retry);
        self.session.record_outcomes(tier, &updates);
    }

    fn cancelled(&self, out: &OutputSender, outcome: RunOutcome) -> RunOutcome {
        info!(tier = %outcome.tier, "request cancelled");
        emit(out, StreamEvent::new(EventKind::Cancelled, "request cancelled"));
        outcome
    }

    fn failed(&self, out: &OutputSender, outcome: RunOutcome, err: &PipelineError) -> RunOutcome {
        let last = outcome.escalated_to.unwrap_or(outcome.strategy);
        error!(tier = %outcome.tier, strategy = %last, error = %err, "request failed");
        emit(
            out,
            StreamEvent::new(
                EventKind::Failure,
                format!("{} failed: {err}", last.label()),
            ),
        );
        outcome
    }
}

fn forward(
    outputs: impl IntoIterator<Item = ParserOutput>,
    out: &OutputSender,
    last_answer: &mut Option<String>,
) {
    for output in outputs {
        let output = match output {
            ParserOutput::Text(text) => PipelineOutput::Token(text),
            ParserOutput::Event(event) => {
                if event.kind == EventKind::FinalAnswer {
                    *last_answer = Some(event.content.clone());
                }
                PipelineOutput::Event(event)
            }
        };
        let _ = out.send(output);
    }
}
