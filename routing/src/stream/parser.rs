//! Incremental stream event parser
//!
//! Turns raw model tokens into visible answer text plus typed events. Chunks
//! may split markers anywhere; only a tail that could still grow into a
//! pattern is held back, everything else is released on the call that
//! delivered it.
//!
//! ```text
//!            [THINKING] / cue            [/THINKING]
//!   Idle ──────────────────► Thinking ─────────────► Idle
//!    │                          │ answer cue
//!    │ untagged text            ▼
//!    └────────────────────► FinalAnswer ──(start marker | finish)──► …
//!
//!   Thinking opened by a cue also ends at an ellipsis or a blank line, so
//!   "Let me think... It is 3pm." still answers "It is 3pm.". A leading
//!   answer cue in Idle is dropped like one inside Thinking.
//!   ToolCall / ToolResult end on a blank line, Plan on `----` or [/PLAN],
//!   Complexity / Architecture on a newline. Any start marker ends the
//!   current segment and opens its own directly.
//! ```

use serde_json::Value;
use tracing::trace;

use super::markers::{
    Segment, Signal, ANSWER_CUES, BLANK_LINE, ELLIPSES, LINE_END, MARKERS, NOISE,
    PARAMS_LABELS, PLAN_RULE, THINKING_CUES, TRUNCATION_MARKER,
};
use crate::events::{EventKind, StreamEvent};

/// Default cap on tool result payloads, in characters
pub const DEFAULT_TOOL_RESULT_CAP: usize = 500;

/// Parser tuning
#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    pub tool_result_cap: usize,
    /// Enter Thinking on "let me think" style phrases while Idle
    pub thinking_heuristics: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            tool_result_cap: DEFAULT_TOOL_RESULT_CAP,
            thinking_heuristics: true,
        }
    }
}

/// What the parser hands back per push
#[derive(Debug, Clone, PartialEq)]
pub enum ParserOutput {
    /// Visible answer text, forwarded as soon as it is known not to be a marker
    Text(String),
    Event(StreamEvent),
}

/// Lexer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Idle,
    Thinking,
    ToolCall,
    ToolResult,
    Plan,
    ComplexityTag,
    ArchitectureTag,
    FinalAnswer,
}

impl From<Segment> for ParserState {
    fn from(segment: Segment) -> Self {
        match segment {
            Segment::Plan => Self::Plan,
            Segment::Thinking => Self::Thinking,
            Segment::ToolCall => Self::ToolCall,
            Segment::ToolResult => Self::ToolResult,
            Segment::FinalAnswer => Self::FinalAnswer,
            Segment::Complexity => Self::ComplexityTag,
            Segment::Architecture => Self::ArchitectureTag,
        }
    }
}

impl std::fmt::Display for ParserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Thinking => write!(f, "thinking"),
            Self::ToolCall => write!(f, "tool_call"),
            Self::ToolResult => write!(f, "tool_result"),
            Self::Plan => write!(f, "plan"),
            Self::ComplexityTag => write!(f, "complexity"),
            Self::ArchitectureTag => write!(f, "architecture"),
            Self::FinalAnswer => write!(f, "final_answer"),
        }
    }
}

type Pattern = (&'static str, Signal);

/// Streaming lexer over raw model output
#[derive(Debug)]
pub struct StreamEventParser {
    config: ParserConfig,
    state: ParserState,
    /// Unprocessed input, at most one partial pattern long between pushes
    pending: String,
    /// Content of the open segment
    segment: String,
    /// Dropping a noise line
    suppressing: bool,
    /// Current Thinking segment was opened by a cue, not a marker
    cued: bool,
}

impl Default for StreamEventParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl StreamEventParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            state: ParserState::Idle,
            pending: String::new(),
            segment: String::new(),
            suppressing: false,
            cued: false,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Feed one chunk of raw output.
    pub fn push(&mut self, chunk: &str) -> Vec<ParserOutput> {
        let mut out = Vec::new();
        self.pending.push_str(chunk);
        self.drain(false, &mut out);
        out
    }

    /// End of stream: release held text and close the open segment.
    ///
    /// The parser is back in `Idle` afterwards and may be reused.
    pub fn finish(&mut self) -> Vec<ParserOutput> {
        let mut out = Vec::new();
        self.drain(true, &mut out);
        self.pending.clear();
        self.suppressing = false;
        self.close_segment(&mut out);
        self.state = ParserState::Idle;
        self.cued = false;
        out
    }

    /// Convenience: parse a complete string in one go.
    pub fn parse_all(config: ParserConfig, text: &str) -> Vec<ParserOutput> {
        let mut parser = Self::new(config);
        let mut out = parser.push(text);
        out.extend(parser.finish());
        out
    }

    fn drain(&mut self, at_end: bool, out: &mut Vec<ParserOutput>) {
        loop {
            if self.suppressing {
                match self.pending.find('\n') {
                    Some(i) => {
                        self.pending.drain(..=i);
                        self.suppressing = false;
                        continue;
                    }
                    None => {
                        self.pending.clear();
                        return;
                    }
                }
            }

            let patterns = self.patterns();
            match earliest_match(&self.pending, &patterns) {
                Some((pos, len, signal)) => {
                    let before: String = self.pending[..pos].to_string();
                    // Untagged text ahead of a heuristic starts the answer;
                    // rescan under the new state before acting on the match.
                    if self.state == ParserState::Idle && !before.trim().is_empty() {
                        self.pending.drain(..pos);
                        self.take_text(&before, out);
                        continue;
                    }
                    let matched: String = self.pending[pos..pos + len].to_string();
                    self.pending.drain(..pos + len);
                    self.take_text(&before, out);
                    self.apply(signal, &matched, out);
                }
                None => {
                    let hold = if at_end {
                        0
                    } else {
                        held_suffix_len(&self.pending, &patterns)
                    };
                    let release = self.pending.len() - hold;
                    let text: String = self.pending.drain(..release).collect();
                    self.take_text(&text, out);
                    return;
                }
            }
        }
    }

    /// Patterns live in the current state, explicit markers first.
    fn patterns(&self) -> Vec<Pattern> {
        let mut patterns: Vec<Pattern> = MARKERS.to_vec();
        patterns.extend(NOISE.iter().map(|n| (*n, Signal::Noise)));
        match self.state {
            ParserState::Idle if self.config.thinking_heuristics => {
                patterns.extend(THINKING_CUES.iter().map(|c| (*c, Signal::ThinkingCue)));
                patterns.extend(ANSWER_CUES.iter().map(|c| (*c, Signal::AnswerCue)));
            }
            ParserState::Thinking => {
                patterns.extend(ANSWER_CUES.iter().map(|c| (*c, Signal::AnswerCue)));
                if self.cued {
                    patterns.extend(ELLIPSES.iter().map(|e| (*e, Signal::Ellipsis)));
                    patterns.push((BLANK_LINE, Signal::BlankLine));
                }
            }
            ParserState::ToolCall | ParserState::ToolResult => {
                patterns.push((BLANK_LINE, Signal::BlankLine));
            }
            ParserState::Plan => patterns.push((PLAN_RULE, Signal::PlanRule)),
            ParserState::ComplexityTag | ParserState::ArchitectureTag => {
                patterns.push((LINE_END, Signal::LineEnd));
            }
            _ => {}
        }
        patterns
    }

    fn take_text(&mut self, text: &str, out: &mut Vec<ParserOutput>) {
        if text.is_empty() {
            return;
        }
        match self.state {
            ParserState::Idle => {
                if text.trim().is_empty() {
                    return;
                }
                trace!("untagged text, answer begins");
                self.state = ParserState::FinalAnswer;
                self.segment.clear();
                self.take_text(text, out);
            }
            ParserState::FinalAnswer => {
                let text = if self.segment.is_empty() {
                    text.trim_start()
                } else {
                    text
                };
                if text.is_empty() {
                    return;
                }
                self.segment.push_str(text);
                out.push(ParserOutput::Text(text.to_string()));
            }
            _ => self.segment.push_str(text),
        }
    }

    fn apply(&mut self, signal: Signal, matched: &str, out: &mut Vec<ParserOutput>) {
        match signal {
            Signal::Noise => self.suppressing = true,
            Signal::Open(segment) => {
                self.close_segment(out);
                self.state = segment.into();
                self.cued = false;
            }
            Signal::ThinkingCue => {
                self.close_segment(out);
                self.state = ParserState::Thinking;
                self.segment.push_str(matched);
                self.cued = true;
                // "Thinking..." is a whole fragment already
                if ELLIPSES.iter().any(|e| matched.ends_with(e)) {
                    self.close_segment(out);
                    self.state = ParserState::Idle;
                    self.cued = false;
                }
            }
            Signal::Ellipsis => {
                self.segment.push_str(matched);
                self.close_segment(out);
                self.state = ParserState::Idle;
                self.cued = false;
            }
            Signal::Close(segment) => {
                if self.state == ParserState::from(segment) {
                    self.close_segment(out);
                    self.state = ParserState::Idle;
                }
            }
            Signal::AnswerCue => {
                self.close_segment(out);
                self.state = ParserState::FinalAnswer;
                self.cued = false;
            }
            Signal::BlankLine | Signal::PlanRule | Signal::LineEnd => {
                self.close_segment(out);
                self.state = ParserState::Idle;
                self.cued = false;
            }
        }
        trace!(state = %self.state, "parser transition");
    }

    /// Emit the open segment's event, if it has content.
    fn close_segment(&mut self, out: &mut Vec<ParserOutput>) {
        let raw = std::mem::take(&mut self.segment);
        let content = raw.trim();
        if content.is_empty() {
            return;
        }
        let event = match self.state {
            ParserState::Idle => return,
            ParserState::Thinking => StreamEvent::new(EventKind::Thinking, content),
            ParserState::Plan => StreamEvent::new(EventKind::Plan, content),
            ParserState::ComplexityTag => StreamEvent::new(EventKind::Complexity, content),
            ParserState::ArchitectureTag => StreamEvent::new(EventKind::Architecture, content),
            ParserState::FinalAnswer => StreamEvent::new(EventKind::FinalAnswer, content),
            ParserState::ToolCall => tool_call_event(content),
            ParserState::ToolResult => tool_result_event(content, self.config.tool_result_cap),
        };
        out.push(ParserOutput::Event(event));
    }
}

/// Earliest pattern occurrence; on equal positions the earlier pattern wins.
fn earliest_match(haystack: &str, patterns: &[Pattern]) -> Option<(usize, usize, Signal)> {
    let mut best: Option<(usize, usize, Signal)> = None;
    for (pattern, signal) in patterns {
        if let Some(pos) = haystack.find(pattern) {
            if best.map_or(true, |(b, _, _)| pos < b) {
                best = Some((pos, pattern.len(), *signal));
            }
        }
    }
    best
}

/// Length of the longest tail that is a proper prefix of some pattern.
fn held_suffix_len(buffer: &str, patterns: &[Pattern]) -> usize {
    let longest = patterns.iter().map(|(p, _)| p.len()).max().unwrap_or(0);
    let max_hold = longest.saturating_sub(1).min(buffer.len());
    (1..=max_hold)
        .rev()
        .filter(|k| buffer.is_char_boundary(buffer.len() - k))
        .find(|k| {
            let tail = &buffer[buffer.len() - k..];
            patterns.iter().any(|(p, _)| p.starts_with(tail))
        })
        .unwrap_or(0)
}

fn tool_call_event(content: &str) -> StreamEvent {
    let label = PARAMS_LABELS
        .iter()
        .filter_map(|label| content.find(label).map(|i| (i, label.len())))
        .min_by_key(|(i, _)| *i);

    let (head, params_text) = match label {
        Some((i, len)) => (&content[..i], Some(&content[i + len..])),
        None => match content.split_once('\n') {
            Some((first, rest)) => (first, Some(rest)),
            None => (content, None),
        },
    };

    let name = head.lines().next().unwrap_or("").trim();
    let parameters = params_text
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(parse_parameters);

    StreamEvent {
        tool_name: (!name.is_empty()).then(|| name.to_string()),
        parameters,
        ..StreamEvent::new(EventKind::ToolCall, content)
    }
}

/// Structured JSON when it parses, otherwise the text as a JSON string
pub fn parse_parameters(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn tool_result_event(content: &str, cap: usize) -> StreamEvent {
    let (name, payload) = match content.split_once('\n') {
        Some((first, rest)) => (Some(first.trim().to_string()), rest.trim()),
        None => (None, content),
    };
    StreamEvent::tool_result(name.filter(|n| !n.is_empty()), truncate_payload(payload, cap))
}

/// Cap `payload` at `cap` characters, marking the cut.
pub fn truncate_payload(payload: &str, cap: usize) -> String {
    match payload.char_indices().nth(cap) {
        Some((cut, _)) => format!("{}{}", &payload[..cut], TRUNCATION_MARKER),
        None => payload.to_string(),
    }
}
