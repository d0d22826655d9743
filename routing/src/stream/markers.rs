//! Marker vocabulary recognised in the raw token stream

/// Segment a marker opens or closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Plan,
    Thinking,
    ToolCall,
    ToolResult,
    FinalAnswer,
    Complexity,
    Architecture,
}

/// What a matched pattern means to the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Open(Segment),
    Close(Segment),
    /// Framework chatter; drop through end of line
    Noise,
    /// "Let me think" style phrase; enters Thinking from Idle, text kept
    ThinkingCue,
    /// Ends Thinking and starts the answer
    AnswerCue,
    /// Ends a Thinking segment a cue opened; the ellipsis stays in it
    Ellipsis,
    /// ToolCall / ToolResult terminator
    BlankLine,
    /// Plan terminator
    PlanRule,
    /// Complexity / Architecture terminator
    LineEnd,
}

/// Explicit start markers and closers, English and CJK
pub(crate) const MARKERS: &[(&str, Signal)] = &[
    ("[PLAN]", Signal::Open(Segment::Plan)),
    ("[/PLAN]", Signal::Close(Segment::Plan)),
    ("[THINKING]", Signal::Open(Segment::Thinking)),
    ("[/THINKING]", Signal::Close(Segment::Thinking)),
    ("[TOOL_CALL]", Signal::Open(Segment::ToolCall)),
    ("[TOOL_RESULT]", Signal::Open(Segment::ToolResult)),
    ("[FINAL_ANSWER]", Signal::Open(Segment::FinalAnswer)),
    ("[COMPLEXITY]", Signal::Open(Segment::Complexity)),
    ("[ARCHITECTURE]", Signal::Open(Segment::Architecture)),
    ("【生成执行计划】", Signal::Open(Segment::Plan)),
    ("【思考过程】", Signal::Open(Segment::Thinking)),
    ("【工具调用】", Signal::Open(Segment::ToolCall)),
    ("【工具返回】", Signal::Open(Segment::ToolResult)),
    ("【最终回答】", Signal::Open(Segment::FinalAnswer)),
    ("【评估复杂度】", Signal::Open(Segment::Complexity)),
    ("【选择架构】", Signal::Open(Segment::Architecture)),
];

pub(crate) const NOISE: &[&str] = &["> Entering new", "> Finished chain", "Finished chain"];

pub(crate) const THINKING_CUES: &[&str] = &[
    "Let me think",
    "let me think",
    "Thinking...",
    "Thinking…",
    "思考中",
    "让我思考",
    "让我想一想",
    "分析一下",
    "考虑一下",
    "推理:",
    "推理：",
];

pub(crate) const ANSWER_CUES: &[&str] = &[
    "结论:",
    "结论：",
    "回答:",
    "回答：",
    "总结:",
    "总结：",
    "因此，",
    "Answer:",
    "Conclusion:",
];

/// Ellipses that close a cue-opened thinking fragment, longest first
pub(crate) const ELLIPSES: &[&str] = &["……", "...", "…"];

/// Labels that introduce a tool call's parameters
pub(crate) const PARAMS_LABELS: &[&str] = &["params:", "参数：", "参数:"];

pub(crate) const BLANK_LINE: &str = "\n\n";
pub(crate) const PLAN_RULE: &str = "----";
pub(crate) const LINE_END: &str = "\n";

/// Appended to a tool result cut at the payload cap
pub const TRUNCATION_MARKER: &str = "…[truncated]";
