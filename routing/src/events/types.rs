//! Stream event types
//!
//! Every structured signal a request produces, whether reclassified out of the
//! raw token stream or emitted directly by the pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::router::{ComplexityTier, Strategy};

/// Kind of a [`StreamEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Thinking,
    ToolCall,
    ToolResult,
    Plan,
    Complexity,
    Architecture,
    FinalAnswer,
    Error,
    /// Diagnosis produced for a failed attempt
    ErrorAnalysis,
    /// Retrying with the strategy named in `content`
    Escalation,
    /// Terminal: the caller cancelled the request
    Cancelled,
    /// Terminal: the request failed and escalation is exhausted
    Failure,
}

impl EventKind {
    /// Whether this kind ends a request's event stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Failure)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Thinking => write!(f, "thinking"),
            Self::ToolCall => write!(f, "tool_call"),
            Self::ToolResult => write!(f, "tool_result"),
            Self::Plan => write!(f, "plan"),
            Self::Complexity => write!(f, "complexity"),
            Self::Architecture => write!(f, "architecture"),
            Self::FinalAnswer => write!(f, "final_answer"),
            Self::Error => write!(f, "error"),
            Self::ErrorAnalysis => write!(f, "error_analysis"),
            Self::Escalation => write!(f, "escalation"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// A typed event with its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub kind: EventKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Structured tool parameters, or a JSON string holding unparseable text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl StreamEvent {
    pub fn new(kind: EventKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            tool_name: None,
            parameters: None,
            timestamp: Utc::now(),
        }
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        Self::new(EventKind::Thinking, content)
    }

    pub fn plan(content: impl Into<String>) -> Self {
        Self::new(EventKind::Plan, content)
    }

    pub fn final_answer(content: impl Into<String>) -> Self {
        Self::new(EventKind::FinalAnswer, content)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, message)
    }

    pub fn complexity(tier: ComplexityTier) -> Self {
        Self::new(EventKind::Complexity, tier.to_string())
    }

    pub fn architecture(strategy: Strategy) -> Self {
        Self::new(EventKind::Architecture, strategy.label())
    }

    pub fn escalation(next: Strategy) -> Self {
        Self::new(EventKind::Escalation, next.label())
    }

    pub fn tool_call(
        name: impl Into<String>,
        content: impl Into<String>,
        parameters: Option<serde_json::Value>,
    ) -> Self {
        Self {
            tool_name: Some(name.into()),
            parameters,
            ..Self::new(EventKind::ToolCall, content)
        }
    }

    pub fn tool_result(name: Option<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: name,
            ..Self::new(EventKind::ToolResult, content)
        }
    }
}
