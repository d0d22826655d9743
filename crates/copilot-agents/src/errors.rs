//! Pipeline error taxonomy with escalation classification.
//!
//! Every error that can end an execution attempt is represented here. The
//! escalation controller asks `is_escalatable()` instead of matching strings.
//!
//! ## Failure categories
//!
//! | Category        | Escalates | Surfaced as                       |
//! |-----------------|-----------|-----------------------------------|
//! | ProviderFailure | yes       | Error + Escalation / Failure      |
//! | MaxIterations   | yes       | Error + Escalation / Failure      |
//! | Internal        | yes       | Error + Escalation / Failure      |
//! | Configuration   | no        | Error + Failure                   |
//! | Cancelled       | no        | Cancelled                         |
//!
//! Failures that never reach this type: classification (falls back to
//! Medium), plan generation (falls back to the unmodified input) and tool
//! execution (becomes a tool result and the loop continues).

use std::fmt;

use thiserror::Error;

/// Classification used by the controller to decide whether to escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// The completion provider failed (network, status, malformed reply).
    ProviderFailure,
    /// The loop kept calling tools until the iteration budget ran out.
    MaxIterations,
    /// The caller cancelled the request.
    Cancelled,
    /// Invalid configuration; another strategy will not help.
    Configuration,
    /// Anything else.
    Internal,
}

impl FailureCategory {
    pub fn is_escalatable(self) -> bool {
        matches!(
            self,
            Self::ProviderFailure | Self::MaxIterations | Self::Internal
        )
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderFailure => write!(f, "provider_failure"),
            Self::MaxIterations => write!(f, "max_iterations"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Errors from a completion provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Transport failure: connect, TLS, timeout.
    #[error("request failed: {0}")]
    Request(String),

    /// Non-success HTTP status.
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The reply could not be decoded.
    #[error("malformed provider response: {0}")]
    Decode(String),

    /// The stream ended or errored before completing.
    #[error("stream interrupted: {0}")]
    Stream(String),

    /// Nothing is configured to answer.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Unified error type for one execution attempt.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("provider failure: {0}")]
    Provider(#[from] ProviderError),

    /// Iteration budget consumed without a final answer.
    #[error("max iterations ({0}) exceeded")]
    MaxIterations(u32),

    #[error("cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Provider(_) => FailureCategory::ProviderFailure,
            Self::MaxIterations(_) => FailureCategory::MaxIterations,
            Self::Cancelled => FailureCategory::Cancelled,
            Self::Configuration(_) => FailureCategory::Configuration,
            Self::Internal(_) => FailureCategory::Internal,
        }
    }

    /// Returns `true` if a harder strategy may be tried after this error.
    pub fn is_escalatable(&self) -> bool {
        self.category().is_escalatable()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
