//! Provider-backed diagnosis of a failed attempt.
//!
//! The analyst asks for a small JSON object describing the failure. Replies
//! often wrap the object in prose or code fences, so the outermost `{…}` is
//! cut out before decoding. Any failure yields `None` and the pipeline moves
//! on to escalation without a diagnosis.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::provider::{CompletionRequest, SharedProvider};

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("JSON object regex should compile"));

/// Structured diagnosis of one failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub error_type: String,
    pub cause: String,
    pub solution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improved_command: Option<String>,
}

impl fmt::Display for ErrorAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}. Suggested fix: {}", self.error_type, self.cause, self.solution)?;
        if let Some(cmd) = self.improved_command.as_deref().filter(|c| !c.is_empty()) {
            write!(f, " (try `{cmd}`)")?;
        }
        Ok(())
    }
}

pub fn analysis_prompt(request: &str, error: &str) -> String {
    format!(
        "As a macOS system expert, analyse the error below and propose a fix.\n\
         \n\
         Original request: \"{request}\"\n\
         Error: \"{error}\"\n\
         \n\
         Answer with JSON only, no other text:\n\
         {{\"error_type\": \"kind of error\", \"cause\": \"short explanation\", \
         \"solution\": \"how to fix it\", \"improved_command\": \"better command, if any\"}}"
    )
}

/// Extract and decode the first JSON object in `reply`.
pub fn parse_analysis(reply: &str) -> Option<ErrorAnalysis> {
    let object = JSON_OBJECT.find(reply)?;
    serde_json::from_str(object.as_str()).ok()
}

pub struct ErrorAnalyst {
    provider: SharedProvider,
}

impl ErrorAnalyst {
    pub fn new(provider: SharedProvider) -> Self {
        Self { provider }
    }

    pub async fn analyze(&self, request: &str, error: &str) -> Option<ErrorAnalysis> {
        let call = CompletionRequest::prompt(analysis_prompt(request, error)).with_temperature(0.0);
        let reply = match self.provider.complete(call).await {
            Ok(completion) => completion.text,
            Err(e) => {
                warn!(error = %e, "error analysis call failed");
                return None;
            }
        };
        let analysis = parse_analysis(&reply);
        match &analysis {
            Some(a) => debug!(error_type = %a.error_type, "error analysed"),
            None => warn!(reply_len = reply.len(), "error analysis reply was not valid JSON"),
        }
        analysis
    }
}
