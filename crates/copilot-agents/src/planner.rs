//! Plan generation for harder tiers.
//!
//! One provider call turns the request into a plan that is shown to the
//! user as a `Plan` event and appended to the model input as a hint.
//! Failure is never fatal: the request simply runs without a plan.

use tracing::{debug, warn};

use crate::provider::{CompletionRequest, SharedProvider};

const PLAN_TEMPERATURE: f32 = 0.2;

/// Builds the planning prompt for `request`.
pub fn plan_prompt(request: &str) -> String {
    format!(
        "As a macOS system expert, write a detailed execution plan for this request.\n\
         \n\
         Request: \"{request}\"\n\
         \n\
         Use this format:\n\
         1. Task analysis: the core need behind the request\n\
         2. Execution steps:\n   \
            a. first step - tool or command used\n   \
            b. next step - tool or command used\n   \
            ...\n\
         3. Possible problems and solutions:\n   \
            - problem: solution\n\
         \n\
         Keep the plan specific to macOS and reply in the language of the request."
    )
}

pub struct PlanGenerator {
    provider: SharedProvider,
}

impl PlanGenerator {
    pub fn new(provider: SharedProvider) -> Self {
        Self { provider }
    }

    /// Returns `None` when the provider fails or the plan is empty.
    pub async fn generate(&self, request: &str) -> Option<String> {
        let call = CompletionRequest::prompt(plan_prompt(request)).with_temperature(PLAN_TEMPERATURE);
        match self.provider.complete(call).await {
            Ok(completion) => {
                let plan = completion.text.trim();
                if plan.is_empty() {
                    warn!("plan generation returned nothing, continuing without a plan");
                    None
                } else {
                    debug!(plan_len = plan.len(), "plan generated");
                    Some(plan.to_string())
                }
            }
            Err(e) => {
                warn!(error = %e, "plan generation failed, continuing without a plan");
                None
            }
        }
    }
}
