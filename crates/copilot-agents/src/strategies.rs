//! Strategy registry.
//!
//! A strategy is nothing but a system instruction template; all five run on
//! the same execution loop. Templates tell the model which markers to emit so
//! the stream parser can reclassify its output.

use std::collections::HashMap;

use routing::router::Strategy;

const BASE_INSTRUCTIONS: &str = "\
You are a macOS system assistant. You can report system status (processes, \
network, battery, disks), look up the current time, and run read-only system \
commands through the tools you are given.

Rules:
- Reply in the language the user writes in, in a friendly, professional tone.
- Prefer the provided tools over guessing; never invent tool output.
- Be careful with anything that could change the system and point out risks.
- If a request is beyond what your tools can do, say so plainly.";

const DIRECT: &str = "Answer directly and concisely.";

const BASIC_COT: &str = "\
Work out the steps needed before you answer, but do not show that reasoning. \
Reply with the answer only.";

const FULL_COT: &str = "\
Reason step by step: understand the intent, consider approaches, choose tools, \
verify results. Write that reasoning inside [THINKING] ... [/THINKING], then \
write [FINAL_ANSWER] followed by the answer for the user.";

const REACT: &str = "\
Work in reason / act / observe cycles. Before each tool call, write your \
reasoning inside [THINKING] ... [/THINKING]; after each result, reflect on what \
it tells you and adjust. If a step fails, explain why and try an alternative. \
When done, write [FINAL_ANSWER] followed by the answer.";

const PLANNER: &str = "\
For this task, first write a plan: begin with [PLAN], list the sub-tasks, their \
order and dependencies, the tool for each, and the main risks, then end the \
plan with a line containing only ----. Then carry the plan out step by step, \
adjusting if results differ from expectations. Finish with [FINAL_ANSWER] \
followed by the result.";

/// Instructions bound to one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyProfile {
    pub strategy: Strategy,
    pub instructions: String,
}

/// The five strategy templates, overridable per strategy.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    base: String,
    profiles: HashMap<Strategy, StrategyProfile>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        let profiles = Strategy::ALL
            .into_iter()
            .map(|strategy| {
                let instructions = match strategy {
                    Strategy::Direct => DIRECT,
                    Strategy::BasicCoT => BASIC_COT,
                    Strategy::FullCoT => FULL_COT,
                    Strategy::ReAct => REACT,
                    Strategy::Planner => PLANNER,
                };
                (
                    strategy,
                    StrategyProfile {
                        strategy,
                        instructions: instructions.to_string(),
                    },
                )
            })
            .collect();
        Self {
            base: BASE_INSTRUCTIONS.to_string(),
            profiles,
        }
    }

    /// Replace the shared persona text.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    /// Replace one strategy's template.
    pub fn with_instructions(mut self, strategy: Strategy, instructions: impl Into<String>) -> Self {
        self.profiles.insert(
            strategy,
            StrategyProfile {
                strategy,
                instructions: instructions.into(),
            },
        );
        self
    }

    pub fn profile(&self, strategy: Strategy) -> Option<&StrategyProfile> {
        self.profiles.get(&strategy)
    }

    /// Full system prompt: persona, then the strategy template.
    pub fn system_prompt(&self, strategy: Strategy) -> String {
        match self.profile(strategy) {
            Some(profile) => format!("{}\n\n{}", self.base, profile.instructions),
            None => self.base.clone(),
        }
    }
}
