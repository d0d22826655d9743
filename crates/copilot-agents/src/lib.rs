//! Copilot agents
//!
//! The async half of the assistant: everything that talks to a completion
//! provider or runs a tool.
//!
//! - [`provider`]: the completion provider trait and the OpenAI-compatible adapter
//! - [`tools`]: tool trait, registry and the built-in tools
//! - [`strategies`]: instruction templates for the five strategies
//! - [`engine`]: the shared tool-calling execution loop
//! - [`planner`] / [`analyst`]: optional helper calls (plans, error diagnosis)
//! - [`controller`]: the request pipeline and failure escalation ([`Assistant`])
//! - [`config`]: TOML + environment configuration
//!
//! # Usage
//!
//! ```bash
//! # One-shot
//! copilot-agents "how much disk space is left?"
//!
//! # Chat session on stdin, showing typed events
//! copilot-agents --events --config copilot.toml
//!
//! # Pin a strategy
//! copilot-agents --strategy react "why is my wifi slow?"
//! ```

pub mod analyst;
pub mod config;
pub mod controller;
pub mod engine;
pub mod errors;
pub mod planner;
pub mod provider;
pub mod strategies;
pub mod tools;

pub use config::AgentConfig;
pub use controller::{Assistant, PipelineOutput, RequestHandle, RunOutcome};
pub use engine::{ExecutionEngine, ExecutionRequest};
pub use errors::{FailureCategory, PipelineError, ProviderError};
pub use provider::{CompletionProvider, SharedProvider};
pub use tools::{Tool, ToolError, ToolRegistry};
