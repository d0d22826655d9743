//! Complexity tiers and reasoning strategies
//!
//! Both enums are closed sets. Tiers are ordinal (1-4) and totally ordered;
//! strategies carry no ordering of their own, escalation order lives in
//! [`crate::escalation::EscalationLadder`].

use serde::{Deserialize, Serialize};

/// Difficulty tier assigned to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    /// Direct lookups and single actions ("what time is it", "open Safari")
    Simple,
    /// Two or three steps, maybe a condition
    Medium,
    /// Multi-step work that needs reasoning or diagnosis
    Complex,
    /// Creative solutions, automation, adaptive execution
    Advanced,
}

impl ComplexityTier {
    pub const ALL: [ComplexityTier; 4] = [
        ComplexityTier::Simple,
        ComplexityTier::Medium,
        ComplexityTier::Complex,
        ComplexityTier::Advanced,
    ];

    /// Ordinal used by the "return one digit 1-4" oracle prompt
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Simple => 1,
            Self::Medium => 2,
            Self::Complex => 3,
            Self::Advanced => 4,
        }
    }

    /// Inverse of [`ordinal`](Self::ordinal)
    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Simple),
            2 => Some(Self::Medium),
            3 => Some(Self::Complex),
            4 => Some(Self::Advanced),
            _ => None,
        }
    }

    /// Strategy used when neither an override nor adaptive memory applies.
    ///
    /// ReAct never appears here.
    pub fn default_strategy(&self) -> Strategy {
        match self {
            Self::Simple => Strategy::Direct,
            Self::Medium => Strategy::BasicCoT,
            Self::Complex => Strategy::FullCoT,
            Self::Advanced => Strategy::Planner,
        }
    }
}

impl std::fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Medium => write!(f, "medium"),
            Self::Complex => write!(f, "complex"),
            Self::Advanced => write!(f, "advanced"),
        }
    }
}

/// Error returned when a tier name cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown complexity tier `{0}`")]
pub struct ParseTierError(pub String);

impl std::str::FromStr for ComplexityTier {
    type Err = ParseTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" | "1" => Ok(Self::Simple),
            "medium" | "2" => Ok(Self::Medium),
            "complex" | "3" => Ok(Self::Complex),
            "advanced" | "4" => Ok(Self::Advanced),
            other => Err(ParseTierError(other.to_string())),
        }
    }
}

/// Reasoning strategy ("architecture") the execution loop runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Answer directly, no reasoning scaffold
    Direct,
    /// Reason silently before answering
    #[serde(rename = "basic_cot")]
    BasicCoT,
    /// Narrate the reasoning, then answer
    #[serde(rename = "full_cot")]
    FullCoT,
    /// Explicit reason / act / observe cycles
    #[serde(rename = "react")]
    ReAct,
    /// Produce a multi-phase plan, then execute it
    Planner,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Direct,
        Strategy::BasicCoT,
        Strategy::FullCoT,
        Strategy::ReAct,
        Strategy::Planner,
    ];

    /// Order used to break tally ties after the tier's own default
    pub const TIE_BREAK_ORDER: [Strategy; 5] = [
        Strategy::Direct,
        Strategy::BasicCoT,
        Strategy::FullCoT,
        Strategy::Planner,
        Strategy::ReAct,
    ];

    /// Stable snake_case identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::BasicCoT => "basic_cot",
            Self::FullCoT => "full_cot",
            Self::ReAct => "react",
            Self::Planner => "planner",
        }
    }

    /// Display name used in Architecture events
    pub fn label(&self) -> &'static str {
        match self {
            Self::Direct => "Direct",
            Self::BasicCoT => "BasicCoT",
            Self::FullCoT => "FullCoT",
            Self::ReAct => "ReAct",
            Self::Planner => "Planner",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a strategy name cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown strategy `{0}` (expected direct, basic_cot, full_cot, react or planner)")]
pub struct ParseStrategyError(pub String);

impl std::str::FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "direct" => Ok(Self::Direct),
            "basic_cot" | "basiccot" => Ok(Self::BasicCoT),
            "full_cot" | "fullcot" | "cot" => Ok(Self::FullCoT),
            "react" | "re_act" => Ok(Self::ReAct),
            "planner" | "plan" => Ok(Self::Planner),
            _ => Err(ParseStrategyError(s.to_string())),
        }
    }
}
