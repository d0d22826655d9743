//! Request Router Module
//!
//! Decides how hard a request is and which reasoning strategy answers it.
//!
//! # Default mapping
//!
//! ```text
//! Tier      | Strategy   | Escalates to
//! ----------|------------|-------------
//! Simple    | Direct     | BasicCoT
//! Medium    | BasicCoT   | FullCoT
//! Complex   | FullCoT    | Planner
//! Advanced  | Planner    | -
//! (override)| ReAct      | Planner
//! ```

pub mod classifier;
pub mod tier;

pub use classifier::{
    apply_upgrade, is_technical_diagnostic, jaccard_similarity, match_rules, oracle_prompt,
    parse_tier_digit, ClassificationCache, ComplexityClassifier, OracleError, TierOracle,
};
pub use tier::{ComplexityTier, ParseStrategyError, ParseTierError, Strategy};
