//! Architecture selector: override, then adaptive memory, then defaults

use std::collections::HashMap;

use tracing::debug;

use super::tally::OutcomeTally;
use crate::router::{ComplexityTier, Strategy};
use crate::session::SessionContext;

/// Where a selection came from, for logging and events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Override,
    Memory,
    Default,
}

impl std::fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Override => write!(f, "override"),
            Self::Memory => write!(f, "memory"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Picks the strategy for a classified request.
#[derive(Debug, Clone, Default)]
pub struct ArchitectureSelector {
    tier_defaults: HashMap<ComplexityTier, Strategy>,
}

impl ArchitectureSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the built-in default for a tier (ReAct is allowed here).
    pub fn with_tier_default(mut self, tier: ComplexityTier, strategy: Strategy) -> Self {
        self.tier_defaults.insert(tier, strategy);
        self
    }

    pub fn with_tier_defaults(
        mut self,
        defaults: impl IntoIterator<Item = (ComplexityTier, Strategy)>,
    ) -> Self {
        self.tier_defaults.extend(defaults);
        self
    }

    /// Default strategy for `tier` once configured overrides are applied
    pub fn default_for(&self, tier: ComplexityTier) -> Strategy {
        self.tier_defaults
            .get(&tier)
            .copied()
            .unwrap_or_else(|| tier.default_strategy())
    }

    /// Tie-break order for `tier`: its default, then the fixed order.
    pub fn preference(&self, tier: ComplexityTier) -> Vec<Strategy> {
        let default = self.default_for(tier);
        std::iter::once(default)
            .chain(
                Strategy::TIE_BREAK_ORDER
                    .into_iter()
                    .filter(move |s| *s != default),
            )
            .collect()
    }

    /// Select against explicit state.
    pub fn select_with(
        &self,
        tier: ComplexityTier,
        override_strategy: Option<Strategy>,
        tally: &OutcomeTally,
    ) -> (Strategy, SelectionSource) {
        if let Some(strategy) = override_strategy {
            return (strategy, SelectionSource::Override);
        }

        if tally.has_entries(tier) {
            if let Some(strategy) = tally.best_for(tier, &self.preference(tier)) {
                return (strategy, SelectionSource::Memory);
            }
        }

        (self.default_for(tier), SelectionSource::Default)
    }

    /// Select for `tier` using the session's override and tallies.
    pub fn select(&self, tier: ComplexityTier, session: &SessionContext) -> Strategy {
        let override_strategy = session.override_strategy();
        let (strategy, source) =
            session.with_tally(|tally| self.select_with(tier, override_strategy, tally));
        debug!(tier = %tier, strategy = %strategy, source = %source, "strategy selected");
        strategy
    }
}
