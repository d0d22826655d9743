//! Outcome tallies: per (tier, strategy) success counts
//!
//! Counts are unsigned and decrement with a floor of zero, so a run of
//! failures can never push a strategy below "no evidence".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::router::{ComplexityTier, Strategy};

/// One row of a tally snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEntry {
    pub tier: ComplexityTier,
    pub strategy: Strategy,
    pub count: u32,
}

/// Success counts keyed by (tier, strategy)
#[derive(Debug, Clone, Default)]
pub struct OutcomeTally {
    counts: HashMap<(ComplexityTier, Strategy), u32>,
}

impl OutcomeTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// +1 for a strategy that answered a request of this tier.
    pub fn record_success(&mut self, tier: ComplexityTier, strategy: Strategy) {
        let count = self.counts.entry((tier, strategy)).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// −1 (floor 0) for a strategy that failed. The entry is still recorded.
    pub fn record_failure(&mut self, tier: ComplexityTier, strategy: Strategy) {
        let count = self.counts.entry((tier, strategy)).or_insert(0);
        *count = count.saturating_sub(1);
    }

    pub fn count(&self, tier: ComplexityTier, strategy: Strategy) -> u32 {
        self.counts.get(&(tier, strategy)).copied().unwrap_or(0)
    }

    /// Whether any outcome was ever recorded for `tier`
    pub fn has_entries(&self, tier: ComplexityTier) -> bool {
        self.counts.keys().any(|(t, _)| *t == tier)
    }

    /// Highest-count strategy recorded for `tier`.
    ///
    /// `preference` decides ties: the earliest strategy in it wins. Strategies
    /// missing from `preference` lose every tie.
    pub fn best_for(&self, tier: ComplexityTier, preference: &[Strategy]) -> Option<Strategy> {
        let rank = |s: Strategy| {
            preference
                .iter()
                .position(|p| *p == s)
                .unwrap_or(preference.len())
        };

        self.counts
            .iter()
            .filter(|((t, _), _)| *t == tier)
            .map(|((_, s), count)| (*s, *count))
            .max_by(|(a, a_count), (b, b_count)| {
                a_count.cmp(b_count).then_with(|| rank(*b).cmp(&rank(*a)))
            })
            .map(|(s, _)| s)
    }

    /// Sorted snapshot of every recorded entry
    pub fn snapshot(&self) -> Vec<TallyEntry> {
        let mut entries: Vec<TallyEntry> = self
            .counts
            .iter()
            .map(|((tier, strategy), count)| TallyEntry {
                tier: *tier,
                strategy: *strategy,
                count: *count,
            })
            .collect();
        entries.sort_by_key(|e| {
            (
                e.tier,
                Strategy::ALL
                    .iter()
                    .position(|s| *s == e.strategy)
                    .unwrap_or(usize::MAX),
            )
        });
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
