//! Failure escalation: ladder lookup and tally bookkeeping
//!
//! ```text
//! primary strategy fails
//!     │
//!     ├─ ladder has a next step → retry once with it
//!     │      ├─ retry succeeds → primary −1, retry +1
//!     │      └─ retry fails    → primary −1, retry −1
//!     │
//!     └─ terminal (Planner)    → primary −1, report failure
//! ```
//!
//! A request escalates at most once. Cancelled requests never escalate and
//! never touch the tallies.

pub mod ladder;

pub use ladder::{EscalationLadder, LadderError, LadderStep};

use crate::router::Strategy;

/// How a request's attempts ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

/// Tally adjustments for one request.
///
/// Returns `(strategy, succeeded)` pairs in attempt order, or nothing when
/// any attempt was cancelled.
pub fn tally_updates(
    primary: (Strategy, AttemptOutcome),
    retry: Option<(Strategy, AttemptOutcome)>,
) -> Vec<(Strategy, bool)> {
    let attempts = std::iter::once(primary).chain(retry);
    let mut updates = Vec::with_capacity(2);
    for (strategy, outcome) in attempts {
        match outcome {
            AttemptOutcome::Succeeded => updates.push((strategy, true)),
            AttemptOutcome::Failed => updates.push((strategy, false)),
            AttemptOutcome::Cancelled => return Vec::new(),
        }
    }
    updates
}
