//! Escalation ladder: an explicit "on failure, try this next" table

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::router::Strategy;

/// Invalid ladder configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LadderError {
    #[error("strategy `{0}` escalates to itself")]
    SelfEscalation(Strategy),

    #[error("escalation ladder has a cycle through `{0}`")]
    Cycle(Strategy),
}

/// One configured step, as read from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderStep {
    pub from: Strategy,
    /// `None` marks `from` as terminal
    pub to: Option<Strategy>,
}

/// Failure → next-strategy table.
///
/// Strategies absent from the table are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationLadder {
    steps: HashMap<Strategy, Strategy>,
}

impl Default for EscalationLadder {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationLadder {
    /// Built-in ladder: Direct → BasicCoT → FullCoT → Planner, ReAct → Planner.
    pub fn new() -> Self {
        let steps = HashMap::from([
            (Strategy::Direct, Strategy::BasicCoT),
            (Strategy::BasicCoT, Strategy::FullCoT),
            (Strategy::FullCoT, Strategy::Planner),
            (Strategy::ReAct, Strategy::Planner),
        ]);
        Self { steps }
    }

    /// Ladder with no steps; every strategy is terminal.
    pub fn empty() -> Self {
        Self {
            steps: HashMap::new(),
        }
    }

    /// Start from the built-in ladder and apply configured steps on top.
    pub fn with_steps(steps: &[LadderStep]) -> Result<Self, LadderError> {
        let mut ladder = Self::new();
        for step in steps {
            ladder.set(step.from, step.to);
        }
        ladder.validate()?;
        Ok(ladder)
    }

    pub fn set(&mut self, from: Strategy, to: Option<Strategy>) {
        match to {
            Some(to) => {
                self.steps.insert(from, to);
            }
            None => {
                self.steps.remove(&from);
            }
        }
    }

    /// Strategy to retry with after `failed`, if any
    pub fn next(&self, failed: Strategy) -> Option<Strategy> {
        self.steps.get(&failed).copied()
    }

    pub fn is_terminal(&self, strategy: Strategy) -> bool {
        !self.steps.contains_key(&strategy)
    }

    /// Reject self-loops and cycles.
    ///
    /// A request escalates at most once, but a cyclic table is still a
    /// configuration mistake.
    pub fn validate(&self) -> Result<(), LadderError> {
        for start in Strategy::ALL {
            if self.next(start) == Some(start) {
                return Err(LadderError::SelfEscalation(start));
            }
            let mut current = start;
            for _ in 0..Strategy::ALL.len() {
                match self.next(current) {
                    Some(next) if next == start => return Err(LadderError::Cycle(start)),
                    Some(next) => current = next,
                    None => break,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder() {
        let ladder = EscalationLadder::new();
        assert_eq!(ladder.next(Strategy::Direct), Some(Strategy::BasicCoT));
        assert_eq!(ladder.next(Strategy::BasicCoT), Some(Strategy::FullCoT));
        assert_eq!(ladder.next(Strategy::FullCoT), Some(Strategy::Planner));
        assert_eq!(ladder.next(Strategy::ReAct), Some(Strategy::Planner));
        assert_eq!(ladder.next(Strategy::Planner), None);
        assert!(ladder.is_terminal(Strategy::Planner));
        assert!(ladder.validate().is_ok());
    }

    #[test]
    fn test_configured_steps_override_defaults() {
        let ladder = EscalationLadder::with_steps(&[
            LadderStep {
                from: Strategy::Direct,
                to: Some(Strategy::FullCoT),
            },
            LadderStep {
                from: Strategy::ReAct,
                to: None,
            },
        ])
        .unwrap();
        assert_eq!(ladder.next(Strategy::Direct), Some(Strategy::FullCoT));
        assert!(ladder.is_terminal(Strategy::ReAct));
    }

    #[test]
    fn test_cycles_rejected() {
        let err = EscalationLadder::with_steps(&[LadderStep {
            from: Strategy::Planner,
            to: Some(Strategy::Direct),
        }])
        .unwrap_err();
        assert!(matches!(err, LadderError::Cycle(_)));

        let err = EscalationLadder::with_steps(&[LadderStep {
            from: Strategy::FullCoT,
            to: Some(Strategy::FullCoT),
        }])
        .unwrap_err();
        assert_eq!(err, LadderError::SelfEscalation(Strategy::FullCoT));
    }
}
