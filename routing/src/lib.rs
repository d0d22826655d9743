//! Routing core for the copilot assistant
//!
//! This library provides the deterministic half of the request pipeline.
//! Nothing here talks to a model directly; the one model-backed decision
//! (the complexity oracle) is reached through the [`TierOracle`] trait.
//!
//! # Modules
//!
//! - [`router`]: complexity tiers, strategies and the complexity classifier
//! - [`memory`]: per-tier outcome tallies and the architecture selector
//! - [`escalation`]: the failure escalation ladder and tally bookkeeping
//! - [`events`]: typed stream events
//! - [`stream`]: the incremental stream event parser
//! - [`session`]: process-lifetime routing state shared across requests
//!
//! # Pipeline
//!
//! ```text
//! text ─► classify ─► select ─► [plan] ─► execute ─► parse stream ─► [escalate once]
//!            │           │                                                │
//!            └── cache ──┴──────────── SessionContext ◄── tallies ────────┘
//! ```

pub mod escalation;
pub mod events;
pub mod memory;
pub mod router;
pub mod session;
pub mod stream;

pub use escalation::{tally_updates, AttemptOutcome, EscalationLadder, LadderError, LadderStep};
pub use events::{EventKind, EventLog, StreamEvent};
pub use memory::{ArchitectureSelector, OutcomeTally, SelectionSource, TallyEntry};
pub use router::{
    ClassificationCache, ComplexityClassifier, ComplexityTier, OracleError, Strategy,
    TierOracle,
};
pub use session::{
    ConversationTurn, ErrorRecord, Role, SessionContext, SessionMetrics, SharedSession,
};
pub use stream::{ParserConfig, ParserOutput, ParserState, StreamEventParser};
