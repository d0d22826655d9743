//! Adaptive memory: outcome tallies and the selector that reads them.

pub mod selector;
pub mod tally;

pub use selector::{ArchitectureSelector, SelectionSource};
pub use tally::{OutcomeTally, TallyEntry};
