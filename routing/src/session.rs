//! Session context: routing state shared by every request in a process
//!
//! Holds the strategy override, the classification cache, the outcome
//! tallies, the error history, request counters and the conversation.
//! Nothing here is persisted; the context lives as long as its owner.
//!
//! Each field has its own lock so concurrent requests only serialize on the
//! piece of state they touch. Counter updates are atomic per call; no ordering
//! across requests is promised.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::tally::{OutcomeTally, TallyEntry};
use crate::router::{ClassificationCache, ComplexityTier, Strategy};

/// Error records kept before the oldest is dropped
const MAX_ERROR_HISTORY: usize = 100;

/// Shared reference to a session
pub type SharedSession = Arc<SessionContext>;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A failed execution attempt, kept for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub input: String,
    pub strategy: Strategy,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of request outcomes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub total: u64,
    pub succeeded: u64,
    pub success_rate: f64,
    pub tallies: Vec<TallyEntry>,
    pub errors_recorded: usize,
}

/// Process-lifetime routing state
#[derive(Debug, Default)]
pub struct SessionContext {
    override_strategy: RwLock<Option<Strategy>>,
    cache: Mutex<ClassificationCache>,
    tally: RwLock<OutcomeTally>,
    errors: Mutex<Vec<ErrorRecord>>,
    conversation: Mutex<Vec<ConversationTurn>>,
    total: AtomicU64,
    succeeded: AtomicU64,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session whose classification cache uses the given limits
    pub fn with_cache_limits(capacity: usize, similarity_threshold: f64) -> Self {
        Self {
            cache: Mutex::new(ClassificationCache::with_limits(
                capacity,
                similarity_threshold,
            )),
            ..Self::default()
        }
    }

    /// Create a shared reference to this session
    pub fn shared(self) -> SharedSession {
        Arc::new(self)
    }

    // ── Override ──────────────────────────────────────────────────────────

    pub fn set_override(&self, strategy: Option<Strategy>) {
        *self
            .override_strategy
            .write()
            .unwrap_or_else(PoisonError::into_inner) = strategy;
    }

    pub fn override_strategy(&self) -> Option<Strategy> {
        *self
            .override_strategy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── Classification cache ─────────────────────────────────────────────

    pub fn cache(&self) -> &Mutex<ClassificationCache> {
        &self.cache
    }

    // ── Outcome tallies ──────────────────────────────────────────────────

    /// Apply a request's outcomes under one write lock.
    ///
    /// Each `(strategy, succeeded)` pair is +1 on success and −1 (floor 0)
    /// on failure.
    pub fn record_outcomes(&self, tier: ComplexityTier, outcomes: &[(Strategy, bool)]) {
        let mut tally = self.tally.write().unwrap_or_else(PoisonError::into_inner);
        for (strategy, succeeded) in outcomes {
            if *succeeded {
                tally.record_success(tier, *strategy);
            } else {
                tally.record_failure(tier, *strategy);
            }
        }
    }

    /// Run `f` against the tally under a read lock
    pub fn with_tally<R>(&self, f: impl FnOnce(&OutcomeTally) -> R) -> R {
        let tally = self.tally.read().unwrap_or_else(PoisonError::into_inner);
        f(&tally)
    }

    pub fn tally_count(&self, tier: ComplexityTier, strategy: Strategy) -> u32 {
        self.with_tally(|t| t.count(tier, strategy))
    }

    // ── Error history ────────────────────────────────────────────────────

    pub fn record_error(&self, input: &str, strategy: Strategy, error: &str) {
        let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        errors.push(ErrorRecord {
            input: input.to_string(),
            strategy,
            error: error.to_string(),
            timestamp: Utc::now(),
        });
        if errors.len() > MAX_ERROR_HISTORY {
            let overflow = errors.len() - MAX_ERROR_HISTORY;
            errors.drain(..overflow);
        }
    }

    pub fn error_history(&self) -> Vec<ErrorRecord> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── Counters ─────────────────────────────────────────────────────────

    /// Count a new request
    pub fn begin_request(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a request that ended successfully
    pub fn mark_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> SessionMetrics {
        let total = self.total.load(Ordering::Relaxed);
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64
        };
        SessionMetrics {
            total,
            succeeded,
            success_rate,
            tallies: self.with_tally(OutcomeTally::snapshot),
            errors_recorded: self
                .errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }

    // ── Conversation ─────────────────────────────────────────────────────

    pub fn conversation(&self) -> Vec<ConversationTurn> {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Append a user/assistant exchange
    pub fn append_exchange(&self, user: &str, assistant: &str) {
        let mut conversation = self
            .conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        conversation.push(ConversationTurn::user(user));
        conversation.push(ConversationTurn::assistant(assistant));
    }

    pub fn reset_conversation(&self) {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
