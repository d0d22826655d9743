//! Complexity classifier
//!
//! Maps free text to a [`ComplexityTier`]:
//!
//! ```text
//! text ─┬─ cache hit (Jaccard > threshold) ──────────────► cached tier
//!       ├─ rule tables Simple → Medium → Complex → Advanced ─┐
//!       └─ oracle ("return one digit 1-4") ─────────────────┤
//!                                                            ▼
//!                                   technical + diagnostic upgrade (never down)
//!                                                            ▼
//!                                                      cache + return
//! ```
//!
//! Oracle failures never surface: the classifier falls back to `Medium`.

use std::collections::{HashSet, VecDeque};
use std::sync::{LazyLock, Mutex, PoisonError};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use super::tier::ComplexityTier;

/// Near-duplicate threshold; a cached entry must score strictly above it.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Cached classifications kept before the oldest is evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Word-set Jaccard similarity of two strings (lower-cased, whitespace split).
///
/// Returns 0.0 when either side has no words.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let a_words: HashSet<&str> = a_lower.split_whitespace().collect();
    let b_words: HashSet<&str> = b_lower.split_whitespace().collect();

    if a_words.is_empty() || b_words.is_empty() {
        return 0.0;
    }

    let intersection = a_words.intersection(&b_words).count();
    let union = a_words.union(&b_words).count();
    intersection as f64 / union as f64
}

// ── Cache ──────────────────────────────────────────────────────────────────

/// Bounded text → tier cache keyed by the raw request string
#[derive(Debug, Clone)]
pub struct ClassificationCache {
    entries: VecDeque<(String, ComplexityTier)>,
    capacity: usize,
    threshold: f64,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CACHE_CAPACITY, DEFAULT_SIMILARITY_THRESHOLD)
    }

    pub fn with_limits(capacity: usize, threshold: f64) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            threshold,
        }
    }

    /// Look up `text`; exact hits first, then the most similar near-duplicate.
    pub fn lookup(&self, text: &str) -> Option<ComplexityTier> {
        if let Some((_, tier)) = self.entries.iter().find(|(key, _)| key == text) {
            return Some(*tier);
        }

        let mut best: Option<(f64, ComplexityTier)> = None;
        for (key, tier) in &self.entries {
            let score = jaccard_similarity(key, text);
            if score > self.threshold && best.map_or(true, |(b, _)| score > b) {
                best = Some((score, *tier));
            }
        }
        best.map(|(_, tier)| tier)
    }

    /// Insert or refresh an entry, evicting the oldest past capacity.
    pub fn insert(&mut self, text: &str, tier: ComplexityTier) {
        self.entries.retain(|(key, _)| key != text);
        self.entries.push_back((text.to_string(), tier));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new()
    }
}

// ── Rule tables ────────────────────────────────────────────────────────────

struct Rule {
    pattern: Regex,
    /// The rule does not fire when this also matches.
    unless: Option<Regex>,
}

impl Rule {
    fn new(pattern: &str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("classifier rule regex should compile"),
            unless: None,
        }
    }

    fn unless(mut self, pattern: &str) -> Self {
        self.unless = Some(Regex::new(pattern).expect("classifier guard regex should compile"));
        self
    }

    fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
            && !self.unless.as_ref().is_some_and(|guard| guard.is_match(text))
    }
}

/// Rule tables in priority order; the first tier with a matching rule wins.
static RULE_TABLES: LazyLock<Vec<(ComplexityTier, Vec<Rule>)>> = LazyLock::new(|| {
    vec![
        (
            ComplexityTier::Simple,
            vec![
                Rule::new(r"时间|现在几点"),
                Rule::new(r"打开\s*[\w\s]+"),
                Rule::new(r"(?:设置|调整)\s*音量"),
                Rule::new(r"(?:查看|显示)\s*(?:系统信息|电池|网络|时间)"),
                Rule::new(r"(?i)\bwhat time\b|\bcurrent time\b|\bwhat day is it\b"),
                Rule::new(r"(?i)^\s*(?:please\s+)?open\s+\w+"),
                Rule::new(r"(?i)\b(?:set|adjust|change|turn (?:up|down))\s+(?:the\s+)?volume\b"),
                Rule::new(
                    r"(?i)\b(?:show|check|display)\s+(?:me\s+)?(?:the\s+|my\s+)?(?:system info|battery|network|time)",
                ),
            ],
        ),
        (
            ComplexityTier::Medium,
            vec![
                Rule::new(r"搜索\s*[\w\s]+"),
                Rule::new(r"创建\s*(?:笔记|文件)"),
                Rule::new(r"运行\s*(?:命令|脚本)"),
                Rule::new(r"进程|安装的应用"),
                Rule::new(r"(?i)\b(?:search|look)\s+for\s+\w+|\bfind\s+(?:the\s+)?files?\b"),
                Rule::new(r"(?i)\bcreate\s+(?:a\s+|an\s+)?(?:note|file)"),
                Rule::new(r"(?i)\brun\s+(?:a\s+|the\s+)?(?:command|script)"),
                Rule::new(r"(?i)\bprocess(?:es)?\b|\binstalled app"),
            ],
        ),
        (
            ComplexityTier::Complex,
            vec![
                Rule::new(r"(?:诊断|解决|修复)\s*问题"),
                Rule::new(r"(?:比较|分析)\s*[\w\s]+"),
                Rule::new(r"(?:优化|提高)\s*[\w\s]+"),
                Rule::new(r"如何").unless(r"如何\s*(?:打开|设置|调整|查看|显示)"),
                Rule::new(r"(?i)\b(?:diagnose|troubleshoot|fix|solve)\b.*\b(?:problem|issue)"),
                Rule::new(r"(?i)\b(?:compare|analy[sz]e)\s+\w+"),
                Rule::new(r"(?i)\b(?:optimi[sz]e|improve|speed up)\s+\w+"),
                Rule::new(r"(?i)\bhow (?:do|can|should) i\b")
                    .unless(r"(?i)\bhow (?:do|can|should) i\s+(?:open|set|adjust|show|check)\b"),
            ],
        ),
        (
            ComplexityTier::Advanced,
            vec![
                Rule::new(r"自动化\s*[\w\s]+"),
                Rule::new(r"编写\s*(?:脚本|程序)"),
                Rule::new(r"监控\s*[\w\s]+"),
                Rule::new(r"实现\s*[\w\s]+功能"),
                Rule::new(r"(?i)\bautomate\s+\w+"),
                Rule::new(r"(?i)\bwrite\s+(?:a\s+|me\s+a\s+)?(?:script|program)"),
                Rule::new(r"(?i)\bmonitor\s+\w+"),
                Rule::new(r"(?i)\bimplement\s+[\w\s]+feature"),
            ],
        ),
    ]
});

/// Apply the ordered rule tables. `None` means no table matched.
pub fn match_rules(text: &str) -> Option<ComplexityTier> {
    RULE_TABLES
        .iter()
        .find(|(_, rules)| rules.iter().any(|rule| rule.matches(text)))
        .map(|(tier, _)| *tier)
}

// ── Technical-diagnostic upgrade ───────────────────────────────────────────

const TECHNICAL_KEYWORDS: &[&str] = &[
    "诊断", "优化", "修复", "配置", "设置", "安装", "卸载", "更新", "升级", "降级", "编译",
    "构建", "调试", "分析", "网络", "系统", "性能", "内存", "磁盘", "CPU", "进程", "端口",
    "服务", "驱动", "内核", "防火墙", "权限", "安全", "network", "system", "performance",
    "memory", "disk", "cpu", "process", "port", "service", "driver", "kernel", "firewall",
    "permission", "wifi", "bluetooth", "install", "compile", "build", "debug", "config",
];

const DIAGNOSTIC_KEYWORDS: &[&str] = &[
    "如何", "怎样", "为什么", "原因", "问题", "错误", "失败", "无法", "不能", "不工作", "慢",
    "卡顿", "崩溃", "冻结", "不响应", "蓝屏", "黑屏", "白屏", "闪退", "死机", "why", "cause",
    "problem", "error", "fail", "cannot", "can't", "won't", "not working", "slow", "lag", "crash",
    "freeze", "frozen", "unresponsive", "hang",
];

/// True when the text names a technical domain and a failure symptom at once.
pub fn is_technical_diagnostic(text: &str) -> bool {
    let lower = text.to_lowercase();
    let technical = TECHNICAL_KEYWORDS
        .iter()
        .any(|k| lower.contains(&k.to_lowercase()));
    let diagnostic = DIAGNOSTIC_KEYWORDS
        .iter()
        .any(|k| lower.contains(&k.to_lowercase()));
    technical && diagnostic
}

/// Raise `tier` to at least `Complex` for technical-diagnostic text.
pub fn apply_upgrade(text: &str, tier: ComplexityTier) -> ComplexityTier {
    if is_technical_diagnostic(text) {
        tier.max(ComplexityTier::Complex)
    } else {
        tier
    }
}

// ── Oracle ─────────────────────────────────────────────────────────────────

/// Failure from the model-backed tier oracle
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("tier oracle unavailable: {0}")]
    Unavailable(String),

    #[error("tier oracle request failed: {0}")]
    Request(String),
}

/// Model-backed fallback used when no rule table matches.
///
/// Receives the full prompt built by [`oracle_prompt`] and returns the raw
/// reply text.
#[async_trait]
pub trait TierOracle: Send + Sync {
    async fn estimate(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Fixed "return one digit 1-4" prompt for the oracle
pub fn oracle_prompt(text: &str) -> String {
    format!(
        "Rate the complexity of the following user request and reply with its level number:\n\
         1 = simple (direct lookup or a single action, e.g. check the time, open an app)\n\
         2 = medium (2-3 steps with a condition, e.g. find a specific file)\n\
         3 = complex (multi-step, needs reasoning or system diagnosis)\n\
         4 = advanced (creative solution, complex diagnosis, adaptive execution)\n\n\
         Reply with a single digit only, no explanation. User request: \"{text}\""
    )
}

/// First ASCII digit of the reply mapped to a tier; anything else is Advanced.
pub fn parse_tier_digit(reply: &str) -> ComplexityTier {
    reply
        .chars()
        .find(|c| c.is_ascii_digit())
        .and_then(|c| c.to_digit(10))
        .and_then(|d| ComplexityTier::from_ordinal(d as u8))
        .unwrap_or(ComplexityTier::Advanced)
}

// ── Classifier ─────────────────────────────────────────────────────────────

/// Stateless classifier; state lives in the cache handed to [`classify`](Self::classify).
#[derive(Debug, Clone, Default)]
pub struct ComplexityClassifier;

impl ComplexityClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify `text`, consulting and updating `cache`.
    pub async fn classify(
        &self,
        text: &str,
        cache: &Mutex<ClassificationCache>,
        oracle: &dyn TierOracle,
    ) -> ComplexityTier {
        let cached = cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(text);
        if let Some(tier) = cached {
            debug!(tier = %tier, "classification cache hit");
            return tier;
        }

        let initial = match match_rules(text) {
            Some(tier) => {
                debug!(tier = %tier, "classified by rule table");
                tier
            }
            None => match oracle.estimate(&oracle_prompt(text)).await {
                Ok(reply) => {
                    let tier = parse_tier_digit(&reply);
                    debug!(tier = %tier, reply = %reply.trim(), "classified by oracle");
                    tier
                }
                Err(e) => {
                    warn!(error = %e, "complexity oracle failed, defaulting to medium");
                    return ComplexityTier::Medium;
                }
            },
        };

        let tier = apply_upgrade(text, initial);
        if tier != initial {
            debug!(from = %initial, to = %tier, "technical-diagnostic upgrade");
        }

        cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(text, tier);
        tier
    }
}
