//! Tunables for the engine, read via `from_env()` in the lineage's style —
//! `std::env::var(...).unwrap_or_else(|_| default)` — rather than a config
//! file parser, since none ships with this crate (§0.3).

use std::time::Duration;

/// Either of the two relationship-discovery strategies the source
/// alternates between (§9 Open Question); selection is a project setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipDiscoveryStrategy {
    Deterministic,
    LlmAssisted,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `W` in §4.3/§5: concurrent WorkQueue tasks (default 16, range 8-32).
    pub work_queue_concurrency: usize,
    /// Separate concurrency cap for LLM-heavy tasks (§5).
    pub llm_concurrency: usize,
    /// §4.8 step 1: reject below this match rate.
    pub match_rate_threshold: f64,
    /// §4.8 step 4: deterministic acceptance requires orphan_rate == 0.0;
    /// the 0.70/0.50 alternative from §9 is reachable via this setting.
    pub orphan_rate_threshold: f64,
    /// §3/§4.4: workflow lease time-to-live.
    pub lease_ttl: Duration,
    /// §4.4/§5: must be strictly less than `lease_ttl` by at least 2×.
    pub heartbeat_period: Duration,
    /// §5: per-task soft timeout before retry.
    pub task_soft_timeout: Duration,
    /// §5: per-phase hard timeout before the workflow is failed.
    pub phase_hard_timeout: Duration,
    /// §5: per-LLM-call timeout.
    pub llm_call_timeout: Duration,
    /// §4.5: DurableTaskQueue debounce window.
    pub durable_queue_debounce: Duration,
    /// §4.11 step 5: minimum covered-table fraction for a convention.
    pub convention_coverage_threshold: f64,
    /// §4.9: LLM validator acceptance confidence floor.
    pub llm_confidence_threshold: f64,
    /// §9: optional review-candidate pass over orphan tables, off by default.
    pub review_candidate_pass_enabled: bool,
    /// §9: mutually exclusive discovery strategies.
    pub relationship_discovery_strategy: RelationshipDiscoveryStrategy,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            work_queue_concurrency: env_usize("WORK_QUEUE_CONCURRENCY", 16),
            llm_concurrency: env_usize("LLM_CONCURRENCY", 4),
            match_rate_threshold: env_f64("MATCH_RATE_THRESHOLD", 0.95),
            orphan_rate_threshold: env_f64("ORPHAN_RATE_THRESHOLD", 0.0),
            lease_ttl: Duration::from_secs(env_u64("LEASE_TTL_SECONDS", 60)),
            heartbeat_period: Duration::from_secs(env_u64("HEARTBEAT_PERIOD_SECONDS", 20)),
            task_soft_timeout: Duration::from_secs(env_u64("TASK_SOFT_TIMEOUT_SECONDS", 300)),
            phase_hard_timeout: Duration::from_secs(env_u64("PHASE_HARD_TIMEOUT_SECONDS", 3600)),
            llm_call_timeout: Duration::from_secs(env_u64("LLM_CALL_TIMEOUT_SECONDS", 90)),
            durable_queue_debounce: Duration::from_millis(env_u64("DURABLE_QUEUE_DEBOUNCE_MS", 250)),
            convention_coverage_threshold: env_f64("CONVENTION_COVERAGE_THRESHOLD", 0.5),
            llm_confidence_threshold: env_f64("LLM_CONFIDENCE_THRESHOLD", 0.85),
            review_candidate_pass_enabled: env_bool("REVIEW_CANDIDATE_PASS_ENABLED", false),
            relationship_discovery_strategy: match std::env::var("RELATIONSHIP_DISCOVERY_STRATEGY").as_deref() {
                Ok("llm_assisted") => RelationshipDiscoveryStrategy::LlmAssisted,
                _ => RelationshipDiscoveryStrategy::Deterministic,
            },
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_queue_concurrency: 16,
            llm_concurrency: 4,
            match_rate_threshold: 0.95,
            orphan_rate_threshold: 0.0,
            lease_ttl: Duration::from_secs(60),
            heartbeat_period: Duration::from_secs(20),
            task_soft_timeout: Duration::from_secs(300),
            phase_hard_timeout: Duration::from_secs(3600),
            llm_call_timeout: Duration::from_secs(90),
            durable_queue_debounce: Duration::from_millis(250),
            convention_coverage_threshold: 0.5,
            llm_confidence_threshold: 0.85,
            review_candidate_pass_enabled: false,
            relationship_discovery_strategy: RelationshipDiscoveryStrategy::Deterministic,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
