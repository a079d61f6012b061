//! Domain-level error taxonomy (§7).
//!
//! Each variant documents its recovery policy per the specification's
//! error-handling table. Propagation policy is enforced by the engine
//! components that raise these errors, not by this type itself: per-row
//! `TransientIo`/`ParseFailure`/`SchemaMissing` during candidate collection
//! are local (log + skip + advance counters), while any error while
//! materializing an already-accepted candidate is workflow-fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Generic validation failure: a value fails an entity invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist.
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: String },

    /// Optimistic-lock / unique-constraint conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller lacks permission for the attempted operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// DB/LLM timeout or connection reset. Retry with backoff (≤3) before
    /// surfacing to the caller.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// The LLM returned a response that could not be parsed as the expected
    /// JSON shape. Reject the candidate / skip the row; the raw conversation
    /// is recorded with `status=error` by the caller.
    #[error("failed to parse LLM response: {0}")]
    ParseFailure(String),

    /// A table or column referenced by a candidate no longer exists at
    /// materialize time. This is a fail-fast condition: the workflow is
    /// marked failed rather than silently dropping the candidate, because
    /// accepting a candidate is a promise to persist it.
    #[error("schema entity missing at materialize time: {0}")]
    SchemaMissing(String),

    /// Value-overlap sample matched below the configured threshold
    /// (default 95%). The candidate is rejected with this reason persisted.
    #[error("match rate below threshold: {observed:.4} < {threshold:.4}")]
    LowMatchRate { observed: f64, threshold: f64 },

    /// Source column is more distinct than the target by more than the
    /// configured ratio — the putative FK direction is reversed.
    #[error("wrong direction: source distinct {source_distinct} > {ratio:.2} * target distinct {target_distinct}")]
    WrongDirection {
        source_distinct: i64,
        target_distinct: i64,
        ratio: f64,
    },

    /// Orphan rows exist without an LLM allowance for deterministic
    /// acceptance. The candidate is rejected or escalated to
    /// `needs_review`, depending on the orphan rate.
    #[error("orphan rows present: {orphan_count} (rate {orphan_rate:.4})")]
    OrphanIntegrity { orphan_count: i64, orphan_rate: f64 },

    /// `SchemaProbe::analyze_join` failed.
    #[error("join analysis failed: {0}")]
    JoinFailed(String),

    /// The workflow's ownership lease expired before a heartbeat refreshed
    /// it. The runner aborts its own work to prevent split-brain.
    #[error("ownership lease lost for workflow {workflow_id}")]
    OwnershipLost { workflow_id: String },

    /// The workflow was cancelled by the caller. Candidates are deleted and
    /// the workflow is marked cancelled.
    #[error("workflow cancelled")]
    Cancelled,

    /// A precondition for the requested operation was not met (e.g.
    /// `SaveRelationships` called while required candidates are still
    /// pending review). No mutation occurs.
    #[error("precondition not met: {0}")]
    PrereqNotMet(String),

    /// A pipeline phase ran longer than its configured hard timeout. The
    /// workflow is marked failed; unlike a per-task soft timeout, this is
    /// not retried.
    #[error("phase '{phase}' exceeded its hard timeout of {timeout_secs}s")]
    PhaseTimedOut { phase: String, timeout_secs: u64 },
}

impl DomainError {
    /// Whether this error kind is eligible for the `TransientIo` retry
    /// policy (bounded retries with exponential jitter) rather than
    /// immediate local-skip or fail-fast handling.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIo(_))
    }
}
