//! Structured helpers for business events and error context.
//!
//! Field naming follows a dotted convention (`event.category`,
//! `error.kind`) so a JSON log sink can filter with
//! `jq 'select(.["event.kind"] == "business_event")'` without parsing
//! message text. `tracing`'s `$($field:ident).+` field syntax supports this
//! directly.

/// Emit a business event as a structured log record.
///
/// Automatically attaches `event.kind = "business_event"` and logs at
/// `info` level.
///
/// Conventional fields: `event.category` ([`event::category`]),
/// `event.action` ([`event::action`]), `event.project_id`, `event.result`
/// ([`event::result`]), plus whatever entity identifiers are relevant.
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// Constants for [`log_business_event!`] field values.
pub mod event {
    pub mod category {
        pub const WORKFLOW: &str = "workflow";
        pub const CANDIDATE: &str = "candidate";
        pub const RELATIONSHIP: &str = "relationship";
        pub const OWNERSHIP: &str = "ownership";
        pub const CONVENTION: &str = "convention";
    }

    pub mod action {
        pub const WORKFLOW_CLAIMED: &str = "workflow.claimed";
        pub const WORKFLOW_PHASE_CHANGED: &str = "workflow.phase_changed";
        pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
        pub const WORKFLOW_FAILED: &str = "workflow.failed";
        pub const WORKFLOW_CANCELLED: &str = "workflow.cancelled";

        pub const CANDIDATE_ACCEPTED: &str = "candidate.accepted";
        pub const CANDIDATE_REJECTED: &str = "candidate.rejected";
        pub const CANDIDATE_NEEDS_REVIEW: &str = "candidate.needs_review";

        pub const RELATIONSHIP_MATERIALIZED: &str = "relationship.materialized";
        pub const RELATIONSHIP_FK_PRESERVED: &str = "relationship.fk_preserved";

        pub const OWNERSHIP_LOST: &str = "ownership.lost";
        pub const OWNERSHIP_RELEASED: &str = "ownership.released";

        pub const CONVENTIONS_FINALIZED: &str = "convention.finalized";
    }

    pub mod entity_type {
        pub const WORKFLOW: &str = "workflow";
        pub const RELATIONSHIP_CANDIDATE: &str = "relationship_candidate";
        pub const SCHEMA_RELATIONSHIP: &str = "schema_relationship";
        pub const ONTOLOGY: &str = "ontology";
    }

    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// Constants for error-context fields attached directly to `tracing::error!`
/// call sites (rather than via the business-event macro).
pub mod error {
    pub mod category {
        /// Database, work queue, or other internal-infrastructure failure.
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// `SchemaProbe` or `LLMClient` call failure.
        pub const EXTERNAL_SERVICE: &str = "external_service";
    }

    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const SCHEMA_PROBE: &str = "schema_probe";
        pub const LLM: &str = "llm";
        pub const PARSE: &str = "parse";
        pub const INTERNAL: &str = "internal";
    }
}
