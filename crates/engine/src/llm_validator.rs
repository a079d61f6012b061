//! Sends surviving candidates to the LLM for semantic validation and
//! classifies the verdict (§4.9). The deterministic gate in
//! [`crate::join_verifier`] only escalates here when it could not resolve a
//! candidate on statistics alone.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use ontology_domain::{
    error::DomainError,
    ids::WorkflowId,
    relationship_candidate::RelationshipCandidate,
    schema_relationship::{Cardinality, RejectionReason},
};
use ontology_ports::{
    LLMClient,
    repository::{AuditRepository, ConversationStatus, LlmConversationRecord},
};
use serde::Deserialize;

use crate::join_verifier::JoinStats;

/// Temperature range the spec assigns to FK validation (`0.0`-`0.2`), as
/// opposed to the `0.3` used for domain description (§4.9, §4.11 step 6).
const VALIDATION_TEMPERATURE: f64 = 0.1;

/// §4.9: `isValidFK=true, confidence >= 0.85` accepts. Configurable via
/// [`crate::config::EngineConfig::llm_confidence_threshold`].
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// §5: per-call LLM timeout, matching [`crate::config::EngineConfig::llm_call_timeout`]'s default.
const DEFAULT_LLM_CALL_TIMEOUT: Duration = Duration::from_secs(90);

/// §4.9: a `needs_review` verdict is marked `is_required=true` when the
/// orphan rate is below this bound.
const REQUIRED_ORPHAN_RATE_BOUND: f64 = 0.05;

const AUDIT_PURPOSE: &str = "relationship_validation";

/// The columns and sample data the prompt describes, gathered once at
/// collection time so this component never re-queries the probe (§4.7
/// step 4, consumed here rather than re-fetched).
#[derive(Debug, Clone)]
pub struct CandidateContext {
    pub source_table: String,
    pub source_column: String,
    pub source_type: String,
    pub target_table: String,
    pub target_column: String,
    pub target_type: String,
    pub source_samples: Vec<String>,
    pub target_samples: Vec<String>,
}

/// The JSON verdict shape from §6: `{isValidFK, confidence, cardinality,
/// reasoning, sourceRole?}`.
#[derive(Debug, Clone, Deserialize)]
struct LlmVerdict {
    #[serde(rename = "isValidFK")]
    is_valid_fk: bool,
    confidence: f64,
    #[serde(default)]
    cardinality: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: String,
    #[serde(default, rename = "sourceRole")]
    #[allow(dead_code)]
    source_role: Option<String>,
}

pub struct LLMValidator {
    llm_client: Arc<dyn LLMClient>,
    audit_repository: Arc<dyn AuditRepository>,
    confidence_threshold: f64,
    llm_call_timeout: Duration,
}

impl LLMValidator {
    pub fn new(
        llm_client: Arc<dyn LLMClient>,
        audit_repository: Arc<dyn AuditRepository>,
        confidence_threshold: f64,
        llm_call_timeout: Duration,
    ) -> Self {
        Self { llm_client, audit_repository, confidence_threshold, llm_call_timeout }
    }

    pub fn with_defaults(llm_client: Arc<dyn LLMClient>, audit_repository: Arc<dyn AuditRepository>) -> Self {
        Self::new(llm_client, audit_repository, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_LLM_CALL_TIMEOUT)
    }

    /// Validates one candidate that the deterministic gate escalated,
    /// mutating it in place to its terminal `accepted`/`rejected`/
    /// `needs_review` status. Transport failures from the LLM call
    /// propagate as `DomainError::TransientIo` so the caller's `WorkQueue`
    /// task (marked `is_llm`) retries with backoff per §4.3/§4.9; a
    /// response that fails to parse is a local-skip, not a propagated
    /// error (§7 `ParseFailure`).
    pub async fn validate(
        &self,
        workflow_id: WorkflowId,
        candidate: &mut RelationshipCandidate,
        stats: &JoinStats,
        context: &CandidateContext,
    ) -> Result<(), DomainError> {
        let prompt = build_prompt(stats, context);
        let response = tokio::time::timeout(
            self.llm_call_timeout,
            self.llm_client.generate_response(&prompt, VALIDATION_SYSTEM_PROMPT, VALIDATION_TEMPERATURE, true),
        )
        .await
        .map_err(|_elapsed| DomainError::TransientIo(format!("LLM call exceeded its {:?} timeout", self.llm_call_timeout)))?
        .map_err(DomainError::from)?;

        match parse_verdict(&response.content) {
            Ok(verdict) => {
                self.record_conversation(workflow_id, candidate.id, &prompt, Some(response.content.clone()), ConversationStatus::Ok, None)
                    .await?;
                apply_verdict(candidate, stats, verdict, self.confidence_threshold);
                Ok(())
            }
            Err(parse_error) => {
                tracing::warn!(candidate.id = %candidate.id, %parse_error, "llm validator: unparseable verdict, rejecting candidate");
                self.record_conversation(
                    workflow_id,
                    candidate.id,
                    &prompt,
                    Some(response.content.clone()),
                    ConversationStatus::Error,
                    Some(parse_error.to_string()),
                )
                .await?;
                candidate.reject(0.0, RejectionReason::LlmRejected);
                Ok(())
            }
        }
    }

    async fn record_conversation(
        &self,
        workflow_id: WorkflowId,
        candidate_id: ontology_domain::ids::RelationshipCandidateId,
        prompt: &str,
        raw_response: Option<String>,
        status: ConversationStatus,
        error_message: Option<String>,
    ) -> Result<(), DomainError> {
        self.audit_repository
            .record_llm_conversation(LlmConversationRecord {
                workflow_id,
                candidate_id: Some(candidate_id),
                purpose: AUDIT_PURPOSE,
                prompt: prompt.to_string(),
                raw_response,
                status,
                error_message,
                created_at: Utc::now(),
            })
            .await
            .map_err(DomainError::from)
    }
}

const VALIDATION_SYSTEM_PROMPT: &str = "You are a database schema analyst. Given a candidate foreign-key \
relationship and its join statistics, decide whether the source column \
genuinely references the target column. Respond with a single JSON object \
and nothing else.";

fn build_prompt(stats: &JoinStats, context: &CandidateContext) -> String {
    format!(
        "Candidate relationship:\n\
         source: {}.{} ({})\n\
         target: {}.{} ({})\n\
         source samples: {:?}\n\
         target samples: {:?}\n\
         statistics: match_rate={:.4}, orphan_count={}, orphan_rate={:.4}, inferred_cardinality={}\n\n\
         Respond with exactly this JSON shape: \
         {{\"isValidFK\": bool, \"confidence\": number, \"cardinality\": \"1:1\"|\"1:N\"|\"N:1\"|\"N:M\"|\"unknown\", \
         \"reasoning\": string, \"sourceRole\": string|null}}",
        context.source_table,
        context.source_column,
        context.source_type,
        context.target_table,
        context.target_column,
        context.target_type,
        context.source_samples,
        context.target_samples,
        stats.match_rate,
        stats.orphan_count,
        stats.orphan_rate,
        stats.cardinality,
    )
}

/// Strips an optional `<think>…</think>` preamble and fenced code blocks
/// before parsing, then parses the remainder as a [`LlmVerdict`] (§4.9,
/// §6: "Content may contain `<think>…</think>` preambles and fenced code
/// blocks; the caller strips both before JSON parse.").
fn parse_verdict(raw: &str) -> Result<LlmVerdict, DomainError> {
    let cleaned = strip_llm_wrapping(raw);
    serde_json::from_str(&cleaned).map_err(|e| DomainError::ParseFailure(format!("LLM verdict: {e}")))
}

/// Shared by [`crate::convention_finalizer`] for the domain-description
/// payload, which carries the same `<think>`/fenced-code wrapping.
pub(crate) fn strip_llm_wrapping(raw: &str) -> String {
    let without_think = strip_think_block(raw);
    strip_code_fence(without_think.trim())
}

fn strip_think_block(raw: &str) -> &str {
    let trimmed = raw.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<think>") {
        if let Some(end) = rest.find("</think>") {
            return rest[end + "</think>".len()..].trim_start();
        }
    }
    raw
}

fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches('\n');
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
        return rest.trim().to_string();
    }
    trimmed.to_string()
}

fn parse_cardinality(raw: Option<&str>, fallback: Cardinality) -> Cardinality {
    match raw {
        Some("1:1") => Cardinality::OneToOne,
        Some("1:N") => Cardinality::OneToN,
        Some("N:1") => Cardinality::NToOne,
        Some("N:M") => Cardinality::NToMany,
        Some("unknown") | None => fallback,
        Some(_) => fallback,
    }
}

/// §4.9 classification: `isValidFK=true, confidence>=threshold` accepts;
/// `isValidFK=false` rejects; otherwise escalates to `needs_review`, marked
/// `is_required` when the orphan rate is below 5%.
fn apply_verdict(candidate: &mut RelationshipCandidate, stats: &JoinStats, verdict: LlmVerdict, confidence_threshold: f64) {
    let cardinality = parse_cardinality(verdict.cardinality.as_deref(), stats.cardinality);
    if verdict.is_valid_fk && verdict.confidence >= confidence_threshold {
        candidate.accept(verdict.confidence, cardinality);
        return;
    }
    if !verdict.is_valid_fk {
        candidate.reject(verdict.confidence, RejectionReason::LlmRejected);
        return;
    }
    candidate.cardinality = Some(cardinality);
    candidate.needs_review(verdict.confidence, stats.orphan_rate < REQUIRED_ORPHAN_RATE_BOUND);
}
