//! Statistical gate between candidate collection and LLM validation (§4.8).
//!
//! Runs three successively more expensive probe calls per candidate: a
//! sampled value-overlap check, a direction check on the same sample, and a
//! full join analysis. Candidates that clear all three either resolve
//! deterministically (zero orphans) or carry their join statistics forward
//! to [`crate::llm_validator`].

use std::sync::Arc;

use ontology_domain::{
    ids::ProjectId,
    relationship_candidate::RelationshipCandidate,
    schema_relationship::{Cardinality, RejectionReason},
    error::DomainError,
};
use ontology_ports::{
    repository::SchemaRepository,
    schema_probe::{ColumnRef, JoinAnalysis, DEFAULT_SAMPLE_LIMIT},
    SchemaProbe,
};

/// Direction and cardinality both compare a distinct/match ratio against
/// this threshold (§4.8 steps 2 and 5); unlike the match-rate and
/// orphan-rate thresholds, the source treats this one as fixed rather than
/// project-configurable.
const RATIO_THRESHOLD: f64 = 1.1;

/// Join statistics carried forward for a candidate the deterministic gate
/// could not resolve on its own, so the LLM validator's prompt doesn't need
/// a second round trip to the probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinStats {
    pub cardinality: Cardinality,
    pub match_rate: f64,
    pub orphan_count: i64,
    pub orphan_rate: f64,
}

pub struct JoinVerifier {
    schema_repository: Arc<dyn SchemaRepository>,
    schema_probe: Arc<dyn SchemaProbe>,
    match_rate_threshold: f64,
    orphan_rate_threshold: f64,
}

impl JoinVerifier {
    pub fn new(
        schema_repository: Arc<dyn SchemaRepository>,
        schema_probe: Arc<dyn SchemaProbe>,
        match_rate_threshold: f64,
        orphan_rate_threshold: f64,
    ) -> Self {
        Self { schema_repository, schema_probe, match_rate_threshold, orphan_rate_threshold }
    }

    /// Runs the gate for one candidate, mutating it in place when the
    /// outcome is deterministic. Returns `Some(stats)` when the candidate
    /// survives but needs LLM judgment, `None` when it is already terminal
    /// (accepted or rejected).
    pub async fn verify(
        &self,
        project_id: ProjectId,
        candidate: &mut RelationshipCandidate,
    ) -> Result<Option<JoinStats>, DomainError> {
        let (source_ref, target_ref) = match self.resolve_refs(project_id, candidate).await {
            Ok(refs) => refs,
            Err(DomainError::SchemaMissing(reason)) => {
                tracing::warn!(%reason, "join verifier: referenced column or table is gone, rejecting candidate");
                candidate.reject(0.0, RejectionReason::JoinFailed);
                return Ok(None);
            }
            Err(other) => return Err(other),
        };

        let overlap = match self.schema_probe.check_value_overlap(&source_ref, &target_ref, DEFAULT_SAMPLE_LIMIT).await {
            Ok(overlap) => overlap,
            Err(error) => {
                tracing::warn!(%error, "join verifier: value-overlap probe call failed");
                candidate.reject(0.0, RejectionReason::JoinFailed);
                return Ok(None);
            }
        };

        if overlap.match_rate < self.match_rate_threshold {
            candidate.reject(overlap.match_rate, RejectionReason::LowMatchRate);
            return Ok(None);
        }

        if overlap.source_distinct as f64 > RATIO_THRESHOLD * overlap.target_distinct as f64 {
            candidate.reject(overlap.match_rate, RejectionReason::WrongDirection);
            return Ok(None);
        }

        let join = match self.schema_probe.analyze_join(&source_ref, &target_ref).await {
            Ok(join) => join,
            Err(error) => {
                tracing::warn!(%error, "join verifier: full join analysis failed");
                candidate.reject(overlap.match_rate, RejectionReason::JoinFailed);
                return Ok(None);
            }
        };

        let cardinality = infer_cardinality(&join);
        let orphan_rate = orphan_rate(&join);

        if orphan_rate <= self.orphan_rate_threshold {
            candidate.accept(overlap.match_rate, cardinality);
            return Ok(None);
        }

        Ok(Some(JoinStats { cardinality, match_rate: overlap.match_rate, orphan_count: join.orphan_count, orphan_rate }))
    }

    async fn resolve_refs(
        &self,
        project_id: ProjectId,
        candidate: &RelationshipCandidate,
    ) -> Result<(ColumnRef, ColumnRef), DomainError> {
        let source_column = self
            .schema_repository
            .get_column(&project_id, &candidate.source_column_id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::SchemaMissing(format!("source column {}", candidate.source_column_id)))?;
        let target_column = self
            .schema_repository
            .get_column(&project_id, &candidate.target_column_id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::SchemaMissing(format!("target column {}", candidate.target_column_id)))?;
        let source_table = self
            .schema_repository
            .get_table(&project_id, &source_column.table_id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::SchemaMissing(format!("source table {}", source_column.table_id)))?;
        let target_table = self
            .schema_repository
            .get_table(&project_id, &target_column.table_id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::SchemaMissing(format!("target table {}", target_column.table_id)))?;

        Ok((
            ColumnRef::new(&source_table.schema, &source_table.name, &source_column.name),
            ColumnRef::new(&target_table.schema, &target_table.name, &target_column.name),
        ))
    }
}

/// Fraction of matched-or-orphaned source rows that are orphans, used both
/// for the deterministic gate (§4.8 step 4) and the LLM validator's
/// `is_required` rule (§4.9: "`orphanRate < 0.05`").
fn orphan_rate(join: &JoinAnalysis) -> f64 {
    let denominator = join.source_matched + join.orphan_count;
    if denominator <= 0 {
        return 0.0;
    }
    join.orphan_count as f64 / denominator as f64
}

/// §4.8 step 5: `sRatio = joinCount/sourceMatched`, `tRatio =
/// joinCount/targetMatched`, threshold `1.1`.
fn infer_cardinality(join: &JoinAnalysis) -> Cardinality {
    if join.source_matched == 0 || join.target_matched == 0 {
        return Cardinality::Unknown;
    }
    let s_ratio = join.join_count as f64 / join.source_matched as f64;
    let t_ratio = join.join_count as f64 / join.target_matched as f64;
    match (s_ratio <= RATIO_THRESHOLD, t_ratio <= RATIO_THRESHOLD) {
        (true, true) => Cardinality::OneToOne,
        (true, false) => Cardinality::NToOne,
        (false, true) => Cardinality::OneToN,
        (false, false) => Cardinality::NToMany,
    }
}
