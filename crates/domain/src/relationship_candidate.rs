//! `RelationshipCandidate` — a (source column, target column) pair under
//! evaluation as a potential foreign key (§3).

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::{
    ids::{ColumnId, RelationshipCandidateId, WorkflowId},
    schema_relationship::{Cardinality, RejectionReason},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Accepted,
    Rejected,
    NeedsReview,
}

/// How a candidate's source identification rule qualified it (§4.7 step 1),
/// also reused as `SchemaRelationship.inference_method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DetectionMethod {
    /// Declared in the source database's FK catalog.
    ForeignKey,
    /// Accepted on value-overlap / join statistics alone.
    ValueMatch,
    /// Qualified via `ColumnFeatures` (role/purpose/classification_path).
    ColumnFeatures,
    /// Surviving candidate escalated to human review.
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    pub id: RelationshipCandidateId,
    pub workflow_id: WorkflowId,
    pub source_column_id: ColumnId,
    pub target_column_id: ColumnId,
    pub status: CandidateStatus,
    /// Set by the LLM validator when `orphan_rate < 0.05` on a
    /// `needs_review` verdict (§4.9): a required candidate blocks
    /// `SaveRelationships` until a human decides it.
    pub is_required: bool,
    pub detection_method: DetectionMethod,
    pub confidence: f64,
    pub user_decision: Option<UserDecision>,
    /// Inferred by `JoinVerifier` or returned by the LLM verdict; carried
    /// through so `RelationshipMaterializer` doesn't have to recompute it.
    pub cardinality: Option<Cardinality>,
    /// Why a `rejected` or deterministic-gate-failed candidate was turned
    /// down, kept for tuning observability (§4.8, §4.10).
    pub rejection_reason: Option<RejectionReason>,
}

impl RelationshipCandidate {
    pub fn new(
        workflow_id: WorkflowId,
        source_column_id: ColumnId,
        target_column_id: ColumnId,
        detection_method: DetectionMethod,
    ) -> Self {
        Self {
            id: RelationshipCandidateId::new(),
            workflow_id,
            source_column_id,
            target_column_id,
            status: CandidateStatus::Pending,
            is_required: false,
            detection_method,
            confidence: 0.0,
            user_decision: None,
            cardinality: None,
            rejection_reason: None,
        }
    }

    /// The key used to detect "already present" pairs when generating new
    /// candidates (§4.7 step 3) and for relationship-upsert idempotency.
    pub fn join_key(&self) -> (ColumnId, ColumnId) {
        (self.source_column_id, self.target_column_id)
    }

    pub fn accept(&mut self, confidence: f64, cardinality: Cardinality) {
        self.status = CandidateStatus::Accepted;
        self.confidence = confidence;
        self.cardinality = Some(cardinality);
    }

    pub fn reject(&mut self, confidence: f64, reason: RejectionReason) {
        self.status = CandidateStatus::Rejected;
        self.confidence = confidence;
        self.rejection_reason = Some(reason);
    }

    pub fn needs_review(&mut self, confidence: f64, is_required: bool) {
        self.status = CandidateStatus::NeedsReview;
        self.confidence = confidence;
        self.is_required = is_required;
    }

    /// Whether this candidate blocks `SaveRelationships` (§4.12): required
    /// and still pending a human decision.
    pub fn blocks_save(&self) -> bool {
        self.status == CandidateStatus::NeedsReview && self.is_required && self.user_decision.is_none()
    }
}
