//! `SchemaRelationship` — a materialized (declared or inferred) foreign-key
//! edge between two columns (§3).

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::{
    DomainError,
    ids::{ColumnId, ProjectId, SchemaRelationshipId, TableId},
    relationship_candidate::DetectionMethod,
    value_objects::Confidence,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RelationshipType {
    /// Declared in the source database's catalog. Preserved verbatim,
    /// never produced by the LLM.
    Fk,
    /// Accepted by the deterministic gate or the LLM validator.
    Inferred,
    /// Accepted with `is_validated = false`, pending human review.
    Review,
}

/// `Display` renders the spec's own notation (`1:1`, `1:N`, …) rather than
/// the variant name, for log lines and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[strum(serialize = "1:1")]
    OneToOne,
    #[strum(serialize = "1:N")]
    OneToN,
    #[strum(serialize = "N:1")]
    NToOne,
    #[strum(serialize = "N:M")]
    NToMany,
    #[strum(serialize = "unknown")]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    LowMatchRate,
    WrongDirection,
    JoinFailed,
    LlmRejected,
    OrphanIntegrity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRelationship {
    pub id: SchemaRelationshipId,
    pub project_id: ProjectId,
    pub source_table_id: TableId,
    pub source_column_id: ColumnId,
    pub target_table_id: TableId,
    pub target_column_id: ColumnId,
    pub relationship_type: RelationshipType,
    pub cardinality: Cardinality,
    pub confidence: Confidence,
    pub inference_method: Option<DetectionMethod>,
    pub is_validated: bool,
    pub rejection_reason: Option<RejectionReason>,
}

/// Parameters for constructing a new [`SchemaRelationship`], separated from
/// the entity itself so [`SchemaRelationship::new`] can validate the
/// cross-field invariants below before the struct ever exists unvalidated.
pub struct NewSchemaRelationship {
    pub project_id: ProjectId,
    pub source_table_id: TableId,
    pub source_column_id: ColumnId,
    pub target_table_id: TableId,
    pub target_column_id: ColumnId,
    pub relationship_type: RelationshipType,
    pub cardinality: Cardinality,
    pub confidence: Confidence,
    pub inference_method: Option<DetectionMethod>,
    pub is_validated: bool,
    pub rejection_reason: Option<RejectionReason>,
}

impl SchemaRelationship {
    /// Construct a relationship, enforcing:
    /// - `relationship_type = Fk ⇒ is_validated ∧ confidence = 1.0`
    /// - source and target columns must not resolve to the same column
    ///   (a column cannot be its own foreign key target)
    pub fn new(params: NewSchemaRelationship) -> Result<Self, DomainError> {
        if matches!(params.relationship_type, RelationshipType::Fk)
            && !(params.is_validated && params.confidence.as_f64() >= 1.0)
        {
            return Err(DomainError::Validation(
                "relationship_type=fk requires is_validated=true and confidence=1.0".to_string(),
            ));
        }
        if params.source_column_id == params.target_column_id {
            return Err(DomainError::Validation(
                "a column cannot be its own foreign-key target".to_string(),
            ));
        }
        Ok(Self {
            id: SchemaRelationshipId::new(),
            project_id: params.project_id,
            source_table_id: params.source_table_id,
            source_column_id: params.source_column_id,
            target_table_id: params.target_table_id,
            target_column_id: params.target_column_id,
            relationship_type: params.relationship_type,
            cardinality: params.cardinality,
            confidence: params.confidence,
            inference_method: params.inference_method,
            is_validated: params.is_validated,
            rejection_reason: params.rejection_reason,
        })
    }

    /// The idempotency key used by `upsert_relationship` (§5: "Relationship
    /// upsert is idempotent keyed by `(sourceColumnID, targetColumnID)`").
    pub fn join_key(&self) -> (ColumnId, ColumnId) {
        (self.source_column_id, self.target_column_id)
    }
}
