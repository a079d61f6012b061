//! The business-level view of a schema: entities, relationships, domains,
//! and project-wide conventions (§3, consumed/produced by §4.11).

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::{
    ids::{EntityRelationshipId, OntologyEntityId, OntologyId, ProjectId, TableId},
    schema_relationship::Cardinality,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ontology {
    pub id: OntologyId,
    pub project_id: ProjectId,
    pub version: u32,
    pub is_active: bool,
}

impl Ontology {
    /// Construct the first version for a project. `version` must be `>= 1`
    /// by construction, matching the `version >= 1` invariant (§3).
    pub fn new_version(project_id: ProjectId, version: u32) -> Self {
        assert!(version >= 1, "ontology version must be >= 1");
        Self {
            id: OntologyId::new(),
            project_id,
            version,
            is_active: true,
        }
    }
}

/// Origin of a fact, used to resolve edit conflicts between automated
/// discovery and human/MCP edits. Higher numeric level wins (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provenance {
    Unknown = 0,
    Inferred = 1,
    Mcp = 2,
    Manual = 3,
}

impl Provenance {
    pub fn level(self) -> u8 {
        self as u8
    }

    /// A writer at `self` level may modify an element whose effective level
    /// (the higher of its `created_by`/`updated_by` provenance) is `<= self`.
    pub fn may_overwrite(self, effective: Provenance) -> bool {
        self.level() >= effective.level()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyEntity {
    pub id: OntologyEntityId,
    pub project_id: ProjectId,
    pub ontology_id: OntologyId,
    pub name: String,
    pub description: String,
    pub domain: Option<String>,
    pub primary_table: TableId,
    pub is_promoted: bool,
    pub provenance: Provenance,
    /// Alternate names a human or the LLM has attached to this entity; the
    /// convention finalizer surfaces these as synonyms in per-entity
    /// summaries (§4.11 step 7).
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityRelationshipStatus {
    Pending,
    Confirmed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub id: EntityRelationshipId,
    pub source_entity_id: OntologyEntityId,
    pub target_entity_id: OntologyEntityId,
    pub description: Option<String>,
    pub cardinality: Cardinality,
    pub status: EntityRelationshipStatus,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CurrencyFormat {
    Cents,
    Dollars,
    BasisPoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CurrencyTransform {
    None,
    DivideBy100,
    DivideBy10000,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftDeleteConvention {
    pub enabled: bool,
    pub column: String,
    pub column_type: String,
    pub filter: String,
    /// Fraction of tables carrying this column, in `[0.0, 1.0]`.
    pub coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyConvention {
    pub default_currency: String,
    pub format: CurrencyFormat,
    pub column_patterns: Vec<String>,
    pub transform: CurrencyTransform,
}

/// Which half of the create/update audit pair a convention column serves,
/// per §4.11 step 3's `auditCreated|auditUpdated` partition. `Other` covers
/// the pattern-fallback names (§4.11 step 4) that carry neither signal,
/// e.g. `deleted_at`, which is also reported as its own soft-delete
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditColumnKind {
    Created,
    Updated,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditColumnConvention {
    pub column: String,
    pub kind: AuditColumnKind,
    pub coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectConventions {
    pub soft_delete: Option<SoftDeleteConvention>,
    pub currency: Option<CurrencyConvention>,
    pub audit_columns: Vec<AuditColumnConvention>,
}

/// A relationship edge surfaced in a `DomainSummary`, a flattened view of
/// [`EntityRelationship`] suitable for the LLM domain-description prompt and
/// for external consumers that don't need the full entity graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipGraphEdge {
    pub source_entity_name: String,
    pub target_entity_name: String,
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DomainSummary {
    pub description: String,
    pub domains: Vec<String>,
    pub relationship_graph: Vec<RelationshipGraphEdge>,
    pub conventions: Option<ProjectConventions>,
    /// Present in the source payload shape but never populated or consumed
    /// by this core (sample-question generation is an explicit non-goal).
    pub sample_questions: Option<Vec<String>>,
}
