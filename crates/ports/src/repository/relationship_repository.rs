//! `RelationshipRepository` — materialized `SchemaRelationship` rows (§3,
//! §4.10). The sole write path for both accepted candidates and
//! DB-declared FKs.

use async_trait::async_trait;
use ontology_domain::{
    ids::{ColumnId, ProjectId},
    schema_relationship::SchemaRelationship,
};

use crate::error::PortError;

#[async_trait]
pub trait RelationshipRepository: Send + Sync {
    /// Idempotent upsert keyed by `(source_column_id, target_column_id)`
    /// (§5): inserts if absent, updates in place on conflict. Never creates
    /// a second row for the same pair.
    async fn upsert_relationship(&self, relationship: &SchemaRelationship) -> Result<(), PortError>;

    async fn find_by_columns(
        &self,
        source_column_id: &ColumnId,
        target_column_id: &ColumnId,
    ) -> Result<Option<SchemaRelationship>, PortError>;

    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<SchemaRelationship>, PortError>;
}
