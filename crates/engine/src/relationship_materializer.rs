//! Persists accepted relationships and preserves DB-declared FKs verbatim
//! (§4.10). The sole writer of [`SchemaRelationship`] rows.

use std::{collections::HashMap, sync::Arc};

use ontology_domain::{
    error::DomainError,
    ids::{ColumnId, DatasourceId, ProjectId, TableId},
    relationship_candidate::{CandidateStatus, DetectionMethod, RelationshipCandidate},
    schema_relationship::{Cardinality, NewSchemaRelationship, RelationshipType, SchemaRelationship},
    value_objects::Confidence,
};
use ontology_ports::{
    SchemaProbe,
    repository::{RelationshipRepository, SchemaRepository},
};

pub struct RelationshipMaterializer {
    schema_repository: Arc<dyn SchemaRepository>,
    relationship_repository: Arc<dyn RelationshipRepository>,
    schema_probe: Arc<dyn SchemaProbe>,
}

impl RelationshipMaterializer {
    pub fn new(
        schema_repository: Arc<dyn SchemaRepository>,
        relationship_repository: Arc<dyn RelationshipRepository>,
        schema_probe: Arc<dyn SchemaProbe>,
    ) -> Self {
        Self { schema_repository, relationship_repository, schema_probe }
    }

    /// §4.10, §8 property 3: upserts every foreign key declared in the
    /// source database's catalog, unchanged, with `confidence=1` and
    /// `is_validated=true`. The LLM is never consulted for these.
    pub async fn materialize_declared_fks(&self, project_id: ProjectId, datasource_id: DatasourceId) -> Result<u64, DomainError> {
        if !self.schema_probe.supports_foreign_keys().await.map_err(DomainError::from)? {
            return Ok(0);
        }
        let declared = self.schema_probe.discover_foreign_keys().await.map_err(DomainError::from)?;
        if declared.is_empty() {
            return Ok(0);
        }

        let lookup = self.build_column_lookup(project_id, datasource_id).await?;
        let mut materialized = 0u64;

        for fk in declared {
            let source = lookup.get(&(fk.source_schema.clone(), fk.source_table.clone(), fk.source_column.clone()));
            let target = lookup.get(&(fk.target_schema.clone(), fk.target_table.clone(), fk.target_column.clone()));
            let (Some(&(source_table_id, source_column_id)), Some(&(target_table_id, target_column_id))) = (source, target) else {
                // The catalog can reference tables outside the selected set
                // for this datasource; unlike an accepted candidate, a
                // declared FK we cannot resolve is simply not ours to
                // preserve yet, not a fatal condition.
                tracing::debug!(
                    source = %format!("{}.{}.{}", fk.source_schema, fk.source_table, fk.source_column),
                    target = %format!("{}.{}.{}", fk.target_schema, fk.target_table, fk.target_column),
                    "relationship materializer: declared FK references an unselected table, skipping"
                );
                continue;
            };

            let relationship = SchemaRelationship::new(NewSchemaRelationship {
                project_id,
                source_table_id,
                source_column_id,
                target_table_id,
                target_column_id,
                relationship_type: RelationshipType::Fk,
                cardinality: Cardinality::Unknown,
                confidence: Confidence::certain(),
                inference_method: Some(DetectionMethod::ForeignKey),
                is_validated: true,
                rejection_reason: None,
            })?;
            self.relationship_repository.upsert_relationship(&relationship).await.map_err(DomainError::from)?;
            materialized += 1;
        }

        Ok(materialized)
    }

    /// §4.10: for every candidate whose final status is `accepted`, looks
    /// up both endpoint columns and upserts a `SchemaRelationship`.
    /// Candidates accepted via the statistical gate or the LLM validator
    /// materialize as `inferred` (`is_validated=true`); a candidate
    /// accepted through human review (`detection_method=Review`)
    /// materializes as `review` (`is_validated=false`), since a human
    /// override is not itself a re-run of the statistical/LLM checks.
    /// Either endpoint column missing is fail-fast (§7 `SchemaMissing`):
    /// accepting a candidate is a promise to persist it.
    pub async fn materialize_accepted(
        &self,
        project_id: ProjectId,
        candidates: &[RelationshipCandidate],
    ) -> Result<u64, DomainError> {
        let mut materialized = 0u64;

        for candidate in candidates {
            if candidate.status != CandidateStatus::Accepted {
                continue;
            }

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

            let (relationship_type, is_validated) = if candidate.detection_method == DetectionMethod::Review {
                (RelationshipType::Review, false)
            } else {
                (RelationshipType::Inferred, true)
            };

            let relationship = SchemaRelationship::new(NewSchemaRelationship {
                project_id,
                source_table_id: source_column.table_id,
                source_column_id: candidate.source_column_id,
                target_table_id: target_column.table_id,
                target_column_id: candidate.target_column_id,
                relationship_type,
                cardinality: candidate.cardinality.unwrap_or(Cardinality::Unknown),
                confidence: Confidence::new(candidate.confidence)?,
                inference_method: Some(candidate.detection_method),
                is_validated,
                rejection_reason: None,
            })?;
            self.relationship_repository.upsert_relationship(&relationship).await.map_err(DomainError::from)?;
            materialized += 1;
        }

        Ok(materialized)
    }

    async fn build_column_lookup(
        &self,
        project_id: ProjectId,
        datasource_id: DatasourceId,
    ) -> Result<HashMap<(String, String, String), (TableId, ColumnId)>, DomainError> {
        let tables = self.schema_repository.list_selected_tables(&project_id, &datasource_id).await.map_err(DomainError::from)?;
        let mut lookup = HashMap::new();
        for table in tables {
            let columns = self.schema_repository.list_columns(&project_id, &table.id).await.map_err(DomainError::from)?;
            for column in columns {
                lookup.insert((table.schema.clone(), table.name.clone(), column.name.clone()), (table.id, column.id));
            }
        }
        Ok(lookup)
    }
}
