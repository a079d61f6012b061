//! Aggregates project-wide conventions from promoted entities and their
//! columns, and produces the LLM-authored domain description (§4.11).
//! Runs once an active ontology and its promoted entities already exist.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use ontology_domain::{
    column::{Column, TimestampPurpose},
    error::DomainError,
    ids::{OntologyEntityId, OntologyId, ProjectId},
    ontology::{
        AuditColumnConvention, AuditColumnKind, CurrencyConvention, CurrencyFormat, CurrencyTransform, DomainSummary,
        EntityRelationshipStatus, OntologyEntity, ProjectConventions, Provenance, RelationshipGraphEdge,
        SoftDeleteConvention,
    },
};
use ontology_ports::{
    LLMClient,
    repository::{AuditRepository, ConversationStatus, EntityRepository, LlmConversationRecord, OntologyRepository, SchemaRepository},
};
use serde::Deserialize;

use crate::{llm_validator::strip_llm_wrapping, type_normalizer};

/// §4.11 step 6, as opposed to the `0.0`-`0.2` range used for FK validation.
const DOMAIN_DESCRIPTION_TEMPERATURE: f64 = 0.3;

const AUDIT_PURPOSE: &str = "domain_description";

/// §5: per-call LLM timeout, matching [`crate::config::EngineConfig::llm_call_timeout`]'s default.
const DEFAULT_LLM_CALL_TIMEOUT: Duration = Duration::from_secs(90);

const AUDIT_COLUMN_NAMES: &[&str] = &["created_at", "updated_at", "deleted_at", "created_by", "updated_by"];

const CURRENCY_SUFFIXES: &[&str] = &["_amount", "_price", "_cost", "_total", "_fee"];

const INTEGER_FAMILY: &[&str] = &[
    "int", "int2", "int4", "int8", "smallint", "integer", "bigint", "serial", "bigserial", "smallserial",
];

fn is_timestamp_type(normalized: &str) -> bool {
    matches!(normalized, "timestamp" | "timestamptz" | "timestamp with time zone" | "timestamp without time zone")
}

fn is_boolean_type(normalized: &str) -> bool {
    matches!(normalized, "bool" | "boolean")
}

fn is_integer_type(normalized: &str) -> bool {
    INTEGER_FAMILY.contains(&normalized)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SoftDeleteKind {
    DeletedAtTimestamp,
    IsDeletedBoolean,
    DeletedBoolean,
}

impl SoftDeleteKind {
    fn column_name(self) -> &'static str {
        match self {
            Self::DeletedAtTimestamp => "deleted_at",
            Self::IsDeletedBoolean => "is_deleted",
            Self::DeletedBoolean => "deleted",
        }
    }

    fn column_type(self) -> &'static str {
        match self {
            Self::DeletedAtTimestamp => "timestamp",
            Self::IsDeletedBoolean | Self::DeletedBoolean => "boolean",
        }
    }

    fn filter(self) -> &'static str {
        match self {
            Self::DeletedAtTimestamp => "deleted_at IS NULL",
            Self::IsDeletedBoolean => "is_deleted = false",
            Self::DeletedBoolean => "deleted = false",
        }
    }

    /// Tie-break order from §4.11 step 5: timestamp -> is_deleted -> deleted.
    fn priority(self) -> u8 {
        match self {
            Self::DeletedAtTimestamp => 0,
            Self::IsDeletedBoolean => 1,
            Self::DeletedBoolean => 2,
        }
    }
}

fn classify_soft_delete(column: &Column) -> Option<SoftDeleteKind> {
    let normalized = type_normalizer::normalize(&column.data_type);
    let feature_flagged = column.features.as_ref().is_some_and(|f| f.timestamp.is_soft_delete);
    match column.name.as_str() {
        "deleted_at" if feature_flagged || is_timestamp_type(&normalized) => Some(SoftDeleteKind::DeletedAtTimestamp),
        "is_deleted" if feature_flagged || is_boolean_type(&normalized) => Some(SoftDeleteKind::IsDeletedBoolean),
        "deleted" if feature_flagged || is_boolean_type(&normalized) => Some(SoftDeleteKind::DeletedBoolean),
        _ if feature_flagged && is_timestamp_type(&normalized) => Some(SoftDeleteKind::DeletedAtTimestamp),
        _ if feature_flagged && is_boolean_type(&normalized) => Some(SoftDeleteKind::IsDeletedBoolean),
        _ => None,
    }
}

fn classify_currency(column: &Column) -> Option<(CurrencyFormat, CurrencyTransform, &'static str)> {
    let normalized = type_normalizer::normalize(&column.data_type);
    if let Some(monetary) = column.features.as_ref().and_then(|f| if f.monetary.is_monetary { f.monetary.currency_unit } else { None }) {
        return Some(match monetary {
            ontology_domain::column::CurrencyUnit::Cents => (CurrencyFormat::Cents, CurrencyTransform::DivideBy100, "feature"),
            ontology_domain::column::CurrencyUnit::Dollars => (CurrencyFormat::Dollars, CurrencyTransform::None, "feature"),
            ontology_domain::column::CurrencyUnit::BasisPoints => {
                (CurrencyFormat::BasisPoints, CurrencyTransform::DivideBy10000, "feature")
            }
        });
    }
    let suffix = CURRENCY_SUFFIXES.iter().find(|suffix| column.name.ends_with(**suffix))?;
    if is_integer_type(&normalized) {
        Some((CurrencyFormat::Cents, CurrencyTransform::DivideBy100, suffix))
    } else {
        Some((CurrencyFormat::Dollars, CurrencyTransform::None, suffix))
    }
}

/// Feature-first audit detection (§4.11 step 3): `timestamp.is_audit_field`
/// wins over the name fallback (step 4) whenever it's set, partitioning by
/// `timestamp_purpose` into the created/updated halves. Only when no
/// feature signal is present does the column fall back to an exact match
/// against [`AUDIT_COLUMN_NAMES`].
fn classify_audit(column: &Column) -> Option<(String, AuditColumnKind)> {
    if let Some(features) = &column.features {
        if features.timestamp.is_audit_field {
            let kind = match features.timestamp.timestamp_purpose {
                Some(TimestampPurpose::AuditCreated) => AuditColumnKind::Created,
                Some(TimestampPurpose::AuditUpdated) => AuditColumnKind::Updated,
                _ => AuditColumnKind::Other,
            };
            return Some((column.name.clone(), kind));
        }
    }
    let name = *AUDIT_COLUMN_NAMES.iter().find(|n| **n == column.name)?;
    let kind = match name {
        "created_at" | "created_by" => AuditColumnKind::Created,
        "updated_at" | "updated_by" => AuditColumnKind::Updated,
        _ => AuditColumnKind::Other,
    };
    Some((name.to_string(), kind))
}

/// Counts distinct entities (by primary table) with Technical Patterns
/// Detected signal, surfaced to the domain-description prompt (§4.11 step 6).
#[derive(Debug, Clone, Default)]
struct TechnicalPatterns {
    soft_delete_tables: usize,
    monetary_columns: usize,
    monetary_paired: usize,
    external_services: usize,
    audit_conventions: Vec<AuditColumnConvention>,
}

#[derive(Debug, Deserialize)]
struct DomainDescriptionResponse {
    description: String,
}

pub struct ConventionFinalizer {
    ontology_repository: Arc<dyn OntologyRepository>,
    entity_repository: Arc<dyn EntityRepository>,
    schema_repository: Arc<dyn SchemaRepository>,
    llm_client: Arc<dyn LLMClient>,
    audit_repository: Arc<dyn AuditRepository>,
    coverage_threshold: f64,
    llm_call_timeout: Duration,
}

impl ConventionFinalizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ontology_repository: Arc<dyn OntologyRepository>,
        entity_repository: Arc<dyn EntityRepository>,
        schema_repository: Arc<dyn SchemaRepository>,
        llm_client: Arc<dyn LLMClient>,
        audit_repository: Arc<dyn AuditRepository>,
        coverage_threshold: f64,
    ) -> Self {
        Self {
            ontology_repository,
            entity_repository,
            schema_repository,
            llm_client,
            audit_repository,
            coverage_threshold,
            llm_call_timeout: DEFAULT_LLM_CALL_TIMEOUT,
        }
    }

    pub fn with_llm_call_timeout(mut self, llm_call_timeout: Duration) -> Self {
        self.llm_call_timeout = llm_call_timeout;
        self
    }

    /// Runs the full §4.11 pipeline for `project_id`'s active ontology:
    /// aggregates conventions from promoted entities' columns, calls the LLM
    /// for a domain description, and persists both the project-wide
    /// `DomainSummary` and a per-entity description refresh. A parse failure
    /// on the domain-description response is fail-fast, unlike the LLM
    /// validator's local-skip: the conversation is still recorded as
    /// `status=error` before the error propagates.
    pub async fn finalize(&self, project_id: ProjectId) -> Result<DomainSummary, DomainError> {
        let ontology = self
            .ontology_repository
            .find_active(&project_id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::NotFound { entity_type: "Ontology", id: project_id.to_string() })?;

        let entities = self.entity_repository.list_promoted(&ontology.id).await.map_err(DomainError::from)?;
        let relationships: Vec<_> = self
            .entity_repository
            .list_relationships(&ontology.id)
            .await
            .map_err(DomainError::from)?
            .into_iter()
            .filter(|r| r.status != EntityRelationshipStatus::Rejected)
            .collect();

        let domains = aggregate_domains(&entities);

        let mut columns_by_entity: HashMap<OntologyEntityId, Vec<Column>> = HashMap::new();
        for entity in &entities {
            let columns = self.schema_repository.list_columns(&project_id, &entity.primary_table).await.map_err(DomainError::from)?;
            columns_by_entity.insert(entity.id, columns);
        }
        let total_tables = entities.len().max(1);

        let conventions = self.build_conventions(&columns_by_entity, total_tables);
        let patterns = self.build_technical_patterns(&columns_by_entity, total_tables, &conventions);

        let entity_by_id: HashMap<OntologyEntityId, &OntologyEntity> = entities.iter().map(|e| (e.id, e)).collect();
        let relationship_graph: Vec<RelationshipGraphEdge> = relationships
            .iter()
            .filter_map(|r| {
                let source = entity_by_id.get(&r.source_entity_id)?;
                let target = entity_by_id.get(&r.target_entity_id)?;
                Some(RelationshipGraphEdge {
                    source_entity_name: source.name.clone(),
                    target_entity_name: target.name.clone(),
                    cardinality: r.cardinality,
                })
            })
            .collect();

        let description = self.generate_domain_description(ontology.id, &entities, &relationship_graph, &patterns).await?;

        let summary = DomainSummary {
            description,
            domains,
            relationship_graph,
            conventions: Some(conventions),
            sample_questions: None,
        };

        self.ontology_repository.save_domain_summary(&ontology.id, &summary).await.map_err(DomainError::from)?;
        self.refresh_entity_descriptions(&entities, &columns_by_entity, &relationships, &entity_by_id).await?;

        Ok(summary)
    }

    fn build_conventions(&self, columns_by_entity: &HashMap<OntologyEntityId, Vec<Column>>, total_tables: usize) -> ProjectConventions {
        let mut soft_delete_counts: HashMap<SoftDeleteKind, usize> = HashMap::new();
        let mut currency_hits: Vec<(CurrencyFormat, CurrencyTransform, &'static str)> = Vec::new();
        let mut currency_tables = 0usize;
        let mut audit_table_counts: HashMap<(String, AuditColumnKind), usize> = HashMap::new();

        for columns in columns_by_entity.values() {
            let mut table_soft_delete_kinds = std::collections::HashSet::new();
            let mut table_has_currency = false;
            let mut table_audit_hits = std::collections::HashSet::new();

            for column in columns {
                if let Some(kind) = classify_soft_delete(column) {
                    table_soft_delete_kinds.insert(kind);
                }
                if let Some(hit) = classify_currency(column) {
                    currency_hits.push(hit);
                    table_has_currency = true;
                }
                if let Some(hit) = classify_audit(column) {
                    table_audit_hits.insert(hit);
                }
            }
            for kind in table_soft_delete_kinds {
                *soft_delete_counts.entry(kind).or_insert(0) += 1;
            }
            if table_has_currency {
                currency_tables += 1;
            }
            for hit in table_audit_hits {
                *audit_table_counts.entry(hit).or_insert(0) += 1;
            }
        }

        let soft_delete = soft_delete_counts
            .into_iter()
            .filter(|(_, count)| *count as f64 / total_tables as f64 >= self.coverage_threshold)
            .max_by(|(kind_a, count_a), (kind_b, count_b)| {
                count_a.cmp(count_b).then_with(|| kind_b.priority().cmp(&kind_a.priority()))
            })
            .map(|(kind, count)| SoftDeleteConvention {
                enabled: true,
                column: kind.column_name().to_string(),
                column_type: kind.column_type().to_string(),
                filter: kind.filter().to_string(),
                coverage: count as f64 / total_tables as f64,
            });

        let currency = if currency_tables as f64 / total_tables as f64 >= self.coverage_threshold && !currency_hits.is_empty() {
            let mut format_counts: HashMap<&str, (CurrencyFormat, CurrencyTransform, usize)> = HashMap::new();
            let mut patterns = std::collections::BTreeSet::new();
            for (format, transform, suffix) in &currency_hits {
                patterns.insert(suffix.to_string());
                let key: &'static str = (*format).into();
                let entry = format_counts.entry(key).or_insert((*format, *transform, 0));
                entry.2 += 1;
            }
            let (format, transform, _) = format_counts.into_values().max_by_key(|(_, _, count)| *count).unwrap();
            Some(CurrencyConvention {
                default_currency: "usd".to_string(),
                format,
                column_patterns: patterns.into_iter().collect(),
                transform,
            })
        } else {
            None
        };

        let mut audit_columns: Vec<AuditColumnConvention> = audit_table_counts
            .into_iter()
            .map(|((column, kind), count)| AuditColumnConvention { column, kind, coverage: count as f64 / total_tables as f64 })
            .filter(|c| c.coverage >= self.coverage_threshold)
            .collect();
        audit_columns.sort_by(|a, b| a.column.cmp(&b.column));

        ProjectConventions { soft_delete, currency, audit_columns }
    }

    fn build_technical_patterns(
        &self,
        columns_by_entity: &HashMap<OntologyEntityId, Vec<Column>>,
        _total_tables: usize,
        conventions: &ProjectConventions,
    ) -> TechnicalPatterns {
        let mut soft_delete_tables = 0usize;
        let mut monetary_columns = 0usize;
        let mut monetary_paired = 0usize;
        let mut external_services = std::collections::HashSet::new();

        for columns in columns_by_entity.values() {
            if columns.iter().any(|c| classify_soft_delete(c).is_some()) {
                soft_delete_tables += 1;
            }
            for column in columns {
                if classify_currency(column).is_some() {
                    monetary_columns += 1;
                    if column.features.as_ref().is_some_and(|f| f.monetary.paired_currency_column.is_some()) {
                        monetary_paired += 1;
                    }
                }
                if let Some(service) = column.features.as_ref().and_then(|f| f.identifier.external_service.clone()) {
                    external_services.insert(service);
                }
            }
        }

        TechnicalPatterns {
            soft_delete_tables,
            monetary_columns,
            monetary_paired,
            external_services: external_services.len(),
            audit_conventions: conventions.audit_columns.clone(),
        }
    }

    async fn generate_domain_description(
        &self,
        ontology_id: OntologyId,
        entities: &[OntologyEntity],
        relationship_graph: &[RelationshipGraphEdge],
        patterns: &TechnicalPatterns,
    ) -> Result<String, DomainError> {
        let prompt = build_domain_description_prompt(entities, relationship_graph, patterns);
        let response = tokio::time::timeout(
            self.llm_call_timeout,
            self.llm_client.generate_response(&prompt, DOMAIN_DESCRIPTION_SYSTEM_PROMPT, DOMAIN_DESCRIPTION_TEMPERATURE, true),
        )
        .await
        .map_err(|_elapsed| DomainError::TransientIo(format!("LLM call exceeded its {:?} timeout", self.llm_call_timeout)))?
        .map_err(DomainError::from)?;

        match parse_domain_description(&response.content) {
            Ok(description) => {
                self.record_conversation(ontology_id, &prompt, Some(response.content.clone()), ConversationStatus::Ok, None).await?;
                Ok(description)
            }
            Err(parse_error) => {
                self.record_conversation(
                    ontology_id,
                    &prompt,
                    Some(response.content.clone()),
                    ConversationStatus::Error,
                    Some(parse_error.to_string()),
                )
                .await?;
                Err(parse_error)
            }
        }
    }

    async fn record_conversation(
        &self,
        ontology_id: OntologyId,
        prompt: &str,
        raw_response: Option<String>,
        status: ConversationStatus,
        error_message: Option<String>,
    ) -> Result<(), DomainError> {
        self.audit_repository
            .record_llm_conversation(LlmConversationRecord {
                workflow_id: ontology_workflow_placeholder(ontology_id),
                candidate_id: None,
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

    /// §4.11 final paragraph: refresh each promoted entity's deterministic
    /// summary (column count, related entities) as its `description`,
    /// honoring provenance precedence so a human/MCP edit is never clobbered.
    async fn refresh_entity_descriptions(
        &self,
        entities: &[OntologyEntity],
        columns_by_entity: &HashMap<OntologyEntityId, Vec<Column>>,
        relationships: &[ontology_domain::ontology::EntityRelationship],
        entity_by_id: &HashMap<OntologyEntityId, &OntologyEntity>,
    ) -> Result<(), DomainError> {
        for entity in entities {
            if !Provenance::Inferred.may_overwrite(entity.provenance) {
                continue;
            }
            let column_count = columns_by_entity.get(&entity.id).map(Vec::len).unwrap_or(0);
            let related_names: Vec<String> = relationships
                .iter()
                .filter_map(|r| {
                    if r.source_entity_id == entity.id {
                        entity_by_id.get(&r.target_entity_id).map(|e| e.name.clone())
                    } else if r.target_entity_id == entity.id {
                        entity_by_id.get(&r.source_entity_id).map(|e| e.name.clone())
                    } else {
                        None
                    }
                })
                .collect();

            let mut updated = entity.clone();
            updated.description = build_entity_description(column_count, &related_names);
            updated.provenance = Provenance::Inferred;
            self.entity_repository.upsert_entity(&updated).await.map_err(DomainError::from)?;
        }
        Ok(())
    }
}

/// `AuditRepository::record_llm_conversation` requires a `WorkflowId`, but
/// the domain-description call is keyed by ontology rather than a live
/// workflow; this deterministic placeholder keeps the audit trail append-only
/// without widening the repository contract for one caller.
fn ontology_workflow_placeholder(ontology_id: OntologyId) -> ontology_domain::ids::WorkflowId {
    ontology_domain::ids::WorkflowId::from_uuid(*ontology_id.as_uuid())
}

fn aggregate_domains(entities: &[OntologyEntity]) -> Vec<String> {
    let mut domains: Vec<String> = entities.iter().filter_map(|e| e.domain.clone()).filter(|d| !d.is_empty()).collect();
    domains.sort();
    domains.dedup();
    domains
}

fn build_entity_description(column_count: usize, related_names: &[String]) -> String {
    if related_names.is_empty() {
        format!("{column_count} columns")
    } else {
        format!("{column_count} columns; related to {}", related_names.join(", "))
    }
}

const DOMAIN_DESCRIPTION_SYSTEM_PROMPT: &str = "You are a database documentation assistant. Given a project's \
business entities, their relationships, and the technical conventions detected in its schema, write a concise \
domain description. Respond with a single JSON object and nothing else.";

fn build_domain_description_prompt(entities: &[OntologyEntity], relationship_graph: &[RelationshipGraphEdge], patterns: &TechnicalPatterns) -> String {
    let entity_lines: Vec<String> = entities.iter().map(|e| format!("- {} ({})", e.name, e.description)).collect();
    let relationship_lines: Vec<String> = relationship_graph
        .iter()
        .map(|edge| format!("- {} {} {}", edge.source_entity_name, edge.cardinality, edge.target_entity_name))
        .collect();
    let audit_coverage_met = patterns.audit_conventions.iter().any(|c| c.coverage >= 0.5);
    let pairing_fraction = if patterns.monetary_columns > 0 {
        patterns.monetary_paired as f64 / patterns.monetary_columns as f64
    } else {
        0.0
    };

    format!(
        "Entities:\n{}\n\nRelationships:\n{}\n\nTechnical Patterns Detected:\n\
         - soft-delete tables: {}\n\
         - monetary columns: {} (currency-paired fraction {:.2})\n\
         - external service integrations: {}\n\
         - audit column coverage >= 50%: {}\n\n\
         Respond with exactly this JSON shape: {{\"description\": string}}",
        entity_lines.join("\n"),
        relationship_lines.join("\n"),
        patterns.soft_delete_tables,
        patterns.monetary_columns,
        pairing_fraction,
        patterns.external_services,
        audit_coverage_met,
    )
}

fn parse_domain_description(raw: &str) -> Result<String, DomainError> {
    let cleaned = strip_llm_wrapping(raw);
    let parsed: DomainDescriptionResponse =
        serde_json::from_str(&cleaned).map_err(|e| DomainError::ParseFailure(format!("domain description: {e}")))?;
    Ok(parsed.description)
}

#[cfg(test)]
mod tests {
    use ontology_domain::{
        column::{ColumnFeatures, CurrencyUnit, MonetaryFeatures, TimestampFeatures},
        ids::{ColumnId, DatasourceId, ProjectId, TableId},
        ontology::{EntityRelationship, EntityRelationshipStatus, Ontology},
        schema_relationship::Cardinality,
        table::Table,
    };
    use ontology_ports::testutil::{FakeLlmClient, InMemoryAuditRepository, InMemoryEntityRepository, InMemoryOntologyRepository, InMemorySchemaRepository};
    use pretty_assertions::assert_eq;

    use super::*;

    fn table(project_id: ProjectId, datasource_id: DatasourceId, name: &str) -> Table {
        Table { id: TableId::new(), project_id, datasource_id, schema: "public".to_string(), name: name.to_string(), row_count: None, selected: true }
    }

    fn column(project_id: ProjectId, table_id: TableId, name: &str, data_type: &str, features: Option<ColumnFeatures>) -> Column {
        Column {
            id: ColumnId::new(),
            project_id,
            table_id,
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            is_primary_key: false,
            ordinal_pos: 1,
            distinct_count: None,
            non_null_count: None,
            row_count: None,
            is_joinable: None,
            joinability_reason: None,
            features,
        }
    }

    fn entity(project_id: ProjectId, ontology_id: OntologyId, table_id: TableId, name: &str, domain: Option<&str>) -> OntologyEntity {
        OntologyEntity {
            id: OntologyEntityId::new(),
            project_id,
            ontology_id,
            name: name.to_string(),
            description: String::new(),
            domain: domain.map(|d| d.to_string()),
            primary_table: table_id,
            is_promoted: true,
            provenance: Provenance::Inferred,
            aliases: vec![],
        }
    }

    struct Harness {
        project_id: ProjectId,
        ontology_repo: InMemoryOntologyRepository,
        entity_repo: InMemoryEntityRepository,
        schema_repo: InMemorySchemaRepository,
        ontology: Ontology,
    }

    async fn harness() -> Harness {
        let project_id = ProjectId::new();
        let ontology_repo = InMemoryOntologyRepository::new();
        let ontology = Ontology::new_version(project_id, 1);
        ontology_repo.create(&ontology).await.unwrap();
        Harness {
            project_id,
            ontology_repo,
            entity_repo: InMemoryEntityRepository::new(),
            schema_repo: InMemorySchemaRepository::new(),
            ontology,
        }
    }

    #[tokio::test]
    async fn soft_delete_convention_detected_above_coverage_threshold() {
        let h = harness().await;
        let datasource_id = DatasourceId::new();

        let orders = table(h.project_id, datasource_id, "orders");
        let users = table(h.project_id, datasource_id, "users");
        let orders_entity = entity(h.project_id, h.ontology.id, orders.id, "Order", Some("commerce"));
        let users_entity = entity(h.project_id, h.ontology.id, users.id, "User", Some("commerce"));
        h.entity_repo.upsert_entity(&orders_entity).await.unwrap();
        h.entity_repo.upsert_entity(&users_entity).await.unwrap();

        h.schema_repo.add_column(column(h.project_id, orders.id, "deleted_at", "timestamptz", None));
        h.schema_repo.add_column(column(h.project_id, users.id, "deleted_at", "timestamptz", None));

        let llm = FakeLlmClient::new().push_response(r#"{"description": "A commerce domain."}"#);
        let audit: Arc<dyn AuditRepository> = Arc::new(InMemoryAuditRepository::new());
        let finalizer = ConventionFinalizer::new(
            Arc::new(h.ontology_repo),
            Arc::new(h.entity_repo),
            Arc::new(h.schema_repo),
            Arc::new(llm),
            audit,
            0.5,
        );

        let summary = finalizer.finalize(h.project_id).await.unwrap();

        let soft_delete = summary.conventions.unwrap().soft_delete.unwrap();
        assert_eq!(soft_delete.column, "deleted_at");
        assert_eq!(soft_delete.coverage, 1.0);
        assert_eq!(summary.description, "A commerce domain.");
    }

    #[tokio::test]
    async fn soft_delete_tie_break_prefers_timestamp_over_boolean() {
        let h = harness().await;
        let datasource_id = DatasourceId::new();

        let orders = table(h.project_id, datasource_id, "orders");
        let users = table(h.project_id, datasource_id, "users");
        h.entity_repo.upsert_entity(&entity(h.project_id, h.ontology.id, orders.id, "Order", None)).await.unwrap();
        h.entity_repo.upsert_entity(&entity(h.project_id, h.ontology.id, users.id, "User", None)).await.unwrap();

        h.schema_repo.add_column(column(h.project_id, orders.id, "deleted_at", "timestamptz", None));
        h.schema_repo.add_column(column(h.project_id, users.id, "is_deleted", "boolean", None));

        let llm = FakeLlmClient::new().push_response(r#"{"description": "x"}"#);
        let audit: Arc<dyn AuditRepository> = Arc::new(InMemoryAuditRepository::new());
        let finalizer = ConventionFinalizer::new(
            Arc::new(h.ontology_repo),
            Arc::new(h.entity_repo),
            Arc::new(h.schema_repo),
            Arc::new(llm),
            audit,
            0.5,
        );

        let summary = finalizer.finalize(h.project_id).await.unwrap();
        let soft_delete = summary.conventions.unwrap().soft_delete.unwrap();
        assert_eq!(soft_delete.column, "deleted_at");
    }

    #[tokio::test]
    async fn currency_convention_detected_via_feature_flag() {
        let h = harness().await;
        let datasource_id = DatasourceId::new();
        let invoices = table(h.project_id, datasource_id, "invoices");
        h.entity_repo.upsert_entity(&entity(h.project_id, h.ontology.id, invoices.id, "Invoice", None)).await.unwrap();

        let mut features = ColumnFeatures::default();
        features.monetary = MonetaryFeatures { is_monetary: true, currency_unit: Some(CurrencyUnit::Cents), paired_currency_column: None };
        h.schema_repo.add_column(column(h.project_id, invoices.id, "total_amount", "bigint", Some(features)));

        let llm = FakeLlmClient::new().push_response(r#"{"description": "x"}"#);
        let audit: Arc<dyn AuditRepository> = Arc::new(InMemoryAuditRepository::new());
        let finalizer = ConventionFinalizer::new(
            Arc::new(h.ontology_repo),
            Arc::new(h.entity_repo),
            Arc::new(h.schema_repo),
            Arc::new(llm),
            audit,
            0.5,
        );

        let summary = finalizer.finalize(h.project_id).await.unwrap();
        let currency = summary.conventions.unwrap().currency.unwrap();
        assert_eq!(currency.format, CurrencyFormat::Cents);
        assert_eq!(currency.transform, CurrencyTransform::DivideBy100);
    }

    #[tokio::test]
    async fn audit_convention_detected_via_feature_flag_on_non_canonical_name() {
        let h = harness().await;
        let datasource_id = DatasourceId::new();
        let orders = table(h.project_id, datasource_id, "orders");
        let users = table(h.project_id, datasource_id, "users");
        h.entity_repo.upsert_entity(&entity(h.project_id, h.ontology.id, orders.id, "Order", None)).await.unwrap();
        h.entity_repo.upsert_entity(&entity(h.project_id, h.ontology.id, users.id, "User", None)).await.unwrap();

        // Neither column matches an `AUDIT_COLUMN_NAMES` literal, so only the
        // feature-first pass (not the name fallback) can surface them.
        let mut inserted_on = ColumnFeatures::default();
        inserted_on.timestamp = TimestampFeatures { is_soft_delete: false, is_audit_field: true, timestamp_purpose: Some(TimestampPurpose::AuditCreated) };
        h.schema_repo.add_column(column(h.project_id, orders.id, "inserted_on", "timestamptz", Some(inserted_on.clone())));
        h.schema_repo.add_column(column(h.project_id, users.id, "inserted_on", "timestamptz", Some(inserted_on)));

        let llm = FakeLlmClient::new().push_response(r#"{"description": "x"}"#);
        let audit: Arc<dyn AuditRepository> = Arc::new(InMemoryAuditRepository::new());
        let finalizer = ConventionFinalizer::new(
            Arc::new(h.ontology_repo),
            Arc::new(h.entity_repo),
            Arc::new(h.schema_repo),
            Arc::new(llm),
            audit,
            0.5,
        );

        let summary = finalizer.finalize(h.project_id).await.unwrap();
        let audit_columns = summary.conventions.unwrap().audit_columns;
        assert_eq!(audit_columns.len(), 1);
        assert_eq!(audit_columns[0].column, "inserted_on");
        assert_eq!(audit_columns[0].kind, AuditColumnKind::Created);
        assert_eq!(audit_columns[0].coverage, 1.0);
    }

    #[tokio::test]
    async fn unparseable_description_propagates_error_and_records_audit() {
        let h = harness().await;
        let datasource_id = DatasourceId::new();
        let orders = table(h.project_id, datasource_id, "orders");
        h.entity_repo.upsert_entity(&entity(h.project_id, h.ontology.id, orders.id, "Order", None)).await.unwrap();

        let llm = FakeLlmClient::new().push_response("not json");
        let audit = Arc::new(InMemoryAuditRepository::new());
        let audit_trait: Arc<dyn AuditRepository> = audit.clone();
        let finalizer = ConventionFinalizer::new(
            Arc::new(h.ontology_repo),
            Arc::new(h.entity_repo),
            Arc::new(h.schema_repo),
            Arc::new(llm),
            audit_trait,
            0.5,
        );

        let result = finalizer.finalize(h.project_id).await;
        assert!(matches!(result, Err(DomainError::ParseFailure(_))));
        let workflow_id = ontology_workflow_placeholder(h.ontology.id);
        let conversations = audit.list_llm_conversations_by_workflow(&workflow_id).await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].status, ConversationStatus::Error);
    }

    #[tokio::test]
    async fn entity_description_skips_manual_provenance() {
        let h = harness().await;
        let datasource_id = DatasourceId::new();
        let orders = table(h.project_id, datasource_id, "orders");
        let mut manual_entity = entity(h.project_id, h.ontology.id, orders.id, "Order", None);
        manual_entity.provenance = Provenance::Manual;
        manual_entity.description = "hand-written".to_string();
        h.entity_repo.upsert_entity(&manual_entity).await.unwrap();

        let llm = FakeLlmClient::new().push_response(r#"{"description": "x"}"#);
        let audit: Arc<dyn AuditRepository> = Arc::new(InMemoryAuditRepository::new());
        let entity_repo = h.entity_repo.clone();
        let finalizer = ConventionFinalizer::new(
            Arc::new(h.ontology_repo),
            Arc::new(entity_repo),
            Arc::new(h.schema_repo),
            Arc::new(llm),
            audit,
            0.5,
        );

        finalizer.finalize(h.project_id).await.unwrap();

        let stored = h.entity_repo.get_entity(&manual_entity.id).await.unwrap().unwrap();
        assert_eq!(stored.description, "hand-written");
    }

    #[tokio::test]
    async fn relationship_graph_excludes_rejected_edges() {
        let h = harness().await;
        let datasource_id = DatasourceId::new();
        let orders = table(h.project_id, datasource_id, "orders");
        let users = table(h.project_id, datasource_id, "users");
        let orders_entity = entity(h.project_id, h.ontology.id, orders.id, "Order", None);
        let users_entity = entity(h.project_id, h.ontology.id, users.id, "User", None);
        h.entity_repo.upsert_entity(&orders_entity).await.unwrap();
        h.entity_repo.upsert_entity(&users_entity).await.unwrap();

        h.entity_repo
            .upsert_relationship(&EntityRelationship {
                id: ontology_domain::ids::EntityRelationshipId::new(),
                source_entity_id: orders_entity.id,
                target_entity_id: users_entity.id,
                description: None,
                cardinality: Cardinality::NToOne,
                status: EntityRelationshipStatus::Rejected,
                provenance: Provenance::Inferred,
            })
            .await
            .unwrap();

        let llm = FakeLlmClient::new().push_response(r#"{"description": "x"}"#);
        let audit: Arc<dyn AuditRepository> = Arc::new(InMemoryAuditRepository::new());
        let finalizer = ConventionFinalizer::new(
            Arc::new(h.ontology_repo),
            Arc::new(h.entity_repo),
            Arc::new(h.schema_repo),
            Arc::new(llm),
            audit,
            0.5,
        );

        let summary = finalizer.finalize(h.project_id).await.unwrap();
        assert!(summary.relationship_graph.is_empty());
    }

    #[test]
    fn domain_description_prompt_lists_entities_relationships_and_patterns() {
        let project_id = ProjectId::new();
        let ontology_id = OntologyId::new();
        let primary_table = TableId::new();
        let entities = vec![
            OntologyEntity {
                id: OntologyEntityId::new(),
                project_id,
                ontology_id,
                name: "Order".to_string(),
                description: "A customer purchase".to_string(),
                domain: Some("commerce".to_string()),
                primary_table,
                is_promoted: true,
                provenance: Provenance::Inferred,
                aliases: vec![],
            },
            OntologyEntity {
                id: OntologyEntityId::new(),
                project_id,
                ontology_id,
                name: "User".to_string(),
                description: "An account holder".to_string(),
                domain: Some("identity".to_string()),
                primary_table,
                is_promoted: true,
                provenance: Provenance::Inferred,
                aliases: vec![],
            },
        ];
        let relationship_graph = vec![RelationshipGraphEdge {
            source_entity_name: "Order".to_string(),
            target_entity_name: "User".to_string(),
            cardinality: Cardinality::NToOne,
        }];
        let patterns = TechnicalPatterns {
            soft_delete_tables: 2,
            monetary_columns: 4,
            monetary_paired: 1,
            external_services: 1,
            audit_conventions: vec![AuditColumnConvention {
                column: "created_at".to_string(),
                kind: AuditColumnKind::Created,
                coverage: 0.75,
            }],
        };

        let prompt = build_domain_description_prompt(&entities, &relationship_graph, &patterns);

        assert!(prompt.contains("- Order (A customer purchase)"));
        assert!(prompt.contains("- User (An account holder)"));
        assert!(prompt.contains("- Order N:1 User"));
        assert!(prompt.contains("soft-delete tables: 2"));
        assert!(prompt.contains("monetary columns: 4 (currency-paired fraction 0.25)"));
        assert!(prompt.contains("external service integrations: 1"));
        assert!(prompt.contains("audit column coverage >= 50%: true"));
        assert!(prompt.ends_with("Respond with exactly this JSON shape: {\"description\": string}"));
    }
}
