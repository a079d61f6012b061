//! Identifies FK source columns, enumerates FK target columns, and produces
//! candidate pairs with enough statistics attached to avoid redundant DB
//! work downstream (§4.7).

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use ontology_domain::{
    column::{ClassificationPath, Column, ColumnPurpose, ColumnRole},
    error::DomainError,
    ids::{ColumnId, DatasourceId, ProjectId, TableId, WorkflowId},
    relationship_candidate::{DetectionMethod, RelationshipCandidate},
    table::Table,
    workflow_entity_state::{EntityType, WorkflowEntityState},
};
use ontology_ports::{
    repository::{RelationshipRepository, SchemaRepository},
    schema_probe::{ColumnRef, ColumnStat, DEFAULT_SAMPLE_LIMIT, MAX_COLUMN_STATS_BATCH},
    SchemaProbe,
};
use serde::{Deserialize, Serialize};

use crate::{progress::ProgressCallback, semantic_filter, type_normalizer, workflow_state_store::WorkflowStateStore};

/// Per-candidate statistics gathered once at collection time (§4.7 step 4),
/// persisted into the candidate's `WorkflowEntityState.state_data` so the
/// LLM validator can build its prompt without re-querying the probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateStats {
    pub source_distinct: i64,
    pub source_non_null: i64,
    pub source_row_count: i64,
    pub target_distinct: i64,
    pub target_non_null: i64,
    pub target_row_count: i64,
    pub source_samples: Vec<String>,
    pub target_samples: Vec<String>,
}

pub struct CollectorOutcome {
    pub candidates: Vec<RelationshipCandidate>,
    /// Tables skipped due to a per-table stats error (log-and-continue,
    /// §4.7 failure policy).
    pub tables_skipped: u64,
}

/// A column qualifies as an FK *source* iff it is not a primary key, is not
/// excluded by type, and at least one feature signal applies. Naming
/// patterns are never used for source qualification (§4.7 step 1).
fn qualifies_as_source(column: &Column) -> bool {
    if column.is_primary_key {
        return false;
    }
    if type_normalizer::is_excluded_for_join(&column.data_type) {
        return false;
    }
    match &column.features {
        Some(features) => {
            features.role == ColumnRole::ForeignKey
                || features.purpose == ColumnPurpose::Identifier
                || matches!(features.classification_path, ClassificationPath::Uuid | ClassificationPath::ExternalId)
                || column.is_joinable == Some(true)
        }
        None => column.is_joinable == Some(true),
    }
}

/// A column qualifies as an FK *target* iff it is a primary key or unique
/// (`distinct_count == non_null_count`) (§4.7 step 2).
fn qualifies_as_target(column: &Column) -> bool {
    column.is_primary_key || column.is_unique()
}

fn detection_method_for(column: &Column) -> DetectionMethod {
    match &column.features {
        Some(features) if features.role == ColumnRole::ForeignKey => DetectionMethod::ColumnFeatures,
        Some(features) if features.purpose == ColumnPurpose::Identifier => DetectionMethod::ColumnFeatures,
        Some(features)
            if matches!(features.classification_path, ClassificationPath::Uuid | ClassificationPath::ExternalId) =>
        {
            DetectionMethod::ColumnFeatures
        }
        _ => DetectionMethod::ValueMatch,
    }
}

pub struct CandidateCollector {
    schema_repository: Arc<dyn SchemaRepository>,
    relationship_repository: Arc<dyn RelationshipRepository>,
    schema_probe: Arc<dyn SchemaProbe>,
    state_store: Arc<WorkflowStateStore>,
}

impl CandidateCollector {
    pub fn new(
        schema_repository: Arc<dyn SchemaRepository>,
        relationship_repository: Arc<dyn RelationshipRepository>,
        schema_probe: Arc<dyn SchemaProbe>,
        state_store: Arc<WorkflowStateStore>,
    ) -> Self {
        Self { schema_repository, relationship_repository, schema_probe, state_store }
    }

    pub async fn collect(
        &self,
        project_id: ProjectId,
        datasource_id: DatasourceId,
        workflow_id: WorkflowId,
        progress: ProgressCallback,
    ) -> Result<CollectorOutcome, DomainError> {
        let tables = self.schema_repository.list_selected_tables(&project_id, &datasource_id).await?;
        if tables.is_empty() {
            progress(0, 0, "no selected tables");
            return Ok(CollectorOutcome { candidates: Vec::new(), tables_skipped: 0 });
        }

        let mut columns_by_table: HashMap<TableId, Vec<Column>> = HashMap::new();
        let mut tables_skipped = 0u64;

        for table in &tables {
            match self.schema_repository.list_columns(&project_id, &table.id).await {
                Ok(columns) => {
                    columns_by_table.insert(table.id, columns);
                }
                Err(error) => {
                    tracing::warn!(table.id = %table.id, %error, "candidate collector: column lookup failed, skipping table");
                    tables_skipped += 1;
                }
            }
        }

        let mut column_index: HashMap<ColumnId, (Table, Column)> = HashMap::new();
        for table in &tables {
            let Some(columns) = columns_by_table.get(&table.id) else { continue };
            for column in columns {
                column_index.insert(column.id, (table.clone(), column.clone()));
            }
        }

        let mut targets_by_type: HashMap<String, Vec<(Table, Column)>> = HashMap::new();
        for table in &tables {
            let Some(columns) = columns_by_table.get(&table.id) else { continue };
            for column in columns {
                if qualifies_as_target(column) {
                    let canonical = type_normalizer::normalize(&column.data_type);
                    targets_by_type.entry(canonical).or_default().push((table.clone(), column.clone()));
                }
            }
        }

        let existing_relationships = self.relationship_repository.list_by_project(&project_id).await?;
        let existing_pairs: HashSet<(ColumnId, ColumnId)> =
            existing_relationships.iter().map(|r| r.join_key()).collect();

        let mut sources: Vec<(Table, Column)> = Vec::new();
        for table in &tables {
            let Some(columns) = columns_by_table.get(&table.id) else { continue };
            for column in columns {
                if qualifies_as_source(column) {
                    sources.push((table.clone(), column.clone()));
                }
            }
        }

        let mut wanted_columns: HashMap<TableId, HashSet<String>> = HashMap::new();
        for (table, column) in &sources {
            wanted_columns.entry(table.id).or_default().insert(column.name.clone());
        }
        for targets in targets_by_type.values() {
            for (table, column) in targets {
                wanted_columns.entry(table.id).or_default().insert(column.name.clone());
            }
        }
        let stats_cache = self.prefetch_column_stats(&tables, &wanted_columns).await;

        let total = sources.len() as u64;
        progress(0, total, "scanning columns for FK sources");

        let mut candidates = Vec::new();
        let mut new_states = Vec::new();

        for (processed, (source_table, source_column)) in sources.into_iter().enumerate() {
            let canonical_source_type = type_normalizer::normalize(&source_column.data_type);
            // Numeric-to-numeric pairs are unconditionally rejected: real
            // numeric FKs are assumed to arrive via DB-declared constraints,
            // not inference (§4.1 rationale).
            if type_normalizer::is_numeric(&canonical_source_type) {
                continue;
            }

            if let Some(targets) = targets_by_type.get(&canonical_source_type) {
                for (target_table, target_column) in targets {
                    if target_table.id == source_table.id {
                        continue;
                    }
                    if existing_pairs.contains(&(source_column.id, target_column.id)) {
                        continue;
                    }
                    if !semantic_filter::should_create_candidate(&source_column.name, &target_table.name) {
                        continue;
                    }

                    let candidate = RelationshipCandidate::new(
                        workflow_id,
                        source_column.id,
                        target_column.id,
                        detection_method_for(&source_column),
                    );

                    let stats = self
                        .gather_stats(&stats_cache, &source_table, &source_column, target_table, target_column)
                        .await;
                    let mut state = WorkflowEntityState::new(workflow_id, EntityType::Candidate, candidate.id.to_string());
                    match stats {
                        Ok(stats) => state.mark_complete(Some(serde_json::to_value(&stats).map_err(|e| {
                            DomainError::ParseFailure(format!("serializing candidate stats: {e}"))
                        })?)),
                        Err(error) => state.mark_failed(error.to_string()),
                    }
                    new_states.push(state);
                    candidates.push(candidate);
                }
            }

            if (processed as u64) % 50 == 0 || processed as u64 + 1 == total {
                progress(processed as u64 + 1, total, "scanning columns for FK sources");
            }
        }

        if !new_states.is_empty() {
            self.state_store.create_batch(&new_states).await?;
        }

        self.resume_failed_candidates(&workflow_id, &candidates, &column_index, &stats_cache).await?;

        progress(total, total, "candidate collection complete");
        Ok(CollectorOutcome { candidates, tables_skipped })
    }

    /// Resume pass over candidate stats-gathering failures (§4.6): retries
    /// each `failed` candidate state still within its retry budget, then
    /// fails the whole collection with an aggregated error for whatever
    /// remains `failed` beyond it.
    async fn resume_failed_candidates(
        &self,
        workflow_id: &WorkflowId,
        candidates: &[RelationshipCandidate],
        column_index: &HashMap<ColumnId, (Table, Column)>,
        stats_cache: &HashMap<(TableId, String), ColumnStat>,
    ) -> Result<(), DomainError> {
        let candidates_by_id: HashMap<String, &RelationshipCandidate> = candidates.iter().map(|c| (c.id.to_string(), c)).collect();

        loop {
            let eligible = self.state_store.list_retry_eligible(workflow_id, EntityType::Candidate).await?;
            if eligible.is_empty() {
                break;
            }

            for state in eligible {
                let Some(candidate) = candidates_by_id.get(state.entity_key.as_str()) else { continue };
                let Some((source_table, source_column)) = column_index.get(&candidate.source_column_id) else { continue };
                let Some((target_table, target_column)) = column_index.get(&candidate.target_column_id) else { continue };

                let stats = self.gather_stats(stats_cache, source_table, source_column, target_table, target_column).await;
                match stats {
                    Ok(stats) => {
                        let value = serde_json::to_value(&stats).map_err(|e| DomainError::ParseFailure(format!("serializing candidate stats: {e}")))?;
                        self.state_store.mark_complete(state, Some(value)).await?;
                    }
                    Err(error) => {
                        tracing::warn!(candidate.id = %candidate.id, %error, "candidate collector: retry of stats gathering failed");
                        self.state_store.mark_failed(state, error.to_string()).await?;
                    }
                }
            }
        }

        let exhausted = self.state_store.list_exhausted(workflow_id).await?;
        if !exhausted.is_empty() {
            let summary = exhausted
                .iter()
                .map(|s| format!("{}: {}", s.entity_key, s.last_error.as_deref().unwrap_or("unknown error")))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DomainError::TransientIo(format!(
                "{} candidate(s) exhausted their retry budget: {summary}",
                exhausted.len()
            )));
        }

        Ok(())
    }

    /// Fetches distinct/non-null/row counts for every source- and
    /// target-qualifying column up front, one or more `analyze_column_stats`
    /// calls per table chunked through [`chunk_columns`] at
    /// [`MAX_COLUMN_STATS_BATCH`] (§6: "must tolerate batches up to 25
    /// columns; larger sets are chunked by the caller"). Fetching once per
    /// table here instead of once per candidate pair also avoids
    /// re-querying the same popular target column's stats for every source
    /// that pairs with it.
    async fn prefetch_column_stats(
        &self,
        tables: &[Table],
        wanted_columns: &HashMap<TableId, HashSet<String>>,
    ) -> HashMap<(TableId, String), ColumnStat> {
        let mut cache = HashMap::new();
        for table in tables {
            let Some(wanted) = wanted_columns.get(&table.id) else { continue };
            if wanted.is_empty() {
                continue;
            }
            let names: Vec<String> = wanted.iter().cloned().collect();
            for chunk in chunk_columns(&names) {
                match self.schema_probe.analyze_column_stats(&table.schema, &table.name, chunk).await {
                    Ok(stats) => {
                        for stat in stats {
                            cache.insert((table.id, stat.column.clone()), stat);
                        }
                    }
                    Err(error) => {
                        tracing::warn!(table.id = %table.id, %error, "candidate collector: column stats batch failed");
                    }
                }
            }
        }
        cache
    }

    /// Gathers the statistics attached to a surviving candidate pair:
    /// distinct/non-null/row counts for both columns (from the prefetched
    /// `stats_cache`) plus up to [`DEFAULT_SAMPLE_LIMIT`] sample values from
    /// each side (§4.7 step 4).
    async fn gather_stats(
        &self,
        stats_cache: &HashMap<(TableId, String), ColumnStat>,
        source_table: &Table,
        source_column: &Column,
        target_table: &Table,
        target_column: &Column,
    ) -> Result<CandidateStats, DomainError> {
        let source_stat = stats_cache.get(&(source_table.id, source_column.name.clone()));
        let target_stat = stats_cache.get(&(target_table.id, target_column.name.clone()));

        let source_ref = ColumnRef::new(&source_table.schema, &source_table.name, &source_column.name);
        let target_ref = ColumnRef::new(&target_table.schema, &target_table.name, &target_column.name);

        let source_samples = self.schema_probe.sample_values(&source_ref, DEFAULT_SAMPLE_LIMIT).await.map_err(DomainError::from)?;
        let target_samples = self.schema_probe.sample_values(&target_ref, DEFAULT_SAMPLE_LIMIT).await.map_err(DomainError::from)?;

        Ok(CandidateStats {
            source_distinct: source_stat.map(|s| s.distinct_count).unwrap_or(0),
            source_non_null: source_stat.map(|s| s.non_null_count).unwrap_or(0),
            source_row_count: source_stat.map(|s| s.row_count).unwrap_or(0),
            target_distinct: target_stat.map(|s| s.distinct_count).unwrap_or(0),
            target_non_null: target_stat.map(|s| s.non_null_count).unwrap_or(0),
            target_row_count: target_stat.map(|s| s.row_count).unwrap_or(0),
            source_samples,
            target_samples,
        })
    }
}

/// Chunks a column list into batches `analyze_column_stats` can accept in a
/// single call (§6: "must tolerate batches up to 25 columns; larger sets
/// are chunked by the caller").
fn chunk_columns(columns: &[String]) -> impl Iterator<Item = &[String]> {
    columns.chunks(MAX_COLUMN_STATS_BATCH)
}

#[cfg(test)]
mod tests {
    use ontology_domain::{
        column::ColumnFeatures,
        ids::{DatasourceId, ProjectId, TableId},
        workflow_entity_state::EntityStateStatus,
    };
    use ontology_ports::{
        schema_probe::ColumnStat,
        testutil::{FakeSchemaProbe, InMemoryRelationshipRepository, InMemorySchemaRepository, InMemoryWorkflowRepository},
    };
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::progress::noop_progress;

    fn table(project_id: ProjectId, datasource_id: DatasourceId, name: &str) -> Table {
        Table {
            id: TableId::new(),
            project_id,
            datasource_id,
            schema: "public".to_string(),
            name: name.to_string(),
            row_count: None,
            selected: true,
        }
    }

    fn pk_column(project_id: ProjectId, table_id: TableId, name: &str, data_type: &str) -> Column {
        Column {
            id: ColumnId::new(),
            project_id,
            table_id,
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: false,
            is_primary_key: true,
            ordinal_pos: 1,
            distinct_count: None,
            non_null_count: None,
            row_count: None,
            is_joinable: None,
            joinability_reason: None,
            features: None,
        }
    }

    fn fk_source_column(project_id: ProjectId, table_id: TableId, name: &str, data_type: &str) -> Column {
        Column {
            id: ColumnId::new(),
            project_id,
            table_id,
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            is_primary_key: false,
            ordinal_pos: 2,
            distinct_count: None,
            non_null_count: None,
            row_count: None,
            is_joinable: None,
            joinability_reason: None,
            features: Some(ColumnFeatures { role: ColumnRole::ForeignKey, ..Default::default() }),
        }
    }

    #[tokio::test]
    async fn collects_candidate_for_uuid_fk_feature_source() {
        let project_id = ProjectId::new();
        let datasource_id = DatasourceId::new();
        let workflow_id = WorkflowId::new();

        let schema_repo = InMemorySchemaRepository::new();
        let users = table(project_id, datasource_id, "users");
        let orders = table(project_id, datasource_id, "orders");
        schema_repo.add_table(users.clone());
        schema_repo.add_table(orders.clone());

        let users_id = pk_column(project_id, users.id, "id", "uuid");
        schema_repo.add_column(users_id.clone());
        let orders_user_id = fk_source_column(project_id, orders.id, "user_id", "uuid");
        schema_repo.add_column(orders_user_id.clone());

        let relationship_repo = InMemoryRelationshipRepository::new();
        let workflow_repo: Arc<dyn ontology_ports::repository::WorkflowRepository> =
            Arc::new(InMemoryWorkflowRepository::new());
        let state_store = Arc::new(WorkflowStateStore::new(workflow_repo, 3));
        let probe = FakeSchemaProbe::new()
            .with_column_stats(
                "public",
                "users",
                vec![ColumnStat { column: "id".to_string(), row_count: 10, non_null_count: 10, distinct_count: 10 }],
            )
            .with_column_stats(
                "public",
                "orders",
                vec![ColumnStat { column: "user_id".to_string(), row_count: 20, non_null_count: 20, distinct_count: 10 }],
            );

        let collector = CandidateCollector::new(
            Arc::new(schema_repo),
            Arc::new(relationship_repo),
            Arc::new(probe),
            state_store,
        );

        let outcome = collector.collect(project_id, datasource_id, workflow_id, noop_progress()).await.unwrap();

        assert_eq!(outcome.candidates.len(), 1);
        let candidate = &outcome.candidates[0];
        assert_eq!(candidate.source_column_id, orders_user_id.id);
        assert_eq!(candidate.target_column_id, users_id.id);
        assert_eq!(candidate.detection_method, DetectionMethod::ColumnFeatures);
    }

    #[tokio::test]
    async fn resume_pass_recovers_a_candidate_whose_stats_gathering_failed_once() {
        let project_id = ProjectId::new();
        let datasource_id = DatasourceId::new();
        let workflow_id = WorkflowId::new();

        let schema_repo = InMemorySchemaRepository::new();
        let users = table(project_id, datasource_id, "users");
        let orders = table(project_id, datasource_id, "orders");
        schema_repo.add_table(users.clone());
        schema_repo.add_table(orders.clone());

        let users_id = pk_column(project_id, users.id, "id", "uuid");
        schema_repo.add_column(users_id.clone());
        let orders_user_id = fk_source_column(project_id, orders.id, "user_id", "uuid");
        schema_repo.add_column(orders_user_id.clone());

        let relationship_repo = InMemoryRelationshipRepository::new();
        let workflow_repo: Arc<dyn ontology_ports::repository::WorkflowRepository> =
            Arc::new(InMemoryWorkflowRepository::new());
        let state_store = Arc::new(WorkflowStateStore::new(workflow_repo, 3));
        let source_ref = ColumnRef::new("public", "orders", "user_id");
        let probe = FakeSchemaProbe::new().with_sample_values_failures(&source_ref, 1);

        let collector = CandidateCollector::new(
            Arc::new(schema_repo),
            Arc::new(relationship_repo),
            Arc::new(probe),
            Arc::clone(&state_store),
        );

        let outcome = collector.collect(project_id, datasource_id, workflow_id, noop_progress()).await.unwrap();

        assert_eq!(outcome.candidates.len(), 1);
        let states = state_store.list_by_workflow(&workflow_id).await.unwrap();
        let candidate_state = states.iter().find(|s| s.entity_type == EntityType::Candidate).unwrap();
        assert_eq!(candidate_state.status, EntityStateStatus::Complete);
        assert_eq!(candidate_state.retry_count, 1, "one failed attempt before the resume pass recovered it");
    }

    #[tokio::test]
    async fn resume_pass_fails_collection_once_a_candidate_exhausts_its_retries() {
        let project_id = ProjectId::new();
        let datasource_id = DatasourceId::new();
        let workflow_id = WorkflowId::new();

        let schema_repo = InMemorySchemaRepository::new();
        let users = table(project_id, datasource_id, "users");
        let orders = table(project_id, datasource_id, "orders");
        schema_repo.add_table(users.clone());
        schema_repo.add_table(orders.clone());

        let users_id = pk_column(project_id, users.id, "id", "uuid");
        schema_repo.add_column(users_id.clone());
        let orders_user_id = fk_source_column(project_id, orders.id, "user_id", "uuid");
        schema_repo.add_column(orders_user_id.clone());

        let relationship_repo = InMemoryRelationshipRepository::new();
        let workflow_repo: Arc<dyn ontology_ports::repository::WorkflowRepository> =
            Arc::new(InMemoryWorkflowRepository::new());
        let state_store = Arc::new(WorkflowStateStore::new(workflow_repo, 3));
        let source_ref = ColumnRef::new("public", "orders", "user_id");
        let probe = FakeSchemaProbe::new().with_sample_values_failures(&source_ref, 10);

        let collector = CandidateCollector::new(
            Arc::new(schema_repo),
            Arc::new(relationship_repo),
            Arc::new(probe),
            Arc::clone(&state_store),
        );

        let error = collector.collect(project_id, datasource_id, workflow_id, noop_progress()).await.unwrap_err();

        assert!(matches!(error, DomainError::TransientIo(_)));
        let states = state_store.list_by_workflow(&workflow_id).await.unwrap();
        let candidate_state = states.iter().find(|s| s.entity_type == EntityType::Candidate).unwrap();
        assert_eq!(candidate_state.status, EntityStateStatus::Failed);
        assert_eq!(candidate_state.retry_count, 3, "retries stop once max_retries is reached");
    }

    #[tokio::test]
    async fn s5_semantic_filter_prevents_email_candidate() {
        let project_id = ProjectId::new();
        let datasource_id = DatasourceId::new();
        let workflow_id = WorkflowId::new();

        let schema_repo = InMemorySchemaRepository::new();
        let accounts = table(project_id, datasource_id, "accounts");
        let auth = table(project_id, datasource_id, "account_authentications");
        schema_repo.add_table(accounts.clone());
        schema_repo.add_table(auth.clone());

        // `uuid` rather than `text`/`varchar` so the pair survives type
        // exclusion and actually reaches the name-based semantic filter.
        let mut auth_email = pk_column(project_id, auth.id, "email", "uuid");
        auth_email.is_primary_key = false;
        auth_email.distinct_count = Some(5);
        auth_email.non_null_count = Some(5);
        schema_repo.add_column(auth_email);

        let mut accounts_email = fk_source_column(project_id, accounts.id, "email", "uuid");
        accounts_email.features = Some(ColumnFeatures { role: ColumnRole::ForeignKey, ..Default::default() });
        schema_repo.add_column(accounts_email);

        let relationship_repo = InMemoryRelationshipRepository::new();
        let workflow_repo: Arc<dyn ontology_ports::repository::WorkflowRepository> =
            Arc::new(InMemoryWorkflowRepository::new());
        let state_store = Arc::new(WorkflowStateStore::new(workflow_repo, 3));
        let probe = FakeSchemaProbe::new();

        let collector = CandidateCollector::new(
            Arc::new(schema_repo),
            Arc::new(relationship_repo),
            Arc::new(probe),
            state_store,
        );

        let outcome = collector.collect(project_id, datasource_id, workflow_id, noop_progress()).await.unwrap();

        assert!(outcome.candidates.is_empty(), "email source column must never be treated as an FK source");
    }

    #[tokio::test]
    async fn numeric_to_numeric_pairs_are_never_generated() {
        let project_id = ProjectId::new();
        let datasource_id = DatasourceId::new();
        let workflow_id = WorkflowId::new();

        let schema_repo = InMemorySchemaRepository::new();
        let users = table(project_id, datasource_id, "users");
        let orders = table(project_id, datasource_id, "orders");
        schema_repo.add_table(users.clone());
        schema_repo.add_table(orders.clone());

        schema_repo.add_column(pk_column(project_id, users.id, "id", "bigint"));
        let mut orders_user_id = fk_source_column(project_id, orders.id, "user_id", "bigint");
        orders_user_id.is_joinable = Some(true);
        schema_repo.add_column(orders_user_id);

        let relationship_repo = InMemoryRelationshipRepository::new();
        let workflow_repo: Arc<dyn ontology_ports::repository::WorkflowRepository> =
            Arc::new(InMemoryWorkflowRepository::new());
        let state_store = Arc::new(WorkflowStateStore::new(workflow_repo, 3));
        let probe = FakeSchemaProbe::new();

        let collector = CandidateCollector::new(
            Arc::new(schema_repo),
            Arc::new(relationship_repo),
            Arc::new(probe),
            state_store,
        );

        let outcome = collector.collect(project_id, datasource_id, workflow_id, noop_progress()).await.unwrap();

        assert!(outcome.candidates.is_empty(), "numeric-to-numeric pairs must be unconditionally rejected");
    }

    #[tokio::test]
    async fn already_present_relationship_is_not_recreated() {
        let project_id = ProjectId::new();
        let datasource_id = DatasourceId::new();
        let workflow_id = WorkflowId::new();

        let schema_repo = InMemorySchemaRepository::new();
        let users = table(project_id, datasource_id, "users");
        let orders = table(project_id, datasource_id, "orders");
        schema_repo.add_table(users.clone());
        schema_repo.add_table(orders.clone());

        let users_id = pk_column(project_id, users.id, "id", "uuid");
        schema_repo.add_column(users_id.clone());
        let orders_user_id = fk_source_column(project_id, orders.id, "user_id", "uuid");
        schema_repo.add_column(orders_user_id.clone());

        let relationship_repo = InMemoryRelationshipRepository::new();
        let existing = ontology_domain::schema_relationship::SchemaRelationship::new(
            ontology_domain::schema_relationship::NewSchemaRelationship {
                project_id,
                source_table_id: orders.id,
                source_column_id: orders_user_id.id,
                target_table_id: users.id,
                target_column_id: users_id.id,
                relationship_type: ontology_domain::schema_relationship::RelationshipType::Fk,
                cardinality: ontology_domain::schema_relationship::Cardinality::NToOne,
                confidence: ontology_domain::value_objects::Confidence::certain(),
                inference_method: Some(DetectionMethod::ForeignKey),
                is_validated: true,
                rejection_reason: None,
            },
        )
        .unwrap();
        relationship_repo.upsert_relationship(&existing).await.unwrap();

        let workflow_repo: Arc<dyn ontology_ports::repository::WorkflowRepository> =
            Arc::new(InMemoryWorkflowRepository::new());
        let state_store = Arc::new(WorkflowStateStore::new(workflow_repo, 3));
        let probe = FakeSchemaProbe::new();

        let collector = CandidateCollector::new(
            Arc::new(schema_repo),
            Arc::new(relationship_repo),
            Arc::new(probe),
            state_store,
        );

        let outcome = collector.collect(project_id, datasource_id, workflow_id, noop_progress()).await.unwrap();

        assert!(outcome.candidates.is_empty(), "a pair already present as a SchemaRelationship must not be recollected");
    }
}
