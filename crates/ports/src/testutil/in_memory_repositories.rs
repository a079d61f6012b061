//! In-memory repository fakes, grounded on the workspace lineage's
//! `Mock*Repository` pattern (a `Mutex<Vec<T>>` behind `Clone` handles so
//! the same backing store can be shared between a test and the component
//! under test).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ontology_domain::{
    column::{Column, ColumnFeatures},
    ids::{
        ColumnId, DatasourceId, OntologyEntityId, OntologyId, ProjectId, RelationshipCandidateId,
        TableId, WorkflowEntityStateId, WorkflowId,
    },
    ontology::{DomainSummary, EntityRelationship, Ontology, OntologyEntity},
    relationship_candidate::RelationshipCandidate,
    schema_relationship::SchemaRelationship,
    table::Table,
    workflow::{Workflow, WorkflowPhase},
    workflow_entity_state::{EntityStateStatus, WorkflowEntityState},
};

use crate::{
    error::PortError,
    repository::{
        AuditRepository, CandidateRepository, EntityRepository, LlmConversationRecord,
        OntologyRepository, RelationshipRepository, SchemaRepository, WorkflowRepository,
    },
};

// ===== InMemorySchemaRepository =====

#[derive(Clone, Default)]
pub struct InMemorySchemaRepository {
    tables: Arc<Mutex<Vec<Table>>>,
    columns: Arc<Mutex<Vec<Column>>>,
}

impl InMemorySchemaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&self, table: Table) {
        self.tables.lock().unwrap().push(table);
    }

    pub fn add_column(&self, column: Column) {
        self.columns.lock().unwrap().push(column);
    }
}

#[async_trait]
impl SchemaRepository for InMemorySchemaRepository {
    async fn list_selected_tables(
        &self,
        project_id: &ProjectId,
        datasource_id: &DatasourceId,
    ) -> Result<Vec<Table>, PortError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .iter()
            .filter(|t| &t.project_id == project_id && &t.datasource_id == datasource_id && t.selected)
            .cloned()
            .collect())
    }

    async fn list_columns(&self, project_id: &ProjectId, table_id: &TableId) -> Result<Vec<Column>, PortError> {
        Ok(self
            .columns
            .lock()
            .unwrap()
            .iter()
            .filter(|c| &c.project_id == project_id && &c.table_id == table_id)
            .cloned()
            .collect())
    }

    async fn get_column(&self, project_id: &ProjectId, column_id: &ColumnId) -> Result<Option<Column>, PortError> {
        Ok(self
            .columns
            .lock()
            .unwrap()
            .iter()
            .find(|c| &c.project_id == project_id && &c.id == column_id)
            .cloned())
    }

    async fn get_table(&self, project_id: &ProjectId, table_id: &TableId) -> Result<Option<Table>, PortError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .iter()
            .find(|t| &t.project_id == project_id && &t.id == table_id)
            .cloned())
    }

    async fn update_column_stats(
        &self,
        project_id: &ProjectId,
        column_id: &ColumnId,
        distinct_count: Option<i64>,
        non_null_count: Option<i64>,
        row_count: Option<i64>,
    ) -> Result<(), PortError> {
        let mut columns = self.columns.lock().unwrap();
        if let Some(col) = columns.iter_mut().find(|c| &c.project_id == project_id && &c.id == column_id) {
            col.distinct_count = distinct_count;
            col.non_null_count = non_null_count;
            col.row_count = row_count;
        }
        Ok(())
    }

    async fn update_column_features(
        &self,
        project_id: &ProjectId,
        column_id: &ColumnId,
        features: ColumnFeatures,
    ) -> Result<(), PortError> {
        let mut columns = self.columns.lock().unwrap();
        if let Some(col) = columns.iter_mut().find(|c| &c.project_id == project_id && &c.id == column_id) {
            col.features = Some(features);
        }
        Ok(())
    }
}

// ===== InMemoryWorkflowRepository =====

#[derive(Clone, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: Arc<Mutex<Vec<Workflow>>>,
    entity_states: Arc<Mutex<Vec<WorkflowEntityState>>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn insert(&self, workflow: &Workflow) -> Result<(), PortError> {
        self.workflows.lock().unwrap().push(workflow.clone());
        Ok(())
    }

    async fn find_by_id(&self, workflow_id: &WorkflowId) -> Result<Option<Workflow>, PortError> {
        Ok(self.workflows.lock().unwrap().iter().find(|w| &w.id == workflow_id).cloned())
    }

    async fn find_non_terminal(
        &self,
        project_id: &ProjectId,
        datasource_id: Option<&DatasourceId>,
        phase: WorkflowPhase,
    ) -> Result<Option<Workflow>, PortError> {
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .iter()
            .find(|w| {
                &w.project_id == project_id
                    && w.datasource_id.as_ref() == datasource_id
                    && w.phase == phase
                    && !w.state.is_terminal()
            })
            .cloned())
    }

    async fn try_claim_ownership(
        &self,
        workflow_id: &WorkflowId,
        instance_id: &str,
        now: DateTime<Utc>,
        lease_ttl: Duration,
    ) -> Result<bool, PortError> {
        let mut workflows = self.workflows.lock().unwrap();
        let Some(workflow) = workflows.iter_mut().find(|w| &w.id == workflow_id) else {
            return Ok(false);
        };
        if workflow.is_actively_owned(now, lease_ttl) {
            return Ok(false);
        }
        workflow
            .start_running(instance_id.to_string(), now)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(true)
    }

    async fn heartbeat(&self, workflow_id: &WorkflowId, instance_id: &str, now: DateTime<Utc>) -> Result<bool, PortError> {
        let mut workflows = self.workflows.lock().unwrap();
        let Some(workflow) = workflows.iter_mut().find(|w| &w.id == workflow_id) else {
            return Ok(false);
        };
        if workflow.owner_instance_id.as_deref() != Some(instance_id) {
            return Ok(false);
        }
        workflow.heartbeat(now);
        Ok(true)
    }

    async fn release_ownership(&self, workflow_id: &WorkflowId, now: DateTime<Utc>) -> Result<(), PortError> {
        let mut workflows = self.workflows.lock().unwrap();
        if let Some(workflow) = workflows.iter_mut().find(|w| &w.id == workflow_id) {
            workflow.release_ownership(now);
        }
        Ok(())
    }

    async fn update(&self, workflow: &Workflow) -> Result<(), PortError> {
        let mut workflows = self.workflows.lock().unwrap();
        if let Some(pos) = workflows.iter().position(|w| w.id == workflow.id) {
            workflows[pos] = workflow.clone();
        } else {
            workflows.push(workflow.clone());
        }
        Ok(())
    }

    async fn create_entity_states(&self, states: &[WorkflowEntityState]) -> Result<(), PortError> {
        self.entity_states.lock().unwrap().extend_from_slice(states);
        Ok(())
    }

    async fn update_entity_state(&self, state: &WorkflowEntityState) -> Result<(), PortError> {
        let mut states = self.entity_states.lock().unwrap();
        if let Some(pos) = states.iter().position(|s| s.id == state.id) {
            states[pos] = state.clone();
        }
        Ok(())
    }

    async fn list_entity_states_by_workflow(&self, workflow_id: &WorkflowId) -> Result<Vec<WorkflowEntityState>, PortError> {
        Ok(self
            .entity_states
            .lock()
            .unwrap()
            .iter()
            .filter(|s| &s.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn list_entity_states_by_status(
        &self,
        workflow_id: &WorkflowId,
        status: EntityStateStatus,
    ) -> Result<Vec<WorkflowEntityState>, PortError> {
        Ok(self
            .entity_states
            .lock()
            .unwrap()
            .iter()
            .filter(|s| &s.workflow_id == workflow_id && s.status == status)
            .cloned()
            .collect())
    }

    async fn get_entity_state(&self, id: &WorkflowEntityStateId) -> Result<Option<WorkflowEntityState>, PortError> {
        Ok(self.entity_states.lock().unwrap().iter().find(|s| &s.id == id).cloned())
    }
}

// ===== InMemoryCandidateRepository =====

#[derive(Clone, Default)]
pub struct InMemoryCandidateRepository {
    candidates: Arc<Mutex<Vec<RelationshipCandidate>>>,
}

impl InMemoryCandidateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandidateRepository for InMemoryCandidateRepository {
    async fn create_batch(&self, candidates: &[RelationshipCandidate]) -> Result<(), PortError> {
        self.candidates.lock().unwrap().extend_from_slice(candidates);
        Ok(())
    }

    async fn update(&self, candidate: &RelationshipCandidate) -> Result<(), PortError> {
        let mut candidates = self.candidates.lock().unwrap();
        if let Some(pos) = candidates.iter().position(|c| c.id == candidate.id) {
            candidates[pos] = candidate.clone();
        }
        Ok(())
    }

    async fn get(&self, id: &RelationshipCandidateId) -> Result<Option<RelationshipCandidate>, PortError> {
        Ok(self.candidates.lock().unwrap().iter().find(|c| &c.id == id).cloned())
    }

    async fn list_by_workflow(&self, workflow_id: &WorkflowId) -> Result<Vec<RelationshipCandidate>, PortError> {
        Ok(self
            .candidates
            .lock()
            .unwrap()
            .iter()
            .filter(|c| &c.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn delete_by_workflow(&self, workflow_id: &WorkflowId) -> Result<(), PortError> {
        self.candidates.lock().unwrap().retain(|c| &c.workflow_id != workflow_id);
        Ok(())
    }
}

// ===== InMemoryOntologyRepository =====

#[derive(Clone, Default)]
pub struct InMemoryOntologyRepository {
    ontologies: Arc<Mutex<Vec<Ontology>>>,
    summaries: Arc<Mutex<Vec<(OntologyId, DomainSummary)>>>,
}

impl InMemoryOntologyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OntologyRepository for InMemoryOntologyRepository {
    async fn find_active(&self, project_id: &ProjectId) -> Result<Option<Ontology>, PortError> {
        Ok(self
            .ontologies
            .lock()
            .unwrap()
            .iter()
            .find(|o| &o.project_id == project_id && o.is_active)
            .cloned())
    }

    async fn next_version(&self, project_id: &ProjectId) -> Result<u32, PortError> {
        let max = self
            .ontologies
            .lock()
            .unwrap()
            .iter()
            .filter(|o| &o.project_id == project_id)
            .map(|o| o.version)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn create(&self, ontology: &Ontology) -> Result<(), PortError> {
        self.ontologies.lock().unwrap().push(ontology.clone());
        Ok(())
    }

    async fn save_domain_summary(&self, ontology_id: &OntologyId, summary: &DomainSummary) -> Result<(), PortError> {
        let mut summaries = self.summaries.lock().unwrap();
        summaries.retain(|(id, _)| id != ontology_id);
        summaries.push((*ontology_id, summary.clone()));
        Ok(())
    }

    async fn get_domain_summary(&self, ontology_id: &OntologyId) -> Result<Option<DomainSummary>, PortError> {
        Ok(self
            .summaries
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == ontology_id)
            .map(|(_, summary)| summary.clone()))
    }
}

// ===== InMemoryEntityRepository =====

#[derive(Clone, Default)]
pub struct InMemoryEntityRepository {
    entities: Arc<Mutex<Vec<OntologyEntity>>>,
    relationships: Arc<Mutex<Vec<EntityRelationship>>>,
}

impl InMemoryEntityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityRepository for InMemoryEntityRepository {
    async fn list_by_ontology(&self, ontology_id: &OntologyId) -> Result<Vec<OntologyEntity>, PortError> {
        Ok(self
            .entities
            .lock()
            .unwrap()
            .iter()
            .filter(|e| &e.ontology_id == ontology_id)
            .cloned()
            .collect())
    }

    async fn list_promoted(&self, ontology_id: &OntologyId) -> Result<Vec<OntologyEntity>, PortError> {
        Ok(self
            .entities
            .lock()
            .unwrap()
            .iter()
            .filter(|e| &e.ontology_id == ontology_id && e.is_promoted)
            .cloned()
            .collect())
    }

    async fn upsert_entity(&self, entity: &OntologyEntity) -> Result<(), PortError> {
        let mut entities = self.entities.lock().unwrap();
        if let Some(pos) = entities.iter().position(|e| e.id == entity.id) {
            entities[pos] = entity.clone();
        } else {
            entities.push(entity.clone());
        }
        Ok(())
    }

    async fn list_relationships(&self, ontology_id: &OntologyId) -> Result<Vec<EntityRelationship>, PortError> {
        let entity_ids: Vec<OntologyEntityId> = self
            .entities
            .lock()
            .unwrap()
            .iter()
            .filter(|e| &e.ontology_id == ontology_id)
            .map(|e| e.id)
            .collect();
        Ok(self
            .relationships
            .lock()
            .unwrap()
            .iter()
            .filter(|r| entity_ids.contains(&r.source_entity_id) || entity_ids.contains(&r.target_entity_id))
            .cloned()
            .collect())
    }

    async fn upsert_relationship(&self, relationship: &EntityRelationship) -> Result<(), PortError> {
        let mut relationships = self.relationships.lock().unwrap();
        if let Some(pos) = relationships.iter().position(|r| r.id == relationship.id) {
            relationships[pos] = relationship.clone();
        } else {
            relationships.push(relationship.clone());
        }
        Ok(())
    }

    async fn get_entity(&self, id: &OntologyEntityId) -> Result<Option<OntologyEntity>, PortError> {
        Ok(self.entities.lock().unwrap().iter().find(|e| &e.id == id).cloned())
    }
}

// ===== InMemoryRelationshipRepository =====

#[derive(Clone, Default)]
pub struct InMemoryRelationshipRepository {
    relationships: Arc<Mutex<Vec<SchemaRelationship>>>,
}

impl InMemoryRelationshipRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<SchemaRelationship> {
        self.relationships.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelationshipRepository for InMemoryRelationshipRepository {
    async fn upsert_relationship(&self, relationship: &SchemaRelationship) -> Result<(), PortError> {
        let mut relationships = self.relationships.lock().unwrap();
        if let Some(pos) = relationships.iter().position(|r| r.join_key() == relationship.join_key()) {
            relationships[pos] = relationship.clone();
        } else {
            relationships.push(relationship.clone());
        }
        Ok(())
    }

    async fn find_by_columns(
        &self,
        source_column_id: &ColumnId,
        target_column_id: &ColumnId,
    ) -> Result<Option<SchemaRelationship>, PortError> {
        Ok(self
            .relationships
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.source_column_id == source_column_id && &r.target_column_id == target_column_id)
            .cloned())
    }

    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<SchemaRelationship>, PortError> {
        Ok(self
            .relationships
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.project_id == project_id)
            .cloned()
            .collect())
    }
}

// ===== InMemoryAuditRepository =====

#[derive(Clone, Default)]
pub struct InMemoryAuditRepository {
    conversations: Arc<Mutex<Vec<LlmConversationRecord>>>,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn record_llm_conversation(&self, record: LlmConversationRecord) -> Result<(), PortError> {
        self.conversations.lock().unwrap().push(record);
        Ok(())
    }

    async fn list_llm_conversations_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<LlmConversationRecord>, PortError> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| &c.workflow_id == workflow_id)
            .cloned()
            .collect())
    }
}
