//! Per-entity (column/candidate) status rows surviving restarts (§4.6).
//! A thin component over [`WorkflowRepository`] — retry counts here are
//! authoritative, since the port's `update_entity_state` persists them
//! verbatim.

use std::sync::Arc;

use ontology_domain::{
    error::DomainError,
    ids::WorkflowId,
    workflow_entity_state::{EntityStateStatus, EntityType, WorkflowEntityState},
};
use ontology_ports::repository::WorkflowRepository;

pub struct WorkflowStateStore {
    repository: Arc<dyn WorkflowRepository>,
    max_retries: u32,
}

impl WorkflowStateStore {
    pub fn new(repository: Arc<dyn WorkflowRepository>, max_retries: u32) -> Self {
        Self { repository, max_retries }
    }

    pub async fn create_batch(&self, states: &[WorkflowEntityState]) -> Result<(), DomainError> {
        self.repository.create_entity_states(states).await.map_err(DomainError::from)
    }

    pub async fn mark_complete(&self, mut state: WorkflowEntityState, state_data: Option<serde_json::Value>) -> Result<(), DomainError> {
        state.mark_complete(state_data);
        self.repository.update_entity_state(&state).await.map_err(DomainError::from)
    }

    pub async fn mark_failed(&self, mut state: WorkflowEntityState, error: impl Into<String>) -> Result<(), DomainError> {
        state.mark_failed(error.into());
        self.repository.update_entity_state(&state).await.map_err(DomainError::from)
    }

    pub async fn list_by_workflow(&self, workflow_id: &WorkflowId) -> Result<Vec<WorkflowEntityState>, DomainError> {
        self.repository.list_entity_states_by_workflow(workflow_id).await.map_err(DomainError::from)
    }

    /// States eligible for the resume pass: `failed` with `retry_count <
    /// max_retries`. Beyond that, the caller should mark the workflow
    /// `failed` with the aggregated errors (§4.6).
    pub async fn list_retry_eligible(&self, workflow_id: &WorkflowId, entity_type: EntityType) -> Result<Vec<WorkflowEntityState>, DomainError> {
        let failed = self
            .repository
            .list_entity_states_by_status(workflow_id, EntityStateStatus::Failed)
            .await
            .map_err(DomainError::from)?;
        Ok(failed.into_iter().filter(|s| s.entity_type == entity_type && s.is_retry_eligible(self.max_retries)).collect())
    }

    /// `failed` states that have exhausted their retry budget; their
    /// aggregated `last_error`s become the workflow's terminal error.
    pub async fn list_exhausted(&self, workflow_id: &WorkflowId) -> Result<Vec<WorkflowEntityState>, DomainError> {
        let failed = self
            .repository
            .list_entity_states_by_status(workflow_id, EntityStateStatus::Failed)
            .await
            .map_err(DomainError::from)?;
        Ok(failed.into_iter().filter(|s| !s.is_retry_eligible(self.max_retries)).collect())
    }
}
