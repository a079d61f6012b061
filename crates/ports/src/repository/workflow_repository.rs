//! `WorkflowRepository` — the durable `Workflow` record plus its
//! `WorkflowEntityState` rows (§4.4, §4.6, §4.12). Backs both the
//! `OwnershipGuard`'s atomic claim and the `WorkflowStateStore` component.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ontology_domain::{
    ids::{DatasourceId, ProjectId, WorkflowEntityStateId, WorkflowId},
    workflow::{Workflow, WorkflowPhase},
    workflow_entity_state::{EntityStateStatus, WorkflowEntityState},
};

use crate::error::PortError;

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn insert(&self, workflow: &Workflow) -> Result<(), PortError>;

    async fn find_by_id(&self, workflow_id: &WorkflowId) -> Result<Option<Workflow>, PortError>;

    /// A non-terminal workflow for `(project, datasource, phase)`, used by
    /// `StartDetection` to refuse starting a duplicate run (§4.12).
    async fn find_non_terminal(
        &self,
        project_id: &ProjectId,
        datasource_id: Option<&DatasourceId>,
        phase: WorkflowPhase,
    ) -> Result<Option<Workflow>, PortError>;

    /// Atomic compare-and-set: succeeds only if the workflow is unowned or
    /// its lease has expired (§4.4). Returns whether the claim succeeded.
    async fn try_claim_ownership(
        &self,
        workflow_id: &WorkflowId,
        instance_id: &str,
        now: DateTime<Utc>,
        lease_ttl: Duration,
    ) -> Result<bool, PortError>;

    /// Refresh the heartbeat for a workflow this instance currently owns.
    /// Returns `false` if `instance_id` no longer matches the stored owner
    /// (ownership was reclaimed out from under the caller).
    async fn heartbeat(&self, workflow_id: &WorkflowId, instance_id: &str, now: DateTime<Utc>) -> Result<bool, PortError>;

    async fn release_ownership(&self, workflow_id: &WorkflowId, now: DateTime<Utc>) -> Result<(), PortError>;

    /// Persist the full row: state, phase, progress, task queue snapshot,
    /// error message.
    async fn update(&self, workflow: &Workflow) -> Result<(), PortError>;

    /// All-or-nothing batch insert of per-unit-of-work state rows,
    /// initialized once at the start of a phase.
    async fn create_entity_states(&self, states: &[WorkflowEntityState]) -> Result<(), PortError>;

    async fn update_entity_state(&self, state: &WorkflowEntityState) -> Result<(), PortError>;

    async fn list_entity_states_by_workflow(&self, workflow_id: &WorkflowId) -> Result<Vec<WorkflowEntityState>, PortError>;

    async fn list_entity_states_by_status(
        &self,
        workflow_id: &WorkflowId,
        status: EntityStateStatus,
    ) -> Result<Vec<WorkflowEntityState>, PortError>;

    async fn get_entity_state(&self, id: &WorkflowEntityStateId) -> Result<Option<WorkflowEntityState>, PortError>;
}
