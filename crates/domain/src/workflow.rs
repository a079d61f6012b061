//! `Workflow` — a durable, ownership-protected record of a discovery run
//! (§3, §4.12).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::{
    DomainError,
    ids::{DatasourceId, OntologyId, ProjectId, WorkflowId},
    value_objects::Progress,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowPhase {
    Relationships,
    Entities,
    Finalization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowState {
    /// Terminal states never transition; they may only be garbage-collected.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Status of one task as last known to the `WorkQueue`, mirrored into
/// `Workflow.task_queue_snapshot` by the `DurableTaskQueue` (§4.5). Its sole
/// contract is readability for operators and liveness observers — no
/// downstream code other than the resume pass depends on its shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshotEntry {
    pub task_id: String,
    pub description: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub project_id: ProjectId,
    pub datasource_id: Option<DatasourceId>,
    pub ontology_id: OntologyId,
    pub phase: WorkflowPhase,
    pub state: WorkflowState,
    pub owner_instance_id: Option<String>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub progress: Progress,
    pub task_queue_snapshot: Vec<TaskSnapshotEntry>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(
        project_id: ProjectId,
        datasource_id: Option<DatasourceId>,
        ontology_id: OntologyId,
        phase: WorkflowPhase,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WorkflowId::new(),
            project_id,
            datasource_id,
            ontology_id,
            phase,
            state: WorkflowState::Pending,
            owner_instance_id: None,
            heartbeat_at: None,
            progress: Progress::new(0, phase_name(phase), "queued"),
            task_queue_snapshot: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A workflow is actively owned iff it has an owner and its last
    /// heartbeat is within `lease_ttl` of `now` (§3 invariant).
    pub fn is_actively_owned(&self, now: DateTime<Utc>, lease_ttl: Duration) -> bool {
        match (&self.owner_instance_id, self.heartbeat_at) {
            (Some(_), Some(heartbeat_at)) => now - heartbeat_at < lease_ttl,
            _ => false,
        }
    }

    /// Transition `pending -> running` under a fresh ownership claim. Fails
    /// if the workflow is already terminal.
    pub fn start_running(
        &mut self,
        owner_instance_id: String,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.state.is_terminal() {
            return Err(DomainError::Conflict(format!(
                "workflow {} is already terminal ({:?})",
                self.id, self.state
            )));
        }
        self.state = WorkflowState::Running;
        self.owner_instance_id = Some(owner_instance_id);
        self.heartbeat_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn heartbeat(&mut self, now: DateTime<Utc>) {
        self.heartbeat_at = Some(now);
        self.updated_at = now;
    }

    pub fn release_ownership(&mut self, now: DateTime<Utc>) {
        self.owner_instance_id = None;
        self.heartbeat_at = None;
        self.updated_at = now;
    }

    fn transition_to_terminal(&mut self, state: WorkflowState, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.state.is_terminal() {
            return Err(DomainError::Conflict(format!(
                "workflow {} is already terminal ({:?})",
                self.id, self.state
            )));
        }
        self.state = state;
        self.owner_instance_id = None;
        self.heartbeat_at = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition_to_terminal(WorkflowState::Completed, now)
    }

    pub fn mark_failed(&mut self, error_message: String, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.error_message = Some(error_message);
        self.transition_to_terminal(WorkflowState::Failed, now)
    }

    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition_to_terminal(WorkflowState::Cancelled, now)
    }

    pub fn enter_phase(&mut self, phase: WorkflowPhase, total: u64, message: impl Into<String>, now: DateTime<Utc>) {
        self.phase = phase;
        self.progress.enter_phase(phase_name(phase), total, message);
        self.updated_at = now;
    }

    pub fn advance_progress(&mut self, current: u64, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.progress.advance(current, message)?;
        self.updated_at = now;
        Ok(())
    }
}

fn phase_name(phase: WorkflowPhase) -> &'static str {
    match phase {
        WorkflowPhase::Relationships => "relationships",
        WorkflowPhase::Entities => "entities",
        WorkflowPhase::Finalization => "finalization",
    }
}
