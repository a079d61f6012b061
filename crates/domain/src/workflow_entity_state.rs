//! `WorkflowEntityState` — per-unit-of-work durable status, one row per
//! column scanned or candidate verified (§3, §4.6).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::{Display, IntoStaticStr};

use crate::ids::{WorkflowEntityStateId, WorkflowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
    Column,
    Candidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityStateStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEntityState {
    pub id: WorkflowEntityStateId,
    pub workflow_id: WorkflowId,
    pub entity_type: EntityType,
    /// Opaque key identifying the unit of work within its entity type (a
    /// column ID or a candidate ID, serialized as a string so this row
    /// layout does not need a variant per entity type).
    pub entity_key: String,
    pub status: EntityStateStatus,
    pub retry_count: u32,
    pub state_data: Option<JsonValue>,
    pub last_error: Option<String>,
}

impl WorkflowEntityState {
    pub fn new(workflow_id: WorkflowId, entity_type: EntityType, entity_key: impl Into<String>) -> Self {
        Self {
            id: WorkflowEntityStateId::new(),
            workflow_id,
            entity_type,
            entity_key: entity_key.into(),
            status: EntityStateStatus::Pending,
            retry_count: 0,
            state_data: None,
            last_error: None,
        }
    }

    pub fn mark_in_progress(&mut self) {
        self.status = EntityStateStatus::InProgress;
    }

    pub fn mark_complete(&mut self, state_data: Option<JsonValue>) {
        self.status = EntityStateStatus::Complete;
        self.state_data = state_data;
        self.last_error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = EntityStateStatus::Failed;
        self.retry_count += 1;
        self.last_error = Some(error.into());
    }

    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.status = EntityStateStatus::Skipped;
        self.last_error = Some(reason.into());
    }

    /// Eligible for the resume pass: failed but within the retry budget.
    pub fn is_retry_eligible(&self, max_retries: u32) -> bool {
        self.status == EntityStateStatus::Failed && self.retry_count < max_retries
    }
}
