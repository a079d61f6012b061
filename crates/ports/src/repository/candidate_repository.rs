//! `CandidateRepository` — durable `RelationshipCandidate` rows (§3, §4.7).

use async_trait::async_trait;
use ontology_domain::{
    ids::{RelationshipCandidateId, WorkflowId},
    relationship_candidate::RelationshipCandidate,
};

use crate::error::PortError;

#[async_trait]
pub trait CandidateRepository: Send + Sync {
    /// All-or-nothing batch insert, produced by the candidate collector.
    async fn create_batch(&self, candidates: &[RelationshipCandidate]) -> Result<(), PortError>;

    async fn update(&self, candidate: &RelationshipCandidate) -> Result<(), PortError>;

    async fn get(&self, id: &RelationshipCandidateId) -> Result<Option<RelationshipCandidate>, PortError>;

    async fn list_by_workflow(&self, workflow_id: &WorkflowId) -> Result<Vec<RelationshipCandidate>, PortError>;

    /// Deletes every candidate for a workflow. Called on cancellation (§3
    /// candidate lifecycle: "deleted with its workflow on cancel").
    async fn delete_by_workflow(&self, workflow_id: &WorkflowId) -> Result<(), PortError>;
}
