//! `AuditRepository` — records of LLM conversations and other
//! operator-visible events. Alert triggering from these events is an
//! external collaborator (§1); this port only persists the record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ontology_domain::ids::{RelationshipCandidateId, WorkflowId};

use crate::error::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    Ok,
    Error,
}

/// A single LLM exchange, recorded regardless of outcome so a parse
/// failure (§4.9, §4.11) is observable after the fact rather than only
/// logged in-process.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConversationRecord {
    pub workflow_id: WorkflowId,
    pub candidate_id: Option<RelationshipCandidateId>,
    pub purpose: &'static str,
    pub prompt: String,
    pub raw_response: Option<String>,
    pub status: ConversationStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn record_llm_conversation(&self, record: LlmConversationRecord) -> Result<(), PortError>;

    async fn list_llm_conversations_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<LlmConversationRecord>, PortError>;
}
