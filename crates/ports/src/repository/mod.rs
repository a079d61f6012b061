//! Persistence ports (§6). Trait-only — no storage schema or SQL driver is
//! defined here; see [`crate::testutil`] for in-memory fakes used in tests.

pub mod audit_repository;
pub mod candidate_repository;
pub mod entity_repository;
pub mod ontology_repository;
pub mod relationship_repository;
pub mod schema_repository;
pub mod workflow_repository;

pub use audit_repository::{AuditRepository, ConversationStatus, LlmConversationRecord};
pub use candidate_repository::CandidateRepository;
pub use entity_repository::EntityRepository;
pub use ontology_repository::OntologyRepository;
pub use relationship_repository::RelationshipRepository;
pub use schema_repository::SchemaRepository;
pub use workflow_repository::WorkflowRepository;
