//! In-memory fakes for every port, gated behind the `test-utils` feature
//! (and always available to this crate's own tests). `ontology-engine`
//! depends on this with `test-utils` enabled in its dev-dependencies.

mod fake_llm_client;
mod fake_schema_probe;
mod in_memory_repositories;

pub use fake_llm_client::FakeLlmClient;
pub use fake_schema_probe::FakeSchemaProbe;
pub use in_memory_repositories::{
    InMemoryAuditRepository, InMemoryCandidateRepository, InMemoryEntityRepository,
    InMemoryOntologyRepository, InMemoryRelationshipRepository, InMemorySchemaRepository,
    InMemoryWorkflowRepository,
};
