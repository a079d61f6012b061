//! `OntologyRepository` — the active `Ontology` per project and its
//! finalized `DomainSummary` (§3, §4.11, §4.12).

use async_trait::async_trait;
use ontology_domain::{
    ids::{OntologyId, ProjectId},
    ontology::{DomainSummary, Ontology},
};

use crate::error::PortError;

#[async_trait]
pub trait OntologyRepository: Send + Sync {
    /// The currently active ontology for a project, if one exists (at most
    /// one active per project, §3).
    async fn find_active(&self, project_id: &ProjectId) -> Result<Option<Ontology>, PortError>;

    /// Next version number to use when creating a new ontology for this
    /// project (starts at 1).
    async fn next_version(&self, project_id: &ProjectId) -> Result<u32, PortError>;

    async fn create(&self, ontology: &Ontology) -> Result<(), PortError>;

    async fn save_domain_summary(&self, ontology_id: &OntologyId, summary: &DomainSummary) -> Result<(), PortError>;

    async fn get_domain_summary(&self, ontology_id: &OntologyId) -> Result<Option<DomainSummary>, PortError>;
}
