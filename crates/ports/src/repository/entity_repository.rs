//! `EntityRepository` — `OntologyEntity` rows and the `EntityRelationship`
//! edges between them (§3, §4.11).

use async_trait::async_trait;
use ontology_domain::{
    ids::{OntologyEntityId, OntologyId},
    ontology::{EntityRelationship, OntologyEntity},
};

use crate::error::PortError;

#[async_trait]
pub trait EntityRepository: Send + Sync {
    async fn list_by_ontology(&self, ontology_id: &OntologyId) -> Result<Vec<OntologyEntity>, PortError>;

    /// Promoted entities only — the subset visible to downstream tools.
    async fn list_promoted(&self, ontology_id: &OntologyId) -> Result<Vec<OntologyEntity>, PortError>;

    async fn upsert_entity(&self, entity: &OntologyEntity) -> Result<(), PortError>;

    async fn list_relationships(&self, ontology_id: &OntologyId) -> Result<Vec<EntityRelationship>, PortError>;

    async fn upsert_relationship(&self, relationship: &EntityRelationship) -> Result<(), PortError>;

    async fn get_entity(&self, id: &OntologyEntityId) -> Result<Option<OntologyEntity>, PortError>;
}
