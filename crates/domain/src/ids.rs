//! Identifier newtypes for every entity in the data model (§3).
//!
//! All identifiers are UUIDv7, generated through [`crate::macros::define_uuid_id`].
//! Every entity in this workspace carries a [`ProjectId`] for tenant scoping
//! even though no tenant-aware connection factory ships here: ports accept
//! `&ProjectId` explicitly rather than relying on ambient context.

use crate::macros::define_uuid_id;

define_uuid_id! {
    /// Opaque identifier of a tenant ("project"). Scopes every other entity.
    pub struct ProjectId;
}

define_uuid_id! {
    /// Identifier of a connection descriptor owned by a [`ProjectId`].
    pub struct DatasourceId;
}

define_uuid_id! {
    /// Identifier of a discovered table.
    pub struct TableId;
}

define_uuid_id! {
    /// Identifier of a discovered column.
    pub struct ColumnId;
}

define_uuid_id! {
    /// Identifier of a `SchemaRelationship` row (declared or inferred FK).
    pub struct SchemaRelationshipId;
}

define_uuid_id! {
    /// Identifier of an `Ontology` (the business-level view of a schema).
    pub struct OntologyId;
}

define_uuid_id! {
    /// Identifier of an `OntologyEntity` (a promoted business entity).
    pub struct OntologyEntityId;
}

define_uuid_id! {
    /// Identifier of an `EntityRelationship` edge between ontology entities.
    pub struct EntityRelationshipId;
}

define_uuid_id! {
    /// Identifier of a durable `Workflow` record.
    pub struct WorkflowId;
}

define_uuid_id! {
    /// Identifier of a `WorkflowEntityState` row (one per unit of work).
    pub struct WorkflowEntityStateId;
}

define_uuid_id! {
    /// Identifier of a `RelationshipCandidate` under evaluation.
    pub struct RelationshipCandidateId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(ProjectId::new(), ProjectId::new());
    }

    #[test]
    fn round_trips_through_uuid() {
        let id = TableId::new();
        let restored = TableId::from_uuid(*id.as_uuid());
        assert_eq!(id, restored);
    }

    #[test]
    fn default_generates_a_fresh_id() {
        assert_ne!(ColumnId::default(), ColumnId::default());
    }
}
