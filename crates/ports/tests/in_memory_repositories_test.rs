//! Exercises the in-memory fakes enough to trust them as test doubles for
//! `ontology-engine`: ownership claim races, idempotent relationship
//! upserts, and basic round-trips through each repository.

use chrono::{Duration, Utc};
use ontology_domain::{
    ids::{DatasourceId, OntologyId, ProjectId},
    schema_relationship::{Cardinality, NewSchemaRelationship, RelationshipType, SchemaRelationship},
    value_objects::Confidence,
    workflow::{Workflow, WorkflowPhase},
};
use ontology_ports::{
    repository::{RelationshipRepository, WorkflowRepository},
    testutil::{InMemoryRelationshipRepository, InMemoryWorkflowRepository},
};
use pretty_assertions::assert_eq;

fn new_workflow() -> Workflow {
    Workflow::new(
        ProjectId::new(),
        Some(DatasourceId::new()),
        OntologyId::new(),
        WorkflowPhase::Relationships,
        Utc::now(),
    )
}

#[tokio::test]
async fn try_claim_ownership_is_exclusive_until_lease_expires() {
    let repo = InMemoryWorkflowRepository::new();
    let workflow = new_workflow();
    repo.insert(&workflow).await.unwrap();

    let now = Utc::now();
    let lease_ttl = Duration::seconds(60);

    assert!(repo.try_claim_ownership(&workflow.id, "instance-a", now, lease_ttl).await.unwrap());
    // A second instance cannot claim while the lease is live.
    assert!(!repo.try_claim_ownership(&workflow.id, "instance-b", now, lease_ttl).await.unwrap());

    // Once the lease has expired, a new instance may reclaim it.
    let later = now + Duration::seconds(120);
    assert!(repo.try_claim_ownership(&workflow.id, "instance-b", later, lease_ttl).await.unwrap());

    let stored = repo.find_by_id(&workflow.id).await.unwrap().unwrap();
    assert_eq!(stored.owner_instance_id.as_deref(), Some("instance-b"));
}

#[tokio::test]
async fn heartbeat_rejected_once_ownership_is_reclaimed() {
    let repo = InMemoryWorkflowRepository::new();
    let workflow = new_workflow();
    repo.insert(&workflow).await.unwrap();

    let now = Utc::now();
    let lease_ttl = Duration::seconds(60);
    repo.try_claim_ownership(&workflow.id, "instance-a", now, lease_ttl).await.unwrap();

    let later = now + Duration::seconds(120);
    repo.try_claim_ownership(&workflow.id, "instance-b", later, lease_ttl).await.unwrap();

    // instance-a no longer owns the workflow; its heartbeat must be refused.
    assert!(!repo.heartbeat(&workflow.id, "instance-a", later).await.unwrap());
    assert!(repo.heartbeat(&workflow.id, "instance-b", later).await.unwrap());
}

#[tokio::test]
async fn relationship_upsert_is_idempotent_on_column_pair() {
    let repo = InMemoryRelationshipRepository::new();
    let project_id = ProjectId::new();
    let source_table = ontology_domain::ids::TableId::new();
    let target_table = ontology_domain::ids::TableId::new();
    let source_column = ontology_domain::ids::ColumnId::new();
    let target_column = ontology_domain::ids::ColumnId::new();

    let first = SchemaRelationship::new(NewSchemaRelationship {
        project_id,
        source_table_id: source_table,
        source_column_id: source_column,
        target_table_id: target_table,
        target_column_id: target_column,
        relationship_type: RelationshipType::Fk,
        cardinality: Cardinality::NToOne,
        confidence: Confidence::certain(),
        inference_method: None,
        is_validated: true,
        rejection_reason: None,
    })
    .unwrap();

    repo.upsert_relationship(&first).await.unwrap();
    repo.upsert_relationship(&first).await.unwrap();

    let all = repo.list_by_project(&project_id).await.unwrap();
    assert_eq!(all.len(), 1, "upserting the same column pair twice must not duplicate the row");

    let found = repo.find_by_columns(&source_column, &target_column).await.unwrap();
    assert_eq!(found.unwrap().id, first.id);
}
