//! Orchestration and business logic for the relationship discovery engine.
//!
//! This crate has no knowledge of HTTP, SQL, or any concrete LLM vendor: it
//! consumes `ontology-ports` traits exclusively and is driven end-to-end by
//! [`workflow_engine::WorkflowEngine`].
//!
//! ## Phase pipeline (§4)
//!
//! ```text
//! WorkflowEngine -> OwnershipGuard -> CandidateCollector -> JoinVerifier
//!                                  -> LLMValidator -> RelationshipMaterializer
//!                                  -> ConventionFinalizer
//! ```

pub mod candidate_collector;
pub mod config;
pub mod convention_finalizer;
pub mod durable_task_queue;
pub mod join_verifier;
pub mod llm_validator;
pub mod ownership_guard;
pub mod progress;
pub mod relationship_materializer;
pub mod semantic_filter;
pub mod table_graph;
pub mod type_normalizer;
pub mod work_queue;
pub mod workflow_engine;
pub mod workflow_state_store;
