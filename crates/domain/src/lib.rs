//! Pure domain model for the relationship discovery engine.
//!
//! This crate has no I/O and no dependency on `ports` or `engine`: it
//! defines the entities, value objects, and invariants from §3 of the
//! specification, plus the error taxonomy (§7) every other crate builds on.
//!
//! ## Dependency direction
//!
//! ```text
//! engine -> ports -> domain -> shared
//! ```
//!
//! ## Module layout
//!
//! - [`ids`] — UUIDv7 identifier newtypes for every entity
//! - [`error`] — the domain error taxonomy
//! - [`clock`] — time abstraction for deterministic tests
//! - [`value_objects`] — small shared value types (`Confidence`, `Progress`)
//! - [`table`], [`column`] — schema entities and their feature annotations
//! - [`schema_relationship`] — materialized FK edges
//! - [`relationship_candidate`] — FK candidates under evaluation
//! - [`workflow`], [`workflow_entity_state`] — the durable workflow record
//!   and its per-unit-of-work state rows
//! - [`ontology`] — the business-level view: entities, relationships,
//!   domains, and project conventions

mod macros;

pub mod clock;
pub mod column;
pub mod error;
pub mod ids;
pub mod ontology;
pub mod relationship_candidate;
pub mod schema_relationship;
pub mod table;
pub mod value_objects;
pub mod workflow;
pub mod workflow_entity_state;

pub use error::DomainError;
