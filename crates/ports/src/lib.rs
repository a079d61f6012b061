//! Trait boundaries to every external collaborator the core consumes:
//! the database-specific `SchemaProbe`, the `LLMClient`, and the seven
//! persistence repositories named in §1. No concrete SQL/HTTP/vendor-API
//! implementation ships in this crate — that is explicitly out of scope
//! (§1) and left to the binary that embeds this engine.
//!
//! With the `test-utils` feature, [`testutil`] exposes in-memory fakes of
//! every port, sufficient to exercise `ontology-engine`'s components
//! without a database or network.

pub mod error;
pub mod llm_client;
pub mod repository;
pub mod schema_probe;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use error::PortError;
pub use llm_client::{LLMClient, LlmResponse};
pub use schema_probe::{
    ColumnRef, ColumnStat, ForeignKeyDecl, JoinAnalysis, SchemaProbe, ValueOverlap,
    DEFAULT_SAMPLE_LIMIT, MAX_COLUMN_STATS_BATCH,
};
