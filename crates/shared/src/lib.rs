//! Cross-cutting utilities shared by every crate in the workspace.
//!
//! This crate carries no business logic and no port/domain dependency of its
//! own — it is the bottom of the dependency graph (`domain`, `ports`, and
//! `engine` all depend on it, never the reverse). It currently provides:
//!
//! - [`observability`] — `tracing` initialization shared by any binary that
//!   embeds the engine.
//! - [`event_log`] — field-naming conventions and a macro for structured
//!   business events (candidate accepted/rejected, workflow phase change,
//!   ownership claimed/lost), queryable by field name in a log sink.
//! - [`metrics`] — the workspace's one process-wide mutable registry,
//!   initialized at boot and read-only thereafter.

pub mod event_log;
pub mod metrics;
pub mod observability;

pub use metrics::Metrics;
pub use observability::{LogFormat, TracingConfig, init_tracing};
