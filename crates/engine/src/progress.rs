//! A small reporting seam shared by every phase driver so progress updates
//! (§3 `Workflow.progress`, §4.7 "report at phase boundaries and every N
//! pairs") can be wired to the durable workflow record without each
//! component depending on [`ontology_ports::repository::WorkflowRepository`]
//! directly.

use std::sync::Arc;

/// `(processed, total, message)`, invoked at phase boundaries and
/// periodically during long loops.
pub type ProgressCallback = Arc<dyn Fn(u64, u64, &str) + Send + Sync>;

pub fn noop_progress() -> ProgressCallback {
    Arc::new(|_, _, _| {})
}
