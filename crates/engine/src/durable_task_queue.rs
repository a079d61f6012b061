//! Debounced mirror of the live [`crate::work_queue::WorkQueue`] task list
//! into the persistent `Workflow.task_queue_snapshot` (§4.5). A single
//! writer task coalesces bursts within a debounce window, matching the
//! lineage's single-writer background-task idiom.

use std::sync::Arc;

use ontology_domain::{
    ids::WorkflowId,
    workflow::{TaskSnapshotEntry, Workflow},
};
use ontology_ports::repository::WorkflowRepository;
use tokio::sync::mpsc;

use crate::work_queue::{TaskSnapshot, TaskStatus};

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
}

/// Handle used by the phase driver to push new snapshots and, on shutdown,
/// to flush the final one before returning.
pub struct DurableTaskQueueHandle {
    sender: mpsc::Sender<Vec<TaskSnapshot>>,
    writer: tokio::task::JoinHandle<()>,
}

impl DurableTaskQueueHandle {
    pub async fn publish(&self, tasks: Vec<TaskSnapshot>) {
        // A full channel means a write is already pending; the debounce
        // window will pick up the latest state on its own, so a dropped
        // send here is not a correctness issue.
        let _ = self.sender.try_send(tasks);
    }

    /// Stops the writer after flushing whatever snapshot it currently has.
    pub async fn shutdown(self) {
        drop(self.sender);
        let _ = self.writer.await;
    }
}

/// Spawns the debounced writer. `debounce` bursts of `publish` calls within
/// this window collapse into a single repository write.
pub fn spawn(
    repository: Arc<dyn WorkflowRepository>,
    workflow_id: WorkflowId,
    debounce: std::time::Duration,
) -> DurableTaskQueueHandle {
    let (sender, mut receiver) = mpsc::channel::<Vec<TaskSnapshot>>(64);

    let writer = tokio::spawn(async move {
        let mut pending: Option<Vec<TaskSnapshot>> = None;
        loop {
            tokio::select! {
                biased;

                maybe_tasks = receiver.recv() => {
                    match maybe_tasks {
                        Some(tasks) => pending = Some(tasks),
                        None => {
                            if let Some(tasks) = pending.take() {
                                write_snapshot(&repository, &workflow_id, tasks).await;
                            }
                            break;
                        }
                    }
                }
                () = tokio::time::sleep(debounce), if pending.is_some() => {
                    if let Some(tasks) = pending.take() {
                        write_snapshot(&repository, &workflow_id, tasks).await;
                    }
                }
            }
        }
    });

    DurableTaskQueueHandle { sender, writer }
}

async fn write_snapshot(repository: &Arc<dyn WorkflowRepository>, workflow_id: &WorkflowId, tasks: Vec<TaskSnapshot>) {
    let Ok(Some(mut workflow)) = repository.find_by_id(workflow_id).await else {
        tracing::warn!(workflow.id = %workflow_id, "durable task queue: workflow disappeared, dropping snapshot");
        return;
    };
    workflow.task_queue_snapshot = tasks
        .into_iter()
        .map(|t| TaskSnapshotEntry { task_id: t.id, description: t.description, status: status_label(t.status).to_string() })
        .collect();
    if let Err(error) = repository.update(&workflow).await {
        tracing::warn!(workflow.id = %workflow_id, %error, "durable task queue: snapshot write failed");
    }
}

/// Convenience used by tests and by [`crate::workflow_engine`] to avoid
/// threading `Workflow` through call sites that only need the snapshot
/// shape.
pub fn snapshot_from(workflow: &Workflow) -> &[TaskSnapshotEntry] {
    &workflow.task_queue_snapshot
}
