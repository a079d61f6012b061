//! Bounded concurrent executor of idempotent [`Task`]s with cooperative
//! cancellation and a status snapshot for the [`crate::durable_task_queue`]
//! (§4.3).

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use ontology_domain::error::DomainError;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

/// A handle a running [`Task`] uses to enqueue follow-up work without
/// holding a reference back to the queue itself.
#[derive(Clone)]
pub struct Enqueuer {
    sender: tokio::sync::mpsc::UnboundedSender<Box<dyn Task>>,
}

impl Enqueuer {
    pub fn enqueue(&self, task: Box<dyn Task>) {
        // The receiver only disconnects once `wait` has returned, by which
        // point no task should still be enqueuing follow-up work.
        let _ = self.sender.send(task);
    }
}

#[async_trait]
pub trait Task: Send + Sync {
    fn id(&self) -> String;
    fn description(&self) -> String;
    /// Cost hint: LLM tasks observe the separate `llm_concurrency` cap.
    fn is_llm(&self) -> bool;
    async fn execute(&self, cancellation: CancellationToken, enqueuer: Enqueuer) -> Result<(), DomainError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
}

struct TrackedTask {
    id: String,
    description: String,
    status: TaskStatus,
}

/// Fail-fast by default: the first task error cancels the shared token and
/// the queue drains without starting new work. Every task carries a
/// per-attempt soft timeout; a task that exceeds it (or fails with another
/// retryable error) gets bounded retry with exponential jitter before its
/// failure surfaces (§4.3, §5).
pub struct WorkQueue {
    general_permits: Arc<Semaphore>,
    llm_permits: Arc<Semaphore>,
    cancellation: CancellationToken,
    tracked: Arc<Mutex<Vec<TrackedTask>>>,
    task_soft_timeout: Duration,
}

const MAX_TASK_ATTEMPTS: u32 = 3;

impl WorkQueue {
    pub fn new(concurrency: usize, llm_concurrency: usize, task_soft_timeout: Duration) -> Self {
        Self {
            general_permits: Arc::new(Semaphore::new(concurrency.max(1))),
            llm_permits: Arc::new(Semaphore::new(llm_concurrency.max(1))),
            cancellation: CancellationToken::new(),
            tracked: Arc::new(Mutex::new(Vec::new())),
            task_soft_timeout,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Runs every task in `tasks` to completion (or first error / cancel),
    /// fanning out up to the configured concurrency caps. Tasks enqueued by
    /// `execute` via the [`Enqueuer`] are drained in the same pass.
    pub async fn run(&self, tasks: Vec<Box<dyn Task>>) -> Result<(), DomainError> {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel::<Box<dyn Task>>();
        let enqueuer = Enqueuer { sender: sender.clone() };

        {
            let mut tracked = self.tracked.lock().await;
            for task in &tasks {
                tracked.push(TrackedTask { id: task.id(), description: task.description(), status: TaskStatus::Pending });
            }
        }
        for task in tasks {
            let _ = sender.send(task);
        }
        drop(sender);

        let mut in_flight = tokio::task::JoinSet::new();
        let mut first_error: Option<DomainError> = None;

        loop {
            tokio::select! {
                biased;

                Some(task) = receiver.recv(), if first_error.is_none() && !self.cancellation.is_cancelled() => {
                    self.spawn_task(task, enqueuer.clone(), &mut in_flight);
                }
                Some(result) = in_flight.join_next() => {
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(error)) => {
                            if first_error.is_none() {
                                self.cancellation.cancel();
                                first_error = Some(error);
                            }
                        }
                        Err(join_error) => {
                            if first_error.is_none() {
                                self.cancellation.cancel();
                                first_error = Some(DomainError::TransientIo(join_error.to_string()));
                            }
                        }
                    }
                }
                else => break,
            }
        }

        while let Some(result) = in_flight.join_next().await {
            if let Ok(Err(error)) = result
                && first_error.is_none()
            {
                first_error = Some(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn spawn_task(
        &self,
        task: Box<dyn Task>,
        enqueuer: Enqueuer,
        in_flight: &mut tokio::task::JoinSet<Result<(), DomainError>>,
    ) {
        let permits = if task.is_llm() { Arc::clone(&self.llm_permits) } else { Arc::clone(&self.general_permits) };
        let cancellation = self.cancellation.clone();
        let tracked = Arc::clone(&self.tracked);
        let task_id = task.id();
        let soft_timeout = self.task_soft_timeout;

        in_flight.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|e| DomainError::TransientIo(e.to_string()))?;
            set_status(&tracked, &task_id, TaskStatus::Running).await;

            if cancellation.is_cancelled() {
                set_status(&tracked, &task_id, TaskStatus::Cancelled).await;
                return Ok(());
            }

            let outcome = run_with_retry(task.as_ref(), cancellation.clone(), enqueuer, soft_timeout).await;

            match &outcome {
                Ok(()) if cancellation.is_cancelled() => set_status(&tracked, &task_id, TaskStatus::Cancelled).await,
                Ok(()) => set_status(&tracked, &task_id, TaskStatus::Completed).await,
                Err(_) => set_status(&tracked, &task_id, TaskStatus::Failed).await,
            }
            outcome
        });
    }

    /// A snapshot of currently known tasks and their status, consumed by
    /// the `DurableTaskQueue`.
    pub async fn get_tasks(&self) -> Vec<TaskSnapshot> {
        self.tracked
            .lock()
            .await
            .iter()
            .map(|t| TaskSnapshot { id: t.id.clone(), description: t.description.clone(), status: t.status })
            .collect()
    }
}

async fn set_status(tracked: &Mutex<Vec<TrackedTask>>, id: &str, status: TaskStatus) {
    let mut tracked = tracked.lock().await;
    if let Some(entry) = tracked.iter_mut().find(|t| t.id == id) {
        entry.status = status;
    }
}

/// Runs a task's `execute` under a per-attempt soft timeout (§5: "a per-task
/// soft timeout turns into retry"), retrying retryable failures — including
/// an elapsed timeout, surfaced as `DomainError::TransientIo` — with
/// exponential jitter up to `MAX_TASK_ATTEMPTS`.
async fn run_with_retry(task: &dyn Task, cancellation: CancellationToken, enqueuer: Enqueuer, soft_timeout: Duration) -> Result<(), DomainError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(soft_timeout, task.execute(cancellation.clone(), enqueuer.clone())).await {
            Ok(result) => result,
            Err(_elapsed) => Err(DomainError::TransientIo(format!("task {} exceeded its {soft_timeout:?} soft timeout", task.id()))),
        };
        match result {
            Ok(()) => return Ok(()),
            Err(error) if error.is_retryable() && attempt < MAX_TASK_ATTEMPTS => {
                let backoff_ms = 100 * 2u64.pow(attempt - 1) + rand::random::<u64>() % 100;
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
            Err(error) => return Err(error),
        }
    }
}
