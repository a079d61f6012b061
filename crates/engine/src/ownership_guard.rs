//! Single-writer claim, heartbeat, and release over a workflow row (§4.4).
//!
//! `instance_id` is one of the two process-wide global mutable items
//! permitted by §9: generated once at boot, read-only thereafter.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use ontology_domain::{error::DomainError, ids::WorkflowId};
use ontology_ports::repository::WorkflowRepository;
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use crate::config::EngineConfig;

static INSTANCE_ID: OnceLock<String> = OnceLock::new();

/// The identifier this process uses for ownership claims. Generated once,
/// on first use, and stable for the process's lifetime.
pub fn instance_id() -> &'static str {
    INSTANCE_ID.get_or_init(|| Uuid::now_v7().to_string())
}

/// An acquired, heartbeated claim over one workflow. Dropping it does not
/// release ownership — call [`OwnershipGuard::release`] explicitly so
/// release always happens-after the caller's last write, per §4.4's
/// ordering requirement.
pub struct OwnershipClaim {
    workflow_id: WorkflowId,
    repository: Arc<dyn WorkflowRepository>,
    heartbeat_task: JoinHandle<()>,
    lost_rx: watch::Receiver<bool>,
}

impl OwnershipClaim {
    pub async fn release(self) -> Result<(), DomainError> {
        self.heartbeat_task.abort();
        self.repository
            .release_ownership(&self.workflow_id, Utc::now())
            .await
            .map_err(DomainError::from)
    }

    /// Drops the claim without writing a release: the lease is already
    /// gone (lost to another owner or the repository stopped accepting our
    /// heartbeats), so calling `release_ownership` here would either no-op
    /// or clobber whoever claimed it next.
    pub fn abandon(self) {
        self.heartbeat_task.abort();
    }

    /// True once the heartbeat has observed the lease lost or given up
    /// retrying past its TTL (§5 split-brain guard).
    pub fn is_lost(&self) -> bool {
        *self.lost_rx.borrow()
    }

    /// Resolves when the heartbeat reports the lease lost. Never resolves
    /// on its own if the claim is released first, since `release` aborts
    /// the heartbeat task before it can report anything further.
    pub async fn wait_until_lost(&mut self) {
        while !*self.lost_rx.borrow() {
            if self.lost_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub struct OwnershipGuard {
    repository: Arc<dyn WorkflowRepository>,
    config: EngineConfig,
}

impl OwnershipGuard {
    pub fn new(repository: Arc<dyn WorkflowRepository>, config: EngineConfig) -> Self {
        Self { repository, config }
    }

    /// Attempts the atomic CAS claim; on success spawns a background task
    /// that heartbeats every `heartbeat_period` until the claim is released
    /// or the process aborts. Claim must happen-before any write to the
    /// workflow's mutable state (§4.4).
    pub async fn claim(&self, workflow_id: WorkflowId) -> Result<Option<OwnershipClaim>, DomainError> {
        let now = Utc::now();
        let claimed = self
            .repository
            .try_claim_ownership(&workflow_id, instance_id(), now, self.config.lease_ttl)
            .await?;
        if !claimed {
            return Ok(None);
        }

        let repository = Arc::clone(&self.repository);
        let heartbeat_period = self.config.heartbeat_period;
        let lease_ttl = self.config.lease_ttl;
        let (lost_tx, lost_rx) = watch::channel(false);
        let heartbeat_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_period);
            let mut consecutive_failures = std::time::Duration::ZERO;
            loop {
                interval.tick().await;
                match repository.heartbeat(&workflow_id, instance_id(), Utc::now()).await {
                    Ok(true) => consecutive_failures = std::time::Duration::ZERO,
                    Ok(false) => {
                        tracing::warn!(workflow.id = %workflow_id, "ownership lost, stopping heartbeat");
                        let _ = lost_tx.send(true);
                        break;
                    }
                    Err(error) => {
                        consecutive_failures += heartbeat_period;
                        tracing::warn!(workflow.id = %workflow_id, %error, "heartbeat write failed, retrying");
                        if consecutive_failures >= lease_ttl {
                            tracing::error!(workflow.id = %workflow_id, "heartbeat failing for >= lease TTL, aborting");
                            let _ = lost_tx.send(true);
                            break;
                        }
                    }
                }
            }
        });

        Ok(Some(OwnershipClaim { workflow_id, repository: Arc::clone(&self.repository), heartbeat_task, lost_rx }))
    }
}
