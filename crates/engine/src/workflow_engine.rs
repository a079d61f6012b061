//! Top-level orchestrator driving a discovery run end to end (§4.12).
//!
//! ```text
//! WorkflowEngine -> OwnershipGuard -> CandidateCollector -> JoinVerifier
//!                                  -> LLMValidator -> RelationshipMaterializer
//! ```
//!
//! This module owns the only `tokio::spawn` call in the crate that isn't
//! internal to a leaf component (`OwnershipGuard`'s heartbeat,
//! `DurableTaskQueue`'s writer): `start_detection` enqueues the run onto a
//! background task and returns immediately, matching §4.12's "create
//! workflow pending; enqueue asynchronously to the engine's runner".

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use ontology_domain::{
    error::DomainError,
    ids::{DatasourceId, ProjectId, RelationshipCandidateId, WorkflowId},
    ontology::Ontology,
    relationship_candidate::{CandidateStatus, RelationshipCandidate},
    workflow::{Workflow, WorkflowPhase},
    workflow_entity_state::{EntityStateStatus, EntityType, WorkflowEntityState},
};
use ontology_ports::{
    LLMClient, SchemaProbe,
    repository::{
        AuditRepository, CandidateRepository, EntityRepository, OntologyRepository,
        RelationshipRepository, SchemaRepository, WorkflowRepository,
    },
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    candidate_collector::{CandidateCollector, CandidateStats},
    config::EngineConfig,
    convention_finalizer::ConventionFinalizer,
    join_verifier::{JoinStats, JoinVerifier},
    llm_validator::{CandidateContext, LLMValidator},
    ownership_guard::{self, OwnershipGuard},
    progress::ProgressCallback,
    relationship_materializer::RelationshipMaterializer,
    work_queue::{Enqueuer, Task, WorkQueue},
    workflow_state_store::WorkflowStateStore,
};

/// Result of a claimed run, distinguishing "ran to completion" from "the
/// operator cancelled it mid-flight" so [`WorkflowEngine::run`] knows
/// whether a subsequent error during ownership release should still
/// surface.
enum RunOutcome {
    Completed,
    Cancelled,
}

/// How many candidates a verify/validate phase processes between
/// cooperative-cancellation checks (§5: "every 100 iterations").
const CANCELLATION_CHECK_INTERVAL: usize = 100;

pub struct WorkflowEngine {
    workflow_repository: Arc<dyn WorkflowRepository>,
    candidate_repository: Arc<dyn CandidateRepository>,
    relationship_repository: Arc<dyn RelationshipRepository>,
    schema_repository: Arc<dyn SchemaRepository>,
    ontology_repository: Arc<dyn OntologyRepository>,
    entity_repository: Arc<dyn EntityRepository>,
    schema_probe: Arc<dyn SchemaProbe>,
    llm_client: Arc<dyn LLMClient>,
    audit_repository: Arc<dyn AuditRepository>,
    ownership_guard: OwnershipGuard,
    state_store: Arc<WorkflowStateStore>,
    config: EngineConfig,
    /// Cancellation tokens for workflows currently running in *this*
    /// process, keyed by workflow ID. Cross-instance cancellation still
    /// works because `Cancel` falls back to a direct terminal-state write
    /// when no local token is registered (see `cancel`).
    running: Mutex<HashMap<WorkflowId, CancellationToken>>,
}

impl WorkflowEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workflow_repository: Arc<dyn WorkflowRepository>,
        candidate_repository: Arc<dyn CandidateRepository>,
        relationship_repository: Arc<dyn RelationshipRepository>,
        schema_repository: Arc<dyn SchemaRepository>,
        ontology_repository: Arc<dyn OntologyRepository>,
        entity_repository: Arc<dyn EntityRepository>,
        schema_probe: Arc<dyn SchemaProbe>,
        llm_client: Arc<dyn LLMClient>,
        audit_repository: Arc<dyn AuditRepository>,
        config: EngineConfig,
    ) -> Self {
        let state_store = Arc::new(WorkflowStateStore::new(Arc::clone(&workflow_repository), 3));
        let ownership_guard = OwnershipGuard::new(Arc::clone(&workflow_repository), config.clone());
        Self {
            workflow_repository,
            candidate_repository,
            relationship_repository,
            schema_repository,
            ontology_repository,
            entity_repository,
            schema_probe,
            llm_client,
            audit_repository,
            ownership_guard,
            state_store,
            config,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// `StartDetection` (§4.12): refuses a duplicate run for the same
    /// `(project, datasource, phase)`, ensures an active ontology, writes
    /// the workflow `pending`, then hands the run off to a background task.
    pub async fn start_detection(
        self: &Arc<Self>,
        project_id: ProjectId,
        datasource_id: DatasourceId,
    ) -> Result<WorkflowId, DomainError> {
        if let Some(existing) = self
            .workflow_repository
            .find_non_terminal(&project_id, Some(&datasource_id), WorkflowPhase::Relationships)
            .await?
        {
            return Err(DomainError::Conflict(format!(
                "workflow {} for this (project, datasource, relationships) is already {:?}",
                existing.id, existing.state
            )));
        }

        let ontology_id = self.ensure_active_ontology(project_id).await?;
        let workflow = Workflow::new(project_id, Some(datasource_id), ontology_id, WorkflowPhase::Relationships, Utc::now());
        self.workflow_repository.insert(&workflow).await?;
        let workflow_id = workflow.id;

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(error) = engine.run(workflow_id).await {
                tracing::error!(workflow.id = %workflow_id, %error, "workflow run ended in error");
            }
        });

        Ok(workflow_id)
    }

    async fn ensure_active_ontology(&self, project_id: ProjectId) -> Result<ontology_domain::ids::OntologyId, DomainError> {
        if let Some(existing) = self.ontology_repository.find_active(&project_id).await? {
            return Ok(existing.id);
        }
        let version = self.ontology_repository.next_version(&project_id).await?;
        let ontology = Ontology::new_version(project_id, version);
        self.ontology_repository.create(&ontology).await?;
        Ok(ontology.id)
    }

    /// The runner (§4.12): claims ownership, drives the relationships
    /// pipeline phase by phase, and writes the terminal state. Returns
    /// `Ok(())` without touching the workflow if the claim fails — another
    /// instance already owns it.
    pub async fn run(&self, workflow_id: WorkflowId) -> Result<(), DomainError> {
        let mut claim = match self.ownership_guard.claim(workflow_id).await? {
            Some(claim) => claim,
            None => return Ok(()),
        };

        let cancel_token = CancellationToken::new();
        self.running.lock().await.insert(workflow_id, cancel_token.clone());

        // Race the pipeline against the heartbeat: if the lease is lost to
        // another instance mid-run, cancel rather than let two owners keep
        // writing the same workflow (§5 split-brain guard).
        let outcome = tokio::select! {
            biased;
            () = claim.wait_until_lost() => {
                cancel_token.cancel();
                Err(DomainError::OwnershipLost { workflow_id: workflow_id.to_string() })
            }
            result = self.run_claimed(workflow_id, &cancel_token) => result,
        };

        self.running.lock().await.remove(&workflow_id);

        match outcome {
            Ok(RunOutcome::Completed | RunOutcome::Cancelled) => {
                claim.release().await?;
                Ok(())
            }
            Err(error) => {
                if let Some(mut workflow) = self.workflow_repository.find_by_id(&workflow_id).await? {
                    // A workflow already terminal (e.g. concurrently
                    // cancelled) must not transition again; ignore that
                    // specific failure so the original error still surfaces.
                    let _ = workflow.mark_failed(error.to_string(), Utc::now());
                    self.workflow_repository.update(&workflow).await?;
                }
                if claim.is_lost() {
                    // The lease is already gone; releasing it here would
                    // either no-op or clobber whoever claimed it next.
                    claim.abandon();
                } else {
                    claim.release().await?;
                }
                Err(error)
            }
        }
    }

    async fn run_claimed(&self, workflow_id: WorkflowId, cancel_token: &CancellationToken) -> Result<RunOutcome, DomainError> {
        let mut workflow = self
            .workflow_repository
            .find_by_id(&workflow_id)
            .await?
            .ok_or_else(|| DomainError::NotFound { entity_type: "Workflow", id: workflow_id.to_string() })?;
        workflow.start_running(ownership_guard::instance_id().to_string(), Utc::now())?;
        self.workflow_repository.update(&workflow).await?;

        let project_id = workflow.project_id;
        let datasource_id = workflow
            .datasource_id
            .ok_or_else(|| DomainError::Validation("relationships workflow requires a datasource".to_string()))?;

        let durable_queue = crate::durable_task_queue::spawn(
            Arc::clone(&self.workflow_repository),
            workflow_id,
            self.config.durable_queue_debounce,
        );

        let run_result = self.drive_relationships_pipeline(&mut workflow, project_id, datasource_id, cancel_token).await;

        durable_queue.shutdown().await;

        match run_result {
            Ok(RunOutcome::Completed) => Ok(RunOutcome::Completed),
            Ok(RunOutcome::Cancelled) => {
                self.candidate_repository.delete_by_workflow(&workflow_id).await?;
                workflow.mark_cancelled(Utc::now())?;
                self.workflow_repository.update(&workflow).await?;
                Ok(RunOutcome::Cancelled)
            }
            Err(error) => Err(error),
        }
    }

    async fn drive_relationships_pipeline(
        &self,
        workflow: &mut Workflow,
        project_id: ProjectId,
        datasource_id: DatasourceId,
        cancel_token: &CancellationToken,
    ) -> Result<RunOutcome, DomainError> {
        self.initialize_column_states(project_id, datasource_id, workflow.id).await?;
        if cancel_token.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        // Phase 1: candidate collection (§4.7).
        workflow.enter_phase(WorkflowPhase::Relationships, 0, "collecting relationship candidates", Utc::now());
        self.workflow_repository.update(workflow).await?;

        let collector = CandidateCollector::new(
            Arc::clone(&self.schema_repository),
            Arc::clone(&self.relationship_repository),
            Arc::clone(&self.schema_probe),
            Arc::clone(&self.state_store),
        );
        let outcome = self
            .with_phase_timeout(
                "candidate_collection",
                collector.collect(project_id, datasource_id, workflow.id, self.progress_reporter(workflow.id)),
            )
            .await?;
        self.candidate_repository.create_batch(&outcome.candidates).await?;
        self.mark_column_states_complete(workflow.id).await?;

        if cancel_token.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        // Phase 2: join verification (§4.8). Escalated stats are kept
        // in-memory for the duration of this run and fed straight into
        // phase 3; a resumed run re-verifies rather than reloading them,
        // which is conservative but correct since the probe calls are
        // idempotent reads (see DESIGN.md).
        let pending_stats: Arc<Mutex<HashMap<RelationshipCandidateId, JoinStats>>> = Arc::new(Mutex::new(HashMap::new()));
        self.with_phase_timeout("join_verification", self.run_join_verification(workflow, &outcome.candidates, &pending_stats, cancel_token))
            .await?;

        if cancel_token.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        // Phase 3: LLM validation (§4.9) for whatever the deterministic
        // gate escalated.
        self.with_phase_timeout("llm_validation", self.run_llm_validation(workflow, project_id, &pending_stats, cancel_token)).await?;

        if cancel_token.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        // Phase 4: materialize accepted relationships and preserve
        // DB-declared FKs verbatim (§4.10).
        workflow.enter_phase(WorkflowPhase::Relationships, 1, "materializing relationships", Utc::now());
        self.workflow_repository.update(workflow).await?;

        let materializer = RelationshipMaterializer::new(
            Arc::clone(&self.schema_repository),
            Arc::clone(&self.relationship_repository),
            Arc::clone(&self.schema_probe),
        );
        let final_candidates = self
            .with_phase_timeout("materialization", async {
                materializer.materialize_declared_fks(project_id, datasource_id).await?;
                let final_candidates = self.candidate_repository.list_by_workflow(&workflow.id).await?;
                materializer.materialize_accepted(project_id, &final_candidates).await?;
                Ok(final_candidates)
            })
            .await?;

        let pending_review_count = final_candidates.iter().filter(|c| c.blocks_save()).count();

        workflow.advance_progress(1, format!("completed with {pending_review_count} candidate(s) pending review"), Utc::now())?;
        workflow.mark_completed(Utc::now())?;
        self.workflow_repository.update(workflow).await?;

        Ok(RunOutcome::Completed)
    }

    /// Enforces §5's per-phase hard timeout (default 60 min): if `fut`
    /// doesn't resolve in time the phase — and the workflow — is failed,
    /// unlike a per-task soft timeout, which only retries.
    async fn with_phase_timeout<T>(&self, phase: &str, fut: impl std::future::Future<Output = Result<T, DomainError>>) -> Result<T, DomainError> {
        match tokio::time::timeout(self.config.phase_hard_timeout, fut).await {
            Ok(result) => result,
            Err(_elapsed) => Err(DomainError::PhaseTimedOut {
                phase: phase.to_string(),
                timeout_secs: self.config.phase_hard_timeout.as_secs(),
            }),
        }
    }

    /// §4.12: "initialize per-column `WorkflowEntityState`" before the
    /// phases run. One pending row per selected column, so an operator can
    /// observe scan progress even before the first candidate exists.
    async fn initialize_column_states(
        &self,
        project_id: ProjectId,
        datasource_id: DatasourceId,
        workflow_id: WorkflowId,
    ) -> Result<(), DomainError> {
        let tables = self.schema_repository.list_selected_tables(&project_id, &datasource_id).await?;
        let mut states = Vec::new();
        for table in tables {
            let columns = self.schema_repository.list_columns(&project_id, &table.id).await?;
            for column in columns {
                states.push(WorkflowEntityState::new(workflow_id, EntityType::Column, column.id.to_string()));
            }
        }
        if !states.is_empty() {
            self.state_store.create_batch(&states).await?;
        }
        Ok(())
    }

    /// Marks every column state for this workflow complete once collection
    /// has returned without error. Per-table collection failures are
    /// already reflected in `CollectorOutcome::tables_skipped`; this core
    /// does not track which individual columns belonged to a skipped
    /// table, so all column rows move to `complete` together here rather
    /// than being marked one at a time during the scan (see DESIGN.md).
    async fn mark_column_states_complete(&self, workflow_id: WorkflowId) -> Result<(), DomainError> {
        let states = self.state_store.list_by_workflow(&workflow_id).await?;
        for state in states.into_iter().filter(|s| s.entity_type == EntityType::Column) {
            self.state_store.mark_complete(state, None).await?;
        }
        Ok(())
    }

    async fn run_join_verification(
        &self,
        workflow: &mut Workflow,
        candidates: &[RelationshipCandidate],
        pending_stats: &Arc<Mutex<HashMap<RelationshipCandidateId, JoinStats>>>,
        cancel_token: &CancellationToken,
    ) -> Result<(), DomainError> {
        let total = candidates.len() as u64;
        workflow.enter_phase(WorkflowPhase::Relationships, total, "verifying joins", Utc::now());
        self.workflow_repository.update(workflow).await?;

        if candidates.is_empty() {
            return Ok(());
        }

        let verifier = Arc::new(JoinVerifier::new(
            Arc::clone(&self.schema_repository),
            Arc::clone(&self.schema_probe),
            self.config.match_rate_threshold,
            self.config.orphan_rate_threshold,
        ));

        let queue = WorkQueue::new(self.config.work_queue_concurrency, self.config.llm_concurrency, self.config.task_soft_timeout);
        let progress = self.progress_reporter(workflow.id);
        let processed = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let tasks: Vec<Box<dyn Task>> = candidates
            .iter()
            .map(|candidate| {
                Box::new(JoinVerifyTask {
                    candidate_id: candidate.id,
                    project_id: workflow.project_id,
                    verifier: Arc::clone(&verifier),
                    candidate_repository: Arc::clone(&self.candidate_repository),
                    pending_stats: Arc::clone(pending_stats),
                    processed: Arc::clone(&processed),
                    total,
                    progress: Arc::clone(&progress),
                    cancel_token: cancel_token.clone(),
                }) as Box<dyn Task>
            })
            .collect();

        queue.run(tasks).await?;
        progress(total, total, "join verification complete");
        Ok(())
    }

    async fn run_llm_validation(
        &self,
        workflow: &mut Workflow,
        project_id: ProjectId,
        pending_stats: &Arc<Mutex<HashMap<RelationshipCandidateId, JoinStats>>>,
        cancel_token: &CancellationToken,
    ) -> Result<(), DomainError> {
        let escalated: Vec<(RelationshipCandidateId, JoinStats)> =
            pending_stats.lock().await.iter().map(|(id, stats)| (*id, *stats)).collect();
        let total = escalated.len() as u64;
        workflow.enter_phase(WorkflowPhase::Relationships, total, "validating candidates with LLM", Utc::now());
        self.workflow_repository.update(workflow).await?;

        if escalated.is_empty() {
            return Ok(());
        }

        let validator = Arc::new(LLMValidator::new(
            Arc::clone(&self.llm_client),
            Arc::clone(&self.audit_repository),
            self.config.llm_confidence_threshold,
            self.config.llm_call_timeout,
        ));

        let queue = WorkQueue::new(self.config.work_queue_concurrency, self.config.llm_concurrency, self.config.task_soft_timeout);
        let progress = self.progress_reporter(workflow.id);
        let processed = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let entity_states = self.state_store.list_by_workflow(&workflow.id).await?;
        let stats_by_entity_key: HashMap<String, CandidateStats> = entity_states
            .into_iter()
            .filter(|s| s.entity_type == EntityType::Candidate)
            .filter_map(|s| {
                let data = s.state_data.clone()?;
                let parsed: CandidateStats = serde_json::from_value(data).ok()?;
                Some((s.entity_key, parsed))
            })
            .collect();

        let mut tasks: Vec<Box<dyn Task>> = Vec::with_capacity(escalated.len());
        for (candidate_id, stats) in escalated {
            let Some(candidate_stats) = stats_by_entity_key.get(&candidate_id.to_string()).cloned() else {
                tracing::warn!(candidate.id = %candidate_id, "llm validation: no collected statistics found, skipping");
                continue;
            };
            tasks.push(Box::new(LlmValidateTask {
                candidate_id,
                project_id,
                join_stats: stats,
                candidate_stats,
                validator: Arc::clone(&validator),
                candidate_repository: Arc::clone(&self.candidate_repository),
                schema_repository: Arc::clone(&self.schema_repository),
                workflow_id: workflow.id,
                processed: Arc::clone(&processed),
                total,
                progress: Arc::clone(&progress),
                cancel_token: cancel_token.clone(),
            }) as Box<dyn Task>);
        }

        queue.run(tasks).await?;
        progress(total, total, "LLM validation complete");
        Ok(())
    }

    /// `SaveRelationships` (§4.12): persists accepted candidates, refusing
    /// if any required candidate is still pending human review.
    pub async fn save_relationships(&self, workflow_id: WorkflowId) -> Result<u64, DomainError> {
        let workflow = self
            .workflow_repository
            .find_by_id(&workflow_id)
            .await?
            .ok_or_else(|| DomainError::NotFound { entity_type: "Workflow", id: workflow_id.to_string() })?;

        let candidates = self.candidate_repository.list_by_workflow(&workflow_id).await?;
        let required_pending = candidates.iter().filter(|c| c.blocks_save()).count();
        if required_pending > 0 {
            return Err(DomainError::PrereqNotMet(format!(
                "{required_pending} required candidate(s) still pending review"
            )));
        }

        let materializer = RelationshipMaterializer::new(
            Arc::clone(&self.schema_repository),
            Arc::clone(&self.relationship_repository),
            Arc::clone(&self.schema_probe),
        );
        materializer.materialize_accepted(workflow.project_id, &candidates).await
    }

    pub async fn get_status(&self, workflow_id: WorkflowId) -> Result<Workflow, DomainError> {
        self.workflow_repository
            .find_by_id(&workflow_id)
            .await?
            .ok_or_else(|| DomainError::NotFound { entity_type: "Workflow", id: workflow_id.to_string() })
    }

    /// `Cancel` (§4.12, §7 `Cancelled`): signals the in-process runner if
    /// one is live, otherwise terminates the workflow directly. Either
    /// path deletes the workflow's candidates per the candidate lifecycle
    /// (§3: "deleted with its workflow on cancel").
    pub async fn cancel(&self, workflow_id: WorkflowId) -> Result<(), DomainError> {
        if let Some(token) = self.running.lock().await.get(&workflow_id) {
            token.cancel();
            return Ok(());
        }

        let mut workflow = self
            .workflow_repository
            .find_by_id(&workflow_id)
            .await?
            .ok_or_else(|| DomainError::NotFound { entity_type: "Workflow", id: workflow_id.to_string() })?;
        if workflow.state.is_terminal() {
            return Ok(());
        }
        self.candidate_repository.delete_by_workflow(&workflow_id).await?;
        workflow.mark_cancelled(Utc::now())?;
        self.workflow_repository.update(&workflow).await
    }

    /// Runs the finalization phase (§4.11) for `project_id`'s active
    /// ontology. Separate from `run` because it operates over promoted
    /// `OntologyEntity` rows rather than a single datasource's candidates,
    /// and the entities phase that promotes them is out of this core's
    /// scope (§1) beyond their data shape.
    pub async fn finalize_conventions(&self, project_id: ProjectId) -> Result<ontology_domain::ontology::DomainSummary, DomainError> {
        let finalizer = ConventionFinalizer::new(
            Arc::clone(&self.ontology_repository),
            Arc::clone(&self.entity_repository),
            Arc::clone(&self.schema_repository),
            Arc::clone(&self.llm_client),
            Arc::clone(&self.audit_repository),
            self.config.convention_coverage_threshold,
        )
        .with_llm_call_timeout(self.config.llm_call_timeout);
        finalizer.finalize(project_id).await
    }

    /// A best-effort, coalescing progress writer: at most one outstanding
    /// repository write per callback, matching the lineage's preference
    /// for a debounced background writer over blocking every call site on
    /// I/O (§4.5's `DurableTaskQueue` uses the same shape for task
    /// snapshots).
    fn progress_reporter(&self, workflow_id: WorkflowId) -> ProgressCallback {
        let repository = Arc::clone(&self.workflow_repository);
        let busy = Arc::new(AtomicBool::new(false));
        Arc::new(move |current, total, message| {
            if busy.swap(true, Ordering::SeqCst) {
                return;
            }
            let repository = Arc::clone(&repository);
            let busy = Arc::clone(&busy);
            let message = message.to_string();
            tokio::spawn(async move {
                if let Ok(Some(mut workflow)) = repository.find_by_id(&workflow_id).await {
                    if workflow.progress.total != total {
                        let phase = workflow.phase;
                        workflow.enter_phase(phase, total, message.clone(), Utc::now());
                    }
                    if workflow.advance_progress(current, message, Utc::now()).is_ok() {
                        let _ = repository.update(&workflow).await;
                    }
                }
                busy.store(false, Ordering::SeqCst);
            });
        })
    }
}

struct JoinVerifyTask {
    candidate_id: RelationshipCandidateId,
    project_id: ProjectId,
    verifier: Arc<JoinVerifier>,
    candidate_repository: Arc<dyn CandidateRepository>,
    pending_stats: Arc<Mutex<HashMap<RelationshipCandidateId, JoinStats>>>,
    processed: Arc<std::sync::atomic::AtomicU64>,
    total: u64,
    progress: ProgressCallback,
    cancel_token: CancellationToken,
}

#[async_trait]
impl Task for JoinVerifyTask {
    fn id(&self) -> String {
        format!("join-verify:{}", self.candidate_id)
    }

    fn description(&self) -> String {
        format!("verify join for candidate {}", self.candidate_id)
    }

    fn is_llm(&self) -> bool {
        false
    }

    async fn execute(&self, _cancellation: CancellationToken, _enqueuer: Enqueuer) -> Result<(), DomainError> {
        if self.cancel_token.is_cancelled() {
            return Ok(());
        }

        let mut candidate = self
            .candidate_repository
            .get(&self.candidate_id)
            .await?
            .ok_or_else(|| DomainError::NotFound { entity_type: "RelationshipCandidate", id: self.candidate_id.to_string() })?;

        if candidate.status == CandidateStatus::Pending {
            let escalated = self.verifier.verify(self.project_id, &mut candidate).await?;
            self.candidate_repository.update(&candidate).await?;
            if let Some(stats) = escalated {
                self.pending_stats.lock().await.insert(self.candidate_id, stats);
            }
        }

        let done = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        if done % CANCELLATION_CHECK_INTERVAL as u64 == 0 || done == self.total {
            (self.progress)(done, self.total, "verifying joins");
        }
        Ok(())
    }
}

struct LlmValidateTask {
    candidate_id: RelationshipCandidateId,
    project_id: ProjectId,
    join_stats: JoinStats,
    candidate_stats: CandidateStats,
    validator: Arc<LLMValidator>,
    candidate_repository: Arc<dyn CandidateRepository>,
    schema_repository: Arc<dyn SchemaRepository>,
    workflow_id: WorkflowId,
    processed: Arc<std::sync::atomic::AtomicU64>,
    total: u64,
    progress: ProgressCallback,
    cancel_token: CancellationToken,
}

#[async_trait]
impl Task for LlmValidateTask {
    fn id(&self) -> String {
        format!("llm-validate:{}", self.candidate_id)
    }

    fn description(&self) -> String {
        format!("LLM-validate candidate {}", self.candidate_id)
    }

    fn is_llm(&self) -> bool {
        true
    }

    async fn execute(&self, _cancellation: CancellationToken, _enqueuer: Enqueuer) -> Result<(), DomainError> {
        if self.cancel_token.is_cancelled() {
            return Ok(());
        }

        let mut candidate = self
            .candidate_repository
            .get(&self.candidate_id)
            .await?
            .ok_or_else(|| DomainError::NotFound { entity_type: "RelationshipCandidate", id: self.candidate_id.to_string() })?;

        if candidate.status == CandidateStatus::Pending {
            let context = self.build_context(&candidate).await?;
            self.validator.validate(self.workflow_id, &mut candidate, &self.join_stats, &context).await?;
            self.candidate_repository.update(&candidate).await?;
        }

        let done = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        if done % CANCELLATION_CHECK_INTERVAL as u64 == 0 || done == self.total {
            (self.progress)(done, self.total, "validating candidates with LLM");
        }
        Ok(())
    }
}

impl LlmValidateTask {
    async fn build_context(&self, candidate: &RelationshipCandidate) -> Result<CandidateContext, DomainError> {
        let source_column = self
            .schema_repository
            .get_column(&self.project_id, &candidate.source_column_id)
            .await?
            .ok_or_else(|| DomainError::SchemaMissing(format!("source column {}", candidate.source_column_id)))?;
        let target_column = self
            .schema_repository
            .get_column(&self.project_id, &candidate.target_column_id)
            .await?
            .ok_or_else(|| DomainError::SchemaMissing(format!("target column {}", candidate.target_column_id)))?;
        let source_table = self
            .schema_repository
            .get_table(&self.project_id, &source_column.table_id)
            .await?
            .ok_or_else(|| DomainError::SchemaMissing(format!("source table {}", source_column.table_id)))?;
        let target_table = self
            .schema_repository
            .get_table(&self.project_id, &target_column.table_id)
            .await?
            .ok_or_else(|| DomainError::SchemaMissing(format!("target table {}", target_column.table_id)))?;

        Ok(CandidateContext {
            source_table: source_table.name,
            source_column: source_column.name,
            source_type: source_column.data_type,
            target_table: target_table.name,
            target_column: target_column.name,
            target_type: target_column.data_type,
            source_samples: self.candidate_stats.source_samples.clone(),
            target_samples: self.candidate_stats.target_samples.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use ontology_domain::{
        column::{ClassificationPath, Column, ColumnFeatures, ColumnRole},
        ids::{ColumnId, TableId},
        table::Table,
    };
    use ontology_ports::{
        schema_probe::{ColumnStat, ForeignKeyDecl, JoinAnalysis, ValueOverlap},
        testutil::{
            FakeLlmClient, FakeSchemaProbe, InMemoryAuditRepository, InMemoryCandidateRepository,
            InMemoryEntityRepository, InMemoryOntologyRepository, InMemoryRelationshipRepository,
            InMemorySchemaRepository, InMemoryWorkflowRepository,
        },
    };
    use pretty_assertions::assert_eq;

    use super::*;

    fn table(project_id: ProjectId, datasource_id: DatasourceId, name: &str) -> Table {
        Table { id: TableId::new(), project_id, datasource_id, schema: "public".to_string(), name: name.to_string(), row_count: None, selected: true }
    }

    fn pk_column(project_id: ProjectId, table_id: TableId, name: &str) -> Column {
        Column {
            id: ColumnId::new(),
            project_id,
            table_id,
            name: name.to_string(),
            data_type: "uuid".to_string(),
            nullable: false,
            is_primary_key: true,
            ordinal_pos: 1,
            distinct_count: None,
            non_null_count: None,
            row_count: None,
            is_joinable: None,
            joinability_reason: None,
            features: None,
        }
    }

    fn fk_source_column(project_id: ProjectId, table_id: TableId, name: &str) -> Column {
        Column {
            id: ColumnId::new(),
            project_id,
            table_id,
            name: name.to_string(),
            data_type: "uuid".to_string(),
            nullable: true,
            is_primary_key: false,
            ordinal_pos: 2,
            distinct_count: None,
            non_null_count: None,
            row_count: None,
            is_joinable: None,
            joinability_reason: None,
            features: Some(ColumnFeatures {
                role: ColumnRole::ForeignKey,
                classification_path: ClassificationPath::Uuid,
                ..Default::default()
            }),
        }
    }

    #[allow(clippy::type_complexity)]
    fn build_engine(
        schema_repo: InMemorySchemaRepository,
        probe: FakeSchemaProbe,
        llm: FakeLlmClient,
    ) -> (
        Arc<WorkflowEngine>,
        InMemoryWorkflowRepository,
        InMemoryCandidateRepository,
        InMemoryRelationshipRepository,
    ) {
        let workflow_repo = InMemoryWorkflowRepository::new();
        let candidate_repo = InMemoryCandidateRepository::new();
        let relationship_repo = InMemoryRelationshipRepository::new();
        let ontology_repo = InMemoryOntologyRepository::new();
        let entity_repo = InMemoryEntityRepository::new();
        let audit_repo = InMemoryAuditRepository::new();

        let engine = Arc::new(WorkflowEngine::new(
            Arc::new(workflow_repo.clone()),
            Arc::new(candidate_repo.clone()),
            Arc::new(relationship_repo.clone()),
            Arc::new(schema_repo),
            Arc::new(ontology_repo),
            Arc::new(entity_repo),
            Arc::new(probe),
            Arc::new(llm),
            Arc::new(audit_repo),
            EngineConfig::default(),
        ));

        (engine, workflow_repo, candidate_repo, relationship_repo)
    }

    #[tokio::test]
    async fn s2_db_declared_fk_preserved_without_llm_and_workflow_completes() {
        let project_id = ProjectId::new();
        let datasource_id = DatasourceId::new();

        let schema_repo = InMemorySchemaRepository::new();
        let users = table(project_id, datasource_id, "users");
        let orders = table(project_id, datasource_id, "orders");
        schema_repo.add_table(users.clone());
        schema_repo.add_table(orders.clone());
        let users_id = pk_column(project_id, users.id, "id");
        let orders_user_id = {
            let mut c = fk_source_column(project_id, orders.id, "user_id");
            c.features = None; // DB-declared only; no feature signal so no candidate is ever collected
            c
        };
        schema_repo.add_column(users_id.clone());
        schema_repo.add_column(orders_user_id.clone());

        let probe = FakeSchemaProbe::new().with_foreign_keys(vec![ForeignKeyDecl {
            source_schema: "public".to_string(),
            source_table: "orders".to_string(),
            source_column: "user_id".to_string(),
            target_schema: "public".to_string(),
            target_table: "users".to_string(),
            target_column: "id".to_string(),
        }]);

        let (engine, workflow_repo, _candidate_repo, relationship_repo) = build_engine(schema_repo, probe, FakeLlmClient::new());

        let workflow_id = engine.start_detection(project_id, datasource_id).await.unwrap();

        let workflow = wait_for_terminal(&workflow_repo, workflow_id).await;
        assert_eq!(workflow.state, ontology_domain::workflow::WorkflowState::Completed);

        let stored = relationship_repo.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].relationship_type, ontology_domain::schema_relationship::RelationshipType::Fk);
        assert_eq!(stored[0].confidence.as_f64(), 1.0);
    }

    #[tokio::test]
    async fn s3_inferred_relationship_accepted_end_to_end() {
        let project_id = ProjectId::new();
        let datasource_id = DatasourceId::new();

        let schema_repo = InMemorySchemaRepository::new();
        let users = table(project_id, datasource_id, "users");
        let orders = table(project_id, datasource_id, "orders");
        schema_repo.add_table(users.clone());
        schema_repo.add_table(orders.clone());
        let users_id = pk_column(project_id, users.id, "id");
        let orders_user_id = fk_source_column(project_id, orders.id, "user_id");
        schema_repo.add_column(users_id.clone());
        schema_repo.add_column(orders_user_id.clone());

        let source_ref = ontology_ports::schema_probe::ColumnRef::new("public", "orders", "user_id");
        let target_ref = ontology_ports::schema_probe::ColumnRef::new("public", "users", "id");

        let probe = FakeSchemaProbe::new()
            .with_column_stats("public", "users", vec![ColumnStat { column: "id".to_string(), row_count: 10, non_null_count: 10, distinct_count: 10 }])
            .with_column_stats("public", "orders", vec![ColumnStat { column: "user_id".to_string(), row_count: 20, non_null_count: 20, distinct_count: 10 }])
            .with_value_overlap(&source_ref, &target_ref, ValueOverlap { match_rate: 1.0, source_distinct: 10, target_distinct: 10, matched_count: 10 })
            .with_join_analysis(&source_ref, &target_ref, JoinAnalysis { join_count: 20, source_matched: 20, target_matched: 10, orphan_count: 0, reverse_orphan_count: 0 });

        let (engine, workflow_repo, _candidate_repo, relationship_repo) = build_engine(schema_repo, probe, FakeLlmClient::new());

        let workflow_id = engine.start_detection(project_id, datasource_id).await.unwrap();
        let workflow = wait_for_terminal(&workflow_repo, workflow_id).await;
        assert_eq!(workflow.state, ontology_domain::workflow::WorkflowState::Completed);

        let stored = relationship_repo.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].relationship_type, ontology_domain::schema_relationship::RelationshipType::Inferred);
        assert!(stored[0].is_validated);
    }

    #[tokio::test]
    async fn s4_low_match_rate_rejects_without_llm_call() {
        let project_id = ProjectId::new();
        let datasource_id = DatasourceId::new();

        let schema_repo = InMemorySchemaRepository::new();
        let users = table(project_id, datasource_id, "users");
        let orders = table(project_id, datasource_id, "orders");
        schema_repo.add_table(users.clone());
        schema_repo.add_table(orders.clone());
        let users_id = pk_column(project_id, users.id, "id");
        let orders_user_id = fk_source_column(project_id, orders.id, "user_id");
        schema_repo.add_column(users_id.clone());
        schema_repo.add_column(orders_user_id.clone());

        let source_ref = ontology_ports::schema_probe::ColumnRef::new("public", "orders", "user_id");
        let target_ref = ontology_ports::schema_probe::ColumnRef::new("public", "users", "id");

        let probe = FakeSchemaProbe::new()
            .with_column_stats("public", "users", vec![ColumnStat { column: "id".to_string(), row_count: 10, non_null_count: 10, distinct_count: 10 }])
            .with_column_stats("public", "orders", vec![ColumnStat { column: "user_id".to_string(), row_count: 20, non_null_count: 20, distinct_count: 10 }])
            .with_value_overlap(&source_ref, &target_ref, ValueOverlap { match_rate: 0.5, source_distinct: 100, target_distinct: 50, matched_count: 50 });

        let llm = FakeLlmClient::new();
        let (engine, workflow_repo, _candidate_repo, relationship_repo) = build_engine(schema_repo, probe, llm.clone());

        let workflow_id = engine.start_detection(project_id, datasource_id).await.unwrap();
        let workflow = wait_for_terminal(&workflow_repo, workflow_id).await;
        assert_eq!(workflow.state, ontology_domain::workflow::WorkflowState::Completed);

        assert!(relationship_repo.all().is_empty());
        assert_eq!(llm.call_count(), 0, "a low match rate must reject before any LLM call");
    }

    #[tokio::test]
    async fn orphaned_join_escalates_to_llm_and_accepted_verdict_materializes() {
        let project_id = ProjectId::new();
        let datasource_id = DatasourceId::new();

        let schema_repo = InMemorySchemaRepository::new();
        let users = table(project_id, datasource_id, "users");
        let orders = table(project_id, datasource_id, "orders");
        schema_repo.add_table(users.clone());
        schema_repo.add_table(orders.clone());
        let users_id = pk_column(project_id, users.id, "id");
        let orders_user_id = fk_source_column(project_id, orders.id, "user_id");
        schema_repo.add_column(users_id.clone());
        schema_repo.add_column(orders_user_id.clone());

        let source_ref = ontology_ports::schema_probe::ColumnRef::new("public", "orders", "user_id");
        let target_ref = ontology_ports::schema_probe::ColumnRef::new("public", "users", "id");

        let probe = FakeSchemaProbe::new()
            .with_column_stats("public", "users", vec![ColumnStat { column: "id".to_string(), row_count: 100, non_null_count: 100, distinct_count: 100 }])
            .with_column_stats("public", "orders", vec![ColumnStat { column: "user_id".to_string(), row_count: 100, non_null_count: 96, distinct_count: 96 }])
            .with_value_overlap(&source_ref, &target_ref, ValueOverlap { match_rate: 0.96, source_distinct: 96, target_distinct: 100, matched_count: 96 })
            .with_join_analysis(&source_ref, &target_ref, JoinAnalysis { join_count: 96, source_matched: 96, target_matched: 96, orphan_count: 50, reverse_orphan_count: 0 });

        let llm = FakeLlmClient::new()
            .push_response(r#"{"isValidFK": true, "confidence": 0.9, "cardinality": "N:1", "reasoning": "plausible", "sourceRole": null}"#);

        let (engine, workflow_repo, _candidate_repo, relationship_repo) = build_engine(schema_repo, probe, llm.clone());

        let workflow_id = engine.start_detection(project_id, datasource_id).await.unwrap();
        let workflow = wait_for_terminal(&workflow_repo, workflow_id).await;
        assert_eq!(workflow.state, ontology_domain::workflow::WorkflowState::Completed);

        assert_eq!(llm.call_count(), 1);
        let stored = relationship_repo.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].relationship_type, ontology_domain::schema_relationship::RelationshipType::Inferred);
        assert_eq!(stored[0].confidence.as_f64(), 0.9);
    }

    #[tokio::test]
    async fn duplicate_start_detection_is_refused_while_non_terminal() {
        let project_id = ProjectId::new();
        let datasource_id = DatasourceId::new();
        let schema_repo = InMemorySchemaRepository::new();
        let (engine, _workflow_repo, _candidate_repo, _relationship_repo) =
            build_engine(schema_repo, FakeSchemaProbe::new(), FakeLlmClient::new());

        let _first = engine.start_detection(project_id, datasource_id).await.unwrap();
        let second = engine.start_detection(project_id, datasource_id).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn save_relationships_refuses_when_required_review_pending() {
        let project_id = ProjectId::new();
        let workflow_repo = InMemoryWorkflowRepository::new();
        let candidate_repo = InMemoryCandidateRepository::new();
        let relationship_repo = InMemoryRelationshipRepository::new();
        let schema_repo = InMemorySchemaRepository::new();
        let ontology_repo = InMemoryOntologyRepository::new();
        let entity_repo = InMemoryEntityRepository::new();
        let audit_repo = InMemoryAuditRepository::new();

        let ontology_id = {
            let o = Ontology::new_version(project_id, 1);
            ontology_repo.create(&o).await.unwrap();
            o.id
        };
        let workflow = Workflow::new(project_id, Some(DatasourceId::new()), ontology_id, WorkflowPhase::Relationships, Utc::now());
        workflow_repo.insert(&workflow).await.unwrap();

        let mut candidate = RelationshipCandidate::new(
            workflow.id,
            ColumnId::new(),
            ColumnId::new(),
            ontology_domain::relationship_candidate::DetectionMethod::ValueMatch,
        );
        candidate.needs_review(0.6, true);
        candidate_repo.create_batch(std::slice::from_ref(&candidate)).await.unwrap();

        let engine = WorkflowEngine::new(
            Arc::new(workflow_repo),
            Arc::new(candidate_repo),
            Arc::new(relationship_repo),
            Arc::new(schema_repo),
            Arc::new(ontology_repo),
            Arc::new(entity_repo),
            Arc::new(FakeSchemaProbe::new()),
            Arc::new(FakeLlmClient::new()),
            Arc::new(audit_repo),
            EngineConfig::default(),
        );

        let result = engine.save_relationships(workflow.id).await;
        assert!(matches!(result, Err(DomainError::PrereqNotMet(_))));
    }

    #[tokio::test]
    async fn cancel_on_pending_workflow_deletes_candidates_and_marks_cancelled() {
        let project_id = ProjectId::new();
        let workflow_repo = InMemoryWorkflowRepository::new();
        let candidate_repo = InMemoryCandidateRepository::new();
        let ontology_repo = InMemoryOntologyRepository::new();
        let ontology_id = {
            let o = Ontology::new_version(project_id, 1);
            ontology_repo.create(&o).await.unwrap();
            o.id
        };
        let workflow = Workflow::new(project_id, Some(DatasourceId::new()), ontology_id, WorkflowPhase::Relationships, Utc::now());
        workflow_repo.insert(&workflow).await.unwrap();

        let candidate = RelationshipCandidate::new(
            workflow.id,
            ColumnId::new(),
            ColumnId::new(),
            ontology_domain::relationship_candidate::DetectionMethod::ValueMatch,
        );
        candidate_repo.create_batch(std::slice::from_ref(&candidate)).await.unwrap();

        let engine = WorkflowEngine::new(
            Arc::new(workflow_repo.clone()),
            Arc::new(candidate_repo.clone()),
            Arc::new(InMemoryRelationshipRepository::new()),
            Arc::new(InMemorySchemaRepository::new()),
            Arc::new(ontology_repo),
            Arc::new(InMemoryEntityRepository::new()),
            Arc::new(FakeSchemaProbe::new()),
            Arc::new(FakeLlmClient::new()),
            Arc::new(InMemoryAuditRepository::new()),
            EngineConfig::default(),
        );

        engine.cancel(workflow.id).await.unwrap();

        let stored = workflow_repo.find_by_id(&workflow.id).await.unwrap().unwrap();
        assert_eq!(stored.state, ontology_domain::workflow::WorkflowState::Cancelled);
        assert!(candidate_repo.list_by_workflow(&workflow.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelling_a_terminal_workflow_is_a_no_op() {
        let project_id = ProjectId::new();
        let workflow_repo = InMemoryWorkflowRepository::new();
        let ontology_repo = InMemoryOntologyRepository::new();
        let ontology_id = {
            let o = Ontology::new_version(project_id, 1);
            ontology_repo.create(&o).await.unwrap();
            o.id
        };
        let mut workflow = Workflow::new(project_id, Some(DatasourceId::new()), ontology_id, WorkflowPhase::Relationships, Utc::now());
        workflow.start_running("instance-a".to_string(), Utc::now()).unwrap();
        workflow.mark_completed(Utc::now()).unwrap();
        workflow_repo.insert(&workflow).await.unwrap();

        let engine = WorkflowEngine::new(
            Arc::new(workflow_repo.clone()),
            Arc::new(InMemoryCandidateRepository::new()),
            Arc::new(InMemoryRelationshipRepository::new()),
            Arc::new(InMemorySchemaRepository::new()),
            Arc::new(ontology_repo),
            Arc::new(InMemoryEntityRepository::new()),
            Arc::new(FakeSchemaProbe::new()),
            Arc::new(FakeLlmClient::new()),
            Arc::new(InMemoryAuditRepository::new()),
            EngineConfig::default(),
        );

        engine.cancel(workflow.id).await.unwrap();
        let stored = workflow_repo.find_by_id(&workflow.id).await.unwrap().unwrap();
        assert_eq!(stored.state, ontology_domain::workflow::WorkflowState::Completed);
    }

    async fn wait_for_terminal(repo: &InMemoryWorkflowRepository, workflow_id: WorkflowId) -> Workflow {
        for _ in 0..200 {
            if let Some(workflow) = repo.find_by_id(&workflow_id).await.unwrap()
                && workflow.state.is_terminal()
            {
                return workflow;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("workflow {workflow_id} did not reach a terminal state in time");
    }
}
