//! The extraction orchestrator.
//!
//! Runs the nine stages of a DAG strictly in order under a leadership
//! lease. Every node transition is persisted before control returns, so a
//! crash between nodes loses no progress: a restart resumes at the first
//! node that is not completed or skipped, unless the schema fingerprint
//! changed, in which case nodes are invalidated back to the first affected
//! one. Cancellation is cooperative and observed only at node boundaries.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::lease::LeaseConfig;
use super::{DagStatus, NodeProgress, NodeStatus, OntologyDag, Stage};
use crate::classify::{ClassificationPipeline, ClassifyConfig, ClassifyError, PhaseProgress};
use crate::discovery::{
    DiscoveryConfig, DiscoveryEngine, DiscoveryError, EntityMaterializer, GroupedCandidates,
};
use crate::llm::{coerce, ClassifyRequest, ModelClient, ModelError};
use crate::profile::{
    ProfilerError, ProfilerProvider, ProfilerProviderExt, TableMetadata,
};
use crate::store::{GlossaryTerm, OntologyStore, StoreError};
use crate::workflow::{
    EntityScope, EntityStatus, EntityTracker, Task, TaskKind, TaskQueue, TaskStatus, TrackerError,
    WorkflowRun, WorkflowState,
};

/// Errors from orchestration.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("profiler error: {0}")]
    Profiler(#[from] ProfilerError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("dag {dag_id} lease is held by another instance")]
    LeaseHeld { dag_id: String },

    #[error("lost leadership lease for dag {dag_id}")]
    LeaseLost { dag_id: String },

    #[error("node {stage} failed after {retries} retries: {message}")]
    NodeFailed {
        stage: Stage,
        retries: i32,
        message: String,
    },

    #[error("extraction was cancelled")]
    Cancelled,
}

impl DagError {
    /// Errors that must not be retried at node granularity.
    fn is_permanent(&self) -> bool {
        match self {
            Self::Profiler(e) => e.is_permanent(),
            Self::Model(e) => e.is_permanent(),
            Self::Classify(ClassifyError::Profiler(e)) => e.is_permanent(),
            Self::Classify(ClassifyError::Model(e)) => e.is_permanent(),
            Self::Discovery(DiscoveryError::Profiler(e)) => e.is_permanent(),
            Self::Cancelled | Self::LeaseHeld { .. } | Self::LeaseLost { .. } => true,
            _ => false,
        }
    }
}

pub type DagResult<T> = Result<T, DagError>;

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Node retry ceiling for transient failures.
    pub max_node_retries: i32,
    pub lease: LeaseConfig,
    /// Bounded batch size for per-table collaborator calls.
    pub batch_size: usize,
    pub classify: ClassifyConfig,
    pub discovery: DiscoveryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_node_retries: 3,
            lease: LeaseConfig::default(),
            batch_size: 4,
            classify: ClassifyConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

/// Per-run context, built once at (re)start.
struct RunContext {
    project_id: String,
    datasource_id: String,
    dag_id: String,
    workflow_id: String,
    tables: Vec<TableMetadata>,
}

/// The DAG orchestrator.
pub struct Orchestrator {
    store: Arc<OntologyStore>,
    profiler: Arc<dyn ProfilerProvider>,
    model: Arc<dyn ModelClient>,
    config: OrchestratorConfig,
    owner_id: String,
}

impl Orchestrator {
    pub fn new(
        store: Arc<OntologyStore>,
        profiler: Arc<dyn ProfilerProvider>,
        model: Arc<dyn ModelClient>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            profiler,
            model,
            config,
            owner_id: Uuid::new_v4().to_string(),
        }
    }

    /// This instance's lease owner id.
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Create or resume the extraction DAG for a datasource and drive it to
    /// a terminal state.
    pub async fn start(&self, project_id: &str, datasource_id: &str) -> DagResult<OntologyDag> {
        // Metadata is fetched once per run; a permanent failure here fails
        // fast before any state is touched.
        let tables = self.profiler.get_all_tables().await?;
        let fingerprint = self.profiler.schema_fingerprint(&tables);

        let dag = match self.store.find_active_dag(project_id, datasource_id)? {
            Some(dag) => dag,
            None => self
                .store
                .create_dag(project_id, datasource_id, &fingerprint)?,
        };

        if !self
            .store
            .try_acquire_lease(&dag.id, &self.owner_id, self.config.lease.staleness_secs)?
        {
            return Err(DagError::LeaseHeld {
                dag_id: dag.id.clone(),
            });
        }

        // Schema drift invalidates completed work back to the first
        // affected node; a schema change always affects EntityDiscovery.
        if dag.schema_fingerprint != fingerprint {
            let reset = self.store.invalidate_nodes_from(&dag.id, 1)?;
            self.store.set_dag_fingerprint(&dag.id, &fingerprint)?;
            info!(dag_id = %dag.id, reset, "schema fingerprint changed, invalidated nodes");
        }

        let table_names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
        self.store.put_datasource_tables(datasource_id, &table_names)?;

        let workflow = self.ensure_workflow(project_id, datasource_id)?;
        self.store.update_dag_status(&dag.id, DagStatus::Running, None)?;
        if workflow.state == WorkflowState::Pending {
            self.store
                .update_workflow_state(&workflow.id, WorkflowState::Running, None)?;
        }

        let ctx = RunContext {
            project_id: project_id.to_string(),
            datasource_id: datasource_id.to_string(),
            dag_id: dag.id.clone(),
            workflow_id: workflow.id.clone(),
            tables,
        };

        // Renew the lease in the background so long nodes never go stale;
        // the renewal loop stops itself if ownership is lost.
        let heartbeat = {
            let store = Arc::clone(&self.store);
            let dag_id = dag.id.clone();
            let owner_id = self.owner_id.clone();
            let period = self.config.lease.heartbeat_secs.max(1) as u64;
            tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(std::time::Duration::from_secs(period));
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if !store.heartbeat(&dag_id, &owner_id).unwrap_or(false) {
                        break;
                    }
                }
            })
        };

        let outcome = self.run_nodes(&ctx).await;
        heartbeat.abort();
        self.finish(&ctx, outcome)?;
        Ok(self.store.get_dag(&dag.id)?)
    }

    /// Request cooperative cancellation; observed at the next node boundary.
    pub fn cancel(&self, dag_id: &str) -> DagResult<()> {
        self.store
            .update_dag_status(dag_id, DagStatus::Cancelled, None)?;
        Ok(())
    }

    /// Renew the leadership lease.
    pub fn heartbeat(&self, dag_id: &str) -> DagResult<bool> {
        Ok(self.store.heartbeat(dag_id, &self.owner_id)?)
    }

    /// Find-or-create the workflow run for this extraction.
    fn ensure_workflow(&self, project_id: &str, datasource_id: &str) -> DagResult<WorkflowRun> {
        if let Some(workflow) = self.store.latest_workflow(project_id, datasource_id)? {
            if !workflow.state.is_terminal() {
                return Ok(workflow);
            }
        }
        Ok(self.store.create_workflow(project_id, datasource_id)?)
    }

    /// Execute nodes strictly in order, resuming past completed ones.
    async fn run_nodes(&self, ctx: &RunContext) -> DagResult<()> {
        for stage in Stage::ALL {
            let node = self.store.get_node(&ctx.dag_id, stage.order())?;
            if node.status.satisfies_dependency() {
                continue;
            }

            // Cancellation and leadership are checked only at node
            // boundaries, never mid-node.
            if self.store.get_dag(&ctx.dag_id)?.status == DagStatus::Cancelled {
                return Err(DagError::Cancelled);
            }
            if !self.store.heartbeat(&ctx.dag_id, &self.owner_id)? {
                return Err(DagError::LeaseLost {
                    dag_id: ctx.dag_id.clone(),
                });
            }

            self.store.set_current_node(&ctx.dag_id, stage.order())?;
            self.run_node_with_retries(ctx, stage).await?;
        }
        Ok(())
    }

    /// Run one node, retrying transient failures up to the ceiling.
    async fn run_node_with_retries(&self, ctx: &RunContext, stage: Stage) -> DagResult<()> {
        loop {
            self.store
                .update_node_status(&ctx.dag_id, stage.order(), NodeStatus::Running, None)?;

            match self.run_stage(ctx, stage).await {
                Ok(()) => {
                    self.store.update_node_status(
                        &ctx.dag_id,
                        stage.order(),
                        NodeStatus::Completed,
                        None,
                    )?;
                    info!(dag_id = %ctx.dag_id, stage = %stage, "node completed");
                    return Ok(());
                }
                Err(e) if e.is_permanent() => {
                    self.store.update_node_status(
                        &ctx.dag_id,
                        stage.order(),
                        NodeStatus::Failed,
                        Some(&e.to_string()),
                    )?;
                    error!(dag_id = %ctx.dag_id, stage = %stage, error = %e,
                           "node failed permanently");
                    return Err(e);
                }
                Err(e) => {
                    let retries = self.store.increment_node_retry(&ctx.dag_id, stage.order())?;
                    if retries >= self.config.max_node_retries {
                        self.store.update_node_status(
                            &ctx.dag_id,
                            stage.order(),
                            NodeStatus::Failed,
                            Some(&e.to_string()),
                        )?;
                        return Err(DagError::NodeFailed {
                            stage,
                            retries,
                            message: e.to_string(),
                        });
                    }
                    warn!(dag_id = %ctx.dag_id, stage = %stage, retries, error = %e,
                          "node failed, retrying");
                }
            }
        }
    }

    /// Record the run outcome on the DAG and workflow rows.
    fn finish(&self, ctx: &RunContext, outcome: DagResult<()>) -> DagResult<()> {
        match &outcome {
            Ok(()) => {
                self.store
                    .update_dag_status(&ctx.dag_id, DagStatus::Completed, None)?;

                let grouped = GroupedCandidates::from_candidates(
                    self.store.list_candidates(&ctx.datasource_id)?,
                );
                let tracker = EntityTracker::new(&self.store, &ctx.project_id);
                let halted = tracker.any_needs_input(&ctx.workflow_id)?;

                let workflow = self.store.get_workflow(&ctx.workflow_id)?;
                let target = if grouped.can_save() && !halted {
                    WorkflowState::Completed
                } else {
                    WorkflowState::AwaitingInput
                };
                if workflow.state.can_transition_to(target) {
                    self.store
                        .update_workflow_state(&ctx.workflow_id, target, None)?;
                }
                if target == WorkflowState::Completed {
                    // Entity state is ephemeral; audit diffs survive
                    tracker.cleanup(&ctx.workflow_id)?;
                }
            }
            Err(DagError::Cancelled) => {
                self.store
                    .update_dag_status(&ctx.dag_id, DagStatus::Cancelled, None)?;
                self.store.update_workflow_state(
                    &ctx.workflow_id,
                    WorkflowState::Failed,
                    Some("cancelled by user"),
                )?;
            }
            Err(DagError::LeaseHeld { .. }) | Err(DagError::LeaseLost { .. }) => {
                // Another instance owns the run now; leave its state alone.
            }
            Err(e) => {
                self.store
                    .update_dag_status(&ctx.dag_id, DagStatus::Failed, Some(&e.to_string()))?;
                self.store.update_workflow_state(
                    &ctx.workflow_id,
                    WorkflowState::Failed,
                    Some(&e.to_string()),
                )?;
            }
        }

        self.store.release_lease(&ctx.dag_id, &self.owner_id)?;
        outcome
    }

    /// Dispatch one stage.
    async fn run_stage(&self, ctx: &RunContext, stage: Stage) -> DagResult<()> {
        match stage {
            Stage::EntityDiscovery => self.stage_entity_discovery(ctx).await,
            Stage::EntityEnrichment => self.stage_entity_enrichment(ctx).await,
            Stage::FkDiscovery => self.stage_fk_discovery(ctx).await,
            Stage::ColumnEnrichment => self.stage_column_enrichment(ctx).await,
            Stage::PkMatchDiscovery => self.stage_pk_match_discovery(ctx).await,
            Stage::RelationshipEnrichment => self.stage_relationship_enrichment(ctx).await,
            Stage::OntologyFinalization => self.stage_finalization(ctx).await,
            Stage::GlossaryDiscovery => self.stage_glossary_discovery(ctx).await,
            Stage::GlossaryEnrichment => self.stage_glossary_enrichment(ctx).await,
        }
    }

    fn set_progress(
        &self,
        ctx: &RunContext,
        stage: Stage,
        current: i64,
        total: i64,
        message: String,
    ) -> DagResult<()> {
        self.store.set_node_progress(
            &ctx.dag_id,
            stage.order(),
            &NodeProgress {
                current,
                total,
                message,
            },
        )?;
        Ok(())
    }

    /// Transition an entity if the move is legal; no-op on re-runs that
    /// already advanced past it.
    fn advance(
        &self,
        tracker: &EntityTracker<'_>,
        workflow_id: &str,
        scope: &EntityScope,
        to: EntityStatus,
    ) -> DagResult<()> {
        let state = tracker.ensure(workflow_id, scope)?;
        if state.status != to && state.status.can_transition_to(to) {
            tracker.transition(workflow_id, scope, to)?;
        }
        Ok(())
    }

    /// Stage 1: discover domain concepts per table.
    async fn stage_entity_discovery(&self, ctx: &RunContext) -> DagResult<()> {
        let tracker = EntityTracker::new(&self.store, &ctx.project_id);
        let materializer = EntityMaterializer::new(&self.store, &ctx.project_id);

        // Previous extraction results go stale until re-observed
        self.store.mark_entities_stale(&ctx.project_id)?;

        self.advance(&tracker, &ctx.workflow_id, &EntityScope::Global, EntityStatus::Scanning)?;

        // Task queue caps concurrent collaborator load per batch; a node
        // retry resumes the persisted queue instead of rebuilding it.
        let mut tasks: Vec<Task> = self
            .store
            .list_tasks(&ctx.workflow_id)?
            .into_iter()
            .filter(|t| t.kind == TaskKind::ProfileTable)
            .collect();
        if tasks.is_empty() {
            tasks = ctx
                .tables
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    Task::new(&ctx.workflow_id, TaskKind::ProfileTable, i as i32, &t.name)
                })
                .collect();
            self.store.save_tasks(&tasks)?;
        } else {
            // Tasks caught mid-flight by a crash go back to pending
            for task in &mut tasks {
                if task.status == TaskStatus::Running {
                    task.status = TaskStatus::Pending;
                }
            }
        }
        let mut queue = TaskQueue::new(tasks, self.config.batch_size);

        let total = ctx.tables.len() as i64;
        let mut done = 0i64;

        while !queue.is_drained() {
            let batch = queue.next_batch();
            if batch.is_empty() {
                break;
            }

            let futures: Vec<_> = batch
                .iter()
                .map(|task| {
                    let table = ctx.tables.iter().find(|t| t.name == task.subject).cloned();
                    let model = Arc::clone(&self.model);
                    let task_id = task.id.clone();
                    async move {
                        let Some(table) = table else {
                            return (task_id, Err(ModelError::ShapeMismatch(
                                "task subject not in table set".to_string(),
                            )));
                        };
                        (task_id, discover_table_entity(model.as_ref(), &table).await)
                    }
                })
                .collect();

            for (task_id, result) in futures::future::join_all(futures).await {
                let Some(task) = queue.tasks().iter().find(|t| t.id == task_id).cloned() else {
                    continue;
                };
                let scope = EntityScope::Table(task.subject.clone());

                match result {
                    Ok(discovered) => {
                        self.advance(&tracker, &ctx.workflow_id, &scope, EntityStatus::Scanning)?;

                        if let Some(discovered) = discovered {
                            let mut entity = materializer
                                .ensure_entity(&discovered.table, discovered.confidence)?;
                            if entity.description.is_none() && discovered.description.is_some() {
                                entity.description = discovered.description;
                                self.store.upsert_entity(&entity)?;
                            }
                            tracker.merge_gathered(
                                &ctx.workflow_id,
                                &scope,
                                &json!({
                                    "entity": entity.name,
                                    "confidence": discovered.confidence
                                }),
                            )?;
                        }

                        self.advance(&tracker, &ctx.workflow_id, &scope, EntityStatus::Scanned)?;
                        queue.finish(&task.id, true, self.config.max_node_retries);
                    }
                    Err(e) if e.is_permanent() => {
                        queue.finish(&task.id, false, self.config.max_node_retries);
                        self.store.save_tasks(queue.tasks())?;
                        return Err(e.into());
                    }
                    Err(e) => {
                        warn!(table = %task.subject, error = %e, "entity discovery item failed");
                        queue.finish(&task.id, false, self.config.max_node_retries);
                    }
                }

                done += 1;
                self.set_progress(
                    ctx,
                    Stage::EntityDiscovery,
                    done.min(total),
                    total,
                    format!("discovered entities in {}/{} tables", done.min(total), total),
                )?;
            }
            self.store.save_tasks(queue.tasks())?;
        }

        self.advance(&tracker, &ctx.workflow_id, &EntityScope::Global, EntityStatus::Scanned)?;
        Ok(())
    }

    /// Stage 2: enrich entities with descriptions and roles.
    async fn stage_entity_enrichment(&self, ctx: &RunContext) -> DagResult<()> {
        let tracker = EntityTracker::new(&self.store, &ctx.project_id);
        let entities = self.store.list_entities(&ctx.project_id)?;
        let total = entities.len() as i64;

        self.advance(&tracker, &ctx.workflow_id, &EntityScope::Global, EntityStatus::Analyzing)?;

        for (i, mut entity) in entities.into_iter().enumerate() {
            let request = ClassifyRequest::new(
                "enrich_entity",
                format!(
                    "Describe the business concept \"{}\" discovered in a relational \
                     database. Respond with description and confidence; set \
                     needs_clarification when the concept is ambiguous.",
                    entity.name
                ),
                json!({
                    "type": "object",
                    "properties": {
                        "description": {"type": "string"},
                        "confidence": {"type": "number"},
                        "needs_clarification": {"type": "boolean"}
                    }
                }),
            );

            match self.model.classify(request).await {
                Ok(response) => {
                    if let Some(value) = coerce::object_or_wrap(&response.value, "description") {
                        if let Some(description) = coerce::string_field(&value, "description") {
                            entity.description = Some(description);
                        }
                        entity.confidence = coerce::confidence_field(
                            &value,
                            "confidence",
                            entity.confidence,
                        );
                        self.store.upsert_entity(&entity)?;

                        if coerce::bool_field(&value, "needs_clarification").unwrap_or(false) {
                            tracker.ask(
                                &ctx.workflow_id,
                                &EntityScope::Global,
                                format!("What does the \"{}\" concept represent?", entity.name),
                                None,
                            )?;
                        }
                    }
                }
                Err(e) if e.is_permanent() => return Err(e.into()),
                Err(e) => {
                    warn!(entity = %entity.name, error = %e, "entity enrichment item failed");
                }
            }

            self.set_progress(
                ctx,
                Stage::EntityEnrichment,
                (i + 1) as i64,
                total,
                format!("enriched {}/{} entities", i + 1, total),
            )?;
        }

        Ok(())
    }

    /// Stage 3: import declared foreign keys.
    async fn stage_fk_discovery(&self, ctx: &RunContext) -> DagResult<()> {
        let engine = DiscoveryEngine::new(
            Arc::clone(&self.profiler),
            Arc::clone(&self.store),
            self.config.discovery.clone(),
        );
        let imported = engine
            .import_foreign_keys(&ctx.project_id, &ctx.datasource_id, &ctx.tables)
            .await?;
        self.set_progress(
            ctx,
            Stage::FkDiscovery,
            imported as i64,
            imported as i64,
            format!("imported {} declared foreign keys", imported),
        )?;
        Ok(())
    }

    /// Stage 4: run the column classification pipeline.
    async fn stage_column_enrichment(&self, ctx: &RunContext) -> DagResult<()> {
        let pipeline = ClassificationPipeline::new(
            Arc::clone(&self.profiler),
            Arc::clone(&self.model),
            Arc::clone(&self.store),
            self.config.classify.clone(),
        );

        let candidates = self.store.list_candidates(&ctx.datasource_id)?;

        // Persist pipeline progress into the node row so status readers see
        // accurate per-phase bars.
        let store = Arc::clone(&self.store);
        let dag_id = ctx.dag_id.clone();
        let mut on_progress = move |p: PhaseProgress| {
            let _ = store.set_node_progress(
                &dag_id,
                Stage::ColumnEnrichment.order(),
                &NodeProgress {
                    current: p.current as i64,
                    total: p.total as i64,
                    message: format!("{}: {}", p.phase.as_str(), p.message),
                },
            );
        };

        let report = pipeline
            .run(&ctx.project_id, &ctx.tables, &candidates, &mut on_progress)
            .await?;

        info!(
            stored = report.columns_stored,
            failures = report.failures.len(),
            "column enrichment finished"
        );
        Ok(())
    }

    /// Stage 5: discover relationships via PK-match and value overlap.
    async fn stage_pk_match_discovery(&self, ctx: &RunContext) -> DagResult<()> {
        let engine = DiscoveryEngine::new(
            Arc::clone(&self.profiler),
            Arc::clone(&self.store),
            self.config.discovery.clone(),
        );
        let report = engine
            .discover(&ctx.project_id, &ctx.datasource_id, &ctx.tables)
            .await?;
        self.set_progress(
            ctx,
            Stage::PkMatchDiscovery,
            report.shortlisted as i64,
            report.pairs_considered as i64,
            format!(
                "validated {} of {} candidate pairs",
                report.shortlisted, report.pairs_considered
            ),
        )?;
        Ok(())
    }

    /// Stage 6: re-score undecided candidates and materialize accepted ones.
    async fn stage_relationship_enrichment(&self, ctx: &RunContext) -> DagResult<()> {
        let engine = DiscoveryEngine::new(
            Arc::clone(&self.profiler),
            Arc::clone(&self.store),
            self.config.discovery.clone(),
        );
        let rescored = engine.rescore_pending(&ctx.datasource_id)?;

        let materializer = EntityMaterializer::new(&self.store, &ctx.project_id);
        let materialized = materializer.materialize_accepted(&ctx.datasource_id)?;

        self.set_progress(
            ctx,
            Stage::RelationshipEnrichment,
            materialized as i64,
            materialized as i64,
            format!(
                "rescored {} candidates, materialized {} relationships",
                rescored, materialized
            ),
        )?;
        Ok(())
    }

    /// Stage 7: finalize the ontology and settle workflow state.
    async fn stage_finalization(&self, ctx: &RunContext) -> DagResult<()> {
        let tracker = EntityTracker::new(&self.store, &ctx.project_id);

        // Close out table states that finished analysis
        for table in &ctx.tables {
            let scope = EntityScope::Table(table.name.clone());
            if let Some(state) = self.store.get_entity_state(&ctx.workflow_id, &scope)? {
                if state.status == EntityStatus::Scanned {
                    tracker.transition(&ctx.workflow_id, &scope, EntityStatus::Analyzing)?;
                    tracker.transition(&ctx.workflow_id, &scope, EntityStatus::Complete)?;
                }
            }
        }

        let global = self
            .store
            .get_entity_state(&ctx.workflow_id, &EntityScope::Global)?;
        if let Some(state) = global {
            if state.status == EntityStatus::Analyzing {
                tracker.transition(&ctx.workflow_id, &EntityScope::Global, EntityStatus::Complete)?;
            }
        }

        let grouped =
            GroupedCandidates::from_candidates(self.store.list_candidates(&ctx.datasource_id)?);
        let (entities, occurrences) = self.store.entity_counts(&ctx.project_id)?;

        // Candidates in the review band pause the workflow for input
        if !grouped.can_save() {
            let workflow = self.store.get_workflow(&ctx.workflow_id)?;
            if workflow.state.can_transition_to(WorkflowState::AwaitingInput) {
                self.store.update_workflow_state(
                    &ctx.workflow_id,
                    WorkflowState::AwaitingInput,
                    None,
                )?;
            }
        }

        self.set_progress(
            ctx,
            Stage::OntologyFinalization,
            1,
            1,
            format!(
                "{} entities, {} occurrences, {} candidates to review",
                entities,
                occurrences,
                grouped.needs_review.len()
            ),
        )?;
        Ok(())
    }

    /// Stage 8: derive glossary terms from finalized entities.
    async fn stage_glossary_discovery(&self, ctx: &RunContext) -> DagResult<()> {
        let entities = self.store.list_entities(&ctx.project_id)?;
        let total = entities.len() as i64;

        for (i, entity) in entities.iter().enumerate() {
            self.store.upsert_glossary_term(&GlossaryTerm {
                id: Uuid::new_v4().to_string(),
                project_id: ctx.project_id.clone(),
                term: entity.name.clone(),
                definition: entity.description.clone().unwrap_or_default(),
                synonyms: Vec::new(),
                source_entity_id: Some(entity.id.clone()),
            })?;
            self.set_progress(
                ctx,
                Stage::GlossaryDiscovery,
                (i + 1) as i64,
                total,
                format!("derived {}/{} glossary terms", i + 1, total),
            )?;
        }
        Ok(())
    }

    /// Stage 9: enrich glossary terms with definitions and synonyms.
    async fn stage_glossary_enrichment(&self, ctx: &RunContext) -> DagResult<()> {
        let terms = self.store.list_glossary_terms(&ctx.project_id)?;
        let total = terms.len() as i64;

        for (i, mut term) in terms.into_iter().enumerate() {
            let request = ClassifyRequest::new(
                "enrich_glossary",
                format!(
                    "Provide a one-sentence business definition and up to three \
                     synonyms for the term \"{}\".",
                    term.term
                ),
                json!({
                    "type": "object",
                    "properties": {
                        "definition": {"type": "string"},
                        "synonyms": {"type": "array", "items": {"type": "string"}}
                    }
                }),
            );

            match self.model.classify(request).await {
                Ok(response) => {
                    if let Some(value) = coerce::object_or_wrap(&response.value, "definition") {
                        if let Some(definition) = coerce::string_field(&value, "definition") {
                            term.definition = definition;
                        }
                        if let Some(synonyms) = value.get("synonyms").and_then(|s| s.as_array()) {
                            term.synonyms = synonyms
                                .iter()
                                .filter_map(|s| s.as_str().map(String::from))
                                .collect();
                        }
                        self.store.upsert_glossary_term(&term)?;
                    }
                }
                Err(e) if e.is_permanent() => return Err(e.into()),
                Err(e) => {
                    warn!(term = %term.term, error = %e, "glossary enrichment item failed");
                }
            }

            self.set_progress(
                ctx,
                Stage::GlossaryEnrichment,
                (i + 1) as i64,
                total,
                format!("enriched {}/{} glossary terms", i + 1, total),
            )?;
        }
        Ok(())
    }
}

/// A model-proposed entity for one table.
struct DiscoveredEntity {
    /// The table whose concept this is (entity name derives from it).
    table: String,
    description: Option<String>,
    confidence: f64,
}

/// Ask the model which domain concept a table represents.
async fn discover_table_entity(
    model: &dyn ModelClient,
    table: &TableMetadata,
) -> Result<Option<DiscoveredEntity>, ModelError> {
    let columns: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    let request = ClassifyRequest::new(
        "discover_entity",
        format!(
            "A relational table \"{}\" has columns [{}]. Name the business \
             concept it stores. Respond with entity (snake_case singular), \
             description and confidence; use entity = null when the table is \
             technical (migrations, logs).",
            table.name,
            columns.join(", ")
        ),
        json!({
            "type": "object",
            "properties": {
                "entity": {"type": ["string", "null"]},
                "description": {"type": "string"},
                "confidence": {"type": "number"}
            },
            "required": ["entity"]
        }),
    );

    let response = model.classify(request).await?;
    let Some(value) = coerce::object_or_wrap(&response.value, "entity") else {
        return Err(ModelError::ShapeMismatch(format!(
            "entity discovery for {} was neither object nor scalar",
            table.name
        )));
    };

    let Some(_) = coerce::string_field(&value, "entity") else {
        return Ok(None);
    };

    Ok(Some(DiscoveredEntity {
        table: table.name.clone(),
        description: coerce::string_field(&value, "description"),
        confidence: coerce::confidence_field(&value, "confidence", 0.6),
    }))
}
