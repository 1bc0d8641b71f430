//! The detection service surface.
//!
//! The seam consumed by the (external) HTTP layer: start/cancel detection,
//! read status with counts, review candidates, save relationships, and read
//! the finished ontology. Everything here is project-scoped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dag::{DagError, Orchestrator};
use crate::discovery::{island_count, EntityWithOccurrences, GroupedCandidates, UserDecision};
use crate::discovery::{CandidateStatus, RelationshipCandidate};
use crate::store::{OntologyStore, StoreError};
use crate::workflow::{WorkflowRun, WorkflowState};

/// Errors from service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("orchestration error: {0}")]
    Dag(#[from] DagError),

    #[error("no workflow exists for datasource {0}")]
    NoWorkflow(String),

    #[error("candidate {candidate_id} does not belong to datasource {datasource_id}")]
    WrongDatasource {
        candidate_id: String,
        datasource_id: String,
    },

    #[error("invalid workflow state: {0}")]
    InvalidState(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Candidate/entity counts for a datasource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionCounts {
    pub confirmed: usize,
    pub needs_review: usize,
    pub rejected: usize,
    pub entities: i64,
    pub occurrences: i64,
    pub islands: usize,
    /// True only when no candidate remains in the review band.
    pub can_save: bool,
}

/// One occurrence inside the hierarchical summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccurrenceSummary {
    pub location: String,
    pub role: Option<String>,
    pub confidence: f64,
    /// Column purpose from classification, when available.
    pub purpose: Option<String>,
}

/// One entity inside the hierarchical summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySummary {
    pub name: String,
    pub description: Option<String>,
    pub confidence: f64,
    pub occurrences: Vec<OccurrenceSummary>,
}

/// The hierarchical ontology summary consumed by downstream natural-language
/// query tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologySummary {
    pub project_id: String,
    pub datasource_id: String,
    pub entities: Vec<EntitySummary>,
    pub relationship_count: usize,
    pub islands: usize,
}

/// The detection service for one project.
pub struct DetectionService {
    store: Arc<OntologyStore>,
    orchestrator: Arc<Orchestrator>,
    project_id: String,
}

impl DetectionService {
    pub fn new(
        store: Arc<OntologyStore>,
        orchestrator: Arc<Orchestrator>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            project_id: project_id.into(),
        }
    }

    /// Start (or resume) detection for a datasource in the background.
    ///
    /// Returns the workflow row immediately; the orchestrator advances the
    /// run on its own task.
    pub async fn start_detection(&self, datasource_id: &str) -> ServiceResult<WorkflowRun> {
        let workflow = match self.store.latest_workflow(&self.project_id, datasource_id)? {
            Some(existing) if !existing.state.is_terminal() => existing,
            Some(finished) => {
                // Explicit restart from a terminal state
                self.store
                    .update_workflow_state(&finished.id, WorkflowState::Pending, None)?;
                self.store.get_workflow(&finished.id)?
            }
            None => self.store.create_workflow(&self.project_id, datasource_id)?,
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let project_id = self.project_id.clone();
        let datasource_id = datasource_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.start(&project_id, &datasource_id).await {
                info!(datasource = %datasource_id, error = %e, "detection run ended with error");
            }
        });

        Ok(workflow)
    }

    /// Run detection to completion on the current task (embedding contexts
    /// and tests).
    pub async fn run_detection(&self, datasource_id: &str) -> ServiceResult<WorkflowRun> {
        self.orchestrator
            .start(&self.project_id, datasource_id)
            .await?;
        self.store
            .latest_workflow(&self.project_id, datasource_id)?
            .ok_or_else(|| ServiceError::NoWorkflow(datasource_id.to_string()))
    }

    /// Current workflow with candidate/entity counts.
    pub fn status_with_counts(
        &self,
        datasource_id: &str,
    ) -> ServiceResult<(WorkflowRun, DetectionCounts)> {
        let workflow = self
            .store
            .latest_workflow(&self.project_id, datasource_id)?
            .ok_or_else(|| ServiceError::NoWorkflow(datasource_id.to_string()))?;

        Ok((workflow, self.counts(datasource_id)?))
    }

    fn counts(&self, datasource_id: &str) -> ServiceResult<DetectionCounts> {
        let candidates = self.store.list_candidates(datasource_id)?;
        let accepted: Vec<RelationshipCandidate> = candidates
            .iter()
            .filter(|c| c.status == CandidateStatus::Accepted)
            .cloned()
            .collect();

        let tables = self.store.get_datasource_tables(datasource_id)?;
        let islands = island_count(&tables, &accepted);

        let grouped = GroupedCandidates::from_candidates(candidates);
        let can_save = grouped.can_save();
        let (entities, occurrences) = self.store.entity_counts(&self.project_id)?;

        Ok(DetectionCounts {
            confirmed: grouped.confirmed.len(),
            needs_review: grouped.needs_review.len(),
            rejected: grouped.rejected.len(),
            entities,
            occurrences,
            islands,
            can_save,
        })
    }

    /// Candidates grouped into confirmed / needs review / rejected.
    pub fn candidates_grouped(&self, datasource_id: &str) -> ServiceResult<GroupedCandidates> {
        Ok(GroupedCandidates::from_candidates(
            self.store.list_candidates(datasource_id)?,
        ))
    }

    /// Record a human decision on a candidate.
    ///
    /// When the decision clears the last review-band candidate of an
    /// awaiting workflow, the workflow completes.
    pub fn update_candidate_decision(
        &self,
        datasource_id: &str,
        candidate_id: &str,
        decision: UserDecision,
    ) -> ServiceResult<RelationshipCandidate> {
        let candidate = self.store.get_candidate(candidate_id)?;
        if candidate.datasource_id != datasource_id {
            return Err(ServiceError::WrongDatasource {
                candidate_id: candidate_id.to_string(),
                datasource_id: datasource_id.to_string(),
            });
        }

        let decided = self.store.record_candidate_decision(candidate_id, decision)?;

        // A cleared review queue completes an awaiting workflow
        if let Some(workflow) = self.store.latest_workflow(&self.project_id, datasource_id)? {
            if workflow.state == WorkflowState::AwaitingInput {
                let grouped = GroupedCandidates::from_candidates(
                    self.store.list_candidates(datasource_id)?,
                );
                if grouped.can_save() {
                    self.store.update_workflow_state(
                        &workflow.id,
                        WorkflowState::Completed,
                        None,
                    )?;
                }
            }
        }

        Ok(decided)
    }

    /// Request cooperative cancellation of a running workflow.
    pub fn cancel(&self, workflow_id: &str) -> ServiceResult<()> {
        let workflow = self.store.get_workflow(workflow_id)?;

        if let Some(dag) = self
            .store
            .find_active_dag(&workflow.project_id, &workflow.datasource_id)?
        {
            self.orchestrator.cancel(&dag.id)?;
        } else if !workflow.state.is_terminal() {
            self.store.update_workflow_state(
                workflow_id,
                WorkflowState::Failed,
                Some("cancelled by user"),
            )?;
        }
        Ok(())
    }

    /// Materialize accepted candidates into saved relationships.
    ///
    /// Only valid once the workflow completed; returns the saved count.
    pub fn save_relationships(&self, workflow_id: &str) -> ServiceResult<usize> {
        let workflow = self.store.get_workflow(workflow_id)?;
        if workflow.state != WorkflowState::Completed {
            return Err(ServiceError::InvalidState(format!(
                "workflow {} is {}, relationships can only be saved when completed",
                workflow_id, workflow.state
            )));
        }

        Ok(self
            .store
            .save_accepted_relationships(&workflow.datasource_id)?)
    }

    /// All live entities with their occurrences.
    pub fn entities_with_occurrences(
        &self,
        _datasource_id: &str,
    ) -> ServiceResult<Vec<EntityWithOccurrences>> {
        Ok(self.store.entities_with_occurrences(&self.project_id)?)
    }

    /// The hierarchical summary for downstream natural-language tools.
    pub fn ontology_summary(&self, datasource_id: &str) -> ServiceResult<OntologySummary> {
        let grouped = self.candidates_grouped(datasource_id)?;
        let tables = self.store.get_datasource_tables(datasource_id)?;
        let islands = island_count(&tables, &grouped.confirmed);

        let entities = self
            .store
            .entities_with_occurrences(&self.project_id)?
            .into_iter()
            .map(|e| {
                let occurrences = e
                    .occurrences
                    .into_iter()
                    .map(|o| {
                        let purpose = self
                            .store
                            .get_column_metadata(&self.project_id, &o.column)
                            .ok()
                            .flatten()
                            .and_then(|m| m.purpose);
                        OccurrenceSummary {
                            location: o.column.qualified(),
                            role: o.role,
                            confidence: o.confidence,
                            purpose,
                        }
                    })
                    .collect();
                EntitySummary {
                    name: e.entity.name,
                    description: e.entity.description,
                    confidence: e.entity.confidence,
                    occurrences,
                }
            })
            .collect();

        Ok(OntologySummary {
            project_id: self.project_id.clone(),
            datasource_id: datasource_id.to_string(),
            entities,
            relationship_count: grouped.confirmed.len(),
            islands,
        })
    }
}
