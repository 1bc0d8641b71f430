//! Per-entity extraction state tracking.
//!
//! The tracker owns [`WorkflowEntityState`] rows: status transitions, the
//! gathered-data blob, generated questions and recorded answers. Cascading
//! effects of an answer are modeled as explicit [`AnswerEffect`] events
//! emitted by the answer handler and applied here, so cross-entity mutation
//! stays auditable and testable in isolation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{EntityScope, EntityStatus, WorkflowEntityState};
use crate::store::hash::content_hash;
use crate::store::{OntologyStore, StoreError};

/// Errors from entity state tracking.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("illegal entity transition {from} -> {to} for {scope}")]
    IllegalTransition {
        scope: String,
        from: EntityStatus,
        to: EntityStatus,
    },

    #[error("question {0} not found")]
    QuestionNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// A clarification question generated for an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    /// Parent question for follow-ups, preserved for audit.
    pub parent_id: Option<String>,
    /// Recorded answer, when given.
    pub answer: Option<String>,
}

/// A cascading effect emitted by an answer handler.
///
/// Effects are applied in order; each names the entity it touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnswerEffect {
    /// Append a follow-up question to an entity (moves it to needs_input).
    FollowUpQuestion {
        scope: EntityScope,
        text: String,
        parent_id: Option<String>,
    },
    /// Shallow-merge a patch into an entity's gathered data.
    UpdateGathered { scope: EntityScope, patch: Value },
    /// Reopen a completed entity for re-analysis.
    Reopen { scope: EntityScope },
    /// Record a knowledge fact, deduplicated by content hash.
    CreateFact { category: String, text: String },
}

/// Audit summary of one recorded answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerDiff {
    pub id: String,
    pub workflow_id: String,
    pub scope: EntityScope,
    pub question_id: String,
    /// Entities whose gathered data or status changed.
    pub entity_updates: Vec<String>,
    /// Follow-up questions created (by id).
    pub questions_created: Vec<String>,
    /// Knowledge facts created (by content hash).
    pub facts_created: Vec<String>,
    pub created_at: i64,
}

/// Result of recording an answer.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub state: WorkflowEntityState,
    pub diff: AnswerDiff,
}

/// Tracker over workflow entity states.
pub struct EntityTracker<'a> {
    store: &'a OntologyStore,
    project_id: String,
}

impl<'a> EntityTracker<'a> {
    pub fn new(store: &'a OntologyStore, project_id: impl Into<String>) -> Self {
        Self {
            store,
            project_id: project_id.into(),
        }
    }

    /// Get or create the state row for an entity, starting at pending.
    pub fn ensure(
        &self,
        workflow_id: &str,
        scope: &EntityScope,
    ) -> TrackerResult<WorkflowEntityState> {
        if let Some(state) = self.store.get_entity_state(workflow_id, scope)? {
            return Ok(state);
        }
        let state = WorkflowEntityState {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            scope: scope.clone(),
            status: EntityStatus::Pending,
            gathered: json!({}),
            updated_at: 0,
        };
        self.store.upsert_entity_state(&state)?;
        Ok(state)
    }

    /// Transition an entity, rejecting anything the state machine forbids.
    pub fn transition(
        &self,
        workflow_id: &str,
        scope: &EntityScope,
        to: EntityStatus,
    ) -> TrackerResult<WorkflowEntityState> {
        let mut state = self.ensure(workflow_id, scope)?;
        if !state.status.can_transition_to(to) {
            return Err(TrackerError::IllegalTransition {
                scope: scope.encode(),
                from: state.status,
                to,
            });
        }
        state.status = to;
        self.store.upsert_entity_state(&state)?;
        Ok(state)
    }

    /// Shallow-merge a patch into the gathered blob.
    pub fn merge_gathered(
        &self,
        workflow_id: &str,
        scope: &EntityScope,
        patch: &Value,
    ) -> TrackerResult<WorkflowEntityState> {
        let mut state = self.ensure(workflow_id, scope)?;
        merge_shallow(&mut state.gathered, patch);
        self.store.upsert_entity_state(&state)?;
        Ok(state)
    }

    /// Append a question and halt the entity on needs_input.
    ///
    /// The entity must be analyzing (or already needs_input for follow-ups).
    pub fn ask(
        &self,
        workflow_id: &str,
        scope: &EntityScope,
        text: impl Into<String>,
        parent_id: Option<String>,
    ) -> TrackerResult<Question> {
        let mut state = self.ensure(workflow_id, scope)?;

        if state.status != EntityStatus::NeedsInput {
            if !state.status.can_transition_to(EntityStatus::NeedsInput) {
                return Err(TrackerError::IllegalTransition {
                    scope: scope.encode(),
                    from: state.status,
                    to: EntityStatus::NeedsInput,
                });
            }
            state.status = EntityStatus::NeedsInput;
        }

        let question = Question {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            parent_id,
            answer: None,
        };
        push_question(&mut state.gathered, &question);
        self.store.upsert_entity_state(&state)?;
        Ok(question)
    }

    /// Record an answer and apply its cascading effects.
    ///
    /// The entity re-enters analyzing; effects may append follow-up
    /// questions, patch sibling entities, reopen completed siblings and
    /// create knowledge facts. An audit diff is persisted and retained even
    /// after entity state cleanup.
    pub fn record_answer(
        &self,
        workflow_id: &str,
        scope: &EntityScope,
        question_id: &str,
        answer: impl Into<String>,
        effects: Vec<AnswerEffect>,
    ) -> TrackerResult<AnswerOutcome> {
        let mut state = self.ensure(workflow_id, scope)?;

        if !set_answer(&mut state.gathered, question_id, &answer.into()) {
            return Err(TrackerError::QuestionNotFound(question_id.to_string()));
        }

        // needs_input -> analyzing
        if state.status == EntityStatus::NeedsInput {
            state.status = EntityStatus::Analyzing;
        }
        self.store.upsert_entity_state(&state)?;

        let mut diff = AnswerDiff {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            scope: scope.clone(),
            question_id: question_id.to_string(),
            entity_updates: Vec::new(),
            questions_created: Vec::new(),
            facts_created: Vec::new(),
            created_at: 0,
        };

        for effect in effects {
            match effect {
                AnswerEffect::FollowUpQuestion {
                    scope: target,
                    text,
                    parent_id,
                } => {
                    let question = self.ask(workflow_id, &target, text, parent_id)?;
                    diff.questions_created.push(question.id);
                    diff.entity_updates.push(target.encode());
                }
                AnswerEffect::UpdateGathered {
                    scope: target,
                    patch,
                } => {
                    self.merge_gathered(workflow_id, &target, &patch)?;
                    diff.entity_updates.push(target.encode());
                }
                AnswerEffect::Reopen { scope: target } => {
                    let sibling = self.ensure(workflow_id, &target)?;
                    if sibling.status == EntityStatus::Complete {
                        self.transition(workflow_id, &target, EntityStatus::Analyzing)?;
                        diff.entity_updates.push(target.encode());
                    }
                }
                AnswerEffect::CreateFact { category, text } => {
                    let id = content_hash(&category, &text);
                    self.store
                        .upsert_knowledge_fact(&self.project_id, &id, &category, &text)?;
                    diff.facts_created.push(id);
                }
            }
        }

        self.store.insert_answer_diff(&diff)?;
        let state = self
            .store
            .get_entity_state(workflow_id, scope)?
            .expect("entity state just written");
        Ok(AnswerOutcome { state, diff })
    }

    /// Open questions (no answer yet) for an entity.
    pub fn open_questions(
        &self,
        workflow_id: &str,
        scope: &EntityScope,
    ) -> TrackerResult<Vec<Question>> {
        let state = self.ensure(workflow_id, scope)?;
        Ok(questions(&state.gathered)
            .into_iter()
            .filter(|q| q.answer.is_none())
            .collect())
    }

    /// Whether any entity in the workflow is halted on needs_input.
    pub fn any_needs_input(&self, workflow_id: &str) -> TrackerResult<bool> {
        let states = self.store.list_entity_states(workflow_id)?;
        Ok(states
            .iter()
            .any(|s| s.status == EntityStatus::NeedsInput))
    }

    /// Delete all entity state for a finished workflow. Audit diffs and
    /// knowledge facts are retained.
    pub fn cleanup(&self, workflow_id: &str) -> TrackerResult<usize> {
        Ok(self.store.delete_entity_states(workflow_id)?)
    }
}

/// Shallow-merge `patch` object fields into `target`.
fn merge_shallow(target: &mut Value, patch: &Value) {
    if let (Some(target_map), Some(patch_map)) = (target.as_object_mut(), patch.as_object()) {
        for (k, v) in patch_map {
            target_map.insert(k.clone(), v.clone());
        }
    }
}

fn questions(gathered: &Value) -> Vec<Question> {
    gathered
        .get("questions")
        .and_then(|q| serde_json::from_value(q.clone()).ok())
        .unwrap_or_default()
}

fn push_question(gathered: &mut Value, question: &Question) {
    let mut all = questions(gathered);
    all.push(question.clone());
    if let Some(map) = gathered.as_object_mut() {
        map.insert(
            "questions".to_string(),
            serde_json::to_value(&all).unwrap_or_else(|_| json!([])),
        );
    }
}

fn set_answer(gathered: &mut Value, question_id: &str, answer: &str) -> bool {
    let mut all = questions(gathered);
    let Some(q) = all.iter_mut().find(|q| q.id == question_id) else {
        return false;
    };
    q.answer = Some(answer.to_string());
    if let Some(map) = gathered.as_object_mut() {
        map.insert(
            "questions".to_string(),
            serde_json::to_value(&all).unwrap_or_else(|_| json!([])),
        );
    }
    true
}
