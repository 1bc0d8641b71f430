//! Workflow, entity-state, task and audit persistence.

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{now, OntologyStore, StoreError, StoreResult};
use crate::workflow::{
    AnswerDiff, EntityScope, EntityStatus, Task, TaskKind, TaskStatus, WorkflowEntityState,
    WorkflowRun, WorkflowState,
};

/// A durable knowledge fact created from an answer, identified by its
/// content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeFact {
    pub id: String,
    pub project_id: String,
    pub category: String,
    pub fact: String,
    pub created_at: i64,
}

fn workflow_from_row(row: &Row<'_>) -> rusqlite::Result<WorkflowRun> {
    let state: String = row.get(3)?;
    Ok(WorkflowRun {
        id: row.get(0)?,
        project_id: row.get(1)?,
        datasource_id: row.get(2)?,
        state: WorkflowState::parse(&state).unwrap_or(WorkflowState::Failed),
        error_message: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn entity_state_from_row(row: &Row<'_>) -> rusqlite::Result<WorkflowEntityState> {
    let scope: String = row.get(2)?;
    let status: String = row.get(3)?;
    let gathered: String = row.get(4)?;
    Ok(WorkflowEntityState {
        id: row.get(0)?,
        workflow_id: row.get(1)?,
        scope: EntityScope::decode(&scope),
        status: EntityStatus::parse(&status).unwrap_or(EntityStatus::Failed),
        gathered: serde_json::from_str(&gathered).unwrap_or(serde_json::json!({})),
        updated_at: row.get(5)?,
    })
}

const WORKFLOW_COLUMNS: &str =
    "id, project_id, datasource_id, state, error_message, created_at, updated_at";

const ENTITY_STATE_COLUMNS: &str = "id, workflow_id, scope, status, gathered, updated_at";

impl OntologyStore {
    /// Create a new workflow run in pending state.
    pub fn create_workflow(
        &self,
        project_id: &str,
        datasource_id: &str,
    ) -> StoreResult<WorkflowRun> {
        let id = Uuid::new_v4().to_string();
        let ts = now();
        self.conn().execute(
            "INSERT INTO workflows (id, project_id, datasource_id, state, created_at, updated_at)
             VALUES (?, ?, ?, 'pending', ?, ?)",
            params![id, project_id, datasource_id, ts, ts],
        )?;
        self.get_workflow(&id)
    }

    pub fn get_workflow(&self, id: &str) -> StoreResult<WorkflowRun> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM workflows WHERE id = ?", WORKFLOW_COLUMNS),
                params![id],
                workflow_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("workflow {}", id)))
    }

    /// Latest workflow run for a datasource, if any.
    pub fn latest_workflow(
        &self,
        project_id: &str,
        datasource_id: &str,
    ) -> StoreResult<Option<WorkflowRun>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM workflows
                     WHERE project_id = ? AND datasource_id = ?
                     ORDER BY created_at DESC LIMIT 1",
                    WORKFLOW_COLUMNS
                ),
                params![project_id, datasource_id],
                workflow_from_row,
            )
            .optional()?)
    }

    /// Persist a workflow state change.
    pub fn update_workflow_state(
        &self,
        id: &str,
        state: WorkflowState,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE workflows SET state = ?, error_message = COALESCE(?, error_message),
                 updated_at = ? WHERE id = ?",
            params![state.as_str(), error_message, now(), id],
        )?;
        Ok(())
    }

    /// Upsert an entity state row (keyed by workflow + scope).
    pub fn upsert_entity_state(&self, state: &WorkflowEntityState) -> StoreResult<()> {
        let gathered = serde_json::to_string(&state.gathered)?;
        self.conn().execute(
            "INSERT INTO entity_states (id, workflow_id, scope, status, gathered, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (workflow_id, scope) DO UPDATE SET
                 status = excluded.status,
                 gathered = excluded.gathered,
                 updated_at = excluded.updated_at",
            params![
                state.id,
                state.workflow_id,
                state.scope.encode(),
                state.status.as_str(),
                gathered,
                now()
            ],
        )?;
        Ok(())
    }

    pub fn get_entity_state(
        &self,
        workflow_id: &str,
        scope: &EntityScope,
    ) -> StoreResult<Option<WorkflowEntityState>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM entity_states WHERE workflow_id = ? AND scope = ?",
                    ENTITY_STATE_COLUMNS
                ),
                params![workflow_id, scope.encode()],
                entity_state_from_row,
            )
            .optional()?)
    }

    pub fn list_entity_states(&self, workflow_id: &str) -> StoreResult<Vec<WorkflowEntityState>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entity_states WHERE workflow_id = ? ORDER BY scope",
            ENTITY_STATE_COLUMNS
        ))?;
        let states = stmt
            .query_map(params![workflow_id], entity_state_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(states)
    }

    /// Delete all entity states for a workflow, returning the count.
    pub fn delete_entity_states(&self, workflow_id: &str) -> StoreResult<usize> {
        Ok(self.conn().execute(
            "DELETE FROM entity_states WHERE workflow_id = ?",
            params![workflow_id],
        )?)
    }

    /// Upsert the persisted task list for a workflow.
    pub fn save_tasks(&self, tasks: &[Task]) -> StoreResult<()> {
        let conn = self.conn();
        for task in tasks {
            conn.execute(
                "INSERT INTO workflow_tasks (id, workflow_id, kind, ord, subject, status,
                     retry_count, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (id) DO UPDATE SET
                     status = excluded.status,
                     retry_count = excluded.retry_count,
                     updated_at = excluded.updated_at",
                params![
                    task.id,
                    task.workflow_id,
                    task.kind.as_str(),
                    task.ord,
                    task.subject,
                    task.status.as_str(),
                    task.retry_count,
                    now()
                ],
            )?;
        }
        Ok(())
    }

    pub fn list_tasks(&self, workflow_id: &str) -> StoreResult<Vec<Task>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, workflow_id, kind, ord, subject, status, retry_count
             FROM workflow_tasks WHERE workflow_id = ? ORDER BY ord",
        )?;
        let tasks = stmt
            .query_map(params![workflow_id], |row| {
                let kind: String = row.get(2)?;
                let status: String = row.get(5)?;
                Ok(Task {
                    id: row.get(0)?,
                    workflow_id: row.get(1)?,
                    kind: TaskKind::parse(&kind).unwrap_or(TaskKind::ProfileTable),
                    ord: row.get(3)?,
                    subject: row.get(4)?,
                    status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Failed),
                    retry_count: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Persist an answer audit diff. Diffs are never deleted.
    pub fn insert_answer_diff(&self, diff: &AnswerDiff) -> StoreResult<()> {
        let summary = serde_json::to_string(diff)?;
        self.conn().execute(
            "INSERT INTO answer_diffs (id, workflow_id, scope, summary, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![diff.id, diff.workflow_id, diff.scope.encode(), summary, now()],
        )?;
        Ok(())
    }

    pub fn list_answer_diffs(&self, workflow_id: &str) -> StoreResult<Vec<AnswerDiff>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT summary FROM answer_diffs WHERE workflow_id = ? ORDER BY created_at",
        )?;
        let diffs = stmt
            .query_map(params![workflow_id], |row| {
                let summary: String = row.get(0)?;
                Ok(summary)
            })?
            .collect::<Result<Vec<String>, _>>()?;

        diffs
            .into_iter()
            .map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .collect()
    }

    /// Upsert a knowledge fact by content hash; duplicates are no-ops.
    pub fn upsert_knowledge_fact(
        &self,
        project_id: &str,
        id: &str,
        category: &str,
        fact: &str,
    ) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO knowledge_facts (id, project_id, category, fact, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (id) DO NOTHING",
            params![id, project_id, category, fact, now()],
        )?;
        Ok(())
    }

    pub fn list_knowledge_facts(&self, project_id: &str) -> StoreResult<Vec<KnowledgeFact>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, category, fact, created_at
             FROM knowledge_facts WHERE project_id = ? ORDER BY created_at",
        )?;
        let facts = stmt
            .query_map(params![project_id], |row| {
                Ok(KnowledgeFact {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    category: row.get(2)?,
                    fact: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_workflow_lifecycle() {
        let store = OntologyStore::open_in_memory().unwrap();
        let wf = store.create_workflow("p1", "ds1").unwrap();
        assert_eq!(wf.state, WorkflowState::Pending);

        store
            .update_workflow_state(&wf.id, WorkflowState::Running, None)
            .unwrap();
        let wf = store.get_workflow(&wf.id).unwrap();
        assert_eq!(wf.state, WorkflowState::Running);

        let latest = store.latest_workflow("p1", "ds1").unwrap().unwrap();
        assert_eq!(latest.id, wf.id);
    }

    #[test]
    fn test_entity_state_upsert_by_scope() {
        let store = OntologyStore::open_in_memory().unwrap();
        let scope = EntityScope::Column("orders".to_string(), "status".to_string());

        let mut state = WorkflowEntityState {
            id: "es1".to_string(),
            workflow_id: "w1".to_string(),
            scope: scope.clone(),
            status: EntityStatus::Pending,
            gathered: json!({"rows": 100}),
            updated_at: 0,
        };
        store.upsert_entity_state(&state).unwrap();

        state.status = EntityStatus::Scanning;
        state.gathered = json!({"rows": 100, "distinct": 3});
        store.upsert_entity_state(&state).unwrap();

        let loaded = store.get_entity_state("w1", &scope).unwrap().unwrap();
        assert_eq!(loaded.status, EntityStatus::Scanning);
        assert_eq!(loaded.gathered["distinct"], 3);
        assert_eq!(store.list_entity_states("w1").unwrap().len(), 1);
    }

    #[test]
    fn test_tasks_roundtrip() {
        let store = OntologyStore::open_in_memory().unwrap();
        let tasks = vec![
            Task::new("w1", TaskKind::ProfileTable, 0, "orders"),
            Task::new("w1", TaskKind::GenerateQuestions, 1, "global"),
        ];
        store.save_tasks(&tasks).unwrap();

        let loaded = store.list_tasks("w1").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].kind, TaskKind::ProfileTable);
        assert_eq!(loaded[1].subject, "global");
    }

    #[test]
    fn test_knowledge_fact_dedup() {
        let store = OntologyStore::open_in_memory().unwrap();
        store
            .upsert_knowledge_fact("p1", "abc123", "domain", "orders are purchases")
            .unwrap();
        store
            .upsert_knowledge_fact("p1", "abc123", "domain", "orders are purchases")
            .unwrap();

        assert_eq!(store.list_knowledge_facts("p1").unwrap().len(), 1);
    }
}
