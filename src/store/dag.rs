//! DAG and node persistence, including the leadership lease.

use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::{now, OntologyStore, StoreError, StoreResult};
use crate::dag::{DagNode, DagStatus, NodeProgress, NodeStatus, OntologyDag, Stage};

fn dag_from_row(row: &Row<'_>) -> rusqlite::Result<OntologyDag> {
    let status: String = row.get(3)?;
    Ok(OntologyDag {
        id: row.get(0)?,
        project_id: row.get(1)?,
        datasource_id: row.get(2)?,
        status: DagStatus::parse(&status).unwrap_or(DagStatus::Failed),
        current_node: row.get(4)?,
        schema_fingerprint: row.get(5)?,
        owner_id: row.get(6)?,
        last_heartbeat: row.get(7)?,
        error_message: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<DagNode> {
    let stage: String = row.get(1)?;
    let status: String = row.get(2)?;
    Ok(DagNode {
        dag_id: row.get(0)?,
        stage: Stage::parse(&stage).unwrap_or(Stage::EntityDiscovery),
        status: NodeStatus::parse(&status).unwrap_or(NodeStatus::Failed),
        progress: NodeProgress {
            current: row.get(3)?,
            total: row.get(4)?,
            message: row.get(5)?,
        },
        retry_count: row.get(6)?,
        error_message: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const DAG_COLUMNS: &str = "id, project_id, datasource_id, status, current_node, \
     schema_fingerprint, owner_id, last_heartbeat, error_message, created_at, updated_at";

const NODE_COLUMNS: &str = "dag_id, stage, status, progress_current, progress_total, \
     progress_message, retry_count, error_message, updated_at";

impl OntologyStore {
    /// Create a new DAG with its nine pending nodes.
    pub fn create_dag(
        &self,
        project_id: &str,
        datasource_id: &str,
        schema_fingerprint: &str,
    ) -> StoreResult<OntologyDag> {
        let id = Uuid::new_v4().to_string();
        let ts = now();

        let conn = self.conn();
        conn.execute(
            "INSERT INTO dags (id, project_id, datasource_id, status, current_node,
                 schema_fingerprint, last_heartbeat, created_at, updated_at)
             VALUES (?, ?, ?, 'pending', 0, ?, 0, ?, ?)",
            params![id, project_id, datasource_id, schema_fingerprint, ts, ts],
        )?;

        for stage in Stage::ALL {
            conn.execute(
                "INSERT INTO dag_nodes (dag_id, ord, stage, status, updated_at)
                 VALUES (?, ?, ?, 'pending', ?)",
                params![id, stage.order(), stage.as_str(), ts],
            )?;
        }
        drop(conn);

        self.get_dag(&id)
    }

    /// Get a DAG by id.
    pub fn get_dag(&self, id: &str) -> StoreResult<OntologyDag> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM dags WHERE id = ?", DAG_COLUMNS),
                params![id],
                dag_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("dag {}", id)))
    }

    /// Find the active (pending/running) DAG for a datasource, if any.
    pub fn find_active_dag(
        &self,
        project_id: &str,
        datasource_id: &str,
    ) -> StoreResult<Option<OntologyDag>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM dags
                     WHERE project_id = ? AND datasource_id = ?
                       AND status IN ('pending', 'running')
                     ORDER BY created_at DESC LIMIT 1",
                    DAG_COLUMNS
                ),
                params![project_id, datasource_id],
                dag_from_row,
            )
            .optional()?)
    }

    /// Latest DAG for a datasource regardless of status.
    pub fn latest_dag(
        &self,
        project_id: &str,
        datasource_id: &str,
    ) -> StoreResult<Option<OntologyDag>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM dags
                     WHERE project_id = ? AND datasource_id = ?
                     ORDER BY created_at DESC LIMIT 1",
                    DAG_COLUMNS
                ),
                params![project_id, datasource_id],
                dag_from_row,
            )
            .optional()?)
    }

    /// Update DAG status; preserves the error message when one is given.
    pub fn update_dag_status(
        &self,
        id: &str,
        status: DagStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE dags SET status = ?, error_message = COALESCE(?, error_message),
                 updated_at = ? WHERE id = ?",
            params![status.as_str(), error_message, now(), id],
        )?;
        Ok(())
    }

    /// Record the node order currently being executed.
    pub fn set_current_node(&self, id: &str, order: i32) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE dags SET current_node = ?, updated_at = ? WHERE id = ?",
            params![order, now(), id],
        )?;
        Ok(())
    }

    /// Update the stored schema fingerprint.
    pub fn set_dag_fingerprint(&self, id: &str, fingerprint: &str) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE dags SET schema_fingerprint = ?, updated_at = ? WHERE id = ?",
            params![fingerprint, now(), id],
        )?;
        Ok(())
    }

    /// Attempt to acquire or renew the leadership lease via compare-and-swap.
    ///
    /// Succeeds when the DAG is still active and the lease is unowned, owned
    /// by this instance, or stale (heartbeat older than `staleness_secs`).
    pub fn try_acquire_lease(
        &self,
        dag_id: &str,
        owner_id: &str,
        staleness_secs: i64,
    ) -> StoreResult<bool> {
        let ts = now();
        let stale_before = ts - staleness_secs;
        let rows = self.conn().execute(
            "UPDATE dags SET owner_id = ?1, last_heartbeat = ?2, updated_at = ?2
             WHERE id = ?3 AND status IN ('pending', 'running')
               AND (owner_id IS NULL OR owner_id = ?1 OR last_heartbeat < ?4)",
            params![owner_id, ts, dag_id, stale_before],
        )?;
        Ok(rows == 1)
    }

    /// Renew the heartbeat; fails if this instance no longer owns the lease.
    pub fn heartbeat(&self, dag_id: &str, owner_id: &str) -> StoreResult<bool> {
        let rows = self.conn().execute(
            "UPDATE dags SET last_heartbeat = ?1, updated_at = ?1
             WHERE id = ?2 AND owner_id = ?3",
            params![now(), dag_id, owner_id],
        )?;
        Ok(rows == 1)
    }

    /// Release the lease if this instance holds it.
    pub fn release_lease(&self, dag_id: &str, owner_id: &str) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE dags SET owner_id = NULL, updated_at = ? WHERE id = ? AND owner_id = ?",
            params![now(), dag_id, owner_id],
        )?;
        Ok(())
    }

    /// All nodes of a DAG in execution order.
    pub fn list_nodes(&self, dag_id: &str) -> StoreResult<Vec<DagNode>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM dag_nodes WHERE dag_id = ? ORDER BY ord",
            NODE_COLUMNS
        ))?;
        let nodes = stmt
            .query_map(params![dag_id], node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    /// One node by stage order.
    pub fn get_node(&self, dag_id: &str, order: i32) -> StoreResult<DagNode> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {} FROM dag_nodes WHERE dag_id = ? AND ord = ?",
                    NODE_COLUMNS
                ),
                params![dag_id, order],
                node_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("node {}/{}", dag_id, order)))
    }

    /// Persist a node status transition.
    pub fn update_node_status(
        &self,
        dag_id: &str,
        order: i32,
        status: NodeStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE dag_nodes SET status = ?, error_message = ?, updated_at = ?
             WHERE dag_id = ? AND ord = ?",
            params![status.as_str(), error_message, now(), dag_id, order],
        )?;
        Ok(())
    }

    /// Persist node progress.
    pub fn set_node_progress(
        &self,
        dag_id: &str,
        order: i32,
        progress: &NodeProgress,
    ) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE dag_nodes SET progress_current = ?, progress_total = ?,
                 progress_message = ?, updated_at = ?
             WHERE dag_id = ? AND ord = ?",
            params![
                progress.current,
                progress.total,
                progress.message,
                now(),
                dag_id,
                order
            ],
        )?;
        Ok(())
    }

    /// Increment a node's retry count, returning the new value.
    pub fn increment_node_retry(&self, dag_id: &str, order: i32) -> StoreResult<i32> {
        let conn = self.conn();
        conn.execute(
            "UPDATE dag_nodes SET retry_count = retry_count + 1, updated_at = ?
             WHERE dag_id = ? AND ord = ?",
            params![now(), dag_id, order],
        )?;
        let count = conn.query_row(
            "SELECT retry_count FROM dag_nodes WHERE dag_id = ? AND ord = ?",
            params![dag_id, order],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Reset nodes at or after `first_order` back to pending.
    ///
    /// Used when a schema fingerprint change invalidates previously
    /// completed work.
    pub fn invalidate_nodes_from(&self, dag_id: &str, first_order: i32) -> StoreResult<usize> {
        let rows = self.conn().execute(
            "UPDATE dag_nodes SET status = 'pending', retry_count = 0,
                 progress_current = 0, progress_total = 0, progress_message = '',
                 error_message = NULL, updated_at = ?
             WHERE dag_id = ? AND ord >= ? AND status != 'pending'",
            params![now(), dag_id, first_order],
        )?;
        Ok(rows)
    }
}
