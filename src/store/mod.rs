//! SQLite-backed ontology store.
//!
//! Durable persistence for all extraction state: DAGs and nodes, workflow
//! runs and entity states, relationship candidates, column metadata,
//! discovered entities and glossary terms.
//!
//! # Design
//!
//! - One schema-versioned SQLite database per deployment; auto-clears on
//!   version mismatch
//! - Structured rows for anything queried by SQL (candidates, nodes),
//!   JSON documents for blob-like state (column metadata, gathered data)
//! - All writes are idempotent upserts so interrupted work can be re-run
//! - Shared between async tasks behind a mutex; every method takes `&self`

pub mod hash;

mod candidates;
mod columns;
mod dag;
mod entities;
mod workflow;

pub use entities::GlossaryTerm;
pub use workflow::KnowledgeFact;

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};

/// Current store schema version. Bump this when the layout changes.
const STORE_VERSION: i32 = 1;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine state directory")]
    NoStateDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Row not found: {0}")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Current unix time in seconds.
pub(crate) fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// SQLite-backed store for all extraction state.
pub struct OntologyStore {
    conn: Mutex<Connection>,
}

impl OntologyStore {
    /// Open or create the store database at the default location
    /// (`~/.ontomap/state.db`).
    pub fn open() -> StoreResult<Self> {
        let path = Self::default_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::open_at(&path)
    }

    /// Open or create the store database at a specific path.
    pub fn open_at(path: &std::path::Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Default on-disk location.
    pub fn default_path() -> StoreResult<PathBuf> {
        let base = dirs::home_dir().ok_or(StoreError::NoStateDir)?;
        Ok(base.join(".ontomap").join("state.db"))
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store lock poisoned")
    }

    /// Initialize the schema and check the version.
    fn init(&self) -> StoreResult<()> {
        self.conn().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS dags (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                datasource_id TEXT NOT NULL,
                status TEXT NOT NULL,
                current_node INTEGER NOT NULL DEFAULT 0,
                schema_fingerprint TEXT NOT NULL DEFAULT '',
                owner_id TEXT,
                last_heartbeat INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS dag_nodes (
                dag_id TEXT NOT NULL,
                ord INTEGER NOT NULL,
                stage TEXT NOT NULL,
                status TEXT NOT NULL,
                progress_current INTEGER NOT NULL DEFAULT 0,
                progress_total INTEGER NOT NULL DEFAULT 0,
                progress_message TEXT NOT NULL DEFAULT '',
                retry_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (dag_id, ord)
            );

            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                datasource_id TEXT NOT NULL,
                state TEXT NOT NULL,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entity_states (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                status TEXT NOT NULL,
                gathered TEXT NOT NULL DEFAULT '{}',
                updated_at INTEGER NOT NULL,
                UNIQUE (workflow_id, scope)
            );

            CREATE TABLE IF NOT EXISTS workflow_tasks (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                ord INTEGER NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS answer_diffs (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                summary TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS knowledge_facts (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                category TEXT NOT NULL,
                fact TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS candidates (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                datasource_id TEXT NOT NULL,
                source_schema TEXT NOT NULL,
                source_table TEXT NOT NULL,
                source_column TEXT NOT NULL,
                target_schema TEXT NOT NULL,
                target_table TEXT NOT NULL,
                target_column TEXT NOT NULL,
                detection_method TEXT NOT NULL,
                confidence REAL NOT NULL,
                value_match_rate REAL,
                name_similarity REAL,
                cardinality TEXT NOT NULL,
                join_match_rate REAL,
                orphan_rate REAL,
                target_coverage REAL,
                matched_rows INTEGER,
                orphan_rows INTEGER,
                status TEXT NOT NULL,
                is_required INTEGER NOT NULL DEFAULT 0,
                user_decision TEXT,
                rejection_reason TEXT,
                updated_at INTEGER NOT NULL,
                UNIQUE (datasource_id, source_schema, source_table, source_column,
                        target_schema, target_table, target_column)
            );

            CREATE TABLE IF NOT EXISTS saved_relationships (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                datasource_id TEXT NOT NULL,
                source_schema TEXT NOT NULL,
                source_table TEXT NOT NULL,
                source_column TEXT NOT NULL,
                target_schema TEXT NOT NULL,
                target_table TEXT NOT NULL,
                target_column TEXT NOT NULL,
                cardinality TEXT NOT NULL,
                detection_method TEXT NOT NULL,
                confidence REAL NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (datasource_id, source_schema, source_table, source_column,
                        target_schema, target_table, target_column)
            );

            CREATE TABLE IF NOT EXISTS column_metadata (
                project_id TEXT NOT NULL,
                schema TEXT NOT NULL,
                table_name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                doc TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (project_id, schema, table_name, column_name)
            );

            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                confidence REAL NOT NULL DEFAULT 0,
                is_stale INTEGER NOT NULL DEFAULT 0,
                deleted_at INTEGER,
                delete_reason TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (project_id, name)
            );

            CREATE TABLE IF NOT EXISTS entity_occurrences (
                id TEXT PRIMARY KEY,
                entity_id TEXT NOT NULL,
                schema TEXT NOT NULL,
                table_name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0,
                role TEXT,
                UNIQUE (entity_id, schema, table_name, column_name)
            );

            CREATE TABLE IF NOT EXISTS glossary_terms (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                term TEXT NOT NULL,
                definition TEXT NOT NULL DEFAULT '',
                synonyms TEXT NOT NULL DEFAULT '[]',
                source_entity_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (project_id, term)
            );
            ",
        )?;

        // Check version
        let stored_version: Option<i32> = self
            .conn()
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == STORE_VERSION => {}
            Some(_) => {
                self.clear_all()?;
                self.set_version()?;
            }
            None => {
                self.set_version()?;
            }
        }

        Ok(())
    }

    fn set_version(&self) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
            params![STORE_VERSION.to_string()],
        )?;
        Ok(())
    }

    /// Record the table list observed for a datasource.
    ///
    /// Written at orchestration start; status readers use it for island
    /// counts after ephemeral workflow state is gone.
    pub fn put_datasource_tables(
        &self,
        datasource_id: &str,
        tables: &[String],
    ) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
            params![
                format!("tables:{}", datasource_id),
                serde_json::to_string(tables)?
            ],
        )?;
        Ok(())
    }

    /// The last observed table list for a datasource.
    pub fn get_datasource_tables(&self, datasource_id: &str) -> StoreResult<Vec<String>> {
        let value: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM meta WHERE key = ?",
                params![format!("tables:{}", datasource_id)],
                |row| row.get(0),
            )
            .optional()?;
        match value {
            Some(s) => Ok(serde_json::from_str(&s)?),
            None => Ok(Vec::new()),
        }
    }

    /// Drop all rows from every table (but keep metadata).
    pub fn clear_all(&self) -> StoreResult<()> {
        self.conn().execute_batch(
            "
            DELETE FROM dags;
            DELETE FROM dag_nodes;
            DELETE FROM workflows;
            DELETE FROM entity_states;
            DELETE FROM workflow_tasks;
            DELETE FROM answer_diffs;
            DELETE FROM knowledge_facts;
            DELETE FROM candidates;
            DELETE FROM saved_relationships;
            DELETE FROM column_metadata;
            DELETE FROM entities;
            DELETE FROM entity_occurrences;
            DELETE FROM glossary_terms;
            ",
        )?;
        Ok(())
    }
}
