//! Entity, occurrence and glossary persistence.
//!
//! Entities survive re-extraction: they are never cascade-deleted with a
//! workflow, only soft-deleted with a reason or marked stale.

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{now, OntologyStore, StoreError, StoreResult};
use crate::discovery::{EntityWithOccurrences, OntologyEntity, OntologyEntityOccurrence};
use crate::profile::ColumnRef;

/// A glossary term derived from the finalized ontology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub id: String,
    pub project_id: String,
    pub term: String,
    pub definition: String,
    pub synonyms: Vec<String>,
    pub source_entity_id: Option<String>,
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<OntologyEntity> {
    Ok(OntologyEntity {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        confidence: row.get(4)?,
        is_stale: row.get(5)?,
        deleted_at: row.get(6)?,
        delete_reason: row.get(7)?,
    })
}

const ENTITY_COLUMNS: &str =
    "id, project_id, name, description, confidence, is_stale, deleted_at, delete_reason";

impl OntologyStore {
    /// Upsert an entity by (project, name).
    pub fn upsert_entity(&self, entity: &OntologyEntity) -> StoreResult<()> {
        let ts = now();
        self.conn().execute(
            "INSERT INTO entities (id, project_id, name, description, confidence, is_stale,
                 deleted_at, delete_reason, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (project_id, name) DO UPDATE SET
                 description = excluded.description,
                 confidence = excluded.confidence,
                 is_stale = excluded.is_stale,
                 deleted_at = excluded.deleted_at,
                 delete_reason = excluded.delete_reason,
                 updated_at = excluded.updated_at",
            params![
                entity.id,
                entity.project_id,
                entity.name,
                entity.description,
                entity.confidence,
                entity.is_stale,
                entity.deleted_at,
                entity.delete_reason,
                ts,
                ts
            ],
        )?;
        Ok(())
    }

    /// Find a live entity by name.
    pub fn find_entity(&self, project_id: &str, name: &str) -> StoreResult<Option<OntologyEntity>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM entities
                     WHERE project_id = ? AND name = ? AND deleted_at IS NULL",
                    ENTITY_COLUMNS
                ),
                params![project_id, name],
                entity_from_row,
            )
            .optional()?)
    }

    pub fn get_entity(&self, id: &str) -> StoreResult<OntologyEntity> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM entities WHERE id = ?", ENTITY_COLUMNS),
                params![id],
                entity_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("entity {}", id)))
    }

    /// All live entities for a project.
    pub fn list_entities(&self, project_id: &str) -> StoreResult<Vec<OntologyEntity>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entities
             WHERE project_id = ? AND deleted_at IS NULL
             ORDER BY name",
            ENTITY_COLUMNS
        ))?;
        let entities = stmt
            .query_map(params![project_id], entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    /// Soft-delete an entity with a reason.
    pub fn soft_delete_entity(&self, id: &str, reason: &str) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE entities SET deleted_at = ?, delete_reason = ?, updated_at = ? WHERE id = ?",
            params![now(), reason, now(), id],
        )?;
        Ok(())
    }

    /// Mark every live entity of a project stale; re-extraction clears the
    /// flag on the ones it observes again.
    pub fn mark_entities_stale(&self, project_id: &str) -> StoreResult<usize> {
        Ok(self.conn().execute(
            "UPDATE entities SET is_stale = 1, updated_at = ?
             WHERE project_id = ? AND deleted_at IS NULL",
            params![now(), project_id],
        )?)
    }

    /// Upsert an occurrence by (entity, location).
    pub fn upsert_occurrence(&self, occurrence: &OntologyEntityOccurrence) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO entity_occurrences (id, entity_id, schema, table_name, column_name,
                 confidence, role)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (entity_id, schema, table_name, column_name) DO UPDATE SET
                 confidence = excluded.confidence,
                 role = COALESCE(excluded.role, entity_occurrences.role)",
            params![
                occurrence.id,
                occurrence.entity_id,
                occurrence.column.schema,
                occurrence.column.table,
                occurrence.column.column,
                occurrence.confidence,
                occurrence.role,
            ],
        )?;
        Ok(())
    }

    pub fn list_occurrences(&self, entity_id: &str) -> StoreResult<Vec<OntologyEntityOccurrence>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, entity_id, schema, table_name, column_name, confidence, role
             FROM entity_occurrences WHERE entity_id = ?
             ORDER BY schema, table_name, column_name",
        )?;
        let occurrences = stmt
            .query_map(params![entity_id], |row| {
                Ok(OntologyEntityOccurrence {
                    id: row.get(0)?,
                    entity_id: row.get(1)?,
                    column: ColumnRef {
                        schema: row.get(2)?,
                        table: row.get(3)?,
                        column: row.get(4)?,
                    },
                    confidence: row.get(5)?,
                    role: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(occurrences)
    }

    /// All live entities with their occurrences.
    pub fn entities_with_occurrences(
        &self,
        project_id: &str,
    ) -> StoreResult<Vec<EntityWithOccurrences>> {
        let entities = self.list_entities(project_id)?;
        entities
            .into_iter()
            .map(|entity| {
                let occurrences = self.list_occurrences(&entity.id)?;
                Ok(EntityWithOccurrences {
                    entity,
                    occurrences,
                })
            })
            .collect()
    }

    /// Total counts of live entities and their occurrences.
    pub fn entity_counts(&self, project_id: &str) -> StoreResult<(i64, i64)> {
        let conn = self.conn();
        let entities: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE project_id = ? AND deleted_at IS NULL",
            params![project_id],
            |row| row.get(0),
        )?;
        let occurrences: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entity_occurrences o
             JOIN entities e ON e.id = o.entity_id
             WHERE e.project_id = ? AND e.deleted_at IS NULL",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok((entities, occurrences))
    }

    /// Upsert a glossary term by (project, term).
    pub fn upsert_glossary_term(&self, term: &GlossaryTerm) -> StoreResult<()> {
        let ts = now();
        self.conn().execute(
            "INSERT INTO glossary_terms (id, project_id, term, definition, synonyms,
                 source_entity_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (project_id, term) DO UPDATE SET
                 definition = excluded.definition,
                 synonyms = excluded.synonyms,
                 source_entity_id = excluded.source_entity_id,
                 updated_at = excluded.updated_at",
            params![
                term.id,
                term.project_id,
                term.term,
                term.definition,
                serde_json::to_string(&term.synonyms)?,
                term.source_entity_id,
                ts,
                ts
            ],
        )?;
        Ok(())
    }

    pub fn list_glossary_terms(&self, project_id: &str) -> StoreResult<Vec<GlossaryTerm>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, term, definition, synonyms, source_entity_id
             FROM glossary_terms WHERE project_id = ? ORDER BY term",
        )?;
        let terms = stmt
            .query_map(params![project_id], |row| {
                let synonyms: String = row.get(4)?;
                Ok((
                    GlossaryTerm {
                        id: row.get(0)?,
                        project_id: row.get(1)?,
                        term: row.get(2)?,
                        definition: row.get(3)?,
                        synonyms: Vec::new(),
                        source_entity_id: row.get(5)?,
                    },
                    synonyms,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        terms
            .into_iter()
            .map(|(mut term, synonyms)| {
                term.synonyms = serde_json::from_str(&synonyms).unwrap_or_default();
                Ok(term)
            })
            .collect()
    }
}
