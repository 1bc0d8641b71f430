//! Column metadata persistence with provenance-aware merge.
//!
//! Rows are stored as JSON documents; the merge itself is field-level and
//! happens in [`crate::classify::ColumnMetadata::merge`], so a read-merge-
//! write here never downgrades a field's source.

use rusqlite::{params, OptionalExtension};

use super::{now, OntologyStore, StoreResult};
use crate::classify::{ColumnMetadata, ColumnMetadataUpdate, MetadataSource};
use crate::profile::ColumnRef;

impl OntologyStore {
    /// Load the metadata row for a column, if present.
    pub fn get_column_metadata(
        &self,
        project_id: &str,
        column: &ColumnRef,
    ) -> StoreResult<Option<ColumnMetadata>> {
        let doc: Option<String> = self
            .conn()
            .query_row(
                "SELECT doc FROM column_metadata
                 WHERE project_id = ? AND schema = ? AND table_name = ? AND column_name = ?",
                params![project_id, column.schema, column.table, column.column],
                |row| row.get(0),
            )
            .optional()?;

        match doc {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    /// Write a metadata row verbatim.
    pub fn put_column_metadata(&self, metadata: &ColumnMetadata) -> StoreResult<()> {
        let doc = serde_json::to_string(metadata)?;
        self.conn().execute(
            "INSERT INTO column_metadata (project_id, schema, table_name, column_name, doc, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (project_id, schema, table_name, column_name)
             DO UPDATE SET doc = excluded.doc, updated_at = excluded.updated_at",
            params![
                metadata.project_id,
                metadata.column.schema,
                metadata.column.table,
                metadata.column.column,
                doc,
                now()
            ],
        )?;
        Ok(())
    }

    /// Merge an update into a column's metadata, honoring provenance
    /// precedence, and persist the result.
    ///
    /// Returns the merged row and the fields actually written.
    pub fn merge_column_metadata(
        &self,
        project_id: &str,
        column: &ColumnRef,
        update: ColumnMetadataUpdate,
        source: MetadataSource,
    ) -> StoreResult<(ColumnMetadata, Vec<String>)> {
        let mut metadata = self
            .get_column_metadata(project_id, column)?
            .unwrap_or_else(|| ColumnMetadata::empty(project_id, column.clone()));

        let written = metadata.merge(update, source);
        metadata.updated_at = now();
        self.put_column_metadata(&metadata)?;
        Ok((metadata, written))
    }

    /// All metadata rows for a table.
    pub fn list_column_metadata(
        &self,
        project_id: &str,
        schema: &str,
        table: &str,
    ) -> StoreResult<Vec<ColumnMetadata>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT doc FROM column_metadata
             WHERE project_id = ? AND schema = ? AND table_name = ?
             ORDER BY column_name",
        )?;
        let docs = stmt
            .query_map(params![project_id, schema, table], |row| {
                let doc: String = row.get(0)?;
                Ok(doc)
            })?
            .collect::<Result<Vec<String>, _>>()?;

        docs.into_iter()
            .map(|s| serde_json::from_str(&s).map_err(Into::into))
            .collect()
    }
}
