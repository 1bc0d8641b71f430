//! ProfilerProvider trait definition.
//!
//! The ProfilerProvider trait abstracts over SQL dialects. Implementations
//! translate each call into read-only statistics queries for their target
//! database; the extraction core only sees these typed results.

use async_trait::async_trait;

use super::error::ProfilerResult;
use super::types::*;
use crate::store::hash::fingerprint;

/// Trait for read-only datasource profiling.
///
/// All methods are suspension points: the orchestrator only awaits inside
/// these calls and persists state strictly after they return.
#[async_trait]
pub trait ProfilerProvider: Send + Sync {
    /// List all tables visible in the datasource.
    async fn list_tables(&self) -> ProfilerResult<Vec<TableRef>>;

    /// Get complete metadata for a table.
    async fn get_table(&self, schema: &str, table: &str) -> ProfilerResult<TableMetadata>;

    /// Profile a single column: counts, bounds and up to 50 samples.
    async fn profile_column(&self, column: &ColumnRef) -> ProfilerResult<ColumnProfile>;

    /// Estimate value overlap from `sample_size` sampled source values.
    async fn value_overlap(
        &self,
        source: &ColumnRef,
        target: &ColumnRef,
        sample_size: usize,
    ) -> ProfilerResult<ValueOverlap>;

    /// Validate a candidate relationship with an actual join.
    async fn join_stats(&self, source: &ColumnRef, target: &ColumnRef)
        -> ProfilerResult<JoinStats>;

    /// Per-value counts for a low-cardinality column, most frequent first.
    async fn value_histogram(
        &self,
        column: &ColumnRef,
        limit: usize,
    ) -> ProfilerResult<Vec<ValueCount>>;

    /// Per-value completion statistics against a completion timestamp column.
    async fn completion_rates(
        &self,
        column: &ColumnRef,
        completion_column: &str,
    ) -> ProfilerResult<Vec<CompletionRate>>;
}

/// Extension trait with derived convenience operations.
#[async_trait]
pub trait ProfilerProviderExt: ProfilerProvider {
    /// Fetch metadata for every table in the datasource.
    ///
    /// Tables are returned sorted by (schema, name) so downstream
    /// fingerprinting is stable.
    async fn get_all_tables(&self) -> ProfilerResult<Vec<TableMetadata>> {
        let refs = self.list_tables().await?;

        let futures: Vec<_> = refs
            .iter()
            .map(|t| self.get_table(&t.schema, &t.name))
            .collect();

        let results = futures::future::join_all(futures).await;

        let mut tables = results.into_iter().collect::<ProfilerResult<Vec<_>>>()?;
        tables.sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));
        Ok(tables)
    }

    /// Compute the schema fingerprint over table metadata.
    ///
    /// The fingerprint changes whenever a table, column, type or constraint
    /// changes; it is compared on DAG resume to decide whether completed
    /// nodes are still valid.
    fn schema_fingerprint(&self, tables: &[TableMetadata]) -> String {
        let shapes: Vec<_> = tables
            .iter()
            .map(|t| {
                (
                    &t.schema,
                    &t.name,
                    t.columns
                        .iter()
                        .map(|c| (&c.name, &c.data_type, c.is_nullable))
                        .collect::<Vec<_>>(),
                    t.primary_key.as_ref().map(|pk| &pk.columns),
                    t.foreign_keys
                        .iter()
                        .map(|fk| (&fk.columns, &fk.referenced_table, &fk.referenced_columns))
                        .collect::<Vec<_>>(),
                )
            })
            .collect();

        fingerprint(&shapes).unwrap_or_default()
    }
}

// Blanket implementation for all ProfilerProvider implementations
impl<T: ?Sized + ProfilerProvider> ProfilerProviderExt for T {}
