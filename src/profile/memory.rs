//! In-memory profiler backed by fixture data.
//!
//! Computes the same statistics a SQL adapter would, but over column vectors
//! held in memory. Used by tests and local experiments; also a reference for
//! what each profiling operation is expected to return.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::error::{ProfilerError, ProfilerResult};
use super::types::*;
use super::MAX_SAMPLE_VALUES;

/// Column-major fixture data for one table.
type TableData = HashMap<String, Vec<Option<String>>>;

/// A fixture-backed [`super::ProfilerProvider`].
#[derive(Default)]
pub struct InMemoryProfiler {
    tables: Vec<TableMetadata>,
    data: HashMap<String, TableData>,
    call_counts: Mutex<HashMap<&'static str, usize>>,
}

impl InMemoryProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table's metadata.
    pub fn add_table(&mut self, table: TableMetadata) {
        self.tables.push(table);
    }

    /// Set one column's values for a table (row order preserved).
    pub fn set_column(&mut self, table: &TableRef, column: &str, values: Vec<Option<String>>) {
        self.data
            .entry(table.qualified())
            .or_default()
            .insert(column.to_string(), values);
    }

    /// Convenience: set a column from non-NULL string values.
    pub fn set_column_values<S: Into<String>>(
        &mut self,
        table: &TableRef,
        column: &str,
        values: Vec<S>,
    ) {
        self.set_column(
            table,
            column,
            values.into_iter().map(|v| Some(v.into())).collect(),
        );
    }

    /// How many times `method` was invoked.
    pub fn call_count(&self, method: &str) -> usize {
        *self
            .call_counts
            .lock()
            .expect("call count lock poisoned")
            .get(method)
            .unwrap_or(&0)
    }

    fn record(&self, method: &'static str) {
        *self
            .call_counts
            .lock()
            .expect("call count lock poisoned")
            .entry(method)
            .or_insert(0) += 1;
    }

    fn column_values(&self, column: &ColumnRef) -> ProfilerResult<&Vec<Option<String>>> {
        self.data
            .get(&column.table_ref().qualified())
            .and_then(|t| t.get(&column.column))
            .ok_or_else(|| ProfilerError::UnknownObject(column.qualified()))
    }

    fn column_type(&self, column: &ColumnRef) -> Option<String> {
        self.tables
            .iter()
            .find(|t| t.schema == column.schema && t.name == column.table)
            .and_then(|t| t.columns.iter().find(|c| c.name == column.column))
            .map(|c| c.data_type.clone())
    }
}

#[async_trait]
impl super::ProfilerProvider for InMemoryProfiler {
    async fn list_tables(&self) -> ProfilerResult<Vec<TableRef>> {
        self.record("list_tables");
        Ok(self.tables.iter().map(|t| t.table_ref()).collect())
    }

    async fn get_table(&self, schema: &str, table: &str) -> ProfilerResult<TableMetadata> {
        self.record("get_table");
        self.tables
            .iter()
            .find(|t| t.schema == schema && t.name == table)
            .cloned()
            .ok_or_else(|| ProfilerError::UnknownObject(format!("{}.{}", schema, table)))
    }

    async fn profile_column(&self, column: &ColumnRef) -> ProfilerResult<ColumnProfile> {
        self.record("profile_column");
        let values = self.column_values(column)?;

        let row_count = values.len() as i64;
        let non_null: Vec<&String> = values.iter().flatten().collect();
        let null_count = row_count - non_null.len() as i64;

        let mut distinct: Vec<&String> = {
            let set: HashSet<&String> = non_null.iter().copied().collect();
            set.into_iter().collect()
        };
        distinct.sort();

        let numeric: Vec<f64> = non_null.iter().filter_map(|v| v.parse().ok()).collect();
        let is_numeric = !non_null.is_empty() && numeric.len() == non_null.len();

        let (avg_numeric, min_value, max_value) = if is_numeric {
            let avg = numeric.iter().sum::<f64>() / numeric.len() as f64;
            let min = numeric.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = numeric.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            (Some(avg), Some(min.to_string()), Some(max.to_string()))
        } else {
            (
                None,
                distinct.first().map(|s| (*s).clone()),
                distinct.last().map(|s| (*s).clone()),
            )
        };

        let (min_length, max_length) = if is_numeric || non_null.is_empty() {
            (None, None)
        } else {
            (
                non_null.iter().map(|v| v.len() as i64).min(),
                non_null.iter().map(|v| v.len() as i64).max(),
            )
        };

        Ok(ColumnProfile {
            row_count,
            null_count,
            distinct_count: distinct.len() as i64,
            min_value,
            max_value,
            avg_numeric,
            min_length,
            max_length,
            sample_values: distinct
                .into_iter()
                .take(MAX_SAMPLE_VALUES)
                .cloned()
                .collect(),
        })
    }

    async fn value_overlap(
        &self,
        source: &ColumnRef,
        target: &ColumnRef,
        sample_size: usize,
    ) -> ProfilerResult<ValueOverlap> {
        self.record("value_overlap");
        let source_values = self.column_values(source)?;
        let target_values = self.column_values(target)?;

        let target_set: HashSet<&String> = target_values.iter().flatten().collect();

        let sampled: Vec<&String> = {
            let set: HashSet<&String> = source_values.iter().flatten().collect();
            let mut v: Vec<&String> = set.into_iter().collect();
            v.sort();
            v.truncate(sample_size);
            v
        };

        let overlap_count = sampled.iter().filter(|v| target_set.contains(*v)).count() as i64;
        let sample_size = sampled.len() as i64;

        Ok(ValueOverlap {
            sample_size,
            overlap_count,
            overlap_rate: if sample_size == 0 {
                0.0
            } else {
                overlap_count as f64 / sample_size as f64
            },
        })
    }

    async fn join_stats(
        &self,
        source: &ColumnRef,
        target: &ColumnRef,
    ) -> ProfilerResult<JoinStats> {
        self.record("join_stats");

        // Simulate a type-mismatch join failure the way a SQL adapter would
        // surface it.
        if let (Some(st), Some(tt)) = (self.column_type(source), self.column_type(target)) {
            if numeric_type(&st) != numeric_type(&tt) {
                return Err(ProfilerError::QueryFailed(format!(
                    "cannot join {} ({}) to {} ({})",
                    source, st, target, tt
                )));
            }
        }

        let source_values = self.column_values(source)?;
        let target_values = self.column_values(target)?;

        let target_non_null: Vec<&String> = target_values.iter().flatten().collect();
        let target_set: HashSet<&String> = target_non_null.iter().copied().collect();
        let source_non_null: Vec<&String> = source_values.iter().flatten().collect();

        let matched_rows = source_non_null
            .iter()
            .filter(|v| target_set.contains(*v))
            .count() as i64;
        let source_rows = source_non_null.len() as i64;

        let source_distinct: HashSet<&String> = source_non_null.iter().copied().collect();
        let target_matched_distinct = target_set
            .iter()
            .filter(|v| source_distinct.contains(*v))
            .count() as i64;

        Ok(JoinStats {
            source_rows,
            matched_rows,
            orphan_rows: source_rows - matched_rows,
            source_distinct: source_distinct.len() as i64,
            target_rows: target_non_null.len() as i64,
            target_distinct: target_set.len() as i64,
            target_matched_distinct,
        })
    }

    async fn value_histogram(
        &self,
        column: &ColumnRef,
        limit: usize,
    ) -> ProfilerResult<Vec<ValueCount>> {
        self.record("value_histogram");
        let values = self.column_values(column)?;

        let mut counts: HashMap<&String, i64> = HashMap::new();
        for v in values.iter().flatten() {
            *counts.entry(v).or_insert(0) += 1;
        }

        let mut histogram: Vec<ValueCount> = counts
            .into_iter()
            .map(|(value, count)| ValueCount {
                value: value.clone(),
                count,
            })
            .collect();
        histogram.sort_by(|a, b| b.count.cmp(&a.count).then(a.value.cmp(&b.value)));
        histogram.truncate(limit);
        Ok(histogram)
    }

    async fn completion_rates(
        &self,
        column: &ColumnRef,
        completion_column: &str,
    ) -> ProfilerResult<Vec<CompletionRate>> {
        self.record("completion_rates");
        let values = self.column_values(column)?;
        let completion = self.column_values(&ColumnRef::new(
            column.schema.clone(),
            column.table.clone(),
            completion_column,
        ))?;

        if values.len() != completion.len() {
            return Err(ProfilerError::QueryFailed(format!(
                "row count mismatch between {} and {}",
                column.column, completion_column
            )));
        }

        let mut groups: HashMap<&String, (i64, i64)> = HashMap::new();
        for (value, done) in values.iter().zip(completion.iter()) {
            if let Some(v) = value {
                let entry = groups.entry(v).or_insert((0, 0));
                entry.0 += 1;
                if done.is_some() {
                    entry.1 += 1;
                }
            }
        }

        let mut rates: Vec<CompletionRate> = groups
            .into_iter()
            .map(|(value, (count, completed_count))| CompletionRate {
                value: value.clone(),
                count,
                completed_count,
            })
            .collect();
        rates.sort_by(|a, b| b.count.cmp(&a.count).then(a.value.cmp(&b.value)));
        Ok(rates)
    }
}

/// Rough type family check used to simulate join type mismatches.
fn numeric_type(data_type: &str) -> bool {
    let t = data_type.to_lowercase();
    t.contains("int")
        || t.contains("numeric")
        || t.contains("decimal")
        || t.contains("float")
        || t.contains("double")
        || t.contains("real")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfilerProvider;

    fn make_profiler() -> InMemoryProfiler {
        let mut profiler = InMemoryProfiler::new();
        profiler.add_table(TableMetadata {
            schema: "public".to_string(),
            name: "orders".to_string(),
            columns: vec![
                ColumnInfo {
                    name: "id".to_string(),
                    position: 1,
                    data_type: "integer".to_string(),
                    is_nullable: false,
                },
                ColumnInfo {
                    name: "customer_id".to_string(),
                    position: 2,
                    data_type: "integer".to_string(),
                    is_nullable: false,
                },
            ],
            primary_key: Some(PrimaryKeyInfo {
                name: "pk_orders".to_string(),
                columns: vec!["id".to_string()],
            }),
            foreign_keys: vec![],
        });

        let orders = TableRef::new("public", "orders");
        profiler.set_column_values(&orders, "id", vec!["1", "2", "3", "4"]);
        profiler.set_column_values(&orders, "customer_id", vec!["10", "10", "11", "12"]);
        profiler
    }

    #[tokio::test]
    async fn test_profile_column_counts() {
        let profiler = make_profiler();
        let col = ColumnRef::new("public", "orders", "customer_id");

        let profile = profiler.profile_column(&col).await.unwrap();
        assert_eq!(profile.row_count, 4);
        assert_eq!(profile.null_count, 0);
        assert_eq!(profile.distinct_count, 3);
        assert!(profile.avg_numeric.is_some());
    }

    #[tokio::test]
    async fn test_histogram_sorted_by_count() {
        let profiler = make_profiler();
        let col = ColumnRef::new("public", "orders", "customer_id");

        let histogram = profiler.value_histogram(&col, 10).await.unwrap();
        assert_eq!(histogram[0].value, "10");
        assert_eq!(histogram[0].count, 2);
    }

    #[tokio::test]
    async fn test_unknown_column_errors() {
        let profiler = make_profiler();
        let col = ColumnRef::new("public", "orders", "missing");

        let err = profiler.profile_column(&col).await.unwrap_err();
        assert!(matches!(err, ProfilerError::UnknownObject(_)));
    }

    #[tokio::test]
    async fn test_call_counts_recorded() {
        let profiler = make_profiler();
        let col = ColumnRef::new("public", "orders", "id");

        profiler.profile_column(&col).await.unwrap();
        profiler.profile_column(&col).await.unwrap();
        assert_eq!(profiler.call_count("profile_column"), 2);
        assert_eq!(profiler.call_count("join_stats"), 0);
    }
}
