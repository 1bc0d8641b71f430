//! Shared metadata and statistics types returned by the profiler.

use serde::{Deserialize, Serialize};

/// A schema-qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Qualified `schema.table` form.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A schema-qualified column reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Column name.
    pub column: String,
}

impl ColumnRef {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }

    /// The table this column belongs to.
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.schema.clone(), self.table.clone())
    }

    /// Qualified `schema.table.column` form.
    pub fn qualified(&self) -> String {
        format!("{}.{}.{}", self.schema, self.table, self.column)
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.schema, self.table, self.column)
    }
}

/// Metadata about a column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Ordinal position (1-based).
    pub position: i32,
    /// Data type (database-specific string).
    pub data_type: String,
    /// Whether the column is nullable.
    pub is_nullable: bool,
}

/// Primary key constraint metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryKeyInfo {
    /// Constraint name.
    pub name: String,
    /// Ordered key columns.
    pub columns: Vec<String>,
}

/// Declared foreign key constraint metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Constraint name.
    pub name: String,
    /// Referencing columns.
    pub columns: Vec<String>,
    /// Referenced schema.
    pub referenced_schema: String,
    /// Referenced table.
    pub referenced_table: String,
    /// Referenced columns (parallel to `columns`).
    pub referenced_columns: Vec<String>,
}

/// Complete metadata for a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnInfo>,
    /// Primary key, if declared.
    pub primary_key: Option<PrimaryKeyInfo>,
    /// Declared foreign keys.
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl TableMetadata {
    /// Reference to this table.
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.schema.clone(), self.name.clone())
    }

    /// Check whether `column` is the sole primary key column.
    pub fn is_single_pk(&self, column: &str) -> bool {
        self.primary_key
            .as_ref()
            .map(|pk| pk.columns.len() == 1 && pk.columns[0] == column)
            .unwrap_or(false)
    }

    /// Check whether `column` participates in the primary key.
    pub fn is_pk_member(&self, column: &str) -> bool {
        self.primary_key
            .as_ref()
            .map(|pk| pk.columns.iter().any(|c| c == column))
            .unwrap_or(false)
    }
}

/// Statistics gathered for a single column.
///
/// Matches the read-only profiling contract: counts, bounds and up to
/// [`super::MAX_SAMPLE_VALUES`] distinct samples rendered as strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnProfile {
    /// Total row count of the owning table.
    pub row_count: i64,
    /// Number of NULL values.
    pub null_count: i64,
    /// Number of distinct non-NULL values.
    pub distinct_count: i64,
    /// Minimum value, rendered as a string.
    pub min_value: Option<String>,
    /// Maximum value, rendered as a string.
    pub max_value: Option<String>,
    /// Average for numeric columns.
    pub avg_numeric: Option<f64>,
    /// Minimum string length for text columns.
    pub min_length: Option<i64>,
    /// Maximum string length for text columns.
    pub max_length: Option<i64>,
    /// Up to 50 distinct sample values.
    pub sample_values: Vec<String>,
}

impl ColumnProfile {
    /// Fraction of rows that are NULL.
    pub fn null_rate(&self) -> f64 {
        if self.row_count == 0 {
            0.0
        } else {
            self.null_count as f64 / self.row_count as f64
        }
    }

    /// Fraction of non-NULL rows that are distinct.
    pub fn distinct_ratio(&self) -> f64 {
        let non_null = self.row_count - self.null_count;
        if non_null <= 0 {
            0.0
        } else {
            self.distinct_count as f64 / non_null as f64
        }
    }

    /// Whether the column looks unique (every non-NULL value distinct).
    pub fn is_unique(&self) -> bool {
        let non_null = self.row_count - self.null_count;
        non_null > 0 && self.distinct_count == non_null
    }
}

/// Sample-based value overlap between two columns.
///
/// Cheap estimation used to shortlist candidate pairs before paying for an
/// exact join. `overlap_rate` is the fraction of sampled source values found
/// in the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueOverlap {
    /// Number of source values sampled.
    pub sample_size: i64,
    /// How many of the sampled values exist in the target column.
    pub overlap_count: i64,
    /// `overlap_count / sample_size`, 0.0 when nothing was sampled.
    pub overlap_rate: f64,
}

/// Exact join validation statistics between a source and target column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinStats {
    /// Non-NULL source rows considered.
    pub source_rows: i64,
    /// Source rows with at least one matching target value.
    pub matched_rows: i64,
    /// Source rows with no matching target value.
    pub orphan_rows: i64,
    /// Distinct source values.
    pub source_distinct: i64,
    /// Non-NULL target rows.
    pub target_rows: i64,
    /// Distinct target values.
    pub target_distinct: i64,
    /// Distinct target values referenced by at least one source row.
    pub target_matched_distinct: i64,
}

impl JoinStats {
    /// Fraction of source rows that matched.
    pub fn match_rate(&self) -> f64 {
        if self.source_rows == 0 {
            0.0
        } else {
            self.matched_rows as f64 / self.source_rows as f64
        }
    }

    /// Fraction of source rows with no target match.
    pub fn orphan_rate(&self) -> f64 {
        if self.source_rows == 0 {
            0.0
        } else {
            self.orphan_rows as f64 / self.source_rows as f64
        }
    }

    /// Fraction of distinct target values referenced by the source.
    pub fn target_coverage(&self) -> f64 {
        if self.target_distinct == 0 {
            0.0
        } else {
            self.target_matched_distinct as f64 / self.target_distinct as f64
        }
    }

    /// Distinct-value ratio on the source side.
    pub fn source_distinct_ratio(&self) -> f64 {
        if self.source_rows == 0 {
            0.0
        } else {
            self.source_distinct as f64 / self.source_rows as f64
        }
    }

    /// Distinct-value ratio on the target side.
    pub fn target_distinct_ratio(&self) -> f64 {
        if self.target_rows == 0 {
            0.0
        } else {
            self.target_distinct as f64 / self.target_rows as f64
        }
    }
}

/// One value of a histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueCount {
    /// The value, rendered as a string.
    pub value: String,
    /// Number of rows carrying it.
    pub count: i64,
}

/// Per-value completion statistics.
///
/// For a status-like column paired with a completion timestamp,
/// `completed_count` is the number of rows carrying `value` whose
/// completion timestamp is non-NULL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRate {
    /// The status value.
    pub value: String,
    /// Rows carrying this value.
    pub count: i64,
    /// Rows carrying this value with a non-NULL completion timestamp.
    pub completed_count: i64,
}

impl CompletionRate {
    /// `completed_count / count`, 0.0 for empty groups.
    pub fn rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.completed_count as f64 / self.count as f64
        }
    }
}
