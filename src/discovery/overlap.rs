//! Sample-based value-overlap scouting.
//!
//! Cheap estimation pass that shortlists column pairs before the expensive
//! join validation: identifier-shaped columns without a declared FK are
//! paired with compatible-type key columns of other tables, and a sampled
//! overlap estimate filters out pairs with no plausible reference.

use std::collections::HashSet;

use crate::discovery::{thresholds, NameMatch, NamingRules};
use crate::profile::{
    ColumnInfo, ColumnRef, ProfilerProvider, ProfilerResult, TableMetadata, ValueOverlap,
};

/// Rough joinability families for type compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Numeric,
    Text,
    Uuid,
    Temporal,
    Other,
}

/// Classify a declared type into a joinability family.
pub fn type_family(data_type: &str) -> TypeFamily {
    let dt = data_type.to_lowercase();
    if dt.contains("uuid") {
        TypeFamily::Uuid
    } else if dt.contains("int")
        || dt.contains("numeric")
        || dt.contains("decimal")
        || dt.contains("float")
        || dt.contains("double")
        || dt.contains("real")
    {
        TypeFamily::Numeric
    } else if dt.contains("char") || dt.contains("text") || dt.contains("string") {
        TypeFamily::Text
    } else if dt.contains("date") || dt.contains("time") {
        TypeFamily::Temporal
    } else {
        TypeFamily::Other
    }
}

/// Whether a column is shaped like a row identifier worth scouting.
pub fn identifier_shaped(column: &ColumnInfo) -> bool {
    let name = column.name.to_lowercase();
    let suffixed = ["_id", "_key", "_code", "_fk", "_sk", "_bk"]
        .iter()
        .any(|s| name.ends_with(s));
    suffixed || type_family(&column.data_type) == TypeFamily::Uuid
}

/// A source/target pair proposed for validation.
#[derive(Debug, Clone)]
pub struct PairCandidate {
    pub source: ColumnRef,
    pub source_type: String,
    pub target: ColumnRef,
    pub target_type: String,
    /// Naming-rule match backing this pair, if any.
    pub name_match: Option<NameMatch>,
}

/// Enumerates pairs and estimates overlap on samples.
pub struct OverlapScout {
    pub sample_size: usize,
    pub min_estimate: f64,
}

impl Default for OverlapScout {
    fn default() -> Self {
        Self {
            sample_size: thresholds::overlap::SAMPLE_SIZE,
            min_estimate: thresholds::overlap::MIN_ESTIMATE,
        }
    }
}

impl OverlapScout {
    /// Enumerate candidate pairs across all tables.
    ///
    /// Sources: identifier-shaped columns that are not the table's own
    /// single primary key and carry no declared FK. Targets: primary-key
    /// columns of other tables with a compatible type family. A naming-rule
    /// match widens the target set beyond PKs for the matched table.
    pub fn enumerate_pairs(&self, tables: &[TableMetadata]) -> Vec<PairCandidate> {
        let declared_fk: HashSet<(String, String)> = tables
            .iter()
            .flat_map(|t| {
                t.foreign_keys
                    .iter()
                    .flat_map(move |fk| fk.columns.iter().map(move |c| (t.name.clone(), c.clone())))
            })
            .collect();

        let rules = NamingRules::new(tables.iter().map(|t| {
            (
                t.name.clone(),
                t.primary_key
                    .as_ref()
                    .map(|pk| pk.columns.clone())
                    .unwrap_or_default(),
            )
        }));

        let mut pairs = Vec::new();

        for table in tables {
            for column in &table.columns {
                if !identifier_shaped(column) {
                    continue;
                }
                if table.is_single_pk(&column.name) {
                    continue;
                }
                if declared_fk.contains(&(table.name.clone(), column.name.clone())) {
                    continue;
                }

                let source_family = type_family(&column.data_type);
                let name_match = rules.best_match(&column.name);

                for target_table in tables {
                    if target_table.name == table.name {
                        continue;
                    }
                    let Some(pk) = &target_table.primary_key else {
                        continue;
                    };
                    // Composite keys cannot be referenced by one column
                    if pk.columns.len() != 1 {
                        continue;
                    }
                    let Some(pk_column) = target_table
                        .columns
                        .iter()
                        .find(|c| c.name == pk.columns[0])
                    else {
                        continue;
                    };

                    if type_family(&pk_column.data_type) != source_family {
                        continue;
                    }

                    let named = name_match
                        .as_ref()
                        .filter(|m| m.target_table.eq_ignore_ascii_case(&target_table.name))
                        .cloned();

                    pairs.push(PairCandidate {
                        source: ColumnRef::new(
                            table.schema.clone(),
                            table.name.clone(),
                            column.name.clone(),
                        ),
                        source_type: column.data_type.clone(),
                        target: ColumnRef::new(
                            target_table.schema.clone(),
                            target_table.name.clone(),
                            pk_column.name.clone(),
                        ),
                        target_type: pk_column.data_type.clone(),
                        name_match: named,
                    });
                }
            }
        }

        pairs
    }

    /// Estimate overlap for each pair and keep those above the floor.
    ///
    /// Pairs whose estimation query fails are dropped silently here; the
    /// join validation pass is where failures become recorded rejections.
    pub async fn shortlist(
        &self,
        profiler: &dyn ProfilerProvider,
        pairs: Vec<PairCandidate>,
    ) -> ProfilerResult<Vec<(PairCandidate, ValueOverlap)>> {
        let mut shortlisted = Vec::new();

        for pair in pairs {
            match profiler
                .value_overlap(&pair.source, &pair.target, self.sample_size)
                .await
            {
                Ok(overlap) if overlap.overlap_rate >= self.min_estimate => {
                    shortlisted.push((pair, overlap));
                }
                Ok(_) => {}
                Err(e) if e.is_permanent() => return Err(e),
                Err(_) => {}
            }
        }

        Ok(shortlisted)
    }
}
