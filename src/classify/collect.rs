//! Phase 1: deterministic data collection.
//!
//! Profiles the column, matches samples against the pattern library, runs
//! the strict boolean-set check and assigns the classification path. No
//! model calls happen here; the output is reproducible from the data alone.

use serde::{Deserialize, Serialize};

use super::patterns::{assign_path, detect_boolean_set, detect_patterns, PatternKind};
use super::ClassificationPath;
use crate::profile::{ColumnProfile, ColumnRef, ProfilerProvider, ProfilerResult};

/// Phase-1 output for one column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDataProfile {
    pub column: ColumnRef,
    /// Database-specific declared type.
    pub data_type: String,
    /// Raw statistics from the profiler.
    pub profile: ColumnProfile,
    /// Patterns matched by the sample set.
    #[serde(skip)]
    pub detected_patterns: Vec<PatternKind>,
    /// Boolean pair (true, false) when the strict set check matched.
    pub boolean_pair: Option<(String, String)>,
    /// Deterministically assigned classification path.
    pub path: ClassificationPath,
}

impl ColumnDataProfile {
    /// Whether a pattern was detected.
    pub fn has_pattern(&self, pattern: PatternKind) -> bool {
        self.detected_patterns.contains(&pattern)
    }

    /// Short human-readable facts for model prompts.
    pub fn summary(&self) -> String {
        format!(
            "{} ({}): {} rows, {} null, {} distinct, path={}",
            self.column,
            self.data_type,
            self.profile.row_count,
            self.profile.null_count,
            self.profile.distinct_count,
            self.path
        )
    }
}

/// Collect the data profile for one column.
pub async fn collect_profile(
    profiler: &dyn ProfilerProvider,
    column: &ColumnRef,
    data_type: &str,
) -> ProfilerResult<ColumnDataProfile> {
    let profile = profiler.profile_column(column).await?;

    let detected_patterns = detect_patterns(&profile.sample_values);
    let boolean_pair = detect_boolean_set(&profile.sample_values);
    let path = assign_path(
        data_type,
        &profile,
        &detected_patterns,
        boolean_pair.is_some(),
    );

    Ok(ColumnDataProfile {
        column: column.clone(),
        data_type: data_type.to_string(),
        profile,
        detected_patterns,
        boolean_pair,
        path,
    })
}
