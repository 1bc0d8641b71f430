//! Phase 3: enum value analysis.
//!
//! Computes per-value counts and percentages, and labels lifecycle
//! categories when a completion timestamp column exists: a value whose rows
//! are (almost) always completed is terminal, a value whose rows are
//! (almost) never completed is initial or in-progress.

use super::thresholds::completion;
use super::{EnumFeature, EnumValue, EnumValueCategory};
use crate::profile::{ColumnRef, ProfilerProvider, ProfilerResult};

/// Result of analyzing one enum column.
#[derive(Debug, Clone)]
pub struct EnumAnalysis {
    pub feature: EnumFeature,
    /// Values that could not be labeled (no completion data).
    pub unlabeled: usize,
}

/// Name tokens that mark a terminal value as successful.
const SUCCESS_TOKENS: [&str; 6] = ["complete", "completed", "done", "success", "succeeded", "paid"];

/// Name tokens that mark a terminal value as an error outcome.
const ERROR_TOKENS: [&str; 6] = ["failed", "error", "cancelled", "canceled", "rejected", "expired"];

/// Analyze an enum/state column.
///
/// `completion_column` is a sibling timestamp populated when a row finished
/// its lifecycle; when absent, values get counts but no category labels.
pub async fn analyze_enum(
    profiler: &dyn ProfilerProvider,
    column: &ColumnRef,
    completion_column: Option<&str>,
    histogram_limit: usize,
) -> ProfilerResult<EnumAnalysis> {
    let histogram = profiler.value_histogram(column, histogram_limit).await?;
    let total: i64 = histogram.iter().map(|v| v.count).sum();

    let mut values: Vec<EnumValue> = histogram
        .into_iter()
        .map(|v| EnumValue {
            percentage: if total == 0 {
                0.0
            } else {
                v.count as f64 / total as f64 * 100.0
            },
            value: v.value,
            count: v.count,
            category: None,
        })
        .collect();

    let mut unlabeled = values.len();

    if let Some(completion) = completion_column {
        let rates = profiler.completion_rates(column, completion).await?;
        let most_common = values.first().map(|v| v.value.clone());

        for value in &mut values {
            let Some(rate) = rates.iter().find(|r| r.value == value.value) else {
                continue;
            };
            value.category = Some(categorize(
                &value.value,
                rate.rate(),
                most_common.as_deref() == Some(value.value.as_str()),
            ));
            unlabeled -= 1;
        }
    }

    Ok(EnumAnalysis {
        feature: EnumFeature {
            values,
            completion_column: completion_column.map(String::from),
        },
        unlabeled,
    })
}

/// Label one value from its completion rate and name.
fn categorize(value: &str, completion_rate: f64, is_most_common: bool) -> EnumValueCategory {
    if completion_rate >= completion::TERMINAL_MIN_RATE {
        let lower = value.to_lowercase();
        if SUCCESS_TOKENS.iter().any(|t| lower.contains(t)) {
            return EnumValueCategory::TerminalSuccess;
        }
        if ERROR_TOKENS.iter().any(|t| lower.contains(t)) {
            return EnumValueCategory::TerminalError;
        }
        return EnumValueCategory::Terminal;
    }

    if completion_rate <= completion::OPEN_MAX_RATE {
        // The dominant never-completed value is where rows start
        if is_most_common {
            return EnumValueCategory::Initial;
        }
        return EnumValueCategory::InProgress;
    }

    EnumValueCategory::InProgress
}
