//! Phase 2: model-assisted semantic classification.
//!
//! Asks the model collaborator for purpose, semantic type, role, description
//! and confidence, plus deferred-work flags for later phases. Model output
//! goes through flexible coercion; a response that cannot be coerced is a
//! recoverable per-column failure, never a node failure.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::collect::ColumnDataProfile;
use crate::llm::{coerce, ClassifyRequest, ModelClient, ModelError, ModelResult, ModelUsage};

/// Deferred-work flags set during classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredFlags {
    /// Phase 3 should analyze the value distribution.
    pub needs_enum_analysis: bool,
    /// Phase 4 should resolve a likely FK target.
    pub needs_fk_resolution: bool,
    /// Phase 5 should look for sibling columns (currency, units).
    pub needs_cross_column_check: bool,
    /// A human should clarify this column's meaning.
    pub needs_clarification: bool,
}

/// Model-provided semantic interpretation of a column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticClassification {
    /// Business purpose (e.g. "billing contact email").
    pub purpose: Option<String>,
    /// Semantic type (e.g. "email", "money_amount").
    pub semantic_type: Option<String>,
    /// Role within its table (e.g. "lifecycle_state").
    pub role: Option<String>,
    pub description: Option<String>,
    /// Model confidence, clamped to [0, 1].
    pub confidence: f64,
    pub flags: DeferredFlags,
    /// Token/duration metrics from the call.
    pub usage: ModelUsage,
}

/// JSON Schema for the classification response.
fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "purpose": {"type": "string"},
            "semantic_type": {"type": "string"},
            "role": {"type": "string"},
            "description": {"type": "string"},
            "confidence": {"type": "number", "minimum": 0, "maximum": 1},
            "needs_enum_analysis": {"type": "boolean"},
            "needs_fk_resolution": {"type": "boolean"},
            "needs_cross_column_check": {"type": "boolean"},
            "needs_clarification": {"type": "boolean"}
        },
        "required": ["purpose", "confidence"]
    })
}

fn build_prompt(data: &ColumnDataProfile) -> String {
    let samples = data
        .profile
        .sample_values
        .iter()
        .take(15)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Classify the business meaning of a database column.\n\
         Column: {}\n\
         Declared type: {}\n\
         Rows: {}, nulls: {}, distinct: {}\n\
         Assigned path: {}\n\
         Sample values: [{}]\n\
         Respond with purpose, semantic_type, role, description, confidence, \
         and the flags needs_enum_analysis, needs_fk_resolution, \
         needs_cross_column_check, needs_clarification.",
        data.column,
        data.data_type,
        data.profile.row_count,
        data.profile.null_count,
        data.profile.distinct_count,
        data.path,
        samples
    )
}

/// Run phase-2 classification for one column.
pub async fn classify_semantics(
    model: &dyn ModelClient,
    data: &ColumnDataProfile,
) -> ModelResult<SemanticClassification> {
    let request = ClassifyRequest::new("classify_column", build_prompt(data), response_schema());
    let response = model.classify(request).await?;

    // Tolerate a bare-scalar response where an object was expected.
    let value = coerce::object_or_wrap(&response.value, "purpose").ok_or_else(|| {
        ModelError::ShapeMismatch(format!(
            "classification for {} was neither object nor scalar",
            data.column
        ))
    })?;

    Ok(SemanticClassification {
        purpose: coerce::string_field(&value, "purpose"),
        semantic_type: coerce::string_field(&value, "semantic_type"),
        role: coerce::string_field(&value, "role"),
        description: coerce::string_field(&value, "description"),
        confidence: coerce::confidence_field(&value, "confidence", 0.5),
        flags: DeferredFlags {
            needs_enum_analysis: coerce::bool_field(&value, "needs_enum_analysis")
                .unwrap_or(false),
            needs_fk_resolution: coerce::bool_field(&value, "needs_fk_resolution")
                .unwrap_or(false),
            needs_cross_column_check: coerce::bool_field(&value, "needs_cross_column_check")
                .unwrap_or(false),
            needs_clarification: coerce::bool_field(&value, "needs_clarification")
                .unwrap_or(false),
        },
        usage: response.usage,
    })
}
