//! Column feature classification pipeline.
//!
//! Turns raw column statistics into typed semantic features through six
//! ordered phases:
//!
//! 1. **Collect** - deterministic profiling and pattern detection
//! 2. **Classify** - model-assisted semantic interpretation
//! 3. **Enum analysis** - per-value lifecycle labeling
//! 4. **FK resolution** - identifier target resolution
//! 5. **Cross-column** - monetary/currency pairing
//! 6. **Store** - provenance-aware merge into persisted metadata
//!
//! Phase 1 always runs to completion before later phases report progress
//! totals, so item counts are exact.

mod collect;
mod cross;
mod enums;
mod fk;
mod patterns;
mod pipeline;
mod semantic;

pub use collect::{collect_profile, ColumnDataProfile};
pub use cross::pair_monetary_columns;
pub use enums::{analyze_enum, EnumAnalysis};
pub use fk::{resolve_fk_target, FkResolution};
pub use patterns::{assign_path, detect_boolean_set, detect_patterns, PatternKind};
pub use pipeline::{
    ClassificationPipeline, ClassifyConfig, ClassifyError, ClassifyResult, ItemFailure,
    PhaseProgress, PipelinePhase, PipelineReport,
};
pub use semantic::{classify_semantics, DeferredFlags, SemanticClassification};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::profile::ColumnRef;

/// Classification thresholds.
pub mod thresholds {
    /// Enum-path detection.
    pub mod enums {
        /// Maximum distinct values for a text column to take the enum path.
        pub const MAX_TEXT_DISTINCT: i64 = 20;
        /// Maximum distinct values for a numeric column to take the enum path.
        pub const MAX_NUMERIC_DISTINCT: i64 = 10;
        /// Minimum rows before cardinality is meaningful.
        pub const MIN_ROWS: i64 = 20;
    }

    /// Completion-rate heuristics for lifecycle labeling.
    pub mod completion {
        /// Completion rate at or above which a value is terminal.
        pub const TERMINAL_MIN_RATE: f64 = 0.95;
        /// Completion rate at or below which a value is pre-terminal.
        pub const OPEN_MAX_RATE: f64 = 0.05;
    }

    /// Pattern detection.
    pub mod patterns {
        /// Fraction of samples that must match for a pattern to count.
        pub const MIN_MATCH_FRACTION: f64 = 0.95;
    }
}

/// The mutually exclusive semantic category assigned to a column before
/// detailed feature extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPath {
    Timestamp,
    Boolean,
    Enum,
    Uuid,
    ExternalId,
    Numeric,
    Text,
    Json,
    #[default]
    Unknown,
}

impl ClassificationPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Boolean => "boolean",
            Self::Enum => "enum",
            Self::Uuid => "uuid",
            Self::ExternalId => "external_id",
            Self::Numeric => "numeric",
            Self::Text => "text",
            Self::Json => "json",
            Self::Unknown => "unknown",
        }
    }

    /// Paths that identify rows in some table (FK resolution applies).
    pub fn is_identifier(&self) -> bool {
        matches!(self, Self::Uuid | Self::ExternalId)
    }

    /// Paths that need model-assisted semantic interpretation.
    pub fn needs_semantics(&self) -> bool {
        !matches!(self, Self::Boolean | Self::Uuid)
    }
}

impl std::fmt::Display for ClassificationPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digit scale of a unix-epoch timestamp column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochScale {
    Seconds,
    Millis,
    Micros,
    Nanos,
}

/// Timestamp-path features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampFeature {
    /// Epoch scale when the column stores raw integers.
    pub epoch_scale: Option<EpochScale>,
    /// Inferred role from the column name (created/updated/completed/...).
    pub role: Option<String>,
}

/// Boolean-path features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanFeature {
    /// The value representing true, as stored.
    pub true_value: String,
    /// The value representing false, as stored.
    pub false_value: String,
}

/// Lifecycle category of one enum value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumValueCategory {
    Initial,
    InProgress,
    Terminal,
    TerminalSuccess,
    TerminalError,
}

/// One observed enum value with distribution and lifecycle label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValue {
    /// The stored value.
    pub value: String,
    /// Row count carrying this value.
    pub count: i64,
    /// Share of non-NULL rows, in percent.
    pub percentage: f64,
    /// Lifecycle label, when a completion timestamp allowed labeling.
    pub category: Option<EnumValueCategory>,
}

/// Enum-path features.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnumFeature {
    /// Observed values, most frequent first.
    pub values: Vec<EnumValue>,
    /// The completion timestamp column used for labeling, if any.
    pub completion_column: Option<String>,
}

impl EnumFeature {
    /// Look up a value's entry.
    pub fn value(&self, value: &str) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.value == value)
    }
}

/// Identifier-path features (uuid / external_id).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IdentifierFeature {
    /// Resolved target table, when FK resolution succeeded.
    pub target_table: Option<String>,
    /// Resolved target column.
    pub target_column: Option<String>,
    /// Resolution confidence in [0, 1].
    pub confidence: f64,
    /// External service prefix when the id format carries one (e.g. "cus").
    pub service_prefix: Option<String>,
}

/// Unit of a monetary amount column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoneyUnit {
    Cents,
    Dollars,
    BasisPoints,
}

/// Monetary-path features from cross-column analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonetaryFeature {
    /// Sibling ISO-4217 currency-code column, when present.
    pub currency_column: Option<String>,
    /// Detected amount unit.
    pub unit: MoneyUnit,
}

/// Path-specific features. Exactly one shape per classification path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnFeatures {
    Timestamp(TimestampFeature),
    Boolean(BooleanFeature),
    Enum(EnumFeature),
    Identifier(IdentifierFeature),
    Monetary(MonetaryFeature),
    /// Plain numeric/text/json/unknown columns carry no extra features.
    Plain,
}

/// Who last set a metadata field.
///
/// Precedence: manual > mcp > inference. Later inference runs must never
/// overwrite a manual- or mcp-sourced field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    Inference,
    Mcp,
    Manual,
}

impl MetadataSource {
    /// Precedence rank; higher wins.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Inference => 0,
            Self::Mcp => 1,
            Self::Manual => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inference => "inference",
            Self::Mcp => "mcp",
            Self::Manual => "manual",
        }
    }
}

/// Persisted classification result for a column, with field-level provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// The column this metadata describes.
    pub column: ColumnRef,
    /// Owning project.
    pub project_id: String,
    /// Classification path.
    pub path: ClassificationPath,
    /// Business purpose (e.g. "billing contact email").
    pub purpose: Option<String>,
    /// Semantic type (e.g. "email", "money_amount").
    pub semantic_type: Option<String>,
    /// Role within its table (e.g. "lifecycle_state").
    pub role: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Classification confidence in [0, 1].
    pub confidence: Option<f64>,
    /// Path-specific features.
    pub features: Option<ColumnFeatures>,
    /// Per-field last edit source. Fields never written have no entry.
    pub field_sources: BTreeMap<String, MetadataSource>,
    /// Last update (unix seconds).
    pub updated_at: i64,
}

/// A field-by-field metadata update from one source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMetadataUpdate {
    pub path: Option<ClassificationPath>,
    pub purpose: Option<String>,
    pub semantic_type: Option<String>,
    pub role: Option<String>,
    pub description: Option<String>,
    pub confidence: Option<f64>,
    pub features: Option<ColumnFeatures>,
}

impl ColumnMetadata {
    /// An empty record for a column.
    pub fn empty(project_id: impl Into<String>, column: ColumnRef) -> Self {
        Self {
            column,
            project_id: project_id.into(),
            path: ClassificationPath::Unknown,
            purpose: None,
            semantic_type: None,
            role: None,
            description: None,
            confidence: None,
            features: None,
            field_sources: BTreeMap::new(),
            updated_at: 0,
        }
    }

    /// Whether `source` may write `field` given its current provenance.
    ///
    /// A source may write a field it outranks or matches; it must never
    /// downgrade a field's source.
    pub fn can_write(&self, field: &str, source: MetadataSource) -> bool {
        match self.field_sources.get(field) {
            Some(current) => source.rank() >= current.rank(),
            None => true,
        }
    }

    /// Merge an update field-by-field, honoring provenance precedence.
    ///
    /// Returns the names of the fields actually written.
    pub fn merge(&mut self, update: ColumnMetadataUpdate, source: MetadataSource) -> Vec<String> {
        let mut written = Vec::new();

        macro_rules! merge_field {
            ($name:literal, $field:ident) => {
                if let Some(value) = update.$field {
                    if self.can_write($name, source) {
                        self.$field = Some(value);
                        self.field_sources.insert($name.to_string(), source);
                        written.push($name.to_string());
                    }
                }
            };
        }

        if let Some(path) = update.path {
            if self.can_write("path", source) {
                self.path = path;
                self.field_sources.insert("path".to_string(), source);
                written.push("path".to_string());
            }
        }
        merge_field!("purpose", purpose);
        merge_field!("semantic_type", semantic_type);
        merge_field!("role", role);
        merge_field!("description", description);
        merge_field!("confidence", confidence);
        merge_field!("features", features);

        written
    }
}
