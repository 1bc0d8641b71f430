//! The six-phase classification pipeline driver.
//!
//! Phase 1 enumerates and profiles every selected column up front, so later
//! phases report progress against exact totals. Collaborator calls run in
//! bounded batches; per-item failures are recorded and skipped, only
//! permanent collaborator errors abort the run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::collect::{collect_profile, ColumnDataProfile};
use super::cross::{looks_monetary, pair_monetary_columns};
use super::enums::analyze_enum;
use super::fk::resolve_fk_target;
use super::patterns::{is_temporal_type, PatternKind};
use super::semantic::{classify_semantics, SemanticClassification};
use super::{
    BooleanFeature, ClassificationPath, ColumnFeatures, ColumnMetadataUpdate, EpochScale,
    MetadataSource, TimestampFeature,
};
use crate::discovery::{NamingRules, RelationshipCandidate};
use crate::llm::{ModelClient, ModelError};
use crate::profile::{ColumnRef, ProfilerError, ProfilerProvider, TableMetadata};
use crate::store::{OntologyStore, StoreError};

/// Errors that abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("profiler error: {0}")]
    Profiler(#[from] ProfilerError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ClassifyResult<T> = Result<T, ClassifyError>;

/// The six pipeline phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Collect,
    Classify,
    EnumAnalysis,
    FkResolution,
    CrossColumn,
    Store,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collect => "collect",
            Self::Classify => "classify",
            Self::EnumAnalysis => "enum_analysis",
            Self::FkResolution => "fk_resolution",
            Self::CrossColumn => "cross_column",
            Self::Store => "store",
        }
    }
}

/// Progress callback payload; totals are exact once phase 1 finished.
#[derive(Debug, Clone)]
pub struct PhaseProgress {
    pub phase: PipelinePhase,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct ClassifyConfig {
    /// Concurrent collaborator calls per batch.
    pub batch_size: usize,
    /// Histogram size for enum analysis.
    pub histogram_limit: usize,
    /// Retries per item for transient collaborator errors.
    pub max_item_retries: u32,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            histogram_limit: 50,
            max_item_retries: 2,
        }
    }
}

/// One column's accumulated pipeline state.
struct ColumnWork {
    data: ColumnDataProfile,
    table: TableMetadata,
    semantics: Option<SemanticClassification>,
    features: Option<ColumnFeatures>,
}

/// A per-item failure recorded instead of failing the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFailure {
    pub column: ColumnRef,
    pub phase: String,
    pub error: String,
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineReport {
    pub columns_total: usize,
    pub columns_stored: usize,
    pub failures: Vec<ItemFailure>,
}

/// The column feature classification pipeline.
pub struct ClassificationPipeline {
    profiler: Arc<dyn ProfilerProvider>,
    model: Arc<dyn ModelClient>,
    store: Arc<OntologyStore>,
    config: ClassifyConfig,
}

impl ClassificationPipeline {
    pub fn new(
        profiler: Arc<dyn ProfilerProvider>,
        model: Arc<dyn ModelClient>,
        store: Arc<OntologyStore>,
        config: ClassifyConfig,
    ) -> Self {
        Self {
            profiler,
            model,
            store,
            config,
        }
    }

    /// Run all six phases over every column of `tables`.
    ///
    /// `candidates` are current discovery candidates, used as PK-match
    /// signals during FK resolution. `progress` is invoked with exact
    /// per-phase totals.
    pub async fn run(
        &self,
        project_id: &str,
        tables: &[TableMetadata],
        candidates: &[RelationshipCandidate],
        progress: &mut (dyn FnMut(PhaseProgress) + Send),
    ) -> ClassifyResult<PipelineReport> {
        let mut report = PipelineReport::default();

        // Phase 1 runs to completion before any later totals are reported.
        let mut work = self.phase_collect(tables, &mut report, progress).await?;
        report.columns_total = work.len() + report.failures.len();

        self.phase_classify(&mut work, &mut report, progress).await?;
        self.phase_enums(&mut work, &mut report, progress).await?;
        self.phase_fk(tables, candidates, &mut work, progress);
        self.phase_cross(&mut work, progress);
        self.phase_store(project_id, &work, &mut report, progress)?;

        Ok(report)
    }

    /// Phase 1: profile every column, in bounded batches.
    async fn phase_collect(
        &self,
        tables: &[TableMetadata],
        report: &mut PipelineReport,
        progress: &mut (dyn FnMut(PhaseProgress) + Send),
    ) -> ClassifyResult<Vec<ColumnWork>> {
        let items: Vec<(TableMetadata, ColumnRef, String)> = tables
            .iter()
            .flat_map(|t| {
                t.columns.iter().map(move |c| {
                    (
                        t.clone(),
                        ColumnRef::new(t.schema.clone(), t.name.clone(), c.name.clone()),
                        c.data_type.clone(),
                    )
                })
            })
            .collect();

        let total = items.len();
        let mut done = 0;
        let mut collected = Vec::with_capacity(total);

        for chunk in items.chunks(self.config.batch_size.max(1)) {
            let futures: Vec<_> = chunk
                .iter()
                .map(|(table, column, data_type)| {
                    let profiler = Arc::clone(&self.profiler);
                    let retries = self.config.max_item_retries;
                    async move {
                        let mut attempt = 0;
                        loop {
                            match collect_profile(profiler.as_ref(), column, data_type).await {
                                Ok(data) => break (table.clone(), column.clone(), Ok(data)),
                                Err(e) if e.is_retriable() && attempt < retries => attempt += 1,
                                Err(e) => break (table.clone(), column.clone(), Err(e)),
                            }
                        }
                    }
                })
                .collect();

            for (table, column, result) in futures::future::join_all(futures).await {
                done += 1;
                match result {
                    Ok(data) => collected.push(ColumnWork {
                        data,
                        table,
                        semantics: None,
                        features: None,
                    }),
                    Err(e) if e.is_permanent() => return Err(e.into()),
                    Err(e) => {
                        warn!(column = %column, error = %e, "column profiling failed");
                        report.failures.push(ItemFailure {
                            column,
                            phase: PipelinePhase::Collect.as_str().to_string(),
                            error: e.to_string(),
                        });
                    }
                }
                progress(PhaseProgress {
                    phase: PipelinePhase::Collect,
                    current: done,
                    total,
                    message: format!("profiled {}/{} columns", done, total),
                });
            }
        }

        Ok(collected)
    }

    /// Phase 2: model-assisted classification for paths that need semantics.
    async fn phase_classify(
        &self,
        work: &mut [ColumnWork],
        report: &mut PipelineReport,
        progress: &mut (dyn FnMut(PhaseProgress) + Send),
    ) -> ClassifyResult<()> {
        let eligible: Vec<usize> = work
            .iter()
            .enumerate()
            .filter(|(_, w)| w.data.path.needs_semantics())
            .map(|(i, _)| i)
            .collect();

        let total = eligible.len();
        let mut done = 0;

        for chunk in eligible.chunks(self.config.batch_size.max(1)) {
            let futures: Vec<_> = chunk
                .iter()
                .map(|&i| {
                    let model = Arc::clone(&self.model);
                    let data = work[i].data.clone();
                    let retries = self.config.max_item_retries;
                    async move {
                        let mut attempt = 0;
                        loop {
                            match classify_semantics(model.as_ref(), &data).await {
                                Ok(s) => break (i, Ok(s)),
                                Err(e) if e.is_retriable() && attempt < retries => attempt += 1,
                                Err(e) => break (i, Err(e)),
                            }
                        }
                    }
                })
                .collect();

            for (i, result) in futures::future::join_all(futures).await {
                done += 1;
                match result {
                    Ok(semantics) => work[i].semantics = Some(semantics),
                    Err(e) if e.is_permanent() => return Err(e.into()),
                    Err(e) => {
                        // Malformed output is a single-item failure
                        debug!(column = %work[i].data.column, error = %e,
                               "classification skipped");
                        report.failures.push(ItemFailure {
                            column: work[i].data.column.clone(),
                            phase: PipelinePhase::Classify.as_str().to_string(),
                            error: e.to_string(),
                        });
                    }
                }
                progress(PhaseProgress {
                    phase: PipelinePhase::Classify,
                    current: done,
                    total,
                    message: format!("classified {}/{} columns", done, total),
                });
            }
        }

        Ok(())
    }

    /// Phase 3: enum analysis for flagged enum/state columns.
    async fn phase_enums(
        &self,
        work: &mut [ColumnWork],
        report: &mut PipelineReport,
        progress: &mut (dyn FnMut(PhaseProgress) + Send),
    ) -> ClassifyResult<()> {
        let eligible: Vec<usize> = work
            .iter()
            .enumerate()
            .filter(|(_, w)| {
                w.data.path == ClassificationPath::Enum
                    || w.semantics
                        .as_ref()
                        .map(|s| s.flags.needs_enum_analysis)
                        .unwrap_or(false)
            })
            .map(|(i, _)| i)
            .collect();

        let total = eligible.len();
        for (done, i) in eligible.into_iter().enumerate() {
            let completion = completion_column(&work[i].table);
            match analyze_enum(
                self.profiler.as_ref(),
                &work[i].data.column,
                completion.as_deref(),
                self.config.histogram_limit,
            )
            .await
            {
                Ok(analysis) => {
                    work[i].features = Some(ColumnFeatures::Enum(analysis.feature));
                }
                Err(e) if e.is_permanent() => return Err(e.into()),
                Err(e) => report.failures.push(ItemFailure {
                    column: work[i].data.column.clone(),
                    phase: PipelinePhase::EnumAnalysis.as_str().to_string(),
                    error: e.to_string(),
                }),
            }
            progress(PhaseProgress {
                phase: PipelinePhase::EnumAnalysis,
                current: done + 1,
                total,
                message: format!("analyzed {}/{} enum columns", done + 1, total),
            });
        }

        Ok(())
    }

    /// Phase 4: FK resolution for identifier columns.
    fn phase_fk(
        &self,
        tables: &[TableMetadata],
        candidates: &[RelationshipCandidate],
        work: &mut [ColumnWork],
        progress: &mut (dyn FnMut(PhaseProgress) + Send),
    ) {
        let rules = NamingRules::new(tables.iter().map(|t| {
            (
                t.name.clone(),
                t.primary_key
                    .as_ref()
                    .map(|pk| pk.columns.clone())
                    .unwrap_or_default(),
            )
        }));

        let eligible: Vec<usize> = work
            .iter()
            .enumerate()
            .filter(|(_, w)| {
                w.data.path.is_identifier()
                    || w.semantics
                        .as_ref()
                        .map(|s| s.flags.needs_fk_resolution)
                        .unwrap_or(false)
            })
            .map(|(i, _)| i)
            .collect();

        let total = eligible.len();
        for (done, i) in eligible.into_iter().enumerate() {
            let prefix = service_prefix(&work[i].data);
            let resolution =
                resolve_fk_target(&work[i].data.column, &rules, candidates, prefix);
            work[i].features = Some(ColumnFeatures::Identifier(resolution.feature));
            progress(PhaseProgress {
                phase: PipelinePhase::FkResolution,
                current: done + 1,
                total,
                message: format!("resolved {}/{} identifier columns", done + 1, total),
            });
        }
    }

    /// Phase 5: monetary/currency pairing.
    fn phase_cross(
        &self,
        work: &mut [ColumnWork],
        progress: &mut (dyn FnMut(PhaseProgress) + Send),
    ) {
        let eligible: Vec<usize> = work
            .iter()
            .enumerate()
            .filter(|(_, w)| {
                w.data.path == ClassificationPath::Numeric
                    && (looks_monetary(&w.data.column.column)
                        || w.semantics
                            .as_ref()
                            .map(|s| s.flags.needs_cross_column_check)
                            .unwrap_or(false))
            })
            .map(|(i, _)| i)
            .collect();

        let total = eligible.len();
        for (done, i) in eligible.into_iter().enumerate() {
            let feature = pair_monetary_columns(
                &work[i].data.column.column,
                &work[i].data.data_type,
                &work[i].data.profile,
                &work[i].table.columns,
            );
            work[i].features = Some(ColumnFeatures::Monetary(feature));
            progress(PhaseProgress {
                phase: PipelinePhase::CrossColumn,
                current: done + 1,
                total,
                message: format!("paired {}/{} monetary columns", done + 1, total),
            });
        }
    }

    /// Phase 6: provenance-aware merge into persisted metadata.
    fn phase_store(
        &self,
        project_id: &str,
        work: &[ColumnWork],
        report: &mut PipelineReport,
        progress: &mut (dyn FnMut(PhaseProgress) + Send),
    ) -> ClassifyResult<()> {
        let total = work.len();
        for (done, w) in work.iter().enumerate() {
            let features = w.features.clone().or_else(|| default_features(&w.data));

            let update = ColumnMetadataUpdate {
                path: Some(w.data.path),
                purpose: w.semantics.as_ref().and_then(|s| s.purpose.clone()),
                semantic_type: w.semantics.as_ref().and_then(|s| s.semantic_type.clone()),
                role: w.semantics.as_ref().and_then(|s| s.role.clone()),
                description: w.semantics.as_ref().and_then(|s| s.description.clone()),
                confidence: w.semantics.as_ref().map(|s| s.confidence),
                features,
            };

            self.store.merge_column_metadata(
                project_id,
                &w.data.column,
                update,
                MetadataSource::Inference,
            )?;
            report.columns_stored += 1;

            progress(PhaseProgress {
                phase: PipelinePhase::Store,
                current: done + 1,
                total,
                message: format!("stored {}/{} columns", done + 1, total),
            });
        }
        Ok(())
    }
}

/// Features derivable from phase-1 data alone.
fn default_features(data: &ColumnDataProfile) -> Option<ColumnFeatures> {
    match data.path {
        ClassificationPath::Boolean => {
            let (true_value, false_value) = data.boolean_pair.clone()?;
            Some(ColumnFeatures::Boolean(BooleanFeature {
                true_value,
                false_value,
            }))
        }
        ClassificationPath::Timestamp => Some(ColumnFeatures::Timestamp(TimestampFeature {
            epoch_scale: epoch_scale(data),
            role: timestamp_role(&data.column.column),
        })),
        ClassificationPath::Uuid | ClassificationPath::ExternalId => {
            // Identifier columns that skipped FK resolution still carry shape
            Some(ColumnFeatures::Identifier(Default::default()))
        }
        _ => Some(ColumnFeatures::Plain),
    }
}

fn epoch_scale(data: &ColumnDataProfile) -> Option<EpochScale> {
    for (pattern, scale) in [
        (PatternKind::EpochSeconds, EpochScale::Seconds),
        (PatternKind::EpochMillis, EpochScale::Millis),
        (PatternKind::EpochMicros, EpochScale::Micros),
        (PatternKind::EpochNanos, EpochScale::Nanos),
    ] {
        if data.has_pattern(pattern) {
            return Some(scale);
        }
    }
    None
}

/// Service prefix of a prefixed external id (`cus_123` -> `cus`).
fn service_prefix(data: &ColumnDataProfile) -> Option<String> {
    if !data.has_pattern(PatternKind::PrefixedServiceId) {
        return None;
    }
    data.profile
        .sample_values
        .first()
        .and_then(|s| s.split('_').next())
        .map(String::from)
}

fn timestamp_role(column: &str) -> Option<String> {
    let lower = column.to_lowercase();
    for role in ["created", "updated", "completed", "deleted", "expired"] {
        if lower.contains(role) {
            return Some(role.to_string());
        }
    }
    None
}

/// Find a completion timestamp column in a table, if one exists.
fn completion_column(table: &TableMetadata) -> Option<String> {
    const NAMES: [&str; 5] = [
        "completed_at",
        "finished_at",
        "closed_at",
        "done_at",
        "resolved_at",
    ];
    table
        .columns
        .iter()
        .find(|c| {
            let lower = c.name.to_lowercase();
            NAMES.contains(&lower.as_str())
                || (lower.contains("complet") && is_temporal_type(&c.data_type.to_lowercase()))
        })
        .map(|c| c.name.clone())
}
