//! The relationship discovery engine.
//!
//! Generates candidates from declared foreign keys, naming heuristics and
//! value overlap; validates them with joins; scores confidence; applies the
//! review policy; and reconciles with previous runs. Candidates carrying an
//! explicit user decision are never touched again.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::naming::name_similarity;
use super::overlap::{OverlapScout, PairCandidate};
use super::review::ReviewPolicy;
use super::validate::{validate_join, ValidatedMetrics};
use super::{
    thresholds, Cardinality, CandidateStatus, DetectionMethod, NameMatch, RelationshipCandidate,
};
use crate::profile::{ColumnRef, ProfilerError, ProfilerProvider, TableMetadata, ValueOverlap};
use crate::store::{OntologyStore, StoreError};

/// Errors that abort a discovery run.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("profiler error: {0}")]
    Profiler(#[from] ProfilerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Discovery tuning knobs.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Values sampled per source column during overlap estimation.
    pub sample_size: usize,
    /// Minimum estimated overlap to shortlist a pair.
    pub min_overlap: f64,
    /// Review thresholds.
    pub review: ReviewPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sample_size: thresholds::overlap::SAMPLE_SIZE,
            min_overlap: thresholds::overlap::MIN_ESTIMATE,
            review: ReviewPolicy::default(),
        }
    }
}

/// Summary of one discovery run.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub imported_fks: usize,
    pub pairs_considered: usize,
    pub shortlisted: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub needs_review: usize,
    /// Candidates skipped because a human already decided on them.
    pub locked_skipped: usize,
}

/// The relationship discovery engine.
pub struct DiscoveryEngine {
    profiler: Arc<dyn ProfilerProvider>,
    store: Arc<OntologyStore>,
    config: DiscoveryConfig,
}

impl DiscoveryEngine {
    pub fn new(
        profiler: Arc<dyn ProfilerProvider>,
        store: Arc<OntologyStore>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            profiler,
            store,
            config,
        }
    }

    /// Import declared foreign keys verbatim at confidence 1.0.
    ///
    /// Declared constraints are ground truth: accepted immediately, never
    /// subject to review. Only single-column FKs map onto candidates.
    pub async fn import_foreign_keys(
        &self,
        project_id: &str,
        datasource_id: &str,
        tables: &[TableMetadata],
    ) -> DiscoveryResult<usize> {
        let mut imported = 0;

        for table in tables {
            for fk in &table.foreign_keys {
                if fk.columns.len() != 1 || fk.referenced_columns.len() != 1 {
                    debug!(constraint = %fk.name, "skipping composite foreign key");
                    continue;
                }

                let source = ColumnRef::new(
                    table.schema.clone(),
                    table.name.clone(),
                    fk.columns[0].clone(),
                );
                let target = ColumnRef::new(
                    fk.referenced_schema.clone(),
                    fk.referenced_table.clone(),
                    fk.referenced_columns[0].clone(),
                );

                if self.is_locked(datasource_id, &source, &target)? {
                    continue;
                }

                self.store.upsert_candidate(&RelationshipCandidate {
                    id: Uuid::new_v4().to_string(),
                    project_id: project_id.to_string(),
                    datasource_id: datasource_id.to_string(),
                    source,
                    target,
                    detection_method: DetectionMethod::ForeignKey,
                    confidence: thresholds::confidence::FOREIGN_KEY,
                    value_match_rate: None,
                    name_similarity: None,
                    cardinality: Cardinality::ManyToOne,
                    join_match_rate: None,
                    orphan_rate: None,
                    target_coverage: None,
                    matched_rows: None,
                    orphan_rows: None,
                    status: CandidateStatus::Accepted,
                    is_required: false,
                    user_decision: None,
                    rejection_reason: None,
                    updated_at: 0,
                })?;
                imported += 1;
            }
        }

        info!(imported, "imported declared foreign keys");
        Ok(imported)
    }

    /// Discover relationships from value overlap and naming, validating
    /// every shortlisted pair with a join.
    pub async fn discover(
        &self,
        project_id: &str,
        datasource_id: &str,
        tables: &[TableMetadata],
    ) -> DiscoveryResult<DiscoveryReport> {
        let mut report = DiscoveryReport::default();

        let scout = OverlapScout {
            sample_size: self.config.sample_size,
            min_estimate: self.config.min_overlap,
        };

        let pairs = scout.enumerate_pairs(tables);
        report.pairs_considered = pairs.len();

        let shortlisted = scout.shortlist(self.profiler.as_ref(), pairs).await?;
        report.shortlisted = shortlisted.len();

        let existing = existing_pairs(tables);

        for (pair, overlap) in shortlisted {
            if self.is_locked(datasource_id, &pair.source, &pair.target)? {
                report.locked_skipped += 1;
                continue;
            }

            let already_exists = existing.contains(&pair_key(&pair.source, &pair.target));

            let join = match self.profiler.join_stats(&pair.source, &pair.target).await {
                Ok(join) => Some(join),
                Err(e) if e.is_permanent() => return Err(e.into()),
                Err(e) => {
                    debug!(source = %pair.source, target = %pair.target, error = %e,
                           "validation join failed");
                    None
                }
            };

            let candidate = self.build_candidate(
                project_id,
                datasource_id,
                &pair,
                &overlap,
                validate_join(
                    &pair.source_type,
                    &pair.target_type,
                    already_exists,
                    overlap.overlap_rate,
                    join,
                ),
            );

            match candidate.status {
                CandidateStatus::Accepted => report.accepted += 1,
                CandidateStatus::Rejected => report.rejected += 1,
                CandidateStatus::Pending => report.needs_review += 1,
            }
            self.store.upsert_candidate(&candidate)?;
        }

        info!(
            considered = report.pairs_considered,
            shortlisted = report.shortlisted,
            accepted = report.accepted,
            rejected = report.rejected,
            needs_review = report.needs_review,
            "discovery pass finished"
        );
        Ok(report)
    }

    /// Re-apply scoring context to undecided candidates.
    ///
    /// Pending candidates without a user decision get their naming
    /// similarity refreshed and the review policy re-applied; anything a
    /// human decided is exempt.
    pub fn rescore_pending(&self, datasource_id: &str) -> DiscoveryResult<usize> {
        let mut updated = 0;

        for mut candidate in self.store.list_candidates(datasource_id)? {
            if candidate.is_user_locked() || candidate.status != CandidateStatus::Pending {
                continue;
            }

            let similarity = name_similarity(
                &candidate.source.column,
                &candidate.target.table,
                &candidate.target.column,
            );
            candidate.name_similarity = Some(similarity);

            // Naming agreement on a value-validated candidate upgrades it
            if similarity >= 0.8 && candidate.detection_method == DetectionMethod::ValueMatch {
                candidate.detection_method = DetectionMethod::Hybrid;
                candidate.confidence = (candidate.confidence
                    + thresholds::adjustment::MINOR_BOOST)
                    .min(thresholds::confidence::INFERENCE_CAP);
            }

            let (status, is_required) = self.config.review.apply(candidate.confidence);
            candidate.status = status;
            candidate.is_required = is_required;

            self.store.upsert_candidate(&candidate)?;
            updated += 1;
        }

        Ok(updated)
    }

    /// Whether a pair already carries an explicit human decision.
    fn is_locked(
        &self,
        datasource_id: &str,
        source: &ColumnRef,
        target: &ColumnRef,
    ) -> Result<bool, StoreError> {
        Ok(self
            .store
            .find_candidate_by_pair(datasource_id, source, target)?
            .map(|c| c.is_user_locked())
            .unwrap_or(false))
    }

    /// Build the candidate row for a validated (or rejected) pair.
    fn build_candidate(
        &self,
        project_id: &str,
        datasource_id: &str,
        pair: &PairCandidate,
        overlap: &ValueOverlap,
        outcome: Result<ValidatedMetrics, super::RejectionReason>,
    ) -> RelationshipCandidate {
        let similarity = name_similarity(
            &pair.source.column,
            &pair.target.table,
            &pair.target.column,
        );

        let mut candidate = RelationshipCandidate {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            datasource_id: datasource_id.to_string(),
            source: pair.source.clone(),
            target: pair.target.clone(),
            detection_method: detection_method(pair.name_match.as_ref()),
            confidence: 0.0,
            value_match_rate: Some(overlap.overlap_rate),
            name_similarity: Some(similarity),
            cardinality: Cardinality::Unknown,
            join_match_rate: None,
            orphan_rate: None,
            target_coverage: None,
            matched_rows: None,
            orphan_rows: None,
            status: CandidateStatus::Pending,
            is_required: false,
            user_decision: None,
            rejection_reason: None,
            updated_at: 0,
        };

        match outcome {
            Ok(metrics) => {
                candidate.confidence = score(pair.name_match.as_ref(), similarity, &metrics);
                candidate.cardinality = metrics.cardinality;
                candidate.join_match_rate = Some(metrics.join_match_rate);
                candidate.orphan_rate = Some(metrics.orphan_rate);
                candidate.target_coverage = Some(metrics.target_coverage);
                candidate.matched_rows = Some(metrics.join.matched_rows);
                candidate.orphan_rows = Some(metrics.join.orphan_rows);

                let (status, is_required) = self.config.review.apply(candidate.confidence);
                candidate.status = status;
                candidate.is_required = is_required;
            }
            Err(reason) => {
                candidate.confidence = overlap.overlap_rate * self.config.review.auto_reject;
                candidate.status = CandidateStatus::Rejected;
                candidate.rejection_reason = Some(reason);
            }
        }

        candidate
    }
}

/// Detection method from the generation signals.
fn detection_method(name_match: Option<&NameMatch>) -> DetectionMethod {
    match name_match {
        Some(m) if m.rule == "pk_match" => DetectionMethod::PkMatch,
        // Naming plus value validation in agreement
        Some(_) => DetectionMethod::Hybrid,
        None => DetectionMethod::ValueMatch,
    }
}

/// Confidence score for a validated pair.
fn score(name_match: Option<&NameMatch>, similarity: f64, metrics: &ValidatedMetrics) -> f64 {
    let base = match name_match {
        Some(m) if m.rule == "pk_match" => {
            thresholds::confidence::PK_MATCH_BASE.max(m.base_confidence)
        }
        Some(m) => m.base_confidence,
        None => thresholds::confidence::VALUE_MATCH_BASE,
    };

    let mut score = base;

    if metrics.join_match_rate >= 0.99 {
        score += thresholds::adjustment::MAJOR_BOOST;
    } else if metrics.join_match_rate >= 0.95 {
        score += thresholds::adjustment::MEDIUM_BOOST;
    } else if metrics.join_match_rate >= 0.80 {
        score += thresholds::adjustment::MINOR_BOOST;
    }

    if similarity >= 0.8 {
        score += thresholds::adjustment::MEDIUM_BOOST;
    } else if similarity >= 0.5 {
        score += thresholds::adjustment::MINOR_BOOST;
    }

    if matches!(
        metrics.cardinality,
        Cardinality::ManyToOne | Cardinality::OneToOne
    ) {
        score += thresholds::adjustment::MINOR_BOOST;
    }

    score.min(thresholds::confidence::INFERENCE_CAP)
}

/// Pairs already covered by declared constraints.
fn existing_pairs(tables: &[TableMetadata]) -> HashSet<(String, String)> {
    tables
        .iter()
        .flat_map(|t| {
            t.foreign_keys.iter().filter_map(move |fk| {
                if fk.columns.len() != 1 {
                    return None;
                }
                Some(pair_key(
                    &ColumnRef::new(t.schema.clone(), t.name.clone(), fk.columns[0].clone()),
                    &ColumnRef::new(
                        fk.referenced_schema.clone(),
                        fk.referenced_table.clone(),
                        fk.referenced_columns[0].clone(),
                    ),
                ))
            })
        })
        .collect()
}

fn pair_key(source: &ColumnRef, target: &ColumnRef) -> (String, String) {
    (
        source.qualified().to_lowercase(),
        target.qualified().to_lowercase(),
    )
}
