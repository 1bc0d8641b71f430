//! Join validation and the ordered rejection policy.
//!
//! Shortlisted pairs are checked with an actual join. The rejection policy
//! applies in fixed order, first applicable reason wins: type mismatch,
//! already exists, wrong direction, orphan integrity, coincidental overlap,
//! low match rate, join failed.
//!
//! Orphan rate and join match rate are row-based complements
//! (`matched_rows + orphan_rows == source_rows`); the low-match-rate gate
//! therefore applies to the sample-based estimate, which can sit well below
//! the exact join rate when the sampled values were unrepresentative.

use super::overlap::type_family;
use super::{thresholds, Cardinality, RejectionReason};
use crate::profile::JoinStats;

/// Metrics for a pair that survived validation.
#[derive(Debug, Clone)]
pub struct ValidatedMetrics {
    pub join: JoinStats,
    pub cardinality: Cardinality,
    pub join_match_rate: f64,
    pub orphan_rate: f64,
    pub target_coverage: f64,
}

/// Apply the rejection policy to one pair.
///
/// `already_exists` marks pairs that duplicate a declared FK or a saved
/// relationship. `value_match_rate` is the sample-based overlap estimate
/// from scouting. `join` is `None` when the validation join itself failed.
pub fn validate_join(
    source_type: &str,
    target_type: &str,
    already_exists: bool,
    value_match_rate: f64,
    join: Option<JoinStats>,
) -> Result<ValidatedMetrics, RejectionReason> {
    if type_family(source_type) != type_family(target_type) {
        return Err(RejectionReason::TypeMismatch);
    }
    if already_exists {
        return Err(RejectionReason::AlreadyExists);
    }

    let Some(join) = join else {
        return Err(RejectionReason::JoinFailed);
    };

    // A reversed FK: the referencing side cannot have more distinct values
    // than the referenced side.
    if join.source_distinct > join.target_distinct {
        return Err(RejectionReason::WrongDirection);
    }

    let orphan_rate = join.orphan_rate();
    if orphan_rate > thresholds::integrity::MAX_ORPHAN_RATE {
        return Err(RejectionReason::OrphanIntegrity);
    }

    let target_coverage = join.target_coverage();
    if target_coverage < thresholds::integrity::MIN_TARGET_COVERAGE {
        return Err(RejectionReason::CoincidentalOverlap);
    }

    if value_match_rate < thresholds::integrity::MIN_MATCH_RATE {
        return Err(RejectionReason::LowMatchRate);
    }

    let cardinality = Cardinality::from_distinct_ratios(
        join.source_distinct_ratio(),
        join.target_distinct_ratio(),
    );

    Ok(ValidatedMetrics {
        cardinality,
        join_match_rate: join.match_rate(),
        orphan_rate,
        target_coverage,
        join,
    })
}
