//! Candidate review policy and grouping.
//!
//! Confidence at or above the accept threshold auto-accepts; at or below
//! the reject threshold auto-rejects; the band between requires a human
//! decision before the owning workflow may complete.

use serde::{Deserialize, Serialize};

use super::{thresholds, CandidateStatus, RelationshipCandidate};

/// Auto-accept / auto-reject thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReviewPolicy {
    /// Confidence at or above which candidates are accepted automatically.
    pub auto_accept: f64,
    /// Confidence at or below which candidates are rejected automatically.
    pub auto_reject: f64,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            auto_accept: thresholds::review::AUTO_ACCEPT,
            auto_reject: thresholds::review::AUTO_REJECT,
        }
    }
}

impl ReviewPolicy {
    /// Classify a confidence score into (status, is_required).
    pub fn apply(&self, confidence: f64) -> (CandidateStatus, bool) {
        if confidence >= self.auto_accept {
            (CandidateStatus::Accepted, false)
        } else if confidence <= self.auto_reject {
            (CandidateStatus::Rejected, false)
        } else {
            (CandidateStatus::Pending, true)
        }
    }
}

/// Candidates split by review outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupedCandidates {
    pub confirmed: Vec<RelationshipCandidate>,
    pub needs_review: Vec<RelationshipCandidate>,
    pub rejected: Vec<RelationshipCandidate>,
}

impl GroupedCandidates {
    /// Group a candidate list by its review state.
    pub fn from_candidates(candidates: Vec<RelationshipCandidate>) -> Self {
        let mut grouped = Self::default();
        for candidate in candidates {
            if candidate.needs_review() {
                grouped.needs_review.push(candidate);
            } else {
                match candidate.status {
                    CandidateStatus::Accepted => grouped.confirmed.push(candidate),
                    CandidateStatus::Rejected => grouped.rejected.push(candidate),
                    // Pending but not required: still undecided, surface for
                    // review rather than hiding it
                    CandidateStatus::Pending => grouped.needs_review.push(candidate),
                }
            }
        }
        grouped
    }

    /// True only when no candidate remains in the review band.
    pub fn can_save(&self) -> bool {
        self.needs_review.iter().all(|c| !c.needs_review())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{Cardinality, DetectionMethod, UserDecision};
    use crate::profile::ColumnRef;

    fn make_candidate(confidence: f64) -> RelationshipCandidate {
        RelationshipCandidate {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: "p1".to_string(),
            datasource_id: "ds1".to_string(),
            source: ColumnRef::new("public", "orders", "customer_id"),
            target: ColumnRef::new("public", "customers", "id"),
            detection_method: DetectionMethod::ValueMatch,
            confidence,
            value_match_rate: None,
            name_similarity: None,
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
        }
    }

    #[test]
    fn test_review_bands() {
        let policy = ReviewPolicy::default();

        assert_eq!(policy.apply(0.95), (CandidateStatus::Accepted, false));
        assert_eq!(policy.apply(0.85), (CandidateStatus::Accepted, false));
        assert_eq!(policy.apply(0.60), (CandidateStatus::Pending, true));
        assert_eq!(policy.apply(0.30), (CandidateStatus::Rejected, false));
        assert_eq!(policy.apply(0.05), (CandidateStatus::Rejected, false));
    }

    #[test]
    fn test_grouping() {
        let mut accepted = make_candidate(0.9);
        accepted.status = CandidateStatus::Accepted;

        let mut pending = make_candidate(0.6);
        pending.status = CandidateStatus::Pending;
        pending.is_required = true;

        let mut rejected = make_candidate(0.1);
        rejected.status = CandidateStatus::Rejected;

        let grouped = GroupedCandidates::from_candidates(vec![accepted, pending, rejected]);
        assert_eq!(grouped.confirmed.len(), 1);
        assert_eq!(grouped.needs_review.len(), 1);
        assert_eq!(grouped.rejected.len(), 1);
        assert!(!grouped.can_save());
    }

    #[test]
    fn test_can_save_after_decisions() {
        let mut decided = make_candidate(0.6);
        decided.is_required = true;
        decided.status = CandidateStatus::Accepted;
        decided.user_decision = Some(UserDecision::Accepted);

        let grouped = GroupedCandidates::from_candidates(vec![decided]);
        assert!(grouped.can_save());
        assert_eq!(grouped.confirmed.len(), 1);
    }
}
