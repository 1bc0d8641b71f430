use ontomap::discovery::{
    Cardinality, CandidateStatus, DetectionMethod, GroupedCandidates, RelationshipCandidate,
    ReviewPolicy, UserDecision,
};
use ontomap::profile::ColumnRef;
use ontomap::store::OntologyStore;

fn make_candidate(id: &str, source_col: &str, confidence: f64) -> RelationshipCandidate {
    RelationshipCandidate {
        id: id.to_string(),
        project_id: "p1".to_string(),
        datasource_id: "ds1".to_string(),
        source: ColumnRef::new("public", "orders", source_col),
        target: ColumnRef::new("public", "customers", "id"),
        detection_method: DetectionMethod::ValueMatch,
        confidence,
        value_match_rate: Some(0.9),
        name_similarity: None,
        cardinality: Cardinality::ManyToOne,
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

/// Apply the default policy the way the engine does.
fn policed(id: &str, source_col: &str, confidence: f64) -> RelationshipCandidate {
    let mut candidate = make_candidate(id, source_col, confidence);
    let (status, is_required) = ReviewPolicy::default().apply(confidence);
    candidate.status = status;
    candidate.is_required = is_required;
    candidate
}

#[test]
fn test_needs_review_definition() {
    // needs_review == is_required && status == pending, nothing else
    let auto_accepted = policed("c1", "a_id", 0.9);
    assert!(!auto_accepted.needs_review());

    let banded = policed("c2", "b_id", 0.6);
    assert!(banded.is_required);
    assert_eq!(banded.status, CandidateStatus::Pending);
    assert!(banded.needs_review());

    let auto_rejected = policed("c3", "c_id", 0.1);
    assert!(!auto_rejected.needs_review());
}

#[test]
fn test_band_boundaries_inclusive() {
    let policy = ReviewPolicy::default();

    // At the thresholds the automatic outcome wins
    assert_eq!(policy.apply(policy.auto_accept).0, CandidateStatus::Accepted);
    assert_eq!(policy.apply(policy.auto_reject).0, CandidateStatus::Rejected);

    // Just inside the band a human is required
    let (status, required) = policy.apply(policy.auto_accept - 0.01);
    assert_eq!(status, CandidateStatus::Pending);
    assert!(required);
}

#[test]
fn test_grouped_counts_and_can_save() {
    let store = OntologyStore::open_in_memory().unwrap();

    store.upsert_candidate(&policed("c1", "customer_id", 0.95)).unwrap();
    store.upsert_candidate(&policed("c2", "vendor_id", 0.60)).unwrap();
    store.upsert_candidate(&policed("c3", "batch_no", 0.10)).unwrap();

    let grouped = GroupedCandidates::from_candidates(store.list_candidates("ds1").unwrap());
    assert_eq!(grouped.confirmed.len(), 1);
    assert_eq!(grouped.needs_review.len(), 1);
    assert_eq!(grouped.rejected.len(), 1);
    assert!(!grouped.can_save());
}

#[test]
fn test_decision_clears_review_queue() {
    let store = OntologyStore::open_in_memory().unwrap();
    store.upsert_candidate(&policed("c1", "vendor_id", 0.60)).unwrap();

    let grouped = GroupedCandidates::from_candidates(store.list_candidates("ds1").unwrap());
    assert!(!grouped.can_save());

    store
        .record_candidate_decision("c1", UserDecision::Accepted)
        .unwrap();

    let grouped = GroupedCandidates::from_candidates(store.list_candidates("ds1").unwrap());
    assert!(grouped.can_save());
    assert_eq!(grouped.confirmed.len(), 1);
}

#[test]
fn test_decided_candidate_never_needs_review_again() {
    let store = OntologyStore::open_in_memory().unwrap();
    store.upsert_candidate(&policed("c1", "vendor_id", 0.60)).unwrap();

    let decided = store
        .record_candidate_decision("c1", UserDecision::Rejected)
        .unwrap();

    // is_required stays true (it was required), but the decision settles it
    assert!(decided.is_required);
    assert!(!decided.needs_review());
    assert!(decided.is_user_locked());
}
