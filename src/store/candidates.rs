//! Relationship candidate persistence.

use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::{now, OntologyStore, StoreError, StoreResult};
use crate::discovery::{
    Cardinality, CandidateStatus, DetectionMethod, RejectionReason, RelationshipCandidate,
    UserDecision,
};
use crate::profile::ColumnRef;

fn candidate_from_row(row: &Row<'_>) -> rusqlite::Result<RelationshipCandidate> {
    let method: String = row.get(9)?;
    let cardinality: String = row.get(13)?;
    let status: String = row.get(19)?;
    let user_decision: Option<String> = row.get(21)?;
    let rejection: Option<String> = row.get(22)?;

    Ok(RelationshipCandidate {
        id: row.get(0)?,
        project_id: row.get(1)?,
        datasource_id: row.get(2)?,
        source: ColumnRef {
            schema: row.get(3)?,
            table: row.get(4)?,
            column: row.get(5)?,
        },
        target: ColumnRef {
            schema: row.get(6)?,
            table: row.get(7)?,
            column: row.get(8)?,
        },
        detection_method: DetectionMethod::parse(&method).unwrap_or(DetectionMethod::ValueMatch),
        confidence: row.get(10)?,
        value_match_rate: row.get(11)?,
        name_similarity: row.get(12)?,
        cardinality: Cardinality::parse(&cardinality).unwrap_or_default(),
        join_match_rate: row.get(14)?,
        orphan_rate: row.get(15)?,
        target_coverage: row.get(16)?,
        matched_rows: row.get(17)?,
        orphan_rows: row.get(18)?,
        status: CandidateStatus::parse(&status).unwrap_or(CandidateStatus::Pending),
        is_required: row.get(20)?,
        user_decision: user_decision.as_deref().and_then(UserDecision::parse),
        rejection_reason: rejection.as_deref().and_then(RejectionReason::parse),
        updated_at: row.get(23)?,
    })
}

const CANDIDATE_COLUMNS: &str = "id, project_id, datasource_id, \
     source_schema, source_table, source_column, \
     target_schema, target_table, target_column, \
     detection_method, confidence, value_match_rate, name_similarity, cardinality, \
     join_match_rate, orphan_rate, target_coverage, matched_rows, orphan_rows, \
     status, is_required, user_decision, rejection_reason, updated_at";

impl OntologyStore {
    /// Upsert a candidate by its (datasource, source, target) pair.
    ///
    /// Plain persistence; the engine decides whether a row may be
    /// re-scored before calling this.
    pub fn upsert_candidate(&self, candidate: &RelationshipCandidate) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO candidates (id, project_id, datasource_id,
                 source_schema, source_table, source_column,
                 target_schema, target_table, target_column,
                 detection_method, confidence, value_match_rate, name_similarity, cardinality,
                 join_match_rate, orphan_rate, target_coverage, matched_rows, orphan_rows,
                 status, is_required, user_decision, rejection_reason, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (datasource_id, source_schema, source_table, source_column,
                          target_schema, target_table, target_column)
             DO UPDATE SET
                 detection_method = excluded.detection_method,
                 confidence = excluded.confidence,
                 value_match_rate = excluded.value_match_rate,
                 name_similarity = excluded.name_similarity,
                 cardinality = excluded.cardinality,
                 join_match_rate = excluded.join_match_rate,
                 orphan_rate = excluded.orphan_rate,
                 target_coverage = excluded.target_coverage,
                 matched_rows = excluded.matched_rows,
                 orphan_rows = excluded.orphan_rows,
                 status = excluded.status,
                 is_required = excluded.is_required,
                 user_decision = excluded.user_decision,
                 rejection_reason = excluded.rejection_reason,
                 updated_at = excluded.updated_at",
            params![
                candidate.id,
                candidate.project_id,
                candidate.datasource_id,
                candidate.source.schema,
                candidate.source.table,
                candidate.source.column,
                candidate.target.schema,
                candidate.target.table,
                candidate.target.column,
                candidate.detection_method.as_str(),
                candidate.confidence,
                candidate.value_match_rate,
                candidate.name_similarity,
                candidate.cardinality.to_string(),
                candidate.join_match_rate,
                candidate.orphan_rate,
                candidate.target_coverage,
                candidate.matched_rows,
                candidate.orphan_rows,
                candidate.status.as_str(),
                candidate.is_required,
                candidate.user_decision.map(|d| d.as_str()),
                candidate.rejection_reason.map(|r| r.as_str()),
                now(),
            ],
        )?;
        Ok(())
    }

    pub fn get_candidate(&self, id: &str) -> StoreResult<RelationshipCandidate> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM candidates WHERE id = ?", CANDIDATE_COLUMNS),
                params![id],
                candidate_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("candidate {}", id)))
    }

    /// Find a candidate by its endpoints.
    pub fn find_candidate_by_pair(
        &self,
        datasource_id: &str,
        source: &ColumnRef,
        target: &ColumnRef,
    ) -> StoreResult<Option<RelationshipCandidate>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM candidates
                     WHERE datasource_id = ?
                       AND source_schema = ? AND source_table = ? AND source_column = ?
                       AND target_schema = ? AND target_table = ? AND target_column = ?",
                    CANDIDATE_COLUMNS
                ),
                params![
                    datasource_id,
                    source.schema,
                    source.table,
                    source.column,
                    target.schema,
                    target.table,
                    target.column
                ],
                candidate_from_row,
            )
            .optional()?)
    }

    /// All candidates for a datasource.
    pub fn list_candidates(&self, datasource_id: &str) -> StoreResult<Vec<RelationshipCandidate>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM candidates WHERE datasource_id = ?
             ORDER BY confidence DESC, source_table, source_column",
            CANDIDATE_COLUMNS
        ))?;
        let candidates = stmt
            .query_map(params![datasource_id], candidate_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(candidates)
    }

    /// Record an explicit human decision on a candidate.
    ///
    /// Sets both the user decision and the matching status; the candidate is
    /// permanently exempt from re-scoring afterwards.
    pub fn record_candidate_decision(
        &self,
        id: &str,
        decision: UserDecision,
    ) -> StoreResult<RelationshipCandidate> {
        let status = match decision {
            UserDecision::Accepted => CandidateStatus::Accepted,
            UserDecision::Rejected => CandidateStatus::Rejected,
        };
        let rows = self.conn().execute(
            "UPDATE candidates SET user_decision = ?, status = ?, updated_at = ? WHERE id = ?",
            params![decision.as_str(), status.as_str(), now(), id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("candidate {}", id)));
        }
        self.get_candidate(id)
    }

    /// Materialize accepted candidates into the saved relationships table.
    ///
    /// Idempotent; returns the number of relationships present afterwards
    /// that came from this save.
    pub fn save_accepted_relationships(&self, datasource_id: &str) -> StoreResult<usize> {
        let accepted: Vec<RelationshipCandidate> = self
            .list_candidates(datasource_id)?
            .into_iter()
            .filter(|c| c.status == CandidateStatus::Accepted)
            .collect();

        let conn = self.conn();
        for candidate in &accepted {
            conn.execute(
                "INSERT INTO saved_relationships (id, project_id, datasource_id,
                     source_schema, source_table, source_column,
                     target_schema, target_table, target_column,
                     cardinality, detection_method, confidence, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (datasource_id, source_schema, source_table, source_column,
                              target_schema, target_table, target_column)
                 DO UPDATE SET
                     cardinality = excluded.cardinality,
                     detection_method = excluded.detection_method,
                     confidence = excluded.confidence",
                params![
                    Uuid::new_v4().to_string(),
                    candidate.project_id,
                    candidate.datasource_id,
                    candidate.source.schema,
                    candidate.source.table,
                    candidate.source.column,
                    candidate.target.schema,
                    candidate.target.table,
                    candidate.target.column,
                    candidate.cardinality.to_string(),
                    candidate.detection_method.as_str(),
                    candidate.confidence,
                    now(),
                ],
            )?;
        }
        Ok(accepted.len())
    }

    /// Count saved relationships for a datasource.
    pub fn saved_relationship_count(&self, datasource_id: &str) -> StoreResult<i64> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM saved_relationships WHERE datasource_id = ?",
            params![datasource_id],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::thresholds;

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
            name_similarity: Some(0.8),
            cardinality: Cardinality::ManyToOne,
            join_match_rate: Some(0.95),
            orphan_rate: Some(0.01),
            target_coverage: Some(0.8),
            matched_rows: Some(950),
            orphan_rows: Some(10),
            status: CandidateStatus::Pending,
            is_required: true,
            user_decision: None,
            rejection_reason: None,
            updated_at: 0,
        }
    }

    #[test]
    fn test_candidate_roundtrip() {
        let store = OntologyStore::open_in_memory().unwrap();
        let candidate = make_candidate("c1", "customer_id", 0.7);
        store.upsert_candidate(&candidate).unwrap();

        let loaded = store.get_candidate("c1").unwrap();
        assert_eq!(loaded.source.column, "customer_id");
        assert_eq!(loaded.cardinality, Cardinality::ManyToOne);
        assert_eq!(loaded.detection_method, DetectionMethod::ValueMatch);
        assert!(loaded.needs_review());
        assert_eq!(loaded.matched_rows, Some(950));
    }

    #[test]
    fn test_upsert_replaces_by_pair() {
        let store = OntologyStore::open_in_memory().unwrap();
        store
            .upsert_candidate(&make_candidate("c1", "customer_id", 0.7))
            .unwrap();

        // Same pair, new id: row count stays 1, metrics update
        let mut updated = make_candidate("c2", "customer_id", 0.9);
        updated.status = CandidateStatus::Accepted;
        store.upsert_candidate(&updated).unwrap();

        let all = store.list_candidates("ds1").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].confidence, 0.9);
        assert_eq!(all[0].status, CandidateStatus::Accepted);
    }

    #[test]
    fn test_decision_locks_candidate() {
        let store = OntologyStore::open_in_memory().unwrap();
        store
            .upsert_candidate(&make_candidate("c1", "customer_id", 0.6))
            .unwrap();

        let decided = store
            .record_candidate_decision("c1", UserDecision::Rejected)
            .unwrap();
        assert_eq!(decided.status, CandidateStatus::Rejected);
        assert_eq!(decided.user_decision, Some(UserDecision::Rejected));
        assert!(!decided.needs_review());
        assert!(decided.is_user_locked());
    }

    #[test]
    fn test_save_accepted_relationships_idempotent() {
        let store = OntologyStore::open_in_memory().unwrap();

        let mut accepted = make_candidate("c1", "customer_id", 0.95);
        accepted.status = CandidateStatus::Accepted;
        accepted.is_required = false;
        store.upsert_candidate(&accepted).unwrap();

        let mut rejected = make_candidate("c2", "updated_by", 0.1);
        rejected.status = CandidateStatus::Rejected;
        store.upsert_candidate(&rejected).unwrap();

        assert_eq!(store.save_accepted_relationships("ds1").unwrap(), 1);
        assert_eq!(store.save_accepted_relationships("ds1").unwrap(), 1);
        assert_eq!(store.saved_relationship_count("ds1").unwrap(), 1);
    }

    #[test]
    fn test_review_band_constants_sane() {
        assert!(thresholds::review::AUTO_REJECT < thresholds::review::AUTO_ACCEPT);
    }
}
