//! Phase 4: FK target resolution for identifier columns.
//!
//! Combines naming similarity with PK-match signals already gathered by the
//! relationship discovery engine: a discovery candidate over the same pair
//! reinforces (or supplies) the resolved target.

use super::IdentifierFeature;
use crate::discovery::{name_similarity, NamingRules, RelationshipCandidate};
use crate::profile::ColumnRef;

/// Outcome of resolving one identifier column.
#[derive(Debug, Clone)]
pub struct FkResolution {
    pub feature: IdentifierFeature,
    /// Whether a discovery candidate corroborated the naming match.
    pub corroborated: bool,
}

/// Resolve the likely FK target of an identifier-path column.
///
/// `candidates` are discovery candidates whose source is this column; the
/// strongest corroborating candidate lifts confidence above what naming
/// alone allows.
pub fn resolve_fk_target(
    column: &ColumnRef,
    rules: &NamingRules,
    candidates: &[RelationshipCandidate],
    service_prefix: Option<String>,
) -> FkResolution {
    let name_match = rules.best_match(&column.column);

    // Strongest discovery candidate originating at this column
    let corroborating = candidates
        .iter()
        .filter(|c| {
            c.source.schema == column.schema
                && c.source.table == column.table
                && c.source.column == column.column
        })
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

    match (name_match, corroborating) {
        (Some(named), Some(candidate)) => {
            let agree = candidate.target.table.eq_ignore_ascii_case(&named.target_table);
            let confidence = if agree {
                // Naming and statistics agree
                (named.base_confidence + 0.10).min(0.95)
            } else {
                // Statistics outrank naming when they disagree
                candidate.confidence
            };
            let (table, col) = if agree {
                (named.target_table, named.target_column)
            } else {
                (
                    candidate.target.table.clone(),
                    candidate.target.column.clone(),
                )
            };
            FkResolution {
                feature: IdentifierFeature {
                    target_table: Some(table),
                    target_column: Some(col),
                    confidence,
                    service_prefix,
                },
                corroborated: true,
            }
        }
        (Some(named), None) => FkResolution {
            feature: IdentifierFeature {
                confidence: named.base_confidence
                    * name_similarity(&column.column, &named.target_table, &named.target_column),
                target_table: Some(named.target_table),
                target_column: Some(named.target_column),
                service_prefix,
            },
            corroborated: false,
        },
        (None, Some(candidate)) => FkResolution {
            feature: IdentifierFeature {
                target_table: Some(candidate.target.table.clone()),
                target_column: Some(candidate.target.column.clone()),
                confidence: candidate.confidence,
                service_prefix,
            },
            corroborated: true,
        },
        (None, None) => FkResolution {
            feature: IdentifierFeature {
                target_table: None,
                target_column: None,
                confidence: 0.0,
                service_prefix,
            },
            corroborated: false,
        },
    }
}
