//! Ontology entities and their occurrences.
//!
//! Accepted relationships materialize into domain concepts: the target table
//! of an accepted reference becomes (or reinforces) an entity, and both
//! endpoints are recorded as occurrences. Occurrences carry an optional
//! semantic role recovered from the column name (e.g. `host_user_id` ->
//! role "host" on the user entity).

use std::collections::{HashMap, HashSet};

use inflector::Inflector;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CandidateStatus, RelationshipCandidate};
use crate::profile::ColumnRef;
use crate::store::{OntologyStore, StoreResult};

/// A discovered domain concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyEntity {
    pub id: String,
    pub project_id: String,
    /// Singular concept name (e.g. "customer").
    pub name: String,
    pub description: Option<String>,
    pub confidence: f64,
    /// Set when a re-extraction no longer observes this entity.
    pub is_stale: bool,
    /// Soft delete timestamp.
    pub deleted_at: Option<i64>,
    pub delete_reason: Option<String>,
}

/// One schema.table.column location where an entity occurs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyEntityOccurrence {
    pub id: String,
    pub entity_id: String,
    pub column: ColumnRef,
    pub confidence: f64,
    /// Optional semantic role (e.g. "host", "visitor").
    pub role: Option<String>,
}

/// An entity together with all of its occurrences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityWithOccurrences {
    pub entity: OntologyEntity,
    pub occurrences: Vec<OntologyEntityOccurrence>,
}

/// Materializes entities and occurrences from accepted candidates.
pub struct EntityMaterializer<'a> {
    store: &'a OntologyStore,
    project_id: String,
}

impl<'a> EntityMaterializer<'a> {
    pub fn new(store: &'a OntologyStore, project_id: impl Into<String>) -> Self {
        Self {
            store,
            project_id: project_id.into(),
        }
    }

    /// Get or create the entity named after a target table.
    pub fn ensure_entity(&self, table: &str, confidence: f64) -> StoreResult<OntologyEntity> {
        let name = table.to_lowercase().to_singular();
        if let Some(mut entity) = self.store.find_entity(&self.project_id, &name)? {
            // Reinforce: keep the strongest observed confidence, clear stale
            if confidence > entity.confidence || entity.is_stale {
                entity.confidence = entity.confidence.max(confidence);
                entity.is_stale = false;
                self.store.upsert_entity(&entity)?;
            }
            return Ok(entity);
        }

        let entity = OntologyEntity {
            id: Uuid::new_v4().to_string(),
            project_id: self.project_id.clone(),
            name,
            description: None,
            confidence,
            is_stale: false,
            deleted_at: None,
            delete_reason: None,
        };
        self.store.upsert_entity(&entity)?;
        Ok(entity)
    }

    /// Materialize entity/occurrence rows for one accepted candidate.
    pub fn materialize(&self, candidate: &RelationshipCandidate) -> StoreResult<OntologyEntity> {
        debug_assert_eq!(candidate.status, CandidateStatus::Accepted);

        let entity = self.ensure_entity(&candidate.target.table, candidate.confidence)?;

        self.store.upsert_occurrence(&OntologyEntityOccurrence {
            id: Uuid::new_v4().to_string(),
            entity_id: entity.id.clone(),
            column: candidate.target.clone(),
            confidence: candidate.confidence,
            role: None,
        })?;

        self.store.upsert_occurrence(&OntologyEntityOccurrence {
            id: Uuid::new_v4().to_string(),
            entity_id: entity.id.clone(),
            column: candidate.source.clone(),
            confidence: candidate.confidence,
            role: role_from_column(&candidate.source.column, &entity.name),
        })?;

        Ok(entity)
    }

    /// Materialize all accepted candidates for a datasource.
    pub fn materialize_accepted(&self, datasource_id: &str) -> StoreResult<usize> {
        let accepted: Vec<_> = self
            .store
            .list_candidates(datasource_id)?
            .into_iter()
            .filter(|c| c.status == CandidateStatus::Accepted)
            .collect();

        for candidate in &accepted {
            self.materialize(candidate)?;
        }
        Ok(accepted.len())
    }
}

/// Recover a semantic role from a referencing column name.
///
/// `host_user_id` referencing the `user` entity yields "host";
/// `user_id` yields no role.
pub fn role_from_column(column: &str, entity_name: &str) -> Option<String> {
    let base = column
        .to_lowercase()
        .trim_end_matches("_id")
        .trim_end_matches("_key")
        .to_string();

    let entity = entity_name.to_lowercase();
    let suffix = format!("_{}", entity);
    if let Some(prefix) = base.strip_suffix(&suffix) {
        if !prefix.is_empty() {
            return Some(prefix.to_string());
        }
    }
    None
}

/// Count relationship islands: connected components over all tables, where
/// accepted candidates connect their endpoint tables.
///
/// A fully linked schema has one island; every unlinked table adds one.
pub fn island_count(tables: &[String], accepted: &[RelationshipCandidate]) -> usize {
    if tables.is_empty() {
        return 0;
    }

    let index: HashMap<&str, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let mut uf = UnionFind::<usize>::new(tables.len());
    for candidate in accepted {
        let source = index.get(candidate.source.table.as_str());
        let target = index.get(candidate.target.table.as_str());
        if let (Some(&s), Some(&t)) = (source, target) {
            uf.union(s, t);
        }
    }

    let roots: HashSet<usize> = (0..tables.len()).map(|i| uf.find(i)).collect();
    roots.len()
}
