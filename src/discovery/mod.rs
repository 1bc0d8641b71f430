//! Relationship discovery engine.
//!
//! Proposes, validates, scores and reconciles column-to-column relationship
//! candidates. Discovery runs in three passes:
//!
//! 1. **Generation** - declared foreign keys imported verbatim, naming
//!    heuristics over identifier-shaped columns, and sample-based value
//!    overlap across compatible pairs.
//! 2. **Validation** - shortlisted pairs are checked with a real join and
//!    either rejected (with a recorded reason) or scored.
//! 3. **Review** - scored candidates are auto-accepted, auto-rejected, or
//!    parked for a human decision depending on confidence.
//!
//! A candidate a human has decided on is never auto-modified again.

mod engine;
mod entities;
mod naming;
mod overlap;
mod review;
mod validate;

pub use engine::{DiscoveryConfig, DiscoveryEngine, DiscoveryError, DiscoveryReport, DiscoveryResult};
pub use entities::{
    island_count, role_from_column, EntityMaterializer, EntityWithOccurrences, OntologyEntity,
    OntologyEntityOccurrence,
};
pub use naming::{name_similarity, pluralize, singularize, NameMatch, NamingRules};
pub use overlap::{identifier_shaped, type_family, OverlapScout, PairCandidate, TypeFamily};
pub use review::{GroupedCandidates, ReviewPolicy};
pub use validate::{validate_join, ValidatedMetrics};

use serde::{Deserialize, Serialize};

use crate::profile::ColumnRef;

/// Centralized discovery thresholds.
///
/// Named constants instead of magic numbers; tuning happens here or through
/// [`DiscoveryConfig`] overrides.
pub mod thresholds {
    /// Review band boundaries.
    pub mod review {
        /// Confidence at or above which candidates are auto-accepted.
        pub const AUTO_ACCEPT: f64 = 0.85;
        /// Confidence at or below which candidates are auto-rejected.
        pub const AUTO_REJECT: f64 = 0.30;
    }

    /// Join-integrity limits.
    pub mod integrity {
        /// Maximum tolerated orphan rate before rejection.
        pub const MAX_ORPHAN_RATE: f64 = 0.05;
        /// Minimum fraction of target values that must be referenced.
        pub const MIN_TARGET_COVERAGE: f64 = 0.50;
        /// Minimum sample-based match rate for a plausible reference.
        pub const MIN_MATCH_RATE: f64 = 0.50;
    }

    /// Sample-based overlap estimation.
    pub mod overlap {
        /// Values sampled per source column.
        pub const SAMPLE_SIZE: usize = 50;
        /// Minimum estimated overlap to shortlist a pair for join validation.
        pub const MIN_ESTIMATE: f64 = 0.30;
    }

    /// Confidence levels and adjustments.
    pub mod confidence {
        /// Declared foreign keys are certain.
        pub const FOREIGN_KEY: f64 = 1.0;
        /// Maximum confidence for anything inferred (never 100% certain).
        pub const INFERENCE_CAP: f64 = 0.95;
        /// Base confidence for pure value-match candidates.
        pub const VALUE_MATCH_BASE: f64 = 0.45;
        /// Base confidence for PK-match candidates.
        pub const PK_MATCH_BASE: f64 = 0.60;
    }

    /// Confidence score adjustments.
    pub mod adjustment {
        /// Major confidence boost (near-perfect join match).
        pub const MAJOR_BOOST: f64 = 0.15;
        /// Medium confidence boost.
        pub const MEDIUM_BOOST: f64 = 0.10;
        /// Minor confidence boost.
        pub const MINOR_BOOST: f64 = 0.05;
    }
}

/// How a candidate was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Sample-based value overlap plus join validation.
    ValueMatch,
    /// Column naming heuristics.
    NameInference,
    /// Model-proposed relationship.
    Llm,
    /// Naming plus value-match agreement.
    Hybrid,
    /// Declared foreign key constraint.
    ForeignKey,
    /// Column name matches another table's primary key.
    PkMatch,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValueMatch => "value_match",
            Self::NameInference => "name_inference",
            Self::Llm => "llm",
            Self::Hybrid => "hybrid",
            Self::ForeignKey => "foreign_key",
            Self::PkMatch => "pk_match",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "value_match" => Some(Self::ValueMatch),
            "name_inference" => Some(Self::NameInference),
            "llm" => Some(Self::Llm),
            "hybrid" => Some(Self::Hybrid),
            "foreign_key" => Some(Self::ForeignKey),
            "pk_match" => Some(Self::PkMatch),
            _ => None,
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review status of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Accepted,
    Rejected,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// An explicit human decision on a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserDecision {
    Accepted,
    Rejected,
}

impl UserDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Join cardinality between two columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
    #[default]
    Unknown,
}

impl Cardinality {
    /// Derive cardinality from per-side uniqueness.
    pub fn from_uniqueness(source_unique: bool, target_unique: bool) -> Self {
        match (source_unique, target_unique) {
            (true, true) => Self::OneToOne,
            (true, false) => Self::OneToMany,
            (false, true) => Self::ManyToOne,
            (false, false) => Self::ManyToMany,
        }
    }

    /// Derive per-side uniqueness from distinct-value ratios.
    ///
    /// A side counts as unique when nearly every row carries a distinct
    /// value (>= 99%).
    pub fn from_distinct_ratios(source_ratio: f64, target_ratio: f64) -> Self {
        Self::from_uniqueness(source_ratio >= 0.99, target_ratio >= 0.99)
    }

    /// Swap the two sides.
    pub fn reverse(&self) -> Self {
        match self {
            Self::OneToMany => Self::ManyToOne,
            Self::ManyToOne => Self::OneToMany,
            other => *other,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "1:1" | "one_to_one" => Some(Self::OneToOne),
            "1:N" | "one_to_many" => Some(Self::OneToMany),
            "N:1" | "many_to_one" => Some(Self::ManyToOne),
            "N:M" | "many_to_many" => Some(Self::ManyToMany),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OneToOne => "1:1",
            Self::OneToMany => "1:N",
            Self::ManyToOne => "N:1",
            Self::ManyToMany => "N:M",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Why a candidate was rejected during validation.
///
/// These are recorded outcomes, not errors; the first applicable reason wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Column types cannot be joined.
    TypeMismatch,
    /// A relationship over this pair already exists.
    AlreadyExists,
    /// Source has strictly more distinct values than target (reversed FK).
    WrongDirection,
    /// Orphan rate above the integrity limit.
    OrphanIntegrity,
    /// Too few target values referenced; overlap is coincidental.
    CoincidentalOverlap,
    /// Join match rate below the plausibility floor.
    LowMatchRate,
    /// The validation join itself failed.
    JoinFailed,
}

impl RejectionReason {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "type_mismatch" => Some(Self::TypeMismatch),
            "already_exists" => Some(Self::AlreadyExists),
            "wrong_direction" => Some(Self::WrongDirection),
            "orphan_integrity" => Some(Self::OrphanIntegrity),
            "coincidental_overlap" => Some(Self::CoincidentalOverlap),
            "low_match_rate" => Some(Self::LowMatchRate),
            "join_failed" => Some(Self::JoinFailed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeMismatch => "type_mismatch",
            Self::AlreadyExists => "already_exists",
            Self::WrongDirection => "wrong_direction",
            Self::OrphanIntegrity => "orphan_integrity",
            Self::CoincidentalOverlap => "coincidental_overlap",
            Self::LowMatchRate => "low_match_rate",
            Self::JoinFailed => "join_failed",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed column-to-column relationship, subject to review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    /// Stable identifier.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Owning datasource.
    pub datasource_id: String,
    /// Source (referencing) column.
    pub source: ColumnRef,
    /// Target (referenced) column.
    pub target: ColumnRef,
    /// How this candidate was detected.
    pub detection_method: DetectionMethod,
    /// Confidence in [0, 1]. Declared FKs are always 1.0.
    pub confidence: f64,
    /// Sample-based overlap estimate, when computed.
    pub value_match_rate: Option<f64>,
    /// Naming similarity between source column and target table/column.
    pub name_similarity: Option<f64>,
    /// Join cardinality from both sides' distinct ratios.
    pub cardinality: Cardinality,
    /// Exact join match rate, when validated.
    pub join_match_rate: Option<f64>,
    /// Exact orphan rate, when validated.
    pub orphan_rate: Option<f64>,
    /// Fraction of distinct target values referenced.
    pub target_coverage: Option<f64>,
    /// Matched source rows from join validation.
    pub matched_rows: Option<i64>,
    /// Orphaned source rows from join validation.
    pub orphan_rows: Option<i64>,
    /// Review status.
    pub status: CandidateStatus,
    /// Whether a human must decide before the workflow may complete.
    pub is_required: bool,
    /// Explicit human decision, if any. Once set, discovery re-runs never
    /// modify this candidate.
    pub user_decision: Option<UserDecision>,
    /// Rejection reason, when status is Rejected by policy.
    pub rejection_reason: Option<RejectionReason>,
    /// Last update (unix seconds).
    pub updated_at: i64,
}

impl RelationshipCandidate {
    /// Whether this candidate still blocks workflow completion.
    pub fn needs_review(&self) -> bool {
        self.is_required && self.status == CandidateStatus::Pending
    }

    /// Whether a human has decided; locked candidates are exempt from
    /// re-scoring.
    pub fn is_user_locked(&self) -> bool {
        self.user_decision.is_some()
    }

    /// Normalized pair key for deduplication.
    pub fn pair_key(&self) -> CandidateKey {
        CandidateKey::new(&self.source, &self.target)
    }
}

/// A unique key identifying a candidate by its endpoints.
///
/// All names are lowercased for case-insensitive comparison.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CandidateKey {
    pub source: String,
    pub target: String,
}

impl CandidateKey {
    pub fn new(source: &ColumnRef, target: &ColumnRef) -> Self {
        Self {
            source: source.qualified().to_lowercase(),
            target: target.qualified().to_lowercase(),
        }
    }

    /// The same pair in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
        }
    }
}
