//! Extraction DAG types and orchestration.
//!
//! One [`OntologyDag`] exists per (project, datasource) extraction run. Its
//! nine stages form a strict total order - the "DAG" name is historical, the
//! pipeline is linear - and every node transition is persisted before control
//! returns, so a crash between nodes loses no progress.

mod lease;
mod orchestrator;

pub use lease::{LeaseConfig, DEFAULT_HEARTBEAT_SECS, DEFAULT_STALENESS_SECS};
pub use orchestrator::{DagError, DagResult, Orchestrator, OrchestratorConfig};

use serde::{Deserialize, Serialize};

/// The nine extraction stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    EntityDiscovery,
    EntityEnrichment,
    FkDiscovery,
    ColumnEnrichment,
    PkMatchDiscovery,
    RelationshipEnrichment,
    OntologyFinalization,
    GlossaryDiscovery,
    GlossaryEnrichment,
}

impl Stage {
    /// All stages in order.
    pub const ALL: [Stage; 9] = [
        Stage::EntityDiscovery,
        Stage::EntityEnrichment,
        Stage::FkDiscovery,
        Stage::ColumnEnrichment,
        Stage::PkMatchDiscovery,
        Stage::RelationshipEnrichment,
        Stage::OntologyFinalization,
        Stage::GlossaryDiscovery,
        Stage::GlossaryEnrichment,
    ];

    /// Fixed 1-based execution order.
    pub fn order(&self) -> i32 {
        match self {
            Self::EntityDiscovery => 1,
            Self::EntityEnrichment => 2,
            Self::FkDiscovery => 3,
            Self::ColumnEnrichment => 4,
            Self::PkMatchDiscovery => 5,
            Self::RelationshipEnrichment => 6,
            Self::OntologyFinalization => 7,
            Self::GlossaryDiscovery => 8,
            Self::GlossaryEnrichment => 9,
        }
    }

    /// Stage with the given order, if in range.
    pub fn from_order(order: i32) -> Option<Stage> {
        Self::ALL.iter().copied().find(|s| s.order() == order)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntityDiscovery => "EntityDiscovery",
            Self::EntityEnrichment => "EntityEnrichment",
            Self::FkDiscovery => "FKDiscovery",
            Self::ColumnEnrichment => "ColumnEnrichment",
            Self::PkMatchDiscovery => "PKMatchDiscovery",
            Self::RelationshipEnrichment => "RelationshipEnrichment",
            Self::OntologyFinalization => "OntologyFinalization",
            Self::GlossaryDiscovery => "GlossaryDiscovery",
            Self::GlossaryEnrichment => "GlossaryEnrichment",
        }
    }

    pub fn parse(raw: &str) -> Option<Stage> {
        Self::ALL.iter().copied().find(|s| s.as_str() == raw)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a whole extraction DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DagStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl DagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this DAG can still hold a lease.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Status of one DAG node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Whether a downstream node may start after this one.
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// One extraction DAG row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyDag {
    pub id: String,
    pub project_id: String,
    pub datasource_id: String,
    pub status: DagStatus,
    /// Order of the node currently (or last) being executed; 0 before start.
    pub current_node: i32,
    /// Schema fingerprint at the time nodes were completed.
    pub schema_fingerprint: String,
    /// Leadership lease: owning instance id.
    pub owner_id: Option<String>,
    /// Leadership lease: last heartbeat (unix seconds).
    pub last_heartbeat: i64,
    /// Error preserved when failed.
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Progress within one node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeProgress {
    pub current: i64,
    pub total: i64,
    pub message: String,
}

/// One DAG node row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagNode {
    pub dag_id: String,
    pub stage: Stage,
    pub status: NodeStatus,
    pub progress: NodeProgress,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub updated_at: i64,
}

impl DagNode {
    /// Fresh pending node for a stage.
    pub fn pending(dag_id: impl Into<String>, stage: Stage) -> Self {
        Self {
            dag_id: dag_id.into(),
            stage,
            status: NodeStatus::Pending,
            progress: NodeProgress::default(),
            retry_count: 0,
            error_message: None,
            updated_at: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_orders_strictly_increasing() {
        let orders: Vec<i32> = Stage::ALL.iter().map(|s| s.order()).collect();
        for pair in orders.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(orders.first(), Some(&1));
        assert_eq!(orders.last(), Some(&9));
    }

    #[test]
    fn test_stage_name_roundtrip() {
        for stage in Stage::ALL {
            assert_eq!(Stage::parse(stage.as_str()), Some(stage));
            assert_eq!(Stage::from_order(stage.order()), Some(stage));
        }
        assert_eq!(Stage::parse("NotAStage"), None);
        assert_eq!(Stage::from_order(10), None);
    }

    #[test]
    fn test_node_status_dependencies() {
        assert!(NodeStatus::Completed.satisfies_dependency());
        assert!(NodeStatus::Skipped.satisfies_dependency());
        assert!(!NodeStatus::Pending.satisfies_dependency());
        assert!(!NodeStatus::Failed.satisfies_dependency());
        assert!(!NodeStatus::Running.satisfies_dependency());
    }
}
