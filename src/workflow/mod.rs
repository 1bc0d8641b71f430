//! Extraction workflow state machines.
//!
//! Two machines govern an extraction run:
//!
//! - The **workflow-level machine** wraps the whole run:
//!   `pending → running → {paused, awaiting_input, completed, failed}`, with
//!   explicit restart from terminal states.
//! - The **entity-level machine** tracks one addressable unit (the whole
//!   datasource, a table, or a table.column pair):
//!   `pending → scanning → scanned → analyzing → {complete, needs_input}`,
//!   with reopening from `complete` when a cascading answer touches the
//!   entity, and `failed` reachable from every state.
//!
//! Transitions not listed are rejected; callers go through
//! `can_transition_to` before persisting.

mod tasks;
mod tracker;

pub use tasks::{Task, TaskKind, TaskQueue, TaskStatus};
pub use tracker::{
    AnswerDiff, AnswerEffect, AnswerOutcome, EntityTracker, Question, TrackerError, TrackerResult,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse state of an extraction workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Running,
    Paused,
    AwaitingInput,
    Completed,
    Failed,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::AwaitingInput => "awaiting_input",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition_to(&self, to: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Running, Paused)
                | (Running, AwaitingInput)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Failed)
                | (AwaitingInput, Running)
                | (AwaitingInput, Completed)
                | (AwaitingInput, Failed)
                // Explicit restart only
                | (Completed, Pending)
                | (Failed, Pending)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "awaiting_input" => Some(Self::AwaitingInput),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one addressable extraction entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Pending,
    Scanning,
    Scanned,
    Analyzing,
    Complete,
    NeedsInput,
    Failed,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scanning => "scanning",
            Self::Scanned => "scanned",
            Self::Analyzing => "analyzing",
            Self::Complete => "complete",
            Self::NeedsInput => "needs_input",
            Self::Failed => "failed",
        }
    }

    /// Whether `self → to` is a legal transition.
    ///
    /// `failed` is reachable from every state. `complete → analyzing` is the
    /// reopen path taken when a cascading answer mutates the entity.
    pub fn can_transition_to(&self, to: EntityStatus) -> bool {
        use EntityStatus::*;
        if to == Failed {
            return true;
        }
        matches!(
            (self, to),
            (Pending, Scanning)
                | (Scanning, Scanned)
                | (Scanned, Analyzing)
                | (Analyzing, Complete)
                | (Analyzing, NeedsInput)
                | (NeedsInput, Analyzing)
                | (Complete, Analyzing)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "scanning" => Some(Self::Scanning),
            "scanned" => Some(Self::Scanned),
            "analyzing" => Some(Self::Analyzing),
            "complete" => Some(Self::Complete),
            "needs_input" => Some(Self::NeedsInput),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The addressable unit an entity state tracks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityScope {
    /// The whole datasource.
    Global,
    /// One table.
    Table(String),
    /// One table.column pair.
    Column(String, String),
}

impl EntityScope {
    /// Encode for persistence: `global`, `<table>`, or `<table>.<column>`.
    pub fn encode(&self) -> String {
        match self {
            Self::Global => "global".to_string(),
            Self::Table(t) => t.clone(),
            Self::Column(t, c) => format!("{}.{}", t, c),
        }
    }

    /// Decode from the persisted form.
    pub fn decode(raw: &str) -> Self {
        if raw == "global" {
            Self::Global
        } else if let Some((table, column)) = raw.split_once('.') {
            Self::Column(table.to_string(), column.to_string())
        } else {
            Self::Table(raw.to_string())
        }
    }
}

impl std::fmt::Display for EntityScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// One workflow run row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: String,
    pub project_id: String,
    pub datasource_id: String,
    pub state: WorkflowState,
    /// Error message when failed.
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Extraction progress state for one addressable entity.
///
/// Ephemeral: deleted when the owning workflow reaches a terminal state
/// (audit diffs are retained separately).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEntityState {
    pub id: String,
    pub workflow_id: String,
    pub scope: EntityScope,
    pub status: EntityStatus,
    /// Gathered statistics, intermediate model reasoning, generated
    /// questions and recorded answers.
    pub gathered: Value,
    pub updated_at: i64,
}
