//! Named, ordered workflow tasks with bounded batching.
//!
//! Each extraction phase enqueues tasks (profile a table, understand the
//! schema, build tiers, generate questions); the queue drains them in fixed
//! batches so concurrent profiler/model load stays capped.

use serde::{Deserialize, Serialize};

/// The kinds of work a workflow enqueues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ProfileTable,
    UnderstandSchema,
    BuildTiers,
    GenerateQuestions,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProfileTable => "profile_table",
            Self::UnderstandSchema => "understand_schema",
            Self::BuildTiers => "build_tiers",
            Self::GenerateQuestions => "generate_questions",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "profile_table" => Some(Self::ProfileTable),
            "understand_schema" => Some(Self::UnderstandSchema),
            "build_tiers" => Some(Self::BuildTiers),
            "generate_questions" => Some(Self::GenerateQuestions),
            _ => None,
        }
    }
}

/// Status of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One unit of queued work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub workflow_id: String,
    pub kind: TaskKind,
    /// Position in the queue; batches preserve this order.
    pub ord: i32,
    /// What the task operates on (table name, "global", ...).
    pub subject: String,
    pub status: TaskStatus,
    pub retry_count: i32,
}

impl Task {
    pub fn new(
        workflow_id: impl Into<String>,
        kind: TaskKind,
        ord: i32,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            kind,
            ord,
            subject: subject.into(),
            status: TaskStatus::Pending,
            retry_count: 0,
        }
    }
}

/// An in-memory task queue drained in bounded batches.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tasks: Vec<Task>,
    batch_size: usize,
}

impl TaskQueue {
    pub fn new(tasks: Vec<Task>, batch_size: usize) -> Self {
        let mut tasks = tasks;
        tasks.sort_by_key(|t| t.ord);
        Self {
            tasks,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The next batch of pending tasks, in order, marked running.
    ///
    /// Returns an empty vec when nothing is pending.
    pub fn next_batch(&mut self) -> Vec<Task> {
        let mut batch = Vec::new();
        for task in self
            .tasks
            .iter_mut()
            .filter(|t| t.status == TaskStatus::Pending)
            .take(self.batch_size)
        {
            task.status = TaskStatus::Running;
            batch.push(task.clone());
        }
        batch
    }

    /// Record a task's outcome.
    ///
    /// Failed tasks go back to pending with an incremented retry count while
    /// under `max_retries`; at the ceiling they stay failed.
    pub fn finish(&mut self, task_id: &str, success: bool, max_retries: i32) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) {
            if success {
                task.status = TaskStatus::Completed;
            } else {
                task.retry_count += 1;
                task.status = if task.retry_count < max_retries {
                    TaskStatus::Pending
                } else {
                    TaskStatus::Failed
                };
            }
        }
    }

    /// Whether every task reached a terminal status.
    pub fn is_drained(&self) -> bool {
        self.tasks
            .iter()
            .all(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Failed))
    }

    /// Count of tasks that ended failed.
    pub fn failed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}
