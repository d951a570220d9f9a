//! Task data model for the orchestration core.
//!
//! Tasks are the atomic units of work tracked by the store. Each task
//! carries its status, priority, tags, technical requirements, effort
//! estimates and an optimistic-concurrency version.

use crate::core::project::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Unique identifier for a task.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Task priority, ordered from least to most urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Task status in its lifecycle.
///
/// Tasks move between these states only via explicit update calls.
/// `Completed` and `Cancelled` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task created but not yet started.
    #[default]
    Pending,
    /// Task is actively being worked on.
    InProgress,
    /// Task cannot proceed until something external changes.
    Blocked,
    /// Task finished successfully.
    Completed,
    /// Task abandoned; will never complete.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Whether a task in this status satisfies a blocking dependency.
    ///
    /// Cancelled prerequisites do not block: a cancelled task cannot be
    /// waited on forever.
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Check whether a transition to `target` is allowed.
    ///
    /// Any transition between distinct non-terminal states is allowed;
    /// terminal states reject everything.
    pub fn can_transition(&self, target: TaskStatus) -> bool {
        !self.is_terminal() && *self != target
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Blocked => write!(f, "blocked"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// A single task tracked by the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Human-readable title. Always non-empty.
    pub title: String,
    /// Detailed description of what the task should accomplish.
    pub description: Option<String>,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Urgency of the task.
    pub priority: Priority,
    /// Free-form classification tags.
    pub tags: BTreeSet<String>,
    /// Ordered list of technical requirements extracted or supplied.
    pub technical_requirements: Vec<String>,
    /// Estimated effort in hours.
    pub estimated_hours: Option<f64>,
    /// Actual effort in hours, recorded after the fact.
    pub actual_hours: Option<f64>,
    /// Weak reference to the owning project, if any.
    pub project_id: Option<ProjectId>,
    /// Optimistic-concurrency version, starting at 1.
    pub version: u64,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task with the given title.
    ///
    /// The title is not validated here; the store rejects empty titles
    /// at the create boundary.
    pub fn new(title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            title: title.to_string(),
            description: None,
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            tags: BTreeSet::new(),
            technical_requirements: Vec::new(),
            estimated_hours: None,
            actual_hours: None,
            project_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// The estimated duration used for critical-path weighting.
    ///
    /// Tasks without an estimate weigh zero so they still appear on
    /// structurally critical paths.
    pub fn duration(&self) -> f64 {
        self.estimated_hours.unwrap_or(0.0)
    }
}
