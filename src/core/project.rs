//! Project data model. A project groups tasks via a weak reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    /// Create a new unique project identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A project. Tasks reference projects weakly; deleting a project does
/// not touch its tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    /// Human-readable name. Always non-empty.
    pub name: String,
    pub description: Option<String>,
    pub repository_url: Option<String>,
    /// Optimistic-concurrency version, starting at 1.
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.to_string(),
            description: None,
            repository_url: None,
            version: 1,
            created_at: Utc::now(),
        }
    }
}
