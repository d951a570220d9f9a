//! Read-only queries over the entity store: ranked task search and
//! on-demand statistics. Nothing here mutates state.

use crate::core::task::{Priority, Task, TaskStatus};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Counts of tasks grouped by status and by priority.
///
/// Computed on demand; always reflects the store at call time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatistics {
    pub by_status: BTreeMap<TaskStatus, usize>,
    pub by_priority: BTreeMap<Priority, usize>,
    pub total: usize,
}

/// Match quality for search ranking. Exact title matches sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchRank {
    ExactTitle,
    Substring,
}

/// Read-only query surface over a store handle.
pub struct QueryService {
    store: Arc<Store>,
}

impl QueryService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Case-insensitive substring search over title, description and
    /// tags.
    ///
    /// Exact (case-insensitive) title matches rank above substring
    /// matches; ties are broken by most recent update.
    pub fn search_tasks(&self, query: &str, limit: usize) -> Vec<Task> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut matches: Vec<(MatchRank, Task)> = self
            .store
            .list_tasks()
            .into_iter()
            .filter_map(|task| rank_match(&task, &needle).map(|rank| (rank, task)))
            .collect();

        matches.sort_by(|(rank_a, task_a), (rank_b, task_b)| {
            rank_a
                .cmp(rank_b)
                .then(task_b.updated_at.cmp(&task_a.updated_at))
                .then(task_a.id.cmp(&task_b.id))
        });

        matches
            .into_iter()
            .take(limit)
            .map(|(_, task)| task)
            .collect()
    }

    /// Status and priority histograms over all tasks.
    pub fn statistics(&self) -> TaskStatistics {
        let tasks = self.store.list_tasks();
        let mut by_status: BTreeMap<TaskStatus, usize> = BTreeMap::new();
        let mut by_priority: BTreeMap<Priority, usize> = BTreeMap::new();
        for task in &tasks {
            *by_status.entry(task.status).or_insert(0) += 1;
            *by_priority.entry(task.priority).or_insert(0) += 1;
        }
        TaskStatistics {
            by_status,
            by_priority,
            total: tasks.len(),
        }
    }
}

fn rank_match(task: &Task, needle: &str) -> Option<MatchRank> {
    let title = task.title.to_lowercase();
    if title == needle {
        return Some(MatchRank::ExactTitle);
    }
    let in_title = title.contains(needle);
    let in_description = task
        .description
        .as_ref()
        .map(|d| d.to_lowercase().contains(needle))
        .unwrap_or(false);
    let in_tags = task.tags.iter().any(|t| t.to_lowercase().contains(needle));

    (in_title || in_description || in_tags).then_some(MatchRank::Substring)
}
