//! Durable keyed storage for tasks, projects, dependency edges and
//! workflow triggers.
//!
//! The store is an explicit handle: opened once, passed to every
//! component, saved or closed at shutdown. Entities live in in-memory
//! maps guarded by read/write locks and are optionally bound to a JSON
//! snapshot on disk. Updates use optimistic concurrency: callers supply
//! the version they read and a mismatch fails with `VersionConflict`
//! instead of silently overwriting. Every committed mutation publishes a
//! `DomainEvent`.

pub mod events;

pub use events::{DomainEvent, EventBus};

use crate::core::graph::DependencyEdge;
use crate::core::project::{Project, ProjectId};
use crate::core::task::{Priority, Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::klog_debug;
use crate::trigger::{TriggerId, TriggerStatus, TriggerType, WorkflowTrigger};
use chrono::Utc;
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// The kinds of entity the store manages, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Project,
    Trigger,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Task => write!(f, "task"),
            EntityKind::Project => write!(f, "project"),
            EntityKind::Trigger => write!(f, "trigger"),
        }
    }
}

/// Payload for creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub project_id: Option<ProjectId>,
    pub estimated_hours: Option<f64>,
    pub tags: BTreeSet<String>,
    pub technical_requirements: Vec<String>,
}

impl NewTask {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}

/// Partial update applied to a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub tags: Option<BTreeSet<String>>,
    pub technical_requirements: Option<Vec<String>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub project_id: Option<ProjectId>,
}

/// Payload for creating a project.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub repository_url: Option<String>,
}

impl NewProject {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Partial update applied to a project. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub repository_url: Option<String>,
}

/// On-disk snapshot of the whole store.
#[derive(Debug, Serialize, Deserialize, Default)]
struct Snapshot {
    tasks: Vec<Task>,
    projects: Vec<Project>,
    triggers: Vec<WorkflowTrigger>,
    edges: Vec<DependencyEdge>,
}

/// The entity store.
pub struct Store {
    tasks: RwLock<HashMap<TaskId, Task>>,
    projects: RwLock<HashMap<ProjectId, Project>>,
    triggers: RwLock<HashMap<TriggerId, WorkflowTrigger>>,
    edges: RwLock<Vec<DependencyEdge>>,
    events: EventBus,
    path: Option<PathBuf>,
}

impl Store {
    /// Create an ephemeral store with no backing file.
    pub fn in_memory() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            projects: RwLock::new(HashMap::new()),
            triggers: RwLock::new(HashMap::new()),
            edges: RwLock::new(Vec::new()),
            events: EventBus::new(),
            path: None,
        }
    }

    /// Open a store bound to a snapshot file, loading it if present.
    pub fn open(path: &Path) -> Result<Self> {
        klog_debug!("Store::open path={}", path.display());
        let snapshot = if path.exists() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            Snapshot::default()
        };

        let store = Self {
            tasks: RwLock::new(snapshot.tasks.into_iter().map(|t| (t.id, t)).collect()),
            projects: RwLock::new(snapshot.projects.into_iter().map(|p| (p.id, p)).collect()),
            triggers: RwLock::new(snapshot.triggers.into_iter().map(|t| (t.id, t)).collect()),
            edges: RwLock::new(snapshot.edges),
            events: EventBus::new(),
            path: Some(path.to_path_buf()),
        };
        Ok(store)
    }

    /// Write the snapshot to the backing file, if any.
    ///
    /// The write goes through a temp file and a rename so a crash never
    /// leaves a half-written snapshot.
    pub fn save(&self) -> Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        let snapshot = Snapshot {
            tasks: self.tasks.read().unwrap().values().cloned().collect(),
            projects: self.projects.read().unwrap().values().cloned().collect(),
            triggers: self.triggers.read().unwrap().values().cloned().collect(),
            edges: self.edges.read().unwrap().clone(),
        };
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&snapshot)?)?;
        fs::rename(&tmp, path)?;
        klog_debug!("Store saved to {}", path.display());
        Ok(())
    }

    /// Save and drop the handle.
    pub fn close(self) -> Result<()> {
        self.save()
    }

    /// Subscribe to domain events.
    pub fn subscribe(&self) -> Receiver<DomainEvent> {
        self.events.subscribe()
    }

    // ---- tasks ----

    /// Create a task from a validated payload.
    pub fn create_task(&self, new: NewTask) -> Result<Task> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(Error::validation("title", "must not be empty"));
        }
        validate_hours("estimated_hours", new.estimated_hours)?;
        if let Some(project_id) = new.project_id {
            self.require_project(&project_id)?;
        }

        let mut task = Task::new(title);
        task.description = new.description;
        task.priority = new.priority.unwrap_or_default();
        task.project_id = new.project_id;
        task.estimated_hours = new.estimated_hours;
        task.tags = new.tags;
        task.technical_requirements = new.technical_requirements;

        let stored = task.clone();
        self.tasks.write().unwrap().insert(task.id, task);
        klog_debug!("Task created: {} ({})", stored.id.short(), stored.title);
        self.events
            .publish(DomainEvent::TaskCreated { task_id: stored.id });
        Ok(stored)
    }

    /// Get a task by id.
    pub fn get_task(&self, id: &TaskId) -> Result<Task> {
        self.tasks
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Task, id))
    }

    /// Apply a partial update under optimistic concurrency.
    ///
    /// `expected_version` must match the stored version or the call
    /// fails with `VersionConflict` and nothing changes.
    pub fn update_task(
        &self,
        id: &TaskId,
        expected_version: u64,
        patch: TaskPatch,
    ) -> Result<Task> {
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(Error::validation("title", "must not be empty"));
            }
        }
        validate_hours("estimated_hours", patch.estimated_hours)?;
        validate_hours("actual_hours", patch.actual_hours)?;
        if let Some(project_id) = patch.project_id {
            self.require_project(&project_id)?;
        }

        let (stored, status_change) = {
            let mut tasks = self.tasks.write().unwrap();
            let task = tasks
                .get_mut(id)
                .ok_or_else(|| not_found(EntityKind::Task, id))?;

            if task.version != expected_version {
                return Err(Error::VersionConflict {
                    kind: EntityKind::Task,
                    id: id.to_string(),
                    expected: expected_version,
                    actual: task.version,
                });
            }

            let mut status_change = None;
            if let Some(status) = patch.status {
                if status != task.status {
                    if !task.status.can_transition(status) {
                        return Err(Error::InvalidStatusTransition {
                            from: task.status.to_string(),
                            to: status.to_string(),
                        });
                    }
                    status_change = Some((task.status, status));
                    task.status = status;
                }
            }

            if let Some(title) = patch.title {
                task.title = title.trim().to_string();
            }
            if let Some(description) = patch.description {
                task.description = Some(description);
            }
            if let Some(priority) = patch.priority {
                task.priority = priority;
            }
            if let Some(tags) = patch.tags {
                task.tags = tags;
            }
            if let Some(reqs) = patch.technical_requirements {
                task.technical_requirements = reqs;
            }
            if let Some(hours) = patch.estimated_hours {
                task.estimated_hours = Some(hours);
            }
            if let Some(hours) = patch.actual_hours {
                task.actual_hours = Some(hours);
            }
            if let Some(project_id) = patch.project_id {
                task.project_id = Some(project_id);
            }

            task.version += 1;
            task.updated_at = Utc::now();
            (task.clone(), status_change)
        };

        klog_debug!("Task updated: {} v{}", stored.id.short(), stored.version);
        self.events
            .publish(DomainEvent::TaskUpdated { task_id: stored.id });
        if let Some((from, to)) = status_change {
            self.events.publish(DomainEvent::TaskStatusChanged {
                task_id: stored.id,
                from,
                to,
            });
        }
        Ok(stored)
    }

    /// Delete a task and its dependency-edge records.
    ///
    /// The task's triggers remain as audit records.
    pub fn delete_task(&self, id: &TaskId) -> Result<()> {
        self.tasks
            .write()
            .unwrap()
            .remove(id)
            .ok_or_else(|| not_found(EntityKind::Task, id))?;
        self.edges
            .write()
            .unwrap()
            .retain(|e| e.from != *id && e.to != *id);
        klog_debug!("Task deleted: {}", id.short());
        self.events.publish(DomainEvent::TaskDeleted { task_id: *id });
        Ok(())
    }

    /// All tasks, ordered by creation time then id.
    pub fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().unwrap().values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    /// Snapshot of all tasks keyed by id, for graph analyses.
    pub fn task_map(&self) -> HashMap<TaskId, Task> {
        self.tasks.read().unwrap().clone()
    }

    // ---- projects ----

    /// Create a project from a validated payload.
    pub fn create_project(&self, new: NewProject) -> Result<Project> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        let mut project = Project::new(name);
        project.description = new.description;
        project.repository_url = new.repository_url;

        let stored = project.clone();
        self.projects.write().unwrap().insert(project.id, project);
        klog_debug!("Project created: {} ({})", stored.id.short(), stored.name);
        self.events.publish(DomainEvent::ProjectCreated {
            project_id: stored.id,
        });
        Ok(stored)
    }

    /// Get a project by id.
    pub fn get_project(&self, id: &ProjectId) -> Result<Project> {
        self.projects
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Project, id))
    }

    /// Apply a partial update to a project under optimistic concurrency.
    pub fn update_project(
        &self,
        id: &ProjectId,
        expected_version: u64,
        patch: ProjectPatch,
    ) -> Result<Project> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(Error::validation("name", "must not be empty"));
            }
        }

        let mut projects = self.projects.write().unwrap();
        let project = projects
            .get_mut(id)
            .ok_or_else(|| not_found(EntityKind::Project, id))?;

        if project.version != expected_version {
            return Err(Error::VersionConflict {
                kind: EntityKind::Project,
                id: id.to_string(),
                expected: expected_version,
                actual: project.version,
            });
        }

        if let Some(name) = patch.name {
            project.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            project.description = Some(description);
        }
        if let Some(url) = patch.repository_url {
            project.repository_url = Some(url);
        }
        project.version += 1;
        Ok(project.clone())
    }

    /// Delete a project. Fails while any task still references it.
    pub fn delete_project(&self, id: &ProjectId) -> Result<()> {
        let referenced = self
            .tasks
            .read()
            .unwrap()
            .values()
            .any(|t| t.project_id == Some(*id));
        if referenced {
            return Err(Error::validation(
                "project_id",
                "project is still referenced by tasks",
            ));
        }
        self.projects
            .write()
            .unwrap()
            .remove(id)
            .ok_or_else(|| not_found(EntityKind::Project, id))?;
        Ok(())
    }

    /// All projects, ordered by creation time.
    pub fn list_projects(&self) -> Vec<Project> {
        let mut projects: Vec<Project> = self.projects.read().unwrap().values().cloned().collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        projects
    }

    fn require_project(&self, id: &ProjectId) -> Result<()> {
        if self.projects.read().unwrap().contains_key(id) {
            Ok(())
        } else {
            Err(not_found(EntityKind::Project, id))
        }
    }

    // ---- dependency edge records ----

    /// Record a committed edge. Duplicates are collapsed.
    ///
    /// The graph engine validates acyclicity before this is called; the
    /// store only persists the record and publishes the event.
    pub fn insert_edge(&self, edge: DependencyEdge) {
        {
            let mut edges = self.edges.write().unwrap();
            if edges.contains(&edge) {
                return;
            }
            edges.push(edge);
        }
        self.events.publish(DomainEvent::DependencyAdded {
            from: edge.from,
            to: edge.to,
            kind: edge.kind,
        });
    }

    /// Drop an edge record. Returns whether one was removed.
    pub fn remove_edge(&self, edge: &DependencyEdge) -> bool {
        let removed = {
            let mut edges = self.edges.write().unwrap();
            let before = edges.len();
            edges.retain(|e| e != edge);
            edges.len() != before
        };
        if removed {
            self.events.publish(DomainEvent::DependencyRemoved {
                from: edge.from,
                to: edge.to,
            });
        }
        removed
    }

    /// All recorded edges.
    pub fn list_edges(&self) -> Vec<DependencyEdge> {
        self.edges.read().unwrap().clone()
    }

    // ---- triggers ----

    /// Insert a freshly created trigger.
    pub fn insert_trigger(&self, trigger: WorkflowTrigger) -> WorkflowTrigger {
        let stored = trigger.clone();
        self.triggers.write().unwrap().insert(trigger.id, trigger);
        self.events.publish(DomainEvent::TriggerCreated {
            trigger_id: stored.id,
            task_id: stored.task_id,
        });
        stored
    }

    /// Get a trigger by id.
    pub fn get_trigger(&self, id: &TriggerId) -> Result<WorkflowTrigger> {
        self.triggers
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Trigger, id))
    }

    /// Find the non-failed trigger holding the dedupe key for
    /// (task, type), if any.
    pub fn find_active_trigger(
        &self,
        task_id: &TaskId,
        trigger_type: &TriggerType,
    ) -> Option<WorkflowTrigger> {
        let key = WorkflowTrigger::dedupe_key_for(task_id, trigger_type);
        self.triggers
            .read()
            .unwrap()
            .values()
            .find(|t| t.dedupe_key == key && t.status != TriggerStatus::Failed)
            .cloned()
    }

    /// All triggers currently awaiting dispatch, oldest first.
    pub fn pending_triggers(&self) -> Vec<WorkflowTrigger> {
        let mut pending: Vec<WorkflowTrigger> = self
            .triggers
            .read()
            .unwrap()
            .values()
            .filter(|t| t.status == TriggerStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending
    }

    /// All triggers for a task, oldest first.
    pub fn list_triggers_for_task(&self, task_id: &TaskId) -> Vec<WorkflowTrigger> {
        let mut triggers: Vec<WorkflowTrigger> = self
            .triggers
            .read()
            .unwrap()
            .values()
            .filter(|t| t.task_id == *task_id)
            .cloned()
            .collect();
        triggers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        triggers
    }

    /// Advance a trigger's state machine.
    ///
    /// Validates the forward-only transition on the record itself and
    /// publishes `TriggerStatusChanged` on success.
    pub fn transition_trigger(
        &self,
        id: &TriggerId,
        to: TriggerStatus,
        failure_reason: Option<String>,
    ) -> Result<WorkflowTrigger> {
        let (stored, from) = {
            let mut triggers = self.triggers.write().unwrap();
            let trigger = triggers
                .get_mut(id)
                .ok_or_else(|| not_found(EntityKind::Trigger, id))?;
            let from = trigger.status;
            trigger.transition(to)?;
            if let Some(reason) = failure_reason {
                trigger.failure_reason = Some(reason);
            }
            (trigger.clone(), from)
        };
        self.events.publish(DomainEvent::TriggerStatusChanged {
            trigger_id: stored.id,
            from,
            to,
        });
        Ok(stored)
    }

    /// Bump the attempt counter on a trigger, returning the new count.
    pub fn record_trigger_attempt(&self, id: &TriggerId) -> Result<u32> {
        let mut triggers = self.triggers.write().unwrap();
        let trigger = triggers
            .get_mut(id)
            .ok_or_else(|| not_found(EntityKind::Trigger, id))?;
        trigger.attempts += 1;
        trigger.updated_at = Utc::now();
        Ok(trigger.attempts)
    }
}

fn not_found(kind: EntityKind, id: &impl std::fmt::Display) -> Error {
    Error::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn validate_hours(field: &str, hours: Option<f64>) -> Result<()> {
    match hours {
        Some(h) if !h.is_finite() || h < 0.0 => {
            Err(Error::validation(field, "must be a non-negative number"))
        }
        _ => Ok(()),
    }
}
