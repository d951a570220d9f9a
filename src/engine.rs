//! Engine facade over the orchestration core.
//!
//! The engine owns the store handle, the locked dependency graph, the
//! requirement parser, the trigger coordinator and the query service,
//! and exposes the operation surface consumed by external collaborators.
//! Graph mutations run their reachability check and their insertion
//! under one write guard, so concurrent dependency additions cannot
//! jointly admit a cycle.

use crate::config::Config;
use crate::core::graph::{CriticalPath, DependencyEdge, DependencyGraph, EdgeKind};
use crate::core::project::{Project, ProjectId};
use crate::core::task::{Task, TaskId};
use crate::error::Result;
use crate::klog_debug;
use crate::parser::{ParsedRequirement, RequirementParser};
use crate::query::{QueryService, TaskStatistics};
use crate::store::{DomainEvent, NewProject, NewTask, ProjectPatch, Store, TaskPatch};
use crate::trigger::{
    CreatedTrigger, ExternalTriggerExecutor, TriggerCoordinator, TriggerId, TriggerType,
    TriggerWorker, WorkflowTrigger,
};
use crossbeam_channel::Receiver;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// The orchestration engine.
pub struct Engine {
    store: Arc<Store>,
    graph: Arc<RwLock<DependencyGraph>>,
    parser: RequirementParser,
    coordinator: TriggerCoordinator,
    query: QueryService,
}

impl Engine {
    /// Open an engine from configuration, loading the persisted
    /// snapshot and rebuilding the dependency graph from it.
    pub fn open(config: &Config) -> Result<Self> {
        config.ensure_dirs()?;
        let store = Store::open(&config.state_path()?)?;
        Self::from_store(store, config.effective_title_cap())
    }

    /// Ephemeral engine with no backing file, for tests and tooling.
    pub fn in_memory() -> Result<Self> {
        Self::from_store(Store::in_memory(), crate::config::DEFAULT_TITLE_CAP)
    }

    fn from_store(store: Store, title_cap: usize) -> Result<Self> {
        let store = Arc::new(store);

        let mut graph = DependencyGraph::new();
        for task in store.list_tasks() {
            graph.add_task(task.id);
        }
        for edge in store.list_edges() {
            // Records were validated when first committed; re-adding
            // them in any order cannot introduce a cycle.
            graph.add_edge(edge.from, edge.to, edge.kind)?;
        }
        klog_debug!(
            "Engine opened: {} tasks, {} edges",
            graph.task_count(),
            graph.edge_count()
        );

        let parser =
            RequirementParser::new(crate::parser::ParserLexicon::default(), title_cap)?;
        Ok(Self {
            graph: Arc::new(RwLock::new(graph)),
            parser,
            coordinator: TriggerCoordinator::new(store.clone()),
            query: QueryService::new(store.clone()),
            store,
        })
    }

    /// The underlying store handle.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Subscribe to domain events.
    pub fn subscribe(&self) -> Receiver<DomainEvent> {
        self.store.subscribe()
    }

    /// Persist the current state to the backing file, if any.
    pub fn save(&self) -> Result<()> {
        self.store.save()
    }

    // ---- tasks ----

    /// Create a task.
    pub fn create_task(&self, new: NewTask) -> Result<Task> {
        let task = self.store.create_task(new)?;
        self.graph.write().unwrap().add_task(task.id);
        Ok(task)
    }

    /// Update a task under optimistic concurrency.
    pub fn update_task(&self, id: &TaskId, version: u64, patch: TaskPatch) -> Result<Task> {
        self.store.update_task(id, version, patch)
    }

    /// Get a task by id.
    pub fn get_task(&self, id: &TaskId) -> Result<Task> {
        self.store.get_task(id)
    }

    /// Delete a task along with its dependency edges.
    pub fn delete_task(&self, id: &TaskId) -> Result<()> {
        self.store.delete_task(id)?;
        self.graph.write().unwrap().remove_task(id);
        Ok(())
    }

    /// All tasks, ordered by creation time.
    pub fn list_tasks(&self) -> Vec<Task> {
        self.store.list_tasks()
    }

    // ---- projects ----

    /// Create a project.
    pub fn create_project(&self, new: NewProject) -> Result<Project> {
        self.store.create_project(new)
    }

    /// Get a project by id.
    pub fn get_project(&self, id: &ProjectId) -> Result<Project> {
        self.store.get_project(id)
    }

    /// Update a project under optimistic concurrency.
    pub fn update_project(
        &self,
        id: &ProjectId,
        version: u64,
        patch: ProjectPatch,
    ) -> Result<Project> {
        self.store.update_project(id, version, patch)
    }

    /// Delete a project that no task references anymore.
    pub fn delete_project(&self, id: &ProjectId) -> Result<()> {
        self.store.delete_project(id)
    }

    /// All projects.
    pub fn list_projects(&self) -> Vec<Project> {
        self.store.list_projects()
    }

    // ---- dependencies ----

    /// Add a dependency edge between two tasks.
    ///
    /// The cycle check and the insertion run atomically under the graph
    /// write lock; a rejected edge leaves graph and store unchanged.
    pub fn add_dependency(
        &self,
        task_id: &TaskId,
        depends_on: &TaskId,
        kind: EdgeKind,
    ) -> Result<DependencyEdge> {
        // Both tasks must exist in the store before touching the graph.
        self.store.get_task(task_id)?;
        self.store.get_task(depends_on)?;

        let mut graph = self.graph.write().unwrap();
        let edge = graph.add_edge(*task_id, *depends_on, kind)?;
        self.store.insert_edge(edge);
        Ok(edge)
    }

    /// Remove a dependency edge. Returns whether one existed.
    pub fn remove_dependency(
        &self,
        task_id: &TaskId,
        depends_on: &TaskId,
        kind: EdgeKind,
    ) -> Result<bool> {
        let mut graph = self.graph.write().unwrap();
        let removed = graph.remove_edge(*task_id, *depends_on, kind)?;
        if removed {
            // Mirror the normalization the graph applied.
            let (from, to, kind) = match kind {
                EdgeKind::BlockedBy => (*depends_on, *task_id, EdgeKind::Blocks),
                kind => (*task_id, *depends_on, kind),
            };
            self.store.remove_edge(&DependencyEdge { from, to, kind });
        }
        Ok(removed)
    }

    /// All stored dependency edges.
    pub fn list_dependencies(&self) -> Vec<DependencyEdge> {
        self.store.list_edges()
    }

    /// Critical path over the `blocks` subgraph.
    pub fn analyze_dependencies(&self) -> CriticalPath {
        let tasks = self.store.task_map();
        self.graph.read().unwrap().critical_path(&tasks)
    }

    /// All ready tasks: pending with no unfinished blocker.
    pub fn get_ready_tasks(&self) -> Vec<Task> {
        let tasks = self.store.task_map();
        let ready = self.graph.read().unwrap().ready_tasks(&tasks);
        ready
            .into_iter()
            .filter_map(|id| tasks.get(&id).cloned())
            .collect()
    }

    // ---- parsing ----

    /// Parse free text into a task draft plus complexity report.
    pub fn parse_natural_language(&self, text: &str, context: Option<&str>) -> ParsedRequirement {
        self.parser.parse(text, context)
    }

    /// Parse free text and persist the resulting draft as a task.
    pub fn create_task_from_text(&self, text: &str, context: Option<&str>) -> Result<Task> {
        let parsed = self.parser.parse(text, context);
        let draft = parsed.draft;
        self.create_task(NewTask {
            title: draft.title,
            description: draft.description,
            priority: Some(draft.priority),
            project_id: None,
            estimated_hours: None,
            tags: draft.tags,
            technical_requirements: draft.technical_requirements,
        })
    }

    // ---- triggers ----

    /// Create a workflow trigger for a task, idempotently.
    pub fn create_workflow_trigger(
        &self,
        task_id: &TaskId,
        trigger_type: TriggerType,
        configuration: BTreeMap<String, String>,
    ) -> Result<CreatedTrigger> {
        self.coordinator
            .create_trigger(*task_id, trigger_type, configuration)
    }

    /// Cancel a pending trigger.
    pub fn cancel_trigger(&self, id: &TriggerId) -> Result<WorkflowTrigger> {
        self.coordinator.cancel(id)
    }

    /// All triggers for a task, oldest first.
    pub fn list_triggers(&self, task_id: &TaskId) -> Vec<WorkflowTrigger> {
        self.coordinator.triggers_for_task(task_id)
    }

    /// Build a dispatch worker bound to this engine's store.
    pub fn trigger_worker(&self, executor: Arc<dyn ExternalTriggerExecutor>) -> TriggerWorker {
        TriggerWorker::new(self.store.clone(), executor)
    }

    // ---- queries ----

    /// Ranked case-insensitive task search.
    pub fn search_tasks(&self, query: &str, limit: usize) -> Vec<Task> {
        self.query.search_tasks(query, limit)
    }

    /// Status and priority histograms.
    pub fn get_task_statistics(&self) -> TaskStatistics {
        self.query.statistics()
    }
}
