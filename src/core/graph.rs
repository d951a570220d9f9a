//! Dependency graph for task ordering.
//!
//! This module maintains the directed graph of task dependencies. The
//! `blocks` subgraph is kept acyclic at all times: every insertion runs a
//! reachability check first and a rejected edge leaves the graph
//! untouched. On top of the graph it computes the critical path (the
//! dependency chain with the largest summed estimate) and the ready
//! frontier (pending tasks with no unfinished blocker).

use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::store::EntityKind;
use chrono::{DateTime, Utc};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Type of dependency between two tasks.
///
/// `Blocks` and `BlockedBy` are the two views of the same logical edge;
/// `BlockedBy` input is normalized to the inverse `Blocks` record before
/// storage so the pair can never diverge. `Related` carries no ordering
/// constraint and is ignored by every `blocks` analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Blocks,
    BlockedBy,
    Related,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::Blocks => write!(f, "blocks"),
            EdgeKind::BlockedBy => write!(f, "blocked_by"),
            EdgeKind::Related => write!(f, "related"),
        }
    }
}

impl std::str::FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocks" => Ok(EdgeKind::Blocks),
            "blocked_by" => Ok(EdgeKind::BlockedBy),
            "related" => Ok(EdgeKind::Related),
            other => Err(format!("unknown edge kind: {}", other)),
        }
    }
}

/// A stored dependency edge in canonical form.
///
/// For `Blocks` edges, `from` must finish before `to` can proceed.
/// The `kind` is always `Blocks` or `Related`, never `BlockedBy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: TaskId,
    pub to: TaskId,
    pub kind: EdgeKind,
}

/// Result of a critical-path analysis over the `blocks` subgraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalPath {
    /// Task ids along the path, blockers first.
    pub path: Vec<TaskId>,
    /// Sum of estimated hours along the path.
    pub total_duration: f64,
}

impl CriticalPath {
    fn empty() -> Self {
        Self {
            path: Vec::new(),
            total_duration: 0.0,
        }
    }
}

/// The task dependency graph.
///
/// Nodes are task ids; edges carry their canonical `EdgeKind`. A side
/// index maps task ids to node indices for fast lookups. Node removal is
/// supported (tasks can be deleted), hence the stable graph.
pub struct DependencyGraph {
    graph: StableDiGraph<TaskId, EdgeKind>,
    node_index: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            node_index: HashMap::new(),
        }
    }

    /// Add a task node to the graph.
    ///
    /// If the task is already present, returns the existing node index.
    pub fn add_task(&mut self, id: TaskId) -> NodeIndex {
        if let Some(&index) = self.node_index.get(&id) {
            return index;
        }
        let index = self.graph.add_node(id);
        self.node_index.insert(id, index);
        index
    }

    /// Remove a task node and all its incident edges.
    pub fn remove_task(&mut self, id: &TaskId) {
        if let Some(index) = self.node_index.remove(id) {
            self.graph.remove_node(index);
        }
    }

    /// Check if the graph contains a task.
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.node_index.contains_key(id)
    }

    /// Get the number of task nodes in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependency edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Add a dependency edge between two tasks.
    ///
    /// `BlockedBy` input is normalized to the inverse `Blocks` record.
    /// For `Blocks` edges the insertion is guarded by a reachability
    /// check: if the dependent already reaches the blocker along
    /// existing `blocks` edges, the edge would close a cycle and the
    /// call fails with `CycleDetected`, leaving the graph unchanged.
    /// `Related` edges skip the check. Re-adding an existing edge is an
    /// idempotent no-op returning the stored record.
    ///
    /// # Errors
    /// Returns `NotFound` if either task is not in the graph and
    /// `CycleDetected` if the edge would violate acyclicity.
    pub fn add_edge(&mut self, from: TaskId, to: TaskId, kind: EdgeKind) -> Result<DependencyEdge> {
        let (from, to, kind) = normalize(from, to, kind);

        let from_index = self.index_of(&from)?;
        let to_index = self.index_of(&to)?;

        if let Some(existing) = self.find_edge(from_index, to_index, kind) {
            return Ok(existing);
        }

        if kind == EdgeKind::Blocks {
            // A blocks edge from -> to closes a cycle exactly when the
            // dependent already reaches the blocker.
            if from == to || self.reachable(to_index, from_index) {
                return Err(Error::CycleDetected { from, to });
            }
        }

        self.graph.add_edge(from_index, to_index, kind);
        Ok(DependencyEdge { from, to, kind })
    }

    /// Remove a dependency edge. Returns whether an edge was removed.
    ///
    /// Accepts any of the three kinds; `BlockedBy` is normalized the
    /// same way as on insertion.
    pub fn remove_edge(&mut self, from: TaskId, to: TaskId, kind: EdgeKind) -> Result<bool> {
        let (from, to, kind) = normalize(from, to, kind);
        let from_index = self.index_of(&from)?;
        let to_index = self.index_of(&to)?;

        let edge = self
            .graph
            .edges_directed(from_index, Direction::Outgoing)
            .find(|e| e.target() == to_index && *e.weight() == kind)
            .map(|e| e.id());

        match edge {
            Some(id) => {
                self.graph.remove_edge(id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// All stored edges, in canonical form.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.graph
            .edge_indices()
            .filter_map(|e| {
                let (a, b) = self.graph.edge_endpoints(e)?;
                Some(DependencyEdge {
                    from: *self.graph.node_weight(a)?,
                    to: *self.graph.node_weight(b)?,
                    kind: *self.graph.edge_weight(e)?,
                })
            })
            .collect()
    }

    /// Tasks that must finish before the given task (incoming blocks edges).
    pub fn blockers(&self, id: &TaskId) -> Vec<TaskId> {
        self.adjacent(id, Direction::Incoming)
    }

    /// Tasks waiting on the given task (outgoing blocks edges).
    pub fn dependents(&self, id: &TaskId) -> Vec<TaskId> {
        self.adjacent(id, Direction::Outgoing)
    }

    /// Compute the critical path over the `blocks` subgraph.
    ///
    /// Runs Kahn's algorithm for a topological order (cycles are
    /// impossible here because insertion forbids them) and a single
    /// dynamic-programming pass accumulating the max cumulative duration
    /// ending at each node. Ties are broken by earliest `created_at`,
    /// then by task id. An edge-free graph degrades to the single
    /// heaviest task; an empty graph yields an empty path.
    pub fn critical_path(&self, tasks: &HashMap<TaskId, Task>) -> CriticalPath {
        let order = self.topological_order();
        if order.is_empty() {
            return CriticalPath::empty();
        }

        let mut best: HashMap<NodeIndex, f64> = HashMap::new();
        let mut prev: HashMap<NodeIndex, NodeIndex> = HashMap::new();

        for &node in &order {
            let id = match self.graph.node_weight(node) {
                Some(id) => id,
                None => continue,
            };
            let own = tasks.get(id).map(Task::duration).unwrap_or(0.0);

            let mut chosen: Option<NodeIndex> = None;
            for edge in self.graph.edges_directed(node, Direction::Incoming) {
                if *edge.weight() != EdgeKind::Blocks {
                    continue;
                }
                let pred = edge.source();
                if self.prefer(pred, chosen, &best, tasks) {
                    chosen = Some(pred);
                }
            }

            let base = chosen.map(|p| best[&p]).unwrap_or(0.0);
            best.insert(node, base + own);
            if let Some(p) = chosen {
                prev.insert(node, p);
            }
        }

        // The path ends at the node with the largest accumulated total.
        let mut end: Option<NodeIndex> = None;
        for &node in &order {
            if self.prefer(node, end, &best, tasks) {
                end = Some(node);
            }
        }

        let end = match end {
            Some(end) => end,
            None => return CriticalPath::empty(),
        };

        let mut path = Vec::new();
        let mut cursor = Some(end);
        while let Some(node) = cursor {
            if let Some(id) = self.graph.node_weight(node) {
                path.push(*id);
            }
            cursor = prev.get(&node).copied();
        }
        path.reverse();

        CriticalPath {
            total_duration: best.get(&end).copied().unwrap_or(0.0),
            path,
        }
    }

    /// Return ids of all ready tasks.
    ///
    /// A task is ready when it is pending and every incoming `blocks`
    /// edge comes from a completed or cancelled task. Tasks with no
    /// blockers are trivially ready. The result is ordered by creation
    /// time, then id.
    pub fn ready_tasks(&self, tasks: &HashMap<TaskId, Task>) -> Vec<TaskId> {
        let mut ready: Vec<&Task> = self
            .graph
            .node_indices()
            .filter_map(|node| {
                let task = tasks.get(self.graph.node_weight(node)?)?;
                if task.status != TaskStatus::Pending {
                    return None;
                }

                let unblocked = self
                    .graph
                    .edges_directed(node, Direction::Incoming)
                    .filter(|e| *e.weight() == EdgeKind::Blocks)
                    .all(|e| {
                        self.graph
                            .node_weight(e.source())
                            .and_then(|id| tasks.get(id))
                            .map(|t| t.status.satisfies_dependency())
                            .unwrap_or(false)
                    });

                unblocked.then_some(task)
            })
            .collect();

        ready.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        ready.into_iter().map(|t| t.id).collect()
    }

    /// Whether `to` is reachable from `from` along `blocks` edges.
    fn reachable(&self, from: NodeIndex, to: NodeIndex) -> bool {
        if from == to {
            return true;
        }
        let mut visited = vec![from];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                if *edge.weight() != EdgeKind::Blocks {
                    continue;
                }
                let next = edge.target();
                if next == to {
                    return true;
                }
                if !visited.contains(&next) {
                    visited.push(next);
                    stack.push(next);
                }
            }
        }
        false
    }

    /// Topological order of all nodes with respect to `blocks` edges
    /// (Kahn's algorithm). Nodes untouched by blocks edges appear too.
    fn topological_order(&self) -> Vec<NodeIndex> {
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        for node in self.graph.node_indices() {
            let degree = self
                .graph
                .edges_directed(node, Direction::Incoming)
                .filter(|e| *e.weight() == EdgeKind::Blocks)
                .count();
            in_degree.insert(node, degree);
        }

        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| in_degree.get(n) == Some(&0))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                if *edge.weight() != EdgeKind::Blocks {
                    continue;
                }
                let target = edge.target();
                if let Some(degree) = in_degree.get_mut(&target) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(target);
                    }
                }
            }
        }
        order
    }

    /// Decide whether `candidate` beats `current` as a path endpoint or
    /// predecessor: larger accumulated total first, then earliest
    /// creation time, then smallest id.
    fn prefer(
        &self,
        candidate: NodeIndex,
        current: Option<NodeIndex>,
        best: &HashMap<NodeIndex, f64>,
        tasks: &HashMap<TaskId, Task>,
    ) -> bool {
        let current = match current {
            Some(current) => current,
            None => return true,
        };
        let cand_total = best.get(&candidate).copied().unwrap_or(0.0);
        let cur_total = best.get(&current).copied().unwrap_or(0.0);

        match cand_total.total_cmp(&cur_total) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.tie_key(candidate, tasks) < self.tie_key(current, tasks),
        }
    }

    fn tie_key(&self, node: NodeIndex, tasks: &HashMap<TaskId, Task>) -> (DateTime<Utc>, TaskId) {
        let id = self.graph.node_weight(node).copied().unwrap_or_default();
        let created = tasks
            .get(&id)
            .map(|t| t.created_at)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        (created, id)
    }

    fn index_of(&self, id: &TaskId) -> Result<NodeIndex> {
        self.node_index
            .get(id)
            .copied()
            .ok_or_else(|| Error::NotFound {
                kind: EntityKind::Task,
                id: id.to_string(),
            })
    }

    fn find_edge(&self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) -> Option<DependencyEdge> {
        let exists = self
            .graph
            .edges_directed(from, Direction::Outgoing)
            .any(|e| e.target() == to && *e.weight() == kind);
        if !exists {
            return None;
        }
        Some(DependencyEdge {
            from: *self.graph.node_weight(from)?,
            to: *self.graph.node_weight(to)?,
            kind,
        })
    }

    fn adjacent(&self, id: &TaskId, direction: Direction) -> Vec<TaskId> {
        let index = match self.node_index.get(id) {
            Some(&index) => index,
            None => return Vec::new(),
        };
        self.graph
            .edges_directed(index, direction)
            .filter(|e| *e.weight() == EdgeKind::Blocks)
            .filter_map(|e| {
                let other = if direction == Direction::Incoming {
                    e.source()
                } else {
                    e.target()
                };
                self.graph.node_weight(other).copied()
            })
            .collect()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse `BlockedBy` into the inverse `Blocks` record.
fn normalize(from: TaskId, to: TaskId, kind: EdgeKind) -> (TaskId, TaskId, EdgeKind) {
    match kind {
        EdgeKind::BlockedBy => (to, from, EdgeKind::Blocks),
        kind => (from, to, kind),
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("tasks", &self.task_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}
