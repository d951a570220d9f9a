//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Building engines with pre-populated tasks
//! - A scripted trigger executor with recorded calls

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use kanri::core::graph::EdgeKind;
use kanri::core::task::{Task, TaskId};
use kanri::store::NewTask;
use kanri::trigger::{ExecutionOutcome, ExternalTriggerExecutor, TriggerId, WorkflowTrigger};
use kanri::Engine;

/// Create an in-memory engine.
pub fn engine() -> Engine {
    Engine::in_memory().expect("failed to build engine")
}

/// Create a task with an effort estimate.
pub fn task_with_hours(engine: &Engine, title: &str, hours: f64) -> Task {
    let mut new = NewTask::new(title);
    new.estimated_hours = Some(hours);
    engine.create_task(new).expect("failed to create task")
}

/// Create a blocks chain a -> b -> c -> ... from (title, hours) specs
/// and return the task ids in chain order.
pub fn chain(engine: &Engine, specs: &[(&str, f64)]) -> Vec<TaskId> {
    let ids: Vec<TaskId> = specs
        .iter()
        .map(|(title, hours)| task_with_hours(engine, title, *hours).id)
        .collect();
    for pair in ids.windows(2) {
        engine
            .add_dependency(&pair[0], &pair[1], EdgeKind::Blocks)
            .expect("failed to add chain dependency");
    }
    ids
}

/// Empty trigger configuration.
pub fn no_config() -> BTreeMap<String, String> {
    BTreeMap::new()
}

/// Executor that replays a scripted sequence of outcomes and records
/// every trigger id it is asked to execute.
pub struct ScriptedExecutor {
    script: Mutex<Vec<ExecutionOutcome>>,
    calls: Mutex<Vec<TriggerId>>,
}

impl ScriptedExecutor {
    /// Executor that always succeeds.
    pub fn succeeding() -> Arc<Self> {
        Self::with_script(vec![])
    }

    /// Executor that replays `script`, then succeeds.
    pub fn with_script(script: Vec<ExecutionOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<TriggerId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExternalTriggerExecutor for ScriptedExecutor {
    async fn execute(&self, trigger: &WorkflowTrigger) -> ExecutionOutcome {
        self.calls.lock().unwrap().push(trigger.id);
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            ExecutionOutcome::Success
        } else {
            script.remove(0)
        }
    }
}
