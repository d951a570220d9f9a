//! Workflow triggers: records binding a task to an external workflow
//! invocation, with a forward-only dispatch state machine.
//!
//! A trigger is created once per (task, type) while a non-failed record
//! exists, which makes firing idempotent. A failed trigger is re-armed
//! by creating a new record, never by resetting the old one.

pub mod dispatch;

pub use dispatch::{ExecutionOutcome, ExternalTriggerExecutor, RetryConfig, TriggerWorker};

use crate::core::task::TaskId;
use crate::error::{Error, Result};
use crate::klog_debug;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a workflow trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(pub Uuid);

impl TriggerId {
    /// Create a new unique trigger identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TriggerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of external workflow a trigger fires.
///
/// Serialized as a plain string so collaborators can introduce new
/// kinds without a schema change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerType {
    /// Start automated code generation.
    Codegen,
    /// Call a webhook.
    Webhook,
    /// Any collaborator-defined workflow kind.
    Custom(String),
}

impl From<String> for TriggerType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "codegen" => TriggerType::Codegen,
            "webhook" => TriggerType::Webhook,
            _ => TriggerType::Custom(s),
        }
    }
}

impl From<&str> for TriggerType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<TriggerType> for String {
    fn from(t: TriggerType) -> Self {
        t.to_string()
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerType::Codegen => write!(f, "codegen"),
            TriggerType::Webhook => write!(f, "webhook"),
            TriggerType::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Dispatch state of a trigger.
///
/// Transitions are forward-only: pending -> dispatched -> succeeded or
/// failed. A pending trigger may also fail directly (cancellation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    #[default]
    Pending,
    Dispatched,
    Succeeded,
    Failed,
}

impl TriggerStatus {
    /// Check whether a transition to `target` is valid.
    pub fn can_transition(&self, target: TriggerStatus) -> bool {
        matches!(
            (self, target),
            (TriggerStatus::Pending, TriggerStatus::Dispatched)
                | (TriggerStatus::Pending, TriggerStatus::Failed)
                | (TriggerStatus::Dispatched, TriggerStatus::Succeeded)
                | (TriggerStatus::Dispatched, TriggerStatus::Failed)
        )
    }
}

impl std::fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerStatus::Pending => write!(f, "pending"),
            TriggerStatus::Dispatched => write!(f, "dispatched"),
            TriggerStatus::Succeeded => write!(f, "succeeded"),
            TriggerStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A workflow trigger record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub id: TriggerId,
    /// The task this trigger belongs to.
    pub task_id: TaskId,
    pub trigger_type: TriggerType,
    /// Opaque configuration interpreted by the external collaborator.
    pub configuration: BTreeMap<String, String>,
    pub status: TriggerStatus,
    /// Uniqueness key: one non-failed trigger per (task, type).
    pub dedupe_key: String,
    /// Reason recorded when the trigger fails.
    pub failure_reason: Option<String>,
    /// Number of dispatch attempts made so far.
    pub attempts: u32,
    /// Optimistic-concurrency version, starting at 1.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowTrigger {
    /// Create a new pending trigger for a task.
    pub fn new(
        task_id: TaskId,
        trigger_type: TriggerType,
        configuration: BTreeMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        let dedupe_key = Self::dedupe_key_for(&task_id, &trigger_type);
        Self {
            id: TriggerId::new(),
            task_id,
            trigger_type,
            configuration,
            status: TriggerStatus::Pending,
            dedupe_key,
            failure_reason: None,
            attempts: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// The dedupe key for a (task, type) pair.
    pub fn dedupe_key_for(task_id: &TaskId, trigger_type: &TriggerType) -> String {
        format!("{}:{}", task_id, trigger_type)
    }

    /// Advance the state machine.
    ///
    /// # Errors
    /// Returns `InvalidTriggerTransition` for anything but a valid
    /// forward step.
    pub fn transition(&mut self, target: TriggerStatus) -> Result<()> {
        if !self.status.can_transition(target) {
            return Err(Error::InvalidTriggerTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Result of a trigger creation request.
///
/// Re-issuing the same request while an active trigger exists returns
/// the existing record with `already_exists` set instead of creating a
/// second active trigger.
#[derive(Debug, Clone)]
pub struct CreatedTrigger {
    pub trigger: WorkflowTrigger,
    pub already_exists: bool,
}

/// Coordinates trigger creation and cancellation against the store.
///
/// Dispatch itself is handled asynchronously by a [`TriggerWorker`].
pub struct TriggerCoordinator {
    store: Arc<Store>,
}

impl TriggerCoordinator {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create a trigger for a task, idempotently.
    ///
    /// # Errors
    /// Returns `NotFound` if the task does not exist.
    pub fn create_trigger(
        &self,
        task_id: TaskId,
        trigger_type: TriggerType,
        configuration: BTreeMap<String, String>,
    ) -> Result<CreatedTrigger> {
        self.store.get_task(&task_id)?;

        if let Some(existing) = self.store.find_active_trigger(&task_id, &trigger_type) {
            klog_debug!(
                "Trigger already active for {}:{}, returning existing record {}",
                task_id.short(),
                trigger_type,
                existing.id.short()
            );
            return Ok(CreatedTrigger {
                trigger: existing,
                already_exists: true,
            });
        }

        let trigger = WorkflowTrigger::new(task_id, trigger_type, configuration);
        klog_debug!(
            "Trigger created: {} for task {}",
            trigger.id.short(),
            task_id.short()
        );
        let stored = self.store.insert_trigger(trigger);
        Ok(CreatedTrigger {
            trigger: stored,
            already_exists: false,
        })
    }

    /// Cancel a pending trigger.
    ///
    /// The record moves to `failed` with reason `"cancelled"`; the audit
    /// trail is preserved. A dispatched trigger cannot be cancelled.
    pub fn cancel(&self, id: &TriggerId) -> Result<WorkflowTrigger> {
        let trigger = self.store.get_trigger(id)?;
        match trigger.status {
            TriggerStatus::Pending => self.store.transition_trigger(
                id,
                TriggerStatus::Failed,
                Some("cancelled".to_string()),
            ),
            _ => Err(Error::TriggerNotCancellable(*id)),
        }
    }

    /// All triggers recorded for a task, oldest first.
    pub fn triggers_for_task(&self, task_id: &TaskId) -> Vec<WorkflowTrigger> {
        self.store.list_triggers_for_task(task_id)
    }
}
