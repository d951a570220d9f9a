//! Domain events published by the store.
//!
//! Every successful create/update/delete publishes an event. The trigger
//! coordinator consumes them internally; external collaborators can
//! subscribe through the same bus.

use crate::core::graph::EdgeKind;
use crate::core::project::ProjectId;
use crate::core::task::{TaskId, TaskStatus};
use crate::trigger::{TriggerId, TriggerStatus};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::RwLock;

/// A domain event describing a committed state change.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    TaskCreated {
        task_id: TaskId,
    },
    TaskUpdated {
        task_id: TaskId,
    },
    TaskStatusChanged {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    TaskDeleted {
        task_id: TaskId,
    },
    ProjectCreated {
        project_id: ProjectId,
    },
    DependencyAdded {
        from: TaskId,
        to: TaskId,
        kind: EdgeKind,
    },
    DependencyRemoved {
        from: TaskId,
        to: TaskId,
    },
    TriggerCreated {
        trigger_id: TriggerId,
        task_id: TaskId,
    },
    TriggerStatusChanged {
        trigger_id: TriggerId,
        from: TriggerStatus,
        to: TriggerStatus,
    },
}

/// Fan-out bus for domain events.
///
/// Subscribers get an unbounded channel so publishing never blocks a
/// store mutation. Disconnected subscribers are pruned on the next
/// publish.
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<DomainEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self) -> Receiver<DomainEvent> {
        let (tx, rx) = unbounded();
        if let Ok(mut subs) = self.subscribers.write() {
            subs.push(tx);
        }
        rx
    }

    /// Deliver an event to every live subscriber.
    pub fn publish(&self, event: DomainEvent) {
        if let Ok(mut subs) = self.subscribers.write() {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Number of live subscribers (primarily for tests).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
