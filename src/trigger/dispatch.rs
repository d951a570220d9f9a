//! Asynchronous trigger dispatch.
//!
//! The worker pulls pending triggers from the store and hands each one
//! to a collaborator-supplied executor. Transient failures are retried
//! with bounded exponential backoff; permanent failures are recorded
//! and never retried. Retry state lives on the trigger record, not in
//! transient memory, so a restarted worker picks up where it left off.

use crate::error::Result;
use crate::store::Store;
use crate::trigger::{TriggerId, TriggerStatus, WorkflowTrigger};
use crate::{klog_debug, klog_warn};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Outcome reported by an external executor for one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The external workflow was started successfully.
    Success,
    /// A network-class failure worth retrying.
    TransientFailure(String),
    /// A collaborator-reported failure that must not be retried.
    PermanentFailure(String),
}

/// The single capability the core consumes: fire an external trigger.
///
/// Supplied by the platform-integration layer (CI runners, webhook
/// senders); the core never embeds vendor-specific dispatch logic.
#[async_trait]
pub trait ExternalTriggerExecutor: Send + Sync {
    async fn execute(&self, trigger: &WorkflowTrigger) -> ExecutionOutcome;
}

/// Bounded exponential backoff settings for transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Delay before the given retry. The first retry waits
    /// `initial_delay`; each further retry multiplies it, capped at
    /// `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Worker that dispatches pending triggers.
///
/// `run` polls the store until the cancellation token fires. Dispatch
/// failures are isolated to the trigger record; the owning task is
/// never mutated.
pub struct TriggerWorker {
    store: Arc<Store>,
    executor: Arc<dyn ExternalTriggerExecutor>,
    retry: RetryConfig,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl TriggerWorker {
    pub fn new(store: Arc<Store>, executor: Arc<dyn ExternalTriggerExecutor>) -> Self {
        Self {
            store,
            executor,
            retry: RetryConfig::default(),
            poll_interval: Duration::from_millis(250),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Token that stops the run loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Poll-and-dispatch loop. Returns when the shutdown token fires.
    pub async fn run(&self) {
        klog_debug!("TriggerWorker started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    klog_debug!("TriggerWorker shutting down");
                    return;
                }
                _ = sleep(self.poll_interval) => {
                    self.drain_pending().await;
                }
            }
        }
    }

    /// Dispatch every currently pending trigger once. Returns how many
    /// reached a terminal or dispatched state.
    pub async fn drain_pending(&self) -> usize {
        let pending = self.store.pending_triggers();
        let mut handled = 0;
        for trigger in pending {
            match self.dispatch(&trigger.id).await {
                Ok(_) => handled += 1,
                Err(err) => {
                    // A trigger can be cancelled between the poll and the
                    // dispatch; that is not a worker failure.
                    klog_warn!("Dispatch of {} skipped: {}", trigger.id.short(), err);
                }
            }
        }
        handled
    }

    /// Dispatch a single trigger through the executor.
    ///
    /// # Errors
    /// Returns an error only when the trigger cannot enter the
    /// `dispatched` state (unknown id, already cancelled or dispatched).
    /// Executor failures are recorded on the trigger, never surfaced.
    pub async fn dispatch(&self, id: &TriggerId) -> Result<WorkflowTrigger> {
        let trigger = self
            .store
            .transition_trigger(id, TriggerStatus::Dispatched, None)?;
        klog_debug!(
            "Dispatching trigger {} ({}) for task {}",
            trigger.id.short(),
            trigger.trigger_type,
            trigger.task_id.short()
        );

        loop {
            let attempt = self.store.record_trigger_attempt(id)?;
            match self.executor.execute(&trigger).await {
                ExecutionOutcome::Success => {
                    return self
                        .store
                        .transition_trigger(id, TriggerStatus::Succeeded, None);
                }
                ExecutionOutcome::PermanentFailure(reason) => {
                    klog_warn!("Trigger {} failed permanently: {}", id.short(), reason);
                    return self
                        .store
                        .transition_trigger(id, TriggerStatus::Failed, Some(reason));
                }
                ExecutionOutcome::TransientFailure(reason) => {
                    if attempt >= self.retry.max_attempts {
                        klog_warn!(
                            "Trigger {} failed after {} attempts: {}",
                            id.short(),
                            attempt,
                            reason
                        );
                        return self
                            .store
                            .transition_trigger(id, TriggerStatus::Failed, Some(reason));
                    }
                    let delay = self.retry.delay_for(attempt);
                    klog_debug!(
                        "Trigger {} attempt {} failed transiently, retrying in {:?}: {}",
                        id.short(),
                        attempt,
                        delay,
                        reason
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
