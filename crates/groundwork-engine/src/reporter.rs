//! Convergence progress reporting

use std::time::Duration;

use crate::report::TaskOutcome;
use crate::task::TaskId;

/// Events emitted while a pass executes
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A task entered its pipeline
    Started { id: TaskId },
    /// A transient error scheduled a retry after a backoff delay
    Retrying {
        id: TaskId,
        attempt: u32,
        delay: Duration,
    },
    /// A task reached a successful terminal state
    Completed {
        id: TaskId,
        outcome: TaskOutcome,
        attempts: u32,
    },
    /// A task failed fatally
    Failed { id: TaskId, error: String },
    /// A task was blocked by a failed dependency and never attempted
    Blocked { id: TaskId },
    /// A collected deletion is executing
    DeletionStarted { task: TaskId, item: String },
    /// A deletion failed (best-effort; the pass outcome is unaffected)
    DeletionFailed {
        task: TaskId,
        item: String,
        error: String,
    },
    /// The pass finished
    PassCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
        blocked: usize,
        duration: Duration,
    },
}

/// Trait for observing convergence progress
pub trait Reporter: Send + Sync {
    fn report(&self, event: &EngineEvent);
}

/// Default reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &EngineEvent) {
        match event {
            EngineEvent::Started { id } => {
                tracing::debug!("starting {}", id);
            }
            EngineEvent::Retrying { id, attempt, delay } => {
                tracing::info!(
                    "{} not ready (attempt {}), retrying in {:.1}s",
                    id,
                    attempt,
                    delay.as_secs_f64()
                );
            }
            EngineEvent::Completed {
                id,
                outcome,
                attempts,
            } => {
                if *attempts > 1 {
                    tracing::info!("{} {} after {} attempts", id, outcome, attempts);
                } else {
                    tracing::info!("{} {}", id, outcome);
                }
            }
            EngineEvent::Failed { id, error } => {
                tracing::error!("{} failed: {}", id, error);
            }
            EngineEvent::Blocked { id } => {
                tracing::warn!("{} blocked by failed dependency", id);
            }
            EngineEvent::DeletionStarted { task, item } => {
                tracing::info!("deleting {} (from {})", item, task);
            }
            EngineEvent::DeletionFailed { task, item, error } => {
                tracing::warn!("failed deleting {} (from {}): {}", item, task, error);
            }
            EngineEvent::PassCompleted {
                total,
                succeeded,
                failed,
                blocked,
                duration,
            } => {
                tracing::info!(
                    "pass complete: {}/{} succeeded, {} failed, {} blocked ({:.1}s)",
                    succeeded,
                    total,
                    failed,
                    blocked,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: std::sync::Mutex<Vec<EngineEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, event: &EngineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::default();
        let id = TaskId::new("subnet", "a");

        reporter.report(&EngineEvent::Started { id: id.clone() });
        reporter.report(&EngineEvent::Completed {
            id,
            outcome: TaskOutcome::Created,
            attempts: 1,
        });

        assert_eq!(reporter.events().len(), 2);
    }

    #[test]
    fn test_tracing_reporter_does_not_panic() {
        let reporter = TracingReporter;
        let id = TaskId::new("subnet", "a");
        reporter.report(&EngineEvent::Retrying {
            id: id.clone(),
            attempt: 1,
            delay: Duration::from_millis(500),
        });
        reporter.report(&EngineEvent::Failed {
            id,
            error: "boom".to_string(),
        });
    }
}
