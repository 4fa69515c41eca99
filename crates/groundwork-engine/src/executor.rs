//! Convergence executor: drives the task graph with bounded parallelism

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use groundwork_core::{diff_states, EngineConfig, EngineError, Lifecycle, Result};

use crate::context::Context;
use crate::graph::TaskGraph;
use crate::report::{ConvergenceReport, TaskOutcome, TaskReport};
use crate::reporter::{EngineEvent, Reporter, TracingReporter};
use crate::target::Target;
use crate::task::{Task, TaskId, TaskSet};

/// Tunables for one executor
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Maximum tasks rendered concurrently
    pub max_parallel: usize,
    /// Attempt budget for transient (try-again-later) errors
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt
    pub backoff_base: Duration,
    /// Retry delay ceiling
    pub backoff_max: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl ExecutorOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_parallel: config.max_parallel,
            max_attempts: config.max_attempts,
            backoff_base: config.backoff_base(),
            backoff_max: config.backoff_max(),
        }
    }
}

/// Cooperative cancellation handle for a pass.
///
/// Cancelling lets in-flight tasks finish their current step but dispatches
/// nothing new; partially-applied state is left for the next pass to
/// reconcile. Cancellation is not a rollback.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Executes a convergence pass: every task renders strictly after its
/// dependencies render successfully, independent subgraphs interleave
/// freely, and already-applied mutations are never rolled back.
pub struct Executor {
    options: ExecutorOptions,
    reporter: Arc<dyn Reporter>,
    cancel: CancelToken,
}

impl Executor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self::with_reporter(options, Arc::new(TracingReporter))
    }

    pub fn with_reporter(options: ExecutorOptions, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            options,
            reporter,
            cancel: CancelToken::new(),
        }
    }

    /// Handle for cancelling this executor's pass from another task
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run one convergence pass over the task set.
    ///
    /// Returns `Err` only for configuration problems detected before any
    /// mutation (cycles, unknown dependencies). Task failures are
    /// aggregated into the report; the caller checks
    /// [`ConvergenceReport::has_failures`].
    pub async fn run(
        &self,
        ctx: Arc<Context>,
        target: Arc<Target>,
        tasks: &TaskSet,
    ) -> Result<ConvergenceReport> {
        let start = Instant::now();
        let graph = TaskGraph::build(tasks)?;

        let mut in_degree = graph.in_degrees();
        let mut ready: VecDeque<TaskId> = graph
            .sorted()
            .iter()
            .filter(|id| in_degree[*id] == 0)
            .cloned()
            .collect();
        let mut reports: HashMap<TaskId, TaskReport> = HashMap::new();
        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel));
        let mut joinset: JoinSet<(TaskId, u32, Result<TaskOutcome>)> = JoinSet::new();
        let mut inflight: HashMap<tokio::task::Id, TaskId> = HashMap::new();
        let mut running = 0usize;

        loop {
            while !self.cancel.is_cancelled() {
                let Some(id) = ready.pop_front() else { break };
                let Some(task) = tasks.get(&id).cloned() else {
                    continue;
                };
                let ctx = ctx.clone();
                let target = target.clone();
                let options = self.options.clone();
                let reporter = self.reporter.clone();
                let semaphore = semaphore.clone();

                let handle = joinset.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.unwrap();
                    reporter.report(&EngineEvent::Started { id: task.id() });
                    let mut attempts = 0;
                    let result =
                        run_task(&task, &ctx, &target, &options, &*reporter, &mut attempts).await;
                    (task.id(), attempts, result)
                });
                inflight.insert(handle.id(), id);
                running += 1;
            }

            if running == 0 {
                break;
            }

            let (id, attempts, result) = match joinset.join_next_with_id().await {
                Some(Ok((join_id, output))) => {
                    inflight.remove(&join_id);
                    output
                }
                Some(Err(join_err)) => {
                    let id = inflight
                        .remove(&join_err.id())
                        .unwrap_or_else(|| TaskId::new("unknown", "unknown"));
                    (
                        id,
                        0,
                        Err(EngineError::other(format!("task panicked: {join_err}"))),
                    )
                }
                None => break,
            };
            running -= 1;

            match result {
                Ok(outcome) => {
                    self.reporter.report(&EngineEvent::Completed {
                        id: id.clone(),
                        outcome,
                        attempts,
                    });
                    reports.insert(
                        id.clone(),
                        TaskReport {
                            id: id.clone(),
                            outcome,
                            attempts,
                            error: None,
                        },
                    );
                    for dependent in graph.dependents_of(&id) {
                        if reports.contains_key(dependent) {
                            continue;
                        }
                        if let Some(degree) = in_degree.get_mut(dependent) {
                            *degree = degree.saturating_sub(1);
                            if *degree == 0 {
                                ready.push_back(dependent.clone());
                            }
                        }
                    }
                }
                Err(error) => {
                    warn!(task = %id, %error, "task failed");
                    self.reporter.report(&EngineEvent::Failed {
                        id: id.clone(),
                        error: error.to_string(),
                    });
                    reports.insert(
                        id.clone(),
                        TaskReport {
                            id: id.clone(),
                            outcome: TaskOutcome::Failed,
                            attempts,
                            error: Some(error.to_string()),
                        },
                    );
                    self.block_dependents(&graph, &id, &mut reports, &mut in_degree);
                }
            }
        }

        // Tasks never dispatched (cancellation) reach a terminal state too
        for id in graph.sorted() {
            if !reports.contains_key(id) {
                self.reporter.report(&EngineEvent::Blocked { id: id.clone() });
                reports.insert(
                    id.clone(),
                    TaskReport {
                        id: id.clone(),
                        outcome: TaskOutcome::Blocked,
                        attempts: 0,
                        error: Some("convergence pass cancelled".to_string()),
                    },
                );
            }
        }

        let mut report = ConvergenceReport::default();
        for id in graph.sorted() {
            if let Some(task_report) = reports.remove(id) {
                report.push(task_report);
            }
        }

        self.run_deletions(&ctx, &target, &semaphore, &mut report)
            .await;

        let succeeded = report.tasks().iter().filter(|t| t.outcome.is_success()).count();
        self.reporter.report(&EngineEvent::PassCompleted {
            total: report.tasks().len(),
            succeeded,
            failed: report.count(TaskOutcome::Failed),
            blocked: report.count(TaskOutcome::Blocked),
            duration: start.elapsed(),
        });

        Ok(report)
    }

    /// Mark every transitive dependent of a failed task as blocked;
    /// independent branches keep executing
    fn block_dependents(
        &self,
        graph: &TaskGraph,
        failed: &TaskId,
        reports: &mut HashMap<TaskId, TaskReport>,
        in_degree: &mut HashMap<TaskId, usize>,
    ) {
        let mut queue: VecDeque<TaskId> = graph.dependents_of(failed).cloned().collect();
        while let Some(id) = queue.pop_front() {
            if reports.contains_key(&id) {
                continue;
            }
            self.reporter.report(&EngineEvent::Blocked { id: id.clone() });
            reports.insert(
                id.clone(),
                TaskReport {
                    id: id.clone(),
                    outcome: TaskOutcome::Blocked,
                    attempts: 0,
                    error: Some(format!("blocked by failed dependency {failed}")),
                },
            );
            in_degree.remove(&id);
            queue.extend(graph.dependents_of(&id).cloned());
        }
    }

    /// Unordered second pass over collected deletions: the regular batch
    /// first, then deferred ones. Failures are recorded, never fatal.
    async fn run_deletions(
        &self,
        ctx: &Context,
        target: &Arc<Target>,
        semaphore: &Arc<Semaphore>,
        report: &mut ConvergenceReport,
    ) {
        let deletions = ctx.take_deletions();
        if deletions.is_empty() {
            return;
        }
        debug!(count = deletions.len(), "running collected deletions");

        let (regular, deferred): (Vec<_>, Vec<_>) =
            deletions.into_iter().partition(|d| !d.deferred());

        for batch in [regular, deferred] {
            let mut joinset: JoinSet<(TaskId, String, Result<()>)> = JoinSet::new();
            for deletion in batch {
                let target = target.clone();
                let reporter = self.reporter.clone();
                let semaphore = semaphore.clone();
                joinset.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.unwrap();
                    reporter.report(&EngineEvent::DeletionStarted {
                        task: deletion.task_id(),
                        item: deletion.item(),
                    });
                    let result = deletion.delete(&target).await;
                    (deletion.task_id(), deletion.item(), result)
                });
            }
            while let Some(joined) = joinset.join_next().await {
                match joined {
                    Ok((_, item, Ok(()))) => {
                        debug!(%item, "deleted");
                    }
                    Ok((task, item, Err(error))) => {
                        self.reporter.report(&EngineEvent::DeletionFailed {
                            task: task.clone(),
                            item: item.clone(),
                            error: error.to_string(),
                        });
                        report
                            .push_deletion_error(format!("deleting {item} (from {task}): {error}"));
                    }
                    Err(join_err) => {
                        report.push_deletion_error(format!("deletion panicked: {join_err}"));
                    }
                }
            }
        }
    }
}

/// Drive one task from observed to desired state.
///
/// Pipeline: lifecycle gate -> normalize -> find -> collect deletions ->
/// diff -> check_changes -> render (with bounded retries on transient
/// errors) -> verify the change set drained.
async fn run_task(
    task: &Arc<dyn Task>,
    ctx: &Context,
    target: &Target,
    options: &ExecutorOptions,
    reporter: &dyn Reporter,
    attempts: &mut u32,
) -> Result<TaskOutcome> {
    let id = task.id();

    if task.lifecycle() == Lifecycle::Ignore {
        debug!(task = %id, "lifecycle is ignore, skipping");
        return Ok(TaskOutcome::NoOp);
    }

    task.normalize(ctx).await?;

    // Text emission never consults live state: every resource is a create,
    // emitted exactly once in dependency order
    let actual = if target.is_text() {
        None
    } else {
        task.find(ctx).await?
    };

    for deletion in task.find_deletions(ctx) {
        ctx.add_deletion(deletion);
    }

    let desired = task.desired()?;
    let changes = diff_states(&task.diff_schema(), actual.as_ref(), &desired)?;

    match task.lifecycle() {
        Lifecycle::ExistsAndValidates => {
            return if actual.is_none() {
                Err(EngineError::Lifecycle {
                    task: id.to_string(),
                    message: "resource does not exist".to_string(),
                })
            } else if !changes.is_empty() {
                Err(EngineError::Lifecycle {
                    task: id.to_string(),
                    message: format!("resource does not match desired state: {}", changes.describe()),
                })
            } else {
                Ok(TaskOutcome::NoOp)
            };
        }
        Lifecycle::ExistsIfPresent if actual.is_some() => {
            if !changes.is_empty() {
                warn!(task = %id, changes = %changes.describe(), "existing resource diverges, leaving as-is");
            }
            return Ok(TaskOutcome::NoOp);
        }
        _ => {}
    }

    task.check_changes(actual.as_ref(), &changes)?;

    let creating = actual.is_none();
    if !creating && changes.is_empty() {
        debug!(task = %id, "no changes");
        return Ok(TaskOutcome::NoOp);
    }

    loop {
        *attempts += 1;
        // Render drains what it applies; retries start from a fresh copy
        let mut pending = changes.clone();
        let rendered = match target {
            Target::Api(api) => task.render_api(api, actual.as_ref(), &mut pending).await,
            Target::Text(text) => task.render_text(text, &mut pending),
        };
        match rendered {
            Ok(()) => {
                if !pending.is_empty() {
                    return Err(EngineError::UnappliedChanges {
                        task: id.to_string(),
                        fields: pending.fields().join(", "),
                    });
                }
                return Ok(if creating {
                    TaskOutcome::Created
                } else {
                    TaskOutcome::Updated
                });
            }
            Err(error) if error.is_transient() && *attempts < options.max_attempts => {
                let delay = backoff_delay(options, *attempts);
                reporter.report(&EngineEvent::Retrying {
                    id: id.clone(),
                    attempt: *attempts,
                    delay,
                });
                warn!(task = %id, attempt = *attempts, delay_ms = delay.as_millis() as u64, %error, "not ready, backing off");
                tokio::time::sleep(delay).await;
            }
            Err(EngineError::TryAgainLater(message)) => {
                return Err(EngineError::RetriesExhausted {
                    task: id.to_string(),
                    attempts: *attempts,
                    message,
                });
            }
            Err(error) => return Err(error),
        }
    }
}

/// Exponential backoff: base doubles per attempt, capped at the maximum
fn backoff_delay(options: &ExecutorOptions, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    options
        .backoff_base
        .saturating_mul(1u32 << exponent)
        .min(options.backoff_max)
}
