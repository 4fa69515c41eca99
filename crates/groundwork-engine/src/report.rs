//! Convergence pass report

use serde::Serialize;

use crate::task::TaskId;

/// Terminal state of one task after a convergence pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskOutcome {
    /// Actual state already matched desired state
    NoOp,
    /// The resource did not exist and was created
    Created,
    /// The resource existed and divergent fields were applied
    Updated,
    /// The task failed fatally
    Failed,
    /// A dependency failed, so this task was never attempted
    Blocked,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::NoOp | Self::Created | Self::Updated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoOp => "no-op",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-task record in the convergence report
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub outcome: TaskOutcome,
    /// Render attempts consumed (0 when render never ran)
    pub attempts: u32,
    pub error: Option<String>,
}

/// Structured result of a convergence pass, in deterministic graph order.
///
/// The caller uses [`ConvergenceReport::has_failures`] for exit-status
/// determination; a failed pass means re-run after remediation, and the
/// idempotent design re-attempts only the unresolved subset.
#[derive(Debug, Default, Serialize)]
pub struct ConvergenceReport {
    tasks: Vec<TaskReport>,
    deletion_errors: Vec<String>,
}

impl ConvergenceReport {
    pub(crate) fn push(&mut self, report: TaskReport) {
        self.tasks.push(report);
    }

    pub(crate) fn push_deletion_error(&mut self, error: String) {
        self.deletion_errors.push(error);
    }

    pub fn tasks(&self) -> &[TaskReport] {
        &self.tasks
    }

    pub fn outcome_of(&self, id: &TaskId) -> Option<TaskOutcome> {
        self.tasks.iter().find(|t| t.id == *id).map(|t| t.outcome)
    }

    /// Deletion failures are best-effort cleanup problems: reported here
    /// but not counted as pass failures
    pub fn deletion_errors(&self) -> &[String] {
        &self.deletion_errors
    }

    /// Whether any task failed or was blocked
    pub fn has_failures(&self) -> bool {
        self.tasks.iter().any(|t| !t.outcome.is_success())
    }

    /// All unresolved errors, aggregated across independent branches
    pub fn errors(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter_map(|t| {
                t.error
                    .as_ref()
                    .map(|e| format!("{}: {}", t.id, e))
            })
            .collect()
    }

    pub fn count(&self, outcome: TaskOutcome) -> usize {
        self.tasks.iter().filter(|t| t.outcome == outcome).count()
    }

    /// One-line summary for display
    pub fn summary(&self) -> String {
        format!(
            "{} tasks: {} unchanged, {} created, {} updated, {} failed, {} blocked",
            self.tasks.len(),
            self.count(TaskOutcome::NoOp),
            self.count(TaskOutcome::Created),
            self.count(TaskOutcome::Updated),
            self.count(TaskOutcome::Failed),
            self.count(TaskOutcome::Blocked),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, outcome: TaskOutcome, error: Option<&str>) -> TaskReport {
        TaskReport {
            id: TaskId::new("stub", name),
            outcome,
            attempts: 1,
            error: error.map(String::from),
        }
    }

    #[test]
    fn test_has_failures() {
        let mut report = ConvergenceReport::default();
        report.push(entry("a", TaskOutcome::Created, None));
        report.push(entry("b", TaskOutcome::NoOp, None));
        assert!(!report.has_failures());

        report.push(entry("c", TaskOutcome::Blocked, Some("blocked by stub:a")));
        assert!(report.has_failures());
    }

    #[test]
    fn test_deletion_errors_do_not_fail_pass() {
        let mut report = ConvergenceReport::default();
        report.push(entry("a", TaskOutcome::Updated, None));
        report.push_deletion_error("deleting stale-attachment: gone wrong".to_string());
        assert!(!report.has_failures());
        assert_eq!(report.deletion_errors().len(), 1);
    }

    #[test]
    fn test_errors_aggregated_with_task_ids() {
        let mut report = ConvergenceReport::default();
        report.push(entry("a", TaskOutcome::Failed, Some("boom")));
        report.push(entry("b", TaskOutcome::Failed, Some("bang")));
        let errors = report.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("stub:a"));
    }

    #[test]
    fn test_summary_counts() {
        let mut report = ConvergenceReport::default();
        report.push(entry("a", TaskOutcome::NoOp, None));
        report.push(entry("b", TaskOutcome::Created, None));
        let summary = report.summary();
        assert!(summary.contains("1 unchanged"));
        assert!(summary.contains("1 created"));
    }
}
