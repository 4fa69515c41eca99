//! Deferred cleanup actions surfaced by tasks

use async_trait::async_trait;

use groundwork_core::Result;

use crate::target::Target;
use crate::task::TaskId;

/// A best-effort cleanup action outside the primary dependency graph.
///
/// Deletions are surfaced during `find` (typically a resource attachment
/// present in the cloud but absent from desired state) and run unordered
/// after every primary task has reached a terminal state. They must be
/// idempotent: deleting something already gone is a success. A deletion
/// failure is reported but never rolls back applied primary changes.
#[async_trait]
pub trait Deletion: Send + Sync {
    /// The task that surfaced this deletion
    fn task_id(&self) -> TaskId;

    /// Human-readable identifier of what gets deleted
    fn item(&self) -> String;

    /// Deferred deletions run in a final batch, after the regular
    /// deletion batch has completed
    fn deferred(&self) -> bool {
        false
    }

    /// Execute the cleanup against the target
    async fn delete(&self, target: &Target) -> Result<()>;
}
