//! Task contract and the desired-state task set

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use groundwork_core::{ChangeSet, DiffSchema, EngineError, Lifecycle, Result};

use crate::context::Context;
use crate::deletion::Deletion;
use crate::target::{ApiTarget, TextTarget};

/// Unique identifier for a task within a convergence pass.
///
/// Names are not unique across resource kinds (an IAM role and an instance
/// group may share a name), so identity is the (kind, name) pair and all
/// graph bookkeeping keys on it.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    /// Resource kind (e.g., "autoscaling-group", "iam-binding")
    pub kind: String,
    /// Resource name
    pub name: String,
}

impl TaskId {
    /// Create a new task ID
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// One intended cloud resource with a uniform reconciliation lifecycle.
///
/// Implementations are per-resource-kind plug-ins. The engine drives each
/// task through normalize -> find -> diff -> check_changes -> render; only
/// render mutates anything, and it must be safe to re-invoke after a
/// transient failure.
#[async_trait]
pub trait Task: Send + Sync {
    /// Identity of this task
    fn id(&self) -> TaskId;

    /// Lifecycle tag constraining what the engine may do
    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::Sync
    }

    /// Comparison rules for this task's state shape
    fn diff_schema(&self) -> DiffSchema {
        DiffSchema::new()
    }

    /// Declared predecessors; this task renders only after all of them
    /// have rendered successfully
    fn dependencies(&self, _all: &TaskSet) -> Vec<TaskId> {
        Vec::new()
    }

    /// Pre-diff canonicalization (sort unordered collections, inherit
    /// tags). Runs once per pass, before `find`.
    async fn normalize(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    /// Serialized desired attributes. Fields that are `null` are explicitly
    /// unset and left unmanaged by the differ.
    fn desired(&self) -> Result<Value>;

    /// Query the provider for the resource matching this task's identity.
    /// Returns `Ok(None)` (not an error) when the resource does not exist.
    /// Must never mutate desired or cloud state.
    async fn find(&self, ctx: &Context) -> Result<Option<Value>>;

    /// Validate required fields, conditioned on whether `actual` is present
    /// (update) or absent (create). Fails with
    /// [`EngineError::RequiredField`] naming the missing field.
    fn check_changes(&self, actual: Option<&Value>, changes: &ChangeSet) -> Result<()>;

    /// Apply `changes` through the live provider API. Each applied field
    /// must be removed from `changes` via [`ChangeSet::take`].
    async fn render_api(
        &self,
        target: &ApiTarget,
        actual: Option<&Value>,
        changes: &mut ChangeSet,
    ) -> Result<()>;

    /// Emit this resource as a declarative record. Never calls a live API.
    fn render_text(&self, target: &TextTarget, changes: &mut ChangeSet) -> Result<()>;

    /// Cleanup operations discovered during `find` (e.g., a stale
    /// attachment present in the cloud but absent from desired state).
    /// These run after the primary pass and add no graph edges.
    fn find_deletions(&self, _ctx: &Context) -> Vec<Arc<dyn Deletion>> {
        Vec::new()
    }
}

/// Serialize a typed desired-state struct into the engine's state shape
pub fn serialize_state<T: Serialize>(state: &T) -> Result<Value> {
    serde_json::to_value(state).map_err(|e| EngineError::other(format!("serializing state: {e}")))
}

/// The fully-constructed set of tasks for one convergence pass.
///
/// Supplied by the desired-state provider; the engine never re-derives it.
#[derive(Default)]
pub struct TaskSet {
    tasks: Vec<Arc<dyn Task>>,
    index: HashMap<TaskId, usize>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task, rejecting duplicate identities
    pub fn insert(&mut self, task: Arc<dyn Task>) -> Result<()> {
        let id = task.id();
        if self.index.contains_key(&id) {
            return Err(EngineError::DuplicateTask(id.to_string()));
        }
        self.index.insert(id, self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    /// Look up a task by identity
    pub fn get(&self, id: &TaskId) -> Option<&Arc<dyn Task>> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// All tasks, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Task>> {
        self.tasks.iter()
    }

    /// Tasks of one resource kind, for dependency declarations that scan
    /// the whole set
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Arc<dyn Task>> {
        self.tasks.iter().filter(move |t| t.id().kind == kind)
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
