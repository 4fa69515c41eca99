//! Change-set model: the structural diff a render must apply

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One divergent field between actual and desired state.
///
/// `old` is `None` on create (no actual state) or when the field was unset.
/// For map-typed fields `new` carries the complete desired map, not a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Field name, as serialized in the task state
    pub field: String,
    /// Observed value, if any
    pub old: Option<Value>,
    /// Desired value
    pub new: Option<Value>,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, old: Option<Value>, new: Option<Value>) -> Self {
        Self {
            field: field.into(),
            old,
            new,
        }
    }
}

/// Ordered list of field changes for one task.
///
/// A renderer removes each change with [`ChangeSet::take`] as it applies it.
/// Anything still present after a successful render is an unapplied change,
/// which the executor reports as an engine bug rather than silently ignoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change record
    pub fn push(&mut self, change: FieldChange) {
        self.changes.push(change);
    }

    /// Whether any field diverges
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Look up a pending change without applying it
    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    /// Whether the named field has a pending change
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Remove and return the named change; the renderer calls this for each
    /// field as it applies the corresponding mutation
    pub fn take(&mut self, field: &str) -> Option<FieldChange> {
        let idx = self.changes.iter().position(|c| c.field == field)?;
        Some(self.changes.remove(idx))
    }

    /// Names of all pending fields, in order
    pub fn fields(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.field.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }

    /// Short human-readable rendering, e.g. `MinSize: 1 -> 3`
    pub fn describe(&self) -> String {
        self.changes
            .iter()
            .map(|c| {
                let old = c
                    .old
                    .as_ref()
                    .map_or_else(|| "<absent>".to_string(), Value::to_string);
                let new = c
                    .new
                    .as_ref()
                    .map_or_else(|| "<unset>".to_string(), Value::to_string);
                format!("{}: {} -> {}", c.field, old, new)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
