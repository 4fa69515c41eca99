//! Structural differ between actual and desired task state

use std::collections::BTreeSet;

use serde_json::Value;

use crate::changes::{ChangeSet, FieldChange};
use crate::error::{EngineError, Result};

/// Per-task-kind comparison rules for the differ.
///
/// Fields default to order-sensitive structural comparison. `unordered`
/// fields (tag maps are order-free by construction; this matters for id
/// lists) compare as multisets. `system` fields are engine-managed (name,
/// lifecycle tag) and never diffed, so `Find` snapshots need not copy them
/// from desired state to avoid spurious changes.
#[derive(Debug, Clone, Default)]
pub struct DiffSchema {
    unordered: BTreeSet<String>,
    system: BTreeSet<String>,
}

impl DiffSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a field as an unordered collection
    pub fn unordered(mut self, field: impl Into<String>) -> Self {
        self.unordered.insert(field.into());
        self
    }

    /// Mark a field as engine-managed, excluded from comparison
    pub fn system(mut self, field: impl Into<String>) -> Self {
        self.system.insert(field.into());
        self
    }

    fn is_unordered(&self, field: &str) -> bool {
        self.unordered.contains(field)
    }

    fn is_system(&self, field: &str) -> bool {
        self.system.contains(field)
    }
}

/// Compute the change set between an observed snapshot and desired state.
///
/// `actual = None` means the resource does not exist: every set desired
/// field becomes a change (a full create). Desired fields that are `null`
/// are explicitly unset and never compared. A divergent map-typed field
/// carries the complete desired map (replacement semantics).
pub fn diff_states(
    schema: &DiffSchema,
    actual: Option<&Value>,
    desired: &Value,
) -> Result<ChangeSet> {
    let desired = desired
        .as_object()
        .ok_or_else(|| EngineError::InvalidState(type_name(desired).to_string()))?;
    if let Some(actual) = actual {
        if !actual.is_object() {
            return Err(EngineError::InvalidState(type_name(actual).to_string()));
        }
    }

    let mut changes = ChangeSet::new();
    for (field, want) in desired {
        if want.is_null() || schema.is_system(field) {
            continue;
        }
        let have = actual.and_then(|a| a.get(field)).filter(|v| !v.is_null());
        let equal = match have {
            Some(have) if schema.is_unordered(field) => unordered_eq(have, want),
            Some(have) => have == want,
            None => false,
        };
        if !equal {
            changes.push(FieldChange::new(
                field.clone(),
                have.cloned(),
                Some(want.clone()),
            ));
        }
    }
    Ok(changes)
}

/// Order-insensitive equality: arrays compare as multisets, everything else
/// falls back to structural equality (JSON maps are already key-based)
fn unordered_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return false;
            }
            let mut a: Vec<String> = a.iter().map(Value::to_string).collect();
            let mut b: Vec<String> = b.iter().map(Value::to_string).collect();
            a.sort();
            b.sort();
            a == b
        }
        _ => a == b,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_actual_is_full_create() {
        let desired = json!({"Name": "nodes", "MinSize": 1, "MaxSize": 3});
        let changes = diff_states(&DiffSchema::new(), None, &desired).unwrap();
        assert_eq!(changes.len(), 3);
        assert!(changes.get("MinSize").unwrap().old.is_none());
    }

    #[test]
    fn test_identical_states_yield_empty_changeset() {
        let state = json!({"MinSize": 1, "Tags": {"a": "1"}});
        let changes = diff_states(&DiffSchema::new(), Some(&state), &state).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_map_field_carries_complete_desired_map() {
        let actual = json!({"MinSize": 1, "Tags": {"a": "1"}});
        let desired = json!({"MinSize": 1, "Tags": {"a": "1", "b": "2"}});
        let changes = diff_states(&DiffSchema::new(), Some(&actual), &desired).unwrap();
        assert_eq!(changes.len(), 1);
        let tags = changes.get("Tags").unwrap();
        assert_eq!(tags.new, Some(json!({"a": "1", "b": "2"})));
        assert!(!changes.contains("MinSize"));
    }

    #[test]
    fn test_unordered_list_ignores_order() {
        let schema = DiffSchema::new().unordered("Subnets");
        let actual = json!({"Subnets": ["subnet-b", "subnet-a"]});
        let desired = json!({"Subnets": ["subnet-a", "subnet-b"]});
        let changes = diff_states(&schema, Some(&actual), &desired).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_ordered_list_respects_order() {
        let actual = json!({"Rules": ["allow", "deny"]});
        let desired = json!({"Rules": ["deny", "allow"]});
        let changes = diff_states(&DiffSchema::new(), Some(&actual), &desired).unwrap();
        assert!(changes.contains("Rules"));
    }

    #[test]
    fn test_unordered_multiset_detects_count_difference() {
        let schema = DiffSchema::new().unordered("Metrics");
        let actual = json!({"Metrics": ["a", "a", "b"]});
        let desired = json!({"Metrics": ["a", "b", "b"]});
        let changes = diff_states(&schema, Some(&actual), &desired).unwrap();
        assert!(changes.contains("Metrics"));
    }

    #[test]
    fn test_null_desired_field_is_unmanaged() {
        let actual = json!({"MaxInstanceLifetime": 3600});
        let desired = json!({"MaxInstanceLifetime": null});
        let changes = diff_states(&DiffSchema::new(), Some(&actual), &desired).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_system_fields_excluded() {
        let schema = DiffSchema::new().system("Name").system("Lifecycle");
        let actual = json!({"Name": "other", "MinSize": 1});
        let desired = json!({"Name": "nodes", "Lifecycle": "sync", "MinSize": 1});
        let changes = diff_states(&schema, Some(&actual), &desired).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_non_object_state_rejected() {
        let desired = json!(["not", "an", "object"]);
        let err = diff_states(&DiffSchema::new(), None, &desired).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }
}
