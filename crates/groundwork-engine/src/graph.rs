//! Dependency graph construction and cycle detection

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::info;

use groundwork_core::{EngineError, Result};

use crate::task::{TaskId, TaskSet};

/// Directed acyclic graph of tasks, keyed by task identity.
///
/// Construction validates every declared predecessor and rejects cycles
/// with the full cycle path; a cyclic configuration is fatal and nothing
/// in it is ever executed.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    dependencies: HashMap<TaskId, HashSet<TaskId>>,
    dependents: HashMap<TaskId, HashSet<TaskId>>,
    sorted_order: Vec<TaskId>,
}

impl TaskGraph {
    /// Build the graph from each task's declared dependencies
    pub fn build(tasks: &TaskSet) -> Result<Self> {
        let mut dependencies: HashMap<TaskId, HashSet<TaskId>> = HashMap::new();
        let mut dependents: HashMap<TaskId, HashSet<TaskId>> = HashMap::new();

        for task in tasks.iter() {
            let id = task.id();
            let deps: HashSet<TaskId> = task.dependencies(tasks).into_iter().collect();
            for dep in &deps {
                if tasks.get(dep).is_none() {
                    return Err(EngineError::UnknownDependency {
                        task: id.to_string(),
                        dependency: dep.to_string(),
                    });
                }
                dependents.entry(dep.clone()).or_default().insert(id.clone());
            }
            dependents.entry(id.clone()).or_default();
            dependencies.insert(id, deps);
        }

        let sorted_order = Self::topological_sort(&dependencies, &dependents)?;

        info!(task_count = sorted_order.len(), "task graph built");

        Ok(Self {
            dependencies,
            dependents,
            sorted_order,
        })
    }

    /// Kahn's algorithm with a sorted ready set for deterministic order
    fn topological_sort(
        dependencies: &HashMap<TaskId, HashSet<TaskId>>,
        dependents: &HashMap<TaskId, HashSet<TaskId>>,
    ) -> Result<Vec<TaskId>> {
        let mut in_degree: HashMap<TaskId, usize> = HashMap::new();
        let mut ready: BTreeSet<TaskId> = BTreeSet::new();
        let mut sorted: Vec<TaskId> = Vec::new();

        for (id, deps) in dependencies {
            in_degree.insert(id.clone(), deps.len());
            if deps.is_empty() {
                ready.insert(id.clone());
            }
        }

        while let Some(id) = ready.pop_first() {
            sorted.push(id.clone());

            for dependent in dependents.get(&id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(dependent.clone());
                    }
                }
            }
        }

        if sorted.len() != dependencies.len() {
            let in_sorted: HashSet<_> = sorted.iter().collect();
            let remaining: HashSet<TaskId> = dependencies
                .keys()
                .filter(|id| !in_sorted.contains(id))
                .cloned()
                .collect();
            let cycle = Self::find_cycle(dependencies, &remaining)
                .map(|path| {
                    path.iter()
                        .map(TaskId::to_string)
                        .collect::<Vec<_>>()
                        .join(" -> ")
                })
                .unwrap_or_else(|| {
                    let mut ids: Vec<String> =
                        remaining.iter().map(TaskId::to_string).collect();
                    ids.sort();
                    ids.join(", ")
                });
            return Err(EngineError::DependencyCycle(cycle));
        }

        Ok(sorted)
    }

    /// Depth-first search over the unsorted remainder, reporting the first
    /// cycle found as a path ending where it started
    fn find_cycle(
        dependencies: &HashMap<TaskId, HashSet<TaskId>>,
        remaining: &HashSet<TaskId>,
    ) -> Option<Vec<TaskId>> {
        fn visit(
            node: &TaskId,
            dependencies: &HashMap<TaskId, HashSet<TaskId>>,
            remaining: &HashSet<TaskId>,
            stack: &mut Vec<TaskId>,
            visited: &mut HashSet<TaskId>,
        ) -> Option<Vec<TaskId>> {
            stack.push(node.clone());
            let mut deps: Vec<&TaskId> = dependencies
                .get(node)
                .into_iter()
                .flatten()
                .filter(|d| remaining.contains(*d))
                .collect();
            deps.sort();
            for dep in deps {
                if let Some(pos) = stack.iter().position(|t| t == dep) {
                    let mut cycle = stack[pos..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
                if visited.insert(dep.clone()) {
                    if let Some(cycle) = visit(dep, dependencies, remaining, stack, visited) {
                        return Some(cycle);
                    }
                }
            }
            stack.pop();
            None
        }

        let mut starts: Vec<&TaskId> = remaining.iter().collect();
        starts.sort();
        let mut visited = HashSet::new();
        for start in starts {
            if visited.insert(start.clone()) {
                if let Some(cycle) = visit(start, dependencies, remaining, &mut Vec::new(), &mut visited)
                {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// In-degree (number of dependencies) per task
    pub fn in_degrees(&self) -> HashMap<TaskId, usize> {
        self.dependencies
            .iter()
            .map(|(id, deps)| (id.clone(), deps.len()))
            .collect()
    }

    /// Tasks waiting on `id`
    pub fn dependents_of<'a>(&'a self, id: &TaskId) -> impl Iterator<Item = &'a TaskId> {
        self.dependents.get(id).into_iter().flatten()
    }

    /// Declared predecessors of `id`
    pub fn dependencies_of<'a>(&'a self, id: &TaskId) -> impl Iterator<Item = &'a TaskId> {
        self.dependencies.get(id).into_iter().flatten()
    }

    /// Deterministic topological order (dependencies before dependents)
    pub fn sorted(&self) -> &[TaskId] {
        &self.sorted_order
    }

    pub fn len(&self) -> usize {
        self.sorted_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted_order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use groundwork_core::ChangeSet;

    use crate::context::Context;
    use crate::target::{ApiTarget, TextTarget};
    use crate::task::Task;

    struct StubTask {
        id: TaskId,
        deps: Vec<TaskId>,
    }

    #[async_trait]
    impl Task for StubTask {
        fn id(&self) -> TaskId {
            self.id.clone()
        }

        fn dependencies(&self, _all: &TaskSet) -> Vec<TaskId> {
            self.deps.clone()
        }

        fn desired(&self) -> groundwork_core::Result<Value> {
            Ok(json!({}))
        }

        async fn find(&self, _ctx: &Context) -> groundwork_core::Result<Option<Value>> {
            Ok(None)
        }

        fn check_changes(
            &self,
            _actual: Option<&Value>,
            _changes: &ChangeSet,
        ) -> groundwork_core::Result<()> {
            Ok(())
        }

        async fn render_api(
            &self,
            _target: &ApiTarget,
            _actual: Option<&Value>,
            _changes: &mut ChangeSet,
        ) -> groundwork_core::Result<()> {
            Ok(())
        }

        fn render_text(
            &self,
            _target: &TextTarget,
            _changes: &mut ChangeSet,
        ) -> groundwork_core::Result<()> {
            Ok(())
        }
    }

    fn set(edges: &[(&str, &[&str])]) -> TaskSet {
        let mut tasks = TaskSet::new();
        for (name, deps) in edges {
            tasks
                .insert(Arc::new(StubTask {
                    id: TaskId::new("stub", *name),
                    deps: deps.iter().map(|d| TaskId::new("stub", *d)).collect(),
                }))
                .unwrap();
        }
        tasks
    }

    #[test]
    fn test_chain_order() {
        let tasks = set(&[("c", &["b"]), ("b", &["a"]), ("a", &[])]);
        let graph = TaskGraph::build(&tasks).unwrap();

        let order = graph.sorted();
        let pos = |name: &str| {
            order
                .iter()
                .position(|id| id.name == name)
                .unwrap()
        };
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn test_diamond_in_degrees() {
        let tasks = set(&[
            ("root", &[]),
            ("left", &["root"]),
            ("right", &["root"]),
            ("join", &["left", "right"]),
        ]);
        let graph = TaskGraph::build(&tasks).unwrap();

        let degrees = graph.in_degrees();
        assert_eq!(degrees[&TaskId::new("stub", "root")], 0);
        assert_eq!(degrees[&TaskId::new("stub", "join")], 2);
        assert_eq!(
            graph.dependents_of(&TaskId::new("stub", "root")).count(),
            2
        );
    }

    #[test]
    fn test_cycle_reports_both_tasks() {
        let tasks = set(&[("a", &["b"]), ("b", &["a"])]);
        let err = TaskGraph::build(&tasks).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("stub:a"), "missing a in: {message}");
        assert!(message.contains("stub:b"), "missing b in: {message}");
        assert!(matches!(err, EngineError::DependencyCycle(_)));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let tasks = set(&[("a", &["a"])]);
        let err = TaskGraph::build(&tasks).unwrap_err();
        assert!(matches!(err, EngineError::DependencyCycle(_)));
    }

    #[test]
    fn test_unknown_dependency() {
        let tasks = set(&[("a", &["ghost"])]);
        let err = TaskGraph::build(&tasks).unwrap_err();
        assert!(matches!(err, EngineError::UnknownDependency { .. }));
        assert!(err.to_string().contains("stub:ghost"));
    }

    #[test]
    fn test_cycle_alongside_valid_subgraph() {
        let tasks = set(&[("ok", &[]), ("a", &["b"]), ("b", &["a"])]);
        // The acyclic part does not mask the cycle
        assert!(TaskGraph::build(&tasks).is_err());
    }
}
