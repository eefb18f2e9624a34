use std::collections::{BTreeMap, BTreeSet};

use super::{Condition, ReplicateTask};

/// Artifact keys expected per condition, the input of the aggregation stage
pub type ConditionKeys = BTreeMap<Condition, BTreeSet<String>>;

/// Independent tasks sharing one condition
#[derive(Debug, Clone)]
pub struct TaskGroup {
    pub condition: Condition,
    pub tasks: Vec<ReplicateTask>,
}

/// Planned replicate stage: one group per condition, no edges between tasks
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    pub groups: Vec<TaskGroup>,
}

impl ExecutionGraph {
    /// Every task, grouped by condition in plan order
    pub fn tasks(&self) -> impl Iterator<Item = &ReplicateTask> {
        self.groups.iter().flat_map(|g| g.tasks.iter())
    }

    /// Total number of tasks
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.tasks.len()).sum()
    }

    /// Artifact keys in plan order
    pub fn keys(&self) -> Vec<&str> {
        self.tasks().map(|t| t.key.as_str()).collect()
    }

    /// Keys grouped by condition, as the aggregator expects them
    pub fn condition_keys(&self) -> ConditionKeys {
        let mut keys = ConditionKeys::new();
        for group in &self.groups {
            keys.entry(group.condition)
                .or_default()
                .extend(group.tasks.iter().map(|t| t.key.clone()));
        }
        keys
    }
}
