use tracing::debug;

use crate::config::{ParamSet, SimulationSpec};
use crate::error::PipelineError;

use super::{Condition, ExecutionGraph, ReplicateTask, TaskGroup};

/// Build the replicate stage: `replicate_count` tasks per condition.
///
/// Validation happens here so an incomplete configuration fails before any
/// simulation is launched. Nothing is executed.
pub fn plan(
    replicate_count: usize,
    spec: &SimulationSpec,
) -> Result<ExecutionGraph, PipelineError> {
    validate(replicate_count, spec)?;

    let mut groups = Vec::with_capacity(Condition::ALL.len());
    for condition in Condition::ALL {
        let flag = &spec.condition_values[&condition];
        let tasks = (0..replicate_count)
            .map(|replicate| {
                let mut overrides = ParamSet::new();
                overrides.set(&spec.seed_key, replicate);
                overrides.set(&spec.condition_key, flag);
                ReplicateTask::new(condition, replicate, spec.base_params.merged(&overrides))
            })
            .collect();
        groups.push(TaskGroup { condition, tasks });
    }

    let graph = ExecutionGraph { groups };
    debug!(tasks = graph.len(), replicate_count, "planned replicate stage");
    Ok(graph)
}

fn validate(replicate_count: usize, spec: &SimulationSpec) -> Result<(), PipelineError> {
    if replicate_count < 1 {
        return Err(PipelineError::Configuration(
            "replicate count must be at least 1".into(),
        ));
    }
    if spec.command.trim().is_empty() {
        return Err(PipelineError::Configuration(
            "simulation command is empty".into(),
        ));
    }
    if spec.output_file.trim().is_empty() {
        return Err(PipelineError::Configuration(
            "simulation output file is empty".into(),
        ));
    }
    if spec.seed_key.trim().is_empty() || spec.condition_key.trim().is_empty() {
        return Err(PipelineError::Configuration(
            "seed key and condition key must be set".into(),
        ));
    }
    if spec.seed_key == spec.condition_key {
        return Err(PipelineError::Configuration(format!(
            "seed key and condition key are both {}",
            spec.seed_key
        )));
    }
    for condition in Condition::ALL {
        if !spec.condition_values.contains_key(&condition) {
            return Err(PipelineError::Configuration(format!(
                "no condition value for {}",
                condition
            )));
        }
    }

    let missing = spec.base_params.missing(&spec.required_keys);
    if !missing.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "missing required parameters: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::plan::TaskStatus;

    fn spec() -> SimulationSpec {
        SimulationSpec {
            base_params: ParamSet::from([("length", "3")]),
            required_keys: vec!["length".into()],
            seed_key: "seed".into(),
            condition_key: "cond".into(),
            ..SimulationSpec::default()
        }
    }

    #[test]
    fn test_plan_produces_two_tasks_per_replicate() {
        for n in [1, 2, 7, 32] {
            let graph = plan(n, &spec()).unwrap();
            assert_eq!(graph.len(), 2 * n);

            let keys: HashSet<&str> = graph.keys().into_iter().collect();
            assert_eq!(keys.len(), 2 * n, "artifact keys must be unique");
        }
    }

    #[test]
    fn test_plan_groups_by_condition() {
        let graph = plan(3, &spec()).unwrap();
        assert_eq!(graph.groups.len(), 2);
        assert_eq!(graph.groups[0].condition, Condition::Predictable);
        assert_eq!(graph.groups[1].condition, Condition::Unpredictable);
        for group in &graph.groups {
            assert_eq!(group.tasks.len(), 3);
            assert!(group.tasks.iter().all(|t| t.condition == group.condition));
            assert!(group.tasks.iter().all(|t| t.status == TaskStatus::Pending));
        }

        let keys = graph.condition_keys();
        assert!(keys[&Condition::Predictable].contains("predictable-rep2"));
        assert!(keys[&Condition::Unpredictable].contains("unpredictable-rep0"));
    }

    #[test]
    fn test_plan_applies_seed_and_condition_overrides() {
        let graph = plan(2, &spec()).unwrap();
        let task = graph
            .tasks()
            .find(|t| t.key == "unpredictable-rep1")
            .unwrap();

        assert_eq!(task.params.get("seed"), Some("1"));
        assert_eq!(task.params.get("cond"), Some("1"));
        assert_eq!(task.params.get("length"), Some("3"));

        let task = graph.tasks().find(|t| t.key == "predictable-rep0").unwrap();
        assert_eq!(task.params.get("seed"), Some("0"));
        assert_eq!(task.params.get("cond"), Some("0"));
    }

    #[test]
    fn test_plan_rejects_zero_replicates() {
        let err = plan(0, &spec()).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_plan_rejects_missing_required_key() {
        let mut spec = spec();
        spec.required_keys.push("trials".into());

        let err = plan(2, &spec).unwrap_err();
        match err {
            PipelineError::Configuration(msg) => assert!(msg.contains("trials")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_plan_rejects_colliding_override_keys() {
        let mut spec = spec();
        spec.condition_key = spec.seed_key.clone();
        assert!(matches!(
            plan(1, &spec),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_plan_rejects_missing_condition_value() {
        let mut spec = spec();
        spec.condition_values.remove(&Condition::Unpredictable);
        assert!(matches!(
            plan(1, &spec),
            Err(PipelineError::Configuration(_))
        ));
    }
}
