mod graph;
mod planner;
mod task;

pub use graph::{ConditionKeys, ExecutionGraph, TaskGroup};
pub use planner::plan;
pub use task::{Condition, ReplicateTask, TaskStatus};
