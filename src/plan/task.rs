use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ParamSet;

/// Experimental treatment shared by every replicate in a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// Static environment
    Predictable,
    /// Environment that changes between trials
    Unpredictable,
}

impl Condition {
    pub const ALL: [Condition; 2] = [Condition::Predictable, Condition::Unpredictable];

    /// Lowercase name used in keys and config files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Predictable => "predictable",
            Self::Unpredictable => "unpredictable",
        }
    }

    /// Label used in chart legends
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Predictable => "Predictable Environment",
            Self::Unpredictable => "Unpredictable Environment",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a replicate task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Planned, not started
    #[default]
    Pending,
    /// Simulation in progress
    Running,
    /// Series published
    Succeeded,
    /// Simulation or publish failed
    Failed,
}

impl TaskStatus {
    /// Terminal state, never changes again
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One simulation run for a (condition, replicate) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateTask {
    /// Treatment this replicate runs under
    pub condition: Condition,
    /// Replicate index, also used as the random seed
    pub replicate: usize,
    /// Artifact key the series is published under
    pub key: String,
    /// Fully resolved simulation parameters
    pub params: ParamSet,
    pub status: TaskStatus,
    /// Set on the first transition to `Running`
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the task settles
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure reason, set when status is `Failed`
    pub error: Option<String>,
    /// Path of the captured stdout/stderr
    pub output_log: Option<String>,
}

impl ReplicateTask {
    /// New pending task keyed by condition and replicate
    pub fn new(condition: Condition, replicate: usize, params: ParamSet) -> Self {
        Self {
            condition,
            replicate,
            key: Self::artifact_key(condition, replicate),
            params,
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
            output_log: None,
        }
    }

    /// `<condition>-rep<index>`, unique within a run
    pub fn artifact_key(condition: Condition, replicate: usize) -> String {
        format!("{}-rep{}", condition.as_str(), replicate)
    }

    /// Change status and stamp the matching timestamp
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        match status {
            TaskStatus::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(Utc::now());
                }
            }
            TaskStatus::Succeeded | TaskStatus::Failed => {
                self.completed_at = Some(Utc::now());
            }
            TaskStatus::Pending => {}
        }
    }

    /// Mark failed with `reason`
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.error = Some(reason.into());
        self.set_status(TaskStatus::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = ReplicateTask::new(Condition::Unpredictable, 4, ParamSet::default());
        assert_eq!(task.key, "unpredictable-rep4");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());
    }

    #[test]
    fn test_status_transition() {
        let mut task = ReplicateTask::new(Condition::Predictable, 0, ParamSet::default());

        task.set_status(TaskStatus::Running);
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_none());
        assert!(!task.status.is_settled());

        task.set_status(TaskStatus::Succeeded);
        assert!(task.completed_at.is_some());
        assert!(task.status.is_settled());
    }

    #[test]
    fn test_fail_records_reason() {
        let mut task = ReplicateTask::new(Condition::Predictable, 1, ParamSet::default());
        task.fail("exit code: Some(2)");
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("exit code: Some(2)"));
    }

    #[test]
    fn test_condition_serialization() {
        let json = serde_json::to_string(&Condition::Unpredictable).unwrap();
        assert_eq!(json, "\"unpredictable\"");

        let parsed: Condition = serde_json::from_str("\"predictable\"").unwrap();
        assert_eq!(parsed, Condition::Predictable);
    }
}
