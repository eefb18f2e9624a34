use thiserror::Error;

/// A single replicate that did not make it past the stage barrier
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub key: String,
    pub reason: String,
}

/// Errors raised by the planning, execution and aggregation stages
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid or missing parameter, detected at plan time
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Simulation failed or produced no usable output
    #[error("replicate task {key} failed: {reason}")]
    TaskExecution { key: String, reason: String },

    /// One or more tasks in a stage failed; the barrier was not satisfied
    #[error("{} replicate task(s) failed: {}", .failures.len(), summarize(.failures))]
    StageFailed { failures: Vec<TaskFailure> },

    /// Aggregation was attempted before every expected artifact was published
    #[error("incomplete data, {} artifact(s) not published: {}", .missing.len(), .missing.join(", "))]
    IncompleteData { missing: Vec<String> },

    /// Fewer than two observations at a time step. Never fatal: the
    /// aggregator excludes the step instead.
    #[error("statistics undefined at t={t}: {observations} observation(s), need at least 2")]
    StatisticsUndefined { t: i64, observations: usize },

    /// Store-level failure: duplicate put, invalid key or I/O
    #[error("artifact {key}: {reason}")]
    Artifact { key: String, reason: String },

    /// Published series could not be parsed
    #[error("series {key}: {reason}")]
    SeriesFormat { key: String, reason: String },
}

impl PipelineError {
    /// Shorthand for `Artifact`
    pub fn artifact(key: &str, reason: impl Into<String>) -> Self {
        Self::Artifact {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand for `TaskExecution`
    pub fn task(key: &str, reason: impl Into<String>) -> Self {
        Self::TaskExecution {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// `key (reason)` pairs joined for display
fn summarize(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.key, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}
