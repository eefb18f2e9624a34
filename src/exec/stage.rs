use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::{PipelineError, TaskFailure};
use crate::plan::{ExecutionGraph, ReplicateTask, TaskStatus};
use crate::store::{ArtifactStore, RunStore};

use super::SimulationRunner;

/// Run every task of `graph` and wait for all of them to settle.
///
/// This is the barrier between the replicate stage and aggregation: it
/// returns `Ok` only when every task succeeded, otherwise `StageFailed`
/// with one entry per failed task. Sibling tasks are never cancelled on a
/// failure so the manifest ends up with every task's final state.
pub async fn execute_stage(
    graph: &ExecutionGraph,
    runner: Arc<SimulationRunner>,
    store: Arc<dyn ArtifactStore>,
    manifest: Arc<Mutex<RunStore>>,
    max_parallel: usize,
) -> Result<Vec<ReplicateTask>, PipelineError> {
    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut set = JoinSet::new();

    for task in graph.tasks().cloned() {
        let runner = Arc::clone(&runner);
        let store = Arc::clone(&store);
        let manifest = Arc::clone(&manifest);
        let permits = Arc::clone(&permits);

        set.spawn(async move {
            let mut task = task;
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let err = PipelineError::task(&task.key, e.to_string());
                    task.fail(err.to_string());
                    record(&manifest, &task).await;
                    return (task, Err(err));
                }
            };

            task.set_status(TaskStatus::Running);
            record(&manifest, &task).await;

            let result = runner.run(&mut task, store.as_ref()).await;
            match &result {
                Ok(()) => task.set_status(TaskStatus::Succeeded),
                Err(e) => task.fail(e.to_string()),
            }
            record(&manifest, &task).await;
            (task, result)
        });
    }

    let mut settled = Vec::with_capacity(graph.len());
    let mut failures = Vec::new();
    let mut aborted = Vec::new();

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((task, Ok(()))) => settled.push(task),
            Ok((task, Err(e))) => {
                error!(key = %task.key, "replicate failed: {}", e);
                failures.push(TaskFailure {
                    key: task.key.clone(),
                    reason: failure_reason(e),
                });
                settled.push(task);
            }
            Err(e) => {
                error!("replicate task did not complete: {}", e);
                aborted.push(e.to_string());
            }
        }
    }

    // A panicked or cancelled task never hands its state back; find it by
    // elimination and record it as failed.
    if !aborted.is_empty() {
        let done: HashSet<&str> = settled.iter().map(|t| t.key.as_str()).collect();
        let lost: Vec<ReplicateTask> = graph
            .tasks()
            .filter(|t| !done.contains(t.key.as_str()))
            .cloned()
            .collect();
        for (mut task, reason) in lost.into_iter().zip(aborted.into_iter().cycle()) {
            task.fail(format!("task did not complete: {}", reason));
            record(&manifest, &task).await;
            failures.push(TaskFailure {
                key: task.key.clone(),
                reason: task.error.clone().unwrap_or_default(),
            });
        }
    }

    if !failures.is_empty() {
        failures.sort_by(|a, b| a.key.cmp(&b.key));
        return Err(PipelineError::StageFailed { failures });
    }

    debug_assert!(settled.iter().all(|t| t.status.is_settled()));

    // Hand back in plan order
    let order: Vec<&str> = graph.keys();
    settled.sort_by_key(|t| order.iter().position(|k| *k == t.key));
    info!(tasks = settled.len(), "replicate stage complete");
    Ok(settled)
}

fn failure_reason(err: PipelineError) -> String {
    match err {
        PipelineError::TaskExecution { reason, .. } => reason,
        other => other.to_string(),
    }
}

async fn record(manifest: &Mutex<RunStore>, task: &ReplicateTask) {
    if let Err(e) = manifest.lock().await.update(task) {
        warn!(key = %task.key, "failed to update run manifest: {:#}", e);
    }
}
