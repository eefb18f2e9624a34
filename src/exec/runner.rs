use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::aggregate::{read_series, SeriesColumns};
use crate::config::SimulationSpec;
use crate::error::PipelineError;
use crate::plan::ReplicateTask;
use crate::store::{ArtifactStore, RunStore};

/// Runs the external simulation for one replicate and publishes its series
pub struct SimulationRunner {
    /// How to invoke the simulation
    spec: SimulationSpec,
    /// Columns validated before publishing
    columns: SeriesColumns,
    /// Per-task working directories live under here
    work_root: PathBuf,
    /// Per-task log files live here
    log_dir: PathBuf,
}

impl SimulationRunner {
    /// Runner writing under the directories of `run_store`
    pub fn new(spec: SimulationSpec, columns: SeriesColumns, run_store: &RunStore) -> Self {
        Self {
            spec,
            columns,
            work_root: run_store.replicates_dir(),
            log_dir: run_store.logs_dir(),
        }
    }

    /// Fixed arguments followed by the task's parameters
    pub fn command_args(&self, task: &ReplicateTask) -> Vec<String> {
        let mut args = self.spec.args.clone();
        args.extend(task.params.to_args());
        args
    }

    /// Working directory of one task
    pub fn work_dir(&self, task: &ReplicateTask) -> PathBuf {
        self.work_root.join(&task.key)
    }

    /// Log file of one task
    pub fn log_path(&self, task: &ReplicateTask) -> PathBuf {
        self.log_dir.join(format!("{}.log", task.key))
    }

    /// Invoke the simulation, wait for it, then validate and publish its
    /// output. Any failure is a `TaskExecution` error for this task.
    pub async fn run(
        &self,
        task: &mut ReplicateTask,
        store: &dyn ArtifactStore,
    ) -> Result<(), PipelineError> {
        let key = task.key.clone();
        let work_dir = self.work_dir(task);
        let log_path = self.log_path(task);
        task.output_log = Some(log_path.display().to_string());

        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| PipelineError::task(&key, format!("failed to create work dir: {}", e)))?;
        let output_path = work_dir.join(&self.spec.output_file);
        if output_path.exists() {
            tokio::fs::remove_file(&output_path).await.map_err(|e| {
                PipelineError::task(&key, format!("failed to clear stale output: {}", e))
            })?;
        }

        let args = self.command_args(task);
        debug!(key = %key, command = %self.spec.command, ?args, "starting simulation");

        let mut child = Command::new(&self.spec.command)
            .args(&args)
            .current_dir(&work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PipelineError::task(&key, format!("failed to start {}: {}", self.spec.command, e))
            })?;

        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(pump_lines(stdout, key.clone(), log_path.clone(), ""));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(pump_lines(stderr, key.clone(), log_path.clone(), "[stderr] "));
        }

        let status = child
            .wait()
            .await
            .map_err(|e| PipelineError::task(&key, format!("failed to wait: {}", e)))?;
        for pump in pumps {
            let _ = pump.await;
        }

        if !status.success() {
            return Err(PipelineError::task(
                &key,
                format!("exit code: {:?}", status.code()),
            ));
        }

        self.publish(&key, &output_path, store)?;
        info!(key = %key, "replicate published");
        Ok(())
    }

    /// Check the output exists and parses, then `put` it under `key`
    fn publish(
        &self,
        key: &str,
        output_path: &Path,
        store: &dyn ArtifactStore,
    ) -> Result<(), PipelineError> {
        if !output_path.is_file() {
            return Err(PipelineError::task(
                key,
                format!("missing output file {}", self.spec.output_file),
            ));
        }
        read_series(key, output_path, &self.columns)
            .map_err(|e| PipelineError::task(key, format!("invalid output: {}", e)))?;
        store
            .put(key, output_path)
            .map_err(|e| PipelineError::task(key, e.to_string()))
    }
}

/// Copy a child's output stream into the task log, line by line
fn pump_lines<R>(
    reader: R,
    key: String,
    log_path: PathBuf,
    prefix: &'static str,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut log_file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
            .ok();

        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(ref mut file) = log_file {
                let _ = file
                    .write_all(format!("{}{}\n", prefix, line).as_bytes())
                    .await;
            }
            debug!(key = %key, "{}{}", prefix, line);
        }
    })
}
