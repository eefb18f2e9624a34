use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::plan::{ReplicateTask, TaskStatus};

/// Persists per-run bookkeeping: task manifest, logs, scratch space, summary
pub struct RunStore {
    /// `<work_dir>/runs/<run_id>`
    run_dir: PathBuf,
}

impl RunStore {
    /// Create `<work_dir>/runs/<run_id>` and its subdirectories
    pub fn new(work_dir: &Path, run_id: &str) -> Result<Self> {
        let run_dir = work_dir.join("runs").join(run_id);

        fs::create_dir_all(&run_dir).context("Failed to create run directory")?;
        fs::create_dir_all(run_dir.join("logs")).context("Failed to create logs dir")?;
        fs::create_dir_all(run_dir.join("replicates"))
            .context("Failed to create replicates dir")?;
        fs::create_dir_all(run_dir.join("scratch")).context("Failed to create scratch dir")?;

        Ok(Self { run_dir })
    }

    /// Root directory of this run
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Per-task simulation logs
    pub fn logs_dir(&self) -> PathBuf {
        self.run_dir.join("logs")
    }

    /// Working directory root for simulations, one subdirectory per task
    pub fn replicates_dir(&self) -> PathBuf {
        self.run_dir.join("replicates")
    }

    /// Local copies of fetched artifacts
    pub fn scratch_dir(&self) -> PathBuf {
        self.run_dir.join("scratch")
    }

    /// Path of run.json
    fn manifest_file(&self) -> PathBuf {
        self.run_dir.join("run.json")
    }

    /// Load every task of the manifest; empty before the first save
    pub fn load(&self) -> Result<Vec<ReplicateTask>> {
        let path = self.manifest_file();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).context("Failed to read run.json")?;
        let tasks: Vec<ReplicateTask> =
            serde_json::from_str(&content).context("Failed to parse run.json")?;
        Ok(tasks)
    }

    /// Overwrite the manifest with `tasks`
    pub fn save(&self, tasks: &[ReplicateTask]) -> Result<()> {
        let content = serde_json::to_string_pretty(tasks).context("Failed to serialize tasks")?;
        fs::write(self.manifest_file(), content).context("Failed to write run.json")?;
        Ok(())
    }

    /// Replace the manifest entry with the same key
    pub fn update(&self, task: &ReplicateTask) -> Result<()> {
        let mut tasks = self.load()?;
        if let Some(existing) = tasks.iter_mut().find(|t| t.key == task.key) {
            *existing = task.clone();
            self.save(&tasks)?;
        }
        Ok(())
    }

    /// Look up a task by artifact key
    #[allow(dead_code)]
    pub fn get(&self, key: &str) -> Result<Option<ReplicateTask>> {
        let tasks = self.load()?;
        Ok(tasks.into_iter().find(|t| t.key == key))
    }

    /// Tasks currently in `status`
    pub fn get_by_status(&self, status: TaskStatus) -> Result<Vec<ReplicateTask>> {
        let tasks = self.load()?;
        Ok(tasks.into_iter().filter(|t| t.status == status).collect())
    }

    /// Write `summary.json` next to the manifest and return its path
    pub fn write_summary<T: Serialize>(&self, summary: &T) -> Result<PathBuf> {
        let path = self.run_dir.join("summary.json");
        let content =
            serde_json::to_string_pretty(summary).context("Failed to serialize summary")?;
        fs::write(&path, content).context("Failed to write summary.json")?;
        Ok(path)
    }
}
