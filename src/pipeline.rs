use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::aggregate::{Aggregator, Trajectory};
use crate::chart::{render, ComparisonChart, SUMMARY_KEY};
use crate::config::PipelineConfig;
use crate::exec::{execute_stage, SimulationRunner};
use crate::plan::{plan, Condition};
use crate::store::{ArtifactStore, FsArtifactStore, RunStore};

/// Per-condition line of the run summary
#[derive(Debug, Clone, Serialize)]
pub struct ConditionSummary {
    /// Series aggregated
    pub replicates: usize,
    /// Time steps kept in the trajectory
    pub points: usize,
    /// Time steps excluded for too few series
    pub dropped_steps: usize,
}

/// Written to `summary.json` at the end of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Replicates per condition
    pub replicates: usize,
    pub conditions: BTreeMap<Condition, ConditionSummary>,
    /// Artifact key of the chart
    pub chart_key: String,
}

/// Result of a successful run
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub trajectories: BTreeMap<Condition, Trajectory>,
    /// Local copy of the rendered chart
    pub chart_path: PathBuf,
    pub summary_path: PathBuf,
}

/// One pipeline run: plan, execute, barrier, aggregate, render, publish
pub struct Pipeline {
    config: PipelineConfig,
    /// Holds `runs/` and `artifacts/`
    work_dir: PathBuf,
    /// `run-xxxxxxxx`
    run_id: String,
}

impl Pipeline {
    /// New run with a fresh id; nothing touches disk until `run`
    pub fn new(config: PipelineConfig, work_dir: impl Into<PathBuf>) -> Self {
        let run_id = format!(
            "run-{}",
            Uuid::new_v4().to_string().split('-').next().unwrap_or_default()
        );
        Self {
            config,
            work_dir: work_dir.into(),
            run_id,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Artifact store root for this run; keys are write-once within a run
    pub fn artifacts_dir(&self) -> PathBuf {
        self.work_dir.join("artifacts").join(&self.run_id)
    }

    /// Execute every stage; any error aborts before the chart is published
    pub async fn run(&self) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let config = &self.config;
        info!(run_id = %self.run_id, replicates = config.replicates, "starting pipeline");

        let graph = plan(config.replicates, &config.simulation)?;

        let run_store = RunStore::new(&self.work_dir, &self.run_id)?;
        run_store.save(&graph.tasks().cloned().collect::<Vec<_>>())?;
        let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(self.artifacts_dir())?);
        let runner = Arc::new(SimulationRunner::new(
            config.simulation.clone(),
            config.series.clone(),
            &run_store,
        ));
        let scratch_dir = run_store.scratch_dir();
        let run_dir = run_store.run_dir().to_path_buf();
        let manifest = Arc::new(Mutex::new(run_store));

        execute_stage(
            &graph,
            runner,
            Arc::clone(&store),
            Arc::clone(&manifest),
            config.parallelism(),
        )
        .await?;

        let condition_keys = graph.condition_keys();
        let trajectories = Aggregator::new(store.as_ref(), &config.series, scratch_dir)
            .aggregate(&condition_keys)?;

        let chart = ComparisonChart::build(&trajectories, &config.chart);
        let chart_path = run_dir.join(&config.chart.file_name);
        render(&chart, &chart_path)?;
        store.put(SUMMARY_KEY, &chart_path)?;
        info!(key = SUMMARY_KEY, path = %chart_path.display(), "chart published");

        let summary = RunSummary {
            run_id: self.run_id.clone(),
            started_at,
            completed_at: Utc::now(),
            replicates: config.replicates,
            conditions: trajectories
                .iter()
                .map(|(&condition, trajectory)| {
                    (
                        condition,
                        ConditionSummary {
                            replicates: condition_keys.get(&condition).map_or(0, |k| k.len()),
                            points: trajectory.points.len(),
                            dropped_steps: trajectory.dropped_steps.len(),
                        },
                    )
                })
                .collect(),
            chart_key: SUMMARY_KEY.to_string(),
        };
        let summary_path = manifest.lock().await.write_summary(&summary)?;

        Ok(RunOutcome {
            run_id: self.run_id.clone(),
            trajectories,
            chart_path,
            summary_path,
        })
    }
}

/// Copy the published chart out of the store
pub fn export_chart(pipeline: &Pipeline, dest: &Path) -> Result<()> {
    let store = FsArtifactStore::new(pipeline.artifacts_dir())?;
    store
        .get(SUMMARY_KEY, dest)
        .context(format!("Failed to export chart to {}", dest.display()))
}
