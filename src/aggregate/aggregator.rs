use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::plan::{Condition, ConditionKeys};
use crate::store::ArtifactStore;

use super::series::{read_series, Series, SeriesColumns};
use super::stats::{mean, t_confidence_interval};

/// Mean and confidence band at one time step
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub t: i64,
    pub mean: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    /// Series that contributed at this step
    pub n: usize,
}

/// Per-condition trajectory, ascending in `t`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    pub condition: Condition,
    pub points: Vec<TrajectoryPoint>,
    /// Steps left out because fewer than two replicates reached them
    pub dropped_steps: Vec<i64>,
}

impl Trajectory {
    /// Mean at every kept step, in `t` order
    #[allow(dead_code)]
    pub fn means(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mean).collect()
    }
}

/// Sparse join of ragged series: `(condition, t) -> series key -> values`
#[derive(Debug, Default)]
struct ObservationArena {
    cells: BTreeMap<(Condition, i64), BTreeMap<String, Vec<f64>>>,
}

impl ObservationArena {
    /// Record every `(t, v)` of `series` under its key
    fn add_series(&mut self, condition: Condition, series: &Series) {
        for record in &series.records {
            self.cells
                .entry((condition, record.t))
                .or_default()
                .entry(series.key.clone())
                .or_default()
                .push(record.v);
        }
    }

    /// Reduce one condition's cells to a trajectory.
    ///
    /// Each series contributes one value per step (the mean of its records
    /// at that `t`), so the sample size is the number of series reaching the
    /// step. Steps reached by fewer than two series are excluded rather than
    /// reported as errors.
    fn reduce(&self, condition: Condition) -> Trajectory {
        let mut points = Vec::new();
        let mut dropped_steps = Vec::new();

        for (&(_, t), by_series) in self.cells.range((condition, i64::MIN)..=(condition, i64::MAX)) {
            let values: Vec<f64> = by_series.values().map(|v| mean(v)).collect();
            match t_confidence_interval(&values, t) {
                Ok(interval) => points.push(TrajectoryPoint {
                    t,
                    mean: interval.mean,
                    ci_low: interval.low,
                    ci_high: interval.high,
                    n: values.len(),
                }),
                Err(e) => {
                    debug!(%condition, t, "excluding time step: {}", e);
                    dropped_steps.push(t);
                }
            }
        }

        Trajectory {
            condition,
            points,
            dropped_steps,
        }
    }
}

/// Folds published series into per-condition confidence trajectories
pub struct Aggregator<'a> {
    /// Source of published series
    store: &'a dyn ArtifactStore,
    /// Columns read from each series
    columns: &'a SeriesColumns,
    /// Where fetched artifacts are copied before parsing
    scratch_dir: PathBuf,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        store: &'a dyn ArtifactStore,
        columns: &'a SeriesColumns,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            columns,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Fails with `IncompleteData` unless every expected key is published.
    /// Checked for all conditions before any artifact is read.
    pub fn check_barrier(&self, condition_keys: &ConditionKeys) -> Result<(), PipelineError> {
        let missing: Vec<String> = condition_keys
            .values()
            .flatten()
            .filter(|key| !self.store.exists(key))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::IncompleteData { missing });
        }
        Ok(())
    }

    /// Fetch every series and reduce each condition to a trajectory
    pub fn aggregate(
        &self,
        condition_keys: &ConditionKeys,
    ) -> Result<BTreeMap<Condition, Trajectory>, PipelineError> {
        self.check_barrier(condition_keys)?;

        let mut arena = ObservationArena::default();
        for (&condition, keys) in condition_keys {
            for key in keys {
                let local = self.scratch_dir.join(format!("{}.csv", key));
                if local.exists() {
                    std::fs::remove_file(&local).map_err(|e| {
                        PipelineError::artifact(key, format!("failed to clear scratch copy: {}", e))
                    })?;
                }
                self.store.get(key, &local)?;
                let series = read_series(key, &local, self.columns)?;
                arena.add_series(condition, &series);
            }
        }

        let mut trajectories = BTreeMap::new();
        for (&condition, keys) in condition_keys {
            let trajectory = arena.reduce(condition);
            info!(
                %condition,
                replicates = keys.len(),
                points = trajectory.points.len(),
                dropped = trajectory.dropped_steps.len(),
                "aggregated condition"
            );
            trajectories.insert(condition, trajectory);
        }
        Ok(trajectories)
    }
}
