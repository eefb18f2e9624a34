use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::SeriesColumns;
use crate::chart::ChartConfig;
use crate::plan::Condition;

/// Simulation parameters, rendered onto the command line as `KEY VALUE` pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Value>")]
pub struct ParamSet(BTreeMap<String, String>);

impl ParamSet {
    /// Empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    /// Value of `key`, if set
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    /// Copy of `self` with `overrides` applied on top
    pub fn merged(&self, overrides: &ParamSet) -> ParamSet {
        let mut params = self.clone();
        for (key, value) in &overrides.0 {
            params.0.insert(key.clone(), value.clone());
        }
        params
    }

    /// Required keys absent (or blank) in this set
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|key| self.get(key).map_or(true, |v| v.trim().is_empty()))
            .map(|key| key.as_str())
            .collect()
    }

    /// Command-line rendition, sorted by key
    pub fn to_args(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(k, v)| [k.clone(), v.clone()])
            .collect()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for ParamSet {
    fn from(pairs: [(&str, &str); N]) -> Self {
        let mut params = ParamSet::new();
        for (k, v) in pairs {
            params.set(k, v);
        }
        params
    }
}

impl TryFrom<BTreeMap<String, Value>> for ParamSet {
    type Error = String;

    fn try_from(raw: BTreeMap<String, Value>) -> std::result::Result<Self, Self::Error> {
        let mut params = ParamSet::new();
        for (key, value) in raw {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => u8::from(b).to_string(),
                other => {
                    return Err(format!(
                        "parameter {} must be a string, number or bool, got {}",
                        key, other
                    ))
                }
            };
            params.0.insert(key, value);
        }
        Ok(params)
    }
}

/// How to invoke the external simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSpec {
    /// Executable
    pub command: String,
    /// Fixed arguments placed before the parameters
    pub args: Vec<String>,
    /// File the simulation writes into its working directory
    pub output_file: String,
    /// Base configuration shared by every replicate
    pub base_params: ParamSet,
    /// Keys that must be present in `base_params`
    pub required_keys: Vec<String>,
    /// Parameter receiving the replicate index
    pub seed_key: String,
    /// Parameter receiving the per-condition flag
    pub condition_key: String,
    /// Flag value passed for each condition
    pub condition_values: BTreeMap<Condition, String>,
}

impl Default for SimulationSpec {
    fn default() -> Self {
        let base_params = ParamSet::from([
            ("GLOBAL-updates", "100"),
            ("BRAIN-brainType", "TDLambda"),
            ("WORLD_CONVEYORBELT-numThreads", "1"),
            ("WORLD_CONVEYORBELT-trials", "2"),
            ("WORLD_CONVEYORBELT-trialLength", "20"),
            ("BRAIN_TDLAMBDA-useConfidence", "0"),
            ("BRAIN_TDLAMBDA-pRandomAction", "0.01"),
            ("GENOME_CIRCULAR-sizeInitial", "36"),
            ("GENOME_CIRCULAR-sizeMax", "36"),
            ("GENOME_CIRCULAR-sizeMin", "36"),
            ("GENOME-sitesType", "double"),
            ("GENOME-alphabetSize", "1000"),
            ("GENOME_CIRCULAR-mutationPointOffsetRange", "1.0"),
            ("GENOME_CIRCULAR-mutationPointOffsetRate", "0.01"),
            ("GENOME_CIRCULAR-mutationPointRate", "0.01"),
            ("GENOME_CIRCULAR-mutationPointOffsetUniform", "0"),
            ("WORLD_CONVEYORBELT-logActions", "0"),
            ("WORLD_CONVEYORBELT-logRewards", "0"),
            ("WORLD_CONVEYORBELT-logSensors", "0"),
            ("ARCHIVIST_LODWAP-dataSequence", ":1"),
            ("ARCHIVIST_LODWAP-organismsSequence", ":1"),
            ("ARCHIVIST_LODWAP-writeDataFile", "1"),
            ("ARCHIVIST_LODWAP-writeOrganismsFile", "1"),
            ("ARCHIVIST_LODWAP-terminateAfter", "0"),
        ]);

        let mut condition_values = BTreeMap::new();
        condition_values.insert(Condition::Predictable, "0".to_string());
        condition_values.insert(Condition::Unpredictable, "1".to_string());

        Self {
            command: "./code/mabe".into(),
            args: vec!["-p".into()],
            output_file: "LOD_data.csv".into(),
            base_params,
            required_keys: vec![
                "GLOBAL-updates".into(),
                "WORLD_CONVEYORBELT-trials".into(),
                "WORLD_CONVEYORBELT-trialLength".into(),
            ],
            seed_key: "GLOBAL-randomSeed".into(),
            condition_key: "WORLD_CONVEYORBELT-randomize".into(),
            condition_values,
        }
    }
}

/// Pipeline configuration, read once at the start of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Replicates per condition
    pub replicates: usize,
    /// Upper bound on concurrently running simulations (None: CPU count)
    pub max_parallel: Option<usize>,
    /// Simulation invocation
    pub simulation: SimulationSpec,
    /// Columns read from each output series
    pub series: SeriesColumns,
    /// Comparison chart presentation
    pub chart: ChartConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            replicates: 10,
            max_parallel: None,
            simulation: SimulationSpec::default(),
            series: SeriesColumns::default(),
            chart: ChartConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load the `pipeline` section of a config file, falling back to defaults
    pub fn load(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context(format!("Failed to read {}", config_path.display()))?;
            let config: Value = serde_json::from_str(&content)
                .context(format!("Failed to parse {}", config_path.display()))?;

            if let Some(section) = config.get("pipeline") {
                return serde_json::from_value(section.clone())
                    .context("Failed to parse pipeline config");
            }
        }
        Ok(Self::default())
    }

    /// Effective parallelism for the replicate stage
    pub fn parallelism(&self) -> usize {
        self.max_parallel
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ========================================
    // ParamSet Tests
    // ========================================

    #[test]
    fn test_merged_overrides_win() {
        let base = ParamSet::from([("a", "1"), ("b", "2")]);
        let merged = base.merged(&ParamSet::from([("b", "3"), ("c", "4")]));

        assert_eq!(merged.get("a"), Some("1"));
        assert_eq!(merged.get("b"), Some("3"));
        assert_eq!(merged.get("c"), Some("4"));
        // base untouched
        assert_eq!(base.get("b"), Some("2"));
    }

    #[test]
    fn test_missing_reports_absent_and_blank_keys() {
        let params = ParamSet::from([("present", "1"), ("blank", " ")]);
        let required = vec!["present".to_string(), "blank".to_string(), "absent".to_string()];
        assert_eq!(params.missing(&required), vec!["blank", "absent"]);
    }

    #[test]
    fn test_to_args_alternates_keys_and_values() {
        let params = ParamSet::from([("GLOBAL-updates", "100"), ("A-b", "x")]);
        assert_eq!(params.to_args(), vec!["A-b", "x", "GLOBAL-updates", "100"]);
    }

    #[test]
    fn test_param_set_accepts_scalars() {
        let params: ParamSet =
            serde_json::from_str(r#"{"n": 100, "rate": 0.5, "flag": true, "name": "x"}"#).unwrap();
        assert_eq!(params.get("n"), Some("100"));
        assert_eq!(params.get("rate"), Some("0.5"));
        assert_eq!(params.get("flag"), Some("1"));
        assert_eq!(params.get("name"), Some("x"));

        let bad: std::result::Result<ParamSet, _> = serde_json::from_str(r#"{"n": [1, 2]}"#);
        assert!(bad.is_err());
    }

    // ========================================
    // PipelineConfig Tests
    // ========================================

    #[test]
    fn test_default_config_is_fully_specified() {
        let config = PipelineConfig::default();
        let sim = &config.simulation;
        assert!(sim.base_params.missing(&sim.required_keys).is_empty());
        assert_eq!(sim.condition_values.len(), 2);
        assert_eq!(sim.output_file, "LOD_data.csv");
    }

    #[test]
    fn test_load_returns_default_when_no_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig::load(&temp_dir.path().join("config.json")).unwrap();
        assert_eq!(config.replicates, 10);
        assert_eq!(config.simulation.seed_key, "GLOBAL-randomSeed");
    }

    #[test]
    fn test_load_from_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let config_json = r#"{
            "pipeline": {
                "replicates": 3,
                "max_parallel": 2,
                "simulation": {
                    "command": "./sim",
                    "base_params": {"length": 50},
                    "required_keys": ["length"],
                    "condition_values": {"predictable": "off", "unpredictable": "on"}
                },
                "series": {"time": "step", "metric": "score"}
            }
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = PipelineConfig::load(&config_path).unwrap();
        assert_eq!(config.replicates, 3);
        assert_eq!(config.parallelism(), 2);
        assert_eq!(config.simulation.command, "./sim");
        assert_eq!(config.simulation.base_params.get("length"), Some("50"));
        assert_eq!(
            config.simulation.condition_values.get(&Condition::Unpredictable),
            Some(&"on".to_string())
        );
        // Unspecified fields fall back to defaults
        assert_eq!(config.simulation.output_file, "LOD_data.csv");
        assert_eq!(config.series.time, "step");
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        std::fs::write(&config_path, "{ not json").unwrap();
        assert!(PipelineConfig::load(&config_path).is_err());
    }

    #[test]
    fn test_parallelism_is_at_least_one() {
        let config = PipelineConfig {
            max_parallel: Some(0),
            ..PipelineConfig::default()
        };
        assert_eq!(config.parallelism(), 1);
    }
}
