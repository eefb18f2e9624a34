mod aggregate;
mod chart;
mod config;
mod error;
mod exec;
mod pipeline;
mod plan;
mod store;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::PipelineConfig;
use pipeline::{export_chart, Pipeline};

/// Run simulation replicates under two conditions and chart the mean
/// trajectory of each with its 95% confidence band
#[derive(Debug, Parser)]
#[command(name = "replica", version, about)]
struct Cli {
    /// Configuration file (reads the `pipeline` section)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Replicates per condition, overrides the config file
    #[arg(short = 'n', long)]
    replicates: Option<usize>,

    /// Maximum simulations running at once
    #[arg(short = 'j', long)]
    max_parallel: Option<usize>,

    /// Directory for runs and artifacts
    #[arg(short, long, default_value = ".replica")]
    work_dir: PathBuf,

    /// Also copy the final chart here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = PipelineConfig::load(&self.config)?;
        if let Some(replicates) = self.replicates {
            config.replicates = replicates;
        }
        if let Some(max_parallel) = self.max_parallel {
            config.max_parallel = Some(max_parallel);
        }
        Ok(config)
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.load_config()?;
    let pipeline = Pipeline::new(config, &cli.work_dir);
    let outcome = pipeline
        .run()
        .await
        .context(format!("Pipeline {} failed", pipeline.run_id()))?;

    if let Some(output) = &cli.output {
        export_chart(&pipeline, output)?;
    }

    println!("run:     {}", outcome.run_id);
    println!("chart:   {}", outcome.chart_path.display());
    println!("summary: {}", outcome.summary_path.display());
    for (condition, trajectory) in &outcome.trajectories {
        println!(
            "{:<14} {} steps ({} dropped)",
            condition.to_string(),
            trajectory.points.len(),
            trajectory.dropped_steps.len()
        );
    }
    Ok(())
}
