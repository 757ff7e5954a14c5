use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use nudge_analysis::config::AnalysisConfig;

use self::{analyze::AnalyzeArg, diagnose::DiagnoseArg, simulate::SimulateArg};

mod analyze;
mod diagnose;
mod simulate;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Simulate a study dataset and write it as CSV
    Simulate(#[clap(flatten)] SimulateArg),
    /// Run the full analysis pipeline on both cohorts
    Analyze(#[clap(flatten)] AnalyzeArg),
    /// Check model assumptions and suggest a covariate transform
    Diagnose(#[clap(flatten)] DiagnoseArg),
}

/// Configuration file and the simulation fields that can be overridden.
#[derive(Debug, Clone, Args)]
pub(crate) struct ConfigArg {
    /// Path to an analysis configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed of the simulated dataset [default: from config, else 123]
    #[arg(long)]
    seed: Option<u64>,
    /// Number of simulated participants [default: from config, else 300]
    #[arg(long)]
    sample_size: Option<usize>,
}

impl ConfigArg {
    /// Configuration file values with command-line overrides applied.
    pub(crate) fn config(&self) -> anyhow::Result<AnalysisConfig> {
        let mut config = crate::util::read_config_file(self.config.as_deref())?;
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(sample_size) = self.sample_size {
            config.simulation.sample_size = sample_size;
        }
        Ok(config)
    }
}

/// Dataset and configuration options shared by the analysis commands.
#[derive(Debug, Clone, Args)]
pub(crate) struct DataArg {
    /// Path to a CSV dataset; simulated from the configuration when omitted
    #[arg(long)]
    data: Option<PathBuf>,
    #[clap(flatten)]
    config: ConfigArg,
}

impl DataArg {
    pub(crate) fn config(&self) -> anyhow::Result<AnalysisConfig> {
        self.config.config()
    }

    pub(crate) fn dataset(
        &self,
        config: &AnalysisConfig,
    ) -> anyhow::Result<nudge_data::Dataset> {
        crate::util::load_dataset(self.data.as_deref(), config)
    }
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Simulate(arg) => simulate::run(&arg)?,
        Mode::Analyze(arg) => analyze::run(&arg)?,
        Mode::Diagnose(arg) => diagnose::run(&arg)?,
    }
    Ok(())
}
