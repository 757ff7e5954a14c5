use std::path::PathBuf;

use anyhow::Context;
use nudge_analysis::{config::AnalysisConfig, pipeline};

use crate::{command::ConfigArg, util::Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SimulateArg {
    #[clap(flatten)]
    config: ConfigArg,
    /// Output CSV path (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

impl SimulateArg {
    pub(crate) fn config(&self) -> anyhow::Result<AnalysisConfig> {
        self.config.config()
    }
}

pub(crate) fn run(arg: &SimulateArg) -> anyhow::Result<()> {
    let config = arg.config()?;
    let dataset = pipeline::simulate_dataset(&config).context("Failed to simulate dataset")?;

    let mut output = Output::from_output_path(arg.output.clone())?;
    dataset
        .write_csv(&mut output)
        .with_context(|| format!("Failed to write dataset to {}", output.display_path()))?;
    if let Output::File { path, .. } = &output {
        eprintln!(
            "Wrote {} participants (seed {}) to {}",
            dataset.len(),
            config.seed,
            path.display()
        );
    }
    Ok(())
}
