use anyhow::Context;
use nudge_analysis::{cohort::CohortAnalysis, pipeline::TransformSuggestion};
use nudge_data::{AnalysisSubset, CohortKind};

use crate::{command::DataArg, table};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct DiagnoseArg {
    #[clap(flatten)]
    data: DataArg,
    /// Cohort to diagnose
    #[arg(long, default_value_t = CohortKind::AtRisk)]
    cohort: CohortKind,
    /// Re-specify the model with the suggested covariate transform and refit
    #[arg(long)]
    apply_transform: bool,
}

pub(crate) fn run(arg: &DiagnoseArg) -> anyhow::Result<()> {
    let config = arg.data.config()?;
    let dataset = arg.data.dataset(&config)?;
    let subset = AnalysisSubset::split(&dataset, arg.cohort)
        .with_context(|| format!("Failed to select the {} cohort", arg.cohort))?;

    let mut analysis = CohortAnalysis::new(subset);
    analysis.fit()?;
    println!("=== {} cohort ===", arg.cohort);
    println!();
    print_model(&analysis, config.confidence_level)?;

    let selection = analysis.suggest_transform()?;
    table::print_transform_candidates(&TransformSuggestion::from(&selection));

    if !arg.apply_transform {
        return Ok(());
    }
    if selection.transform.is_identity() {
        println!("Covariate is already closest to normal untransformed; nothing to apply.");
        return Ok(());
    }

    analysis.respecify(&selection)?;
    log::info!("refitted with {}", analysis.formula());
    println!("=== {} cohort, re-specified ===", arg.cohort);
    println!();
    print_model(&analysis, config.confidence_level)?;
    Ok(())
}

fn print_model(analysis: &CohortAnalysis, confidence_level: f64) -> anyhow::Result<()> {
    table::print_model_summary(&analysis.model()?.summary());
    table::print_coefficients(&analysis.coefficients(confidence_level)?);
    table::print_diagnostics(&analysis.diagnostics()?);
    Ok(())
}
