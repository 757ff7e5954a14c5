use std::path::{Path, PathBuf};

use anyhow::Context;
use nudge_analysis::{
    equivalence::Sesoi,
    pipeline::{self, AnalysisReport, CohortReport},
};
use nudge_data::CohortKind;

use crate::{
    command::DataArg,
    plot, table,
    util::{self, Output},
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct AnalyzeArg {
    #[clap(flatten)]
    data: DataArg,
    /// Symmetric equivalence bound: tests the no-risk effect against [-SESOI, +SESOI]
    #[arg(long)]
    sesoi: Option<f64>,
    /// One-sided alpha of each TOST test
    #[arg(long)]
    alpha: Option<f64>,
    /// Directory for CSV tables, the JSON report and the SVG figure
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

pub(crate) fn run(arg: &AnalyzeArg) -> anyhow::Result<()> {
    let mut config = arg.data.config()?;
    if let Some(bound) = arg.sesoi {
        config.sesoi = Sesoi::symmetric(bound);
    }
    if let Some(alpha) = arg.alpha {
        config.equivalence_alpha = alpha;
    }
    let dataset = arg.data.dataset(&config)?;
    log::info!("loaded {} participants", dataset.len());

    let report = pipeline::run(&config, &dataset).context("Analysis failed")?;

    for cohort in &report.cohorts {
        print_cohort(cohort);
    }
    table::print_equivalence(&report.equivalence);

    if let Some(dir) = &arg.output_dir {
        save_outputs(dir, &report)?;
    }
    Ok(())
}

fn print_cohort(cohort: &CohortReport) {
    println!("=== {} cohort ===", cohort.cohort);
    println!();
    table::print_model_summary(&cohort.model);
    table::print_coefficients(&cohort.coefficients);
    table::print_marginal_means(&cohort.marginal_means);
    table::print_contrasts(&cohort.contrasts);

    let failures = cohort
        .diagnostics
        .failures()
        .map(|check| check.assumption.to_string())
        .collect::<Vec<_>>();
    if failures.is_empty() {
        println!("All assumption checks passed or were inconclusive.");
    } else {
        println!("Failed assumption checks: {}", failures.join(", "));
        println!("  run `nudge diagnose --cohort {}` for details", cohort.cohort);
    }
    println!();
}

fn save_outputs(dir: &Path, report: &AnalysisReport) -> anyhow::Result<()> {
    util::create_dir(dir)?;

    for cohort in &report.cohorts {
        let name = cohort.cohort.to_str().replace('-', "_");
        util::write_csv_file(
            &dir.join(format!("coefficients_{name}.csv")),
            &cohort.coefficients,
        )?;
        util::write_csv_file(
            &dir.join(format!("marginal_means_{name}.csv")),
            &cohort.marginal_means,
        )?;
        let contrasts = cohort
            .contrasts
            .pairwise
            .iter()
            .chain(&cohort.contrasts.interactions)
            .collect::<Vec<_>>();
        util::write_csv_file(&dir.join(format!("contrasts_{name}.csv")), &contrasts)?;
        util::write_csv_file(
            &dir.join(format!("predictions_{name}.csv")),
            &cohort.predictions,
        )?;
    }

    let mut output = Output::open(dir.join("report.json"))?;
    output.write_json(report)?;

    let at_risk = cohort_means(report, CohortKind::AtRisk)?;
    let no_risk = cohort_means(report, CohortKind::NoRisk)?;
    let svg = plot::render_estimates(at_risk, no_risk, report.config.sesoi)?;
    Output::open(dir.join("estimates.svg"))?.write_text(&svg)?;

    eprintln!("Wrote tables, report.json and estimates.svg to {}", dir.display());
    Ok(())
}

fn cohort_means(
    report: &AnalysisReport,
    kind: CohortKind,
) -> anyhow::Result<&[nudge_analysis::emmeans::MarginalMean]> {
    report
        .cohort(kind)
        .map(|c| c.marginal_means.as_slice())
        .with_context(|| format!("Report has no {kind} cohort"))
}
