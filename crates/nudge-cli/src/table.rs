//! Console tables for the analysis commands
//!
//! Every table is indented by two spaces and separated from its header by a
//! dashed rule, so reports from several cohorts line up when printed in
//! sequence.

use nudge_analysis::{
    coefficients::CoefficientRow,
    contrasts::{ContrastRow, ContrastTable},
    emmeans::MarginalMean,
    equivalence::EquivalenceResult,
    pipeline::TransformSuggestion,
};
use nudge_model::{DiagnosticReport, ModelSummary};

fn print_separator(width: usize) {
    println!("  {}", "-".repeat(width));
}

/// p-values below 0.001 are shown as a bound.
fn format_p(p: f64) -> String {
    if p < 0.001 {
        "<0.001".to_string()
    } else {
        format!("{p:.3}")
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or("-".to_string(), |v| format!("{v:.3}"))
}

pub(crate) fn print_model_summary(summary: &ModelSummary) {
    println!("Linear mixed model fit by REML");
    println!("  Formula: {}", summary.formula);
    println!("  REML criterion at convergence: {:.1}", summary.reml_criterion);
    println!(
        "  Observations: {}, groups (setting): {}",
        summary.observations, summary.groups
    );
    if summary.singular {
        println!("  boundary (singular) fit: setting variance estimated at zero");
    }
    println!();

    let [min, q1, median, q3, max] = summary.scaled_residuals;
    println!("  Scaled residuals:");
    println!(
        "  {:>9} {:>9} {:>9} {:>9} {:>9}",
        "Min", "1Q", "Median", "3Q", "Max"
    );
    println!("  {min:>9.3} {q1:>9.3} {median:>9.3} {q3:>9.3} {max:>9.3}");
    println!();

    let components = &summary.variance_components;
    println!("  Random effects:");
    println!("  {:<12} {:<12} {:>10} {:>10}", "Groups", "Name", "Variance", "Std.Dev.");
    println!(
        "  {:<12} {:<12} {:>10.3} {:>10.3}",
        "setting",
        "(Intercept)",
        components.setting_intercept,
        components.setting_intercept.sqrt()
    );
    println!(
        "  {:<12} {:<12} {:>10.3} {:>10.3}",
        "Residual",
        "",
        components.residual,
        components.residual.sqrt()
    );
    for effect in &summary.random_effects {
        println!(
            "    BLUP {:<10} n={:<5} {:>10.3}",
            effect.setting.to_string(),
            effect.observations,
            effect.blup
        );
    }
    println!();
}

pub(crate) fn print_coefficients(rows: &[CoefficientRow]) {
    println!("Fixed effects:");
    println!(
        "  {:<36} {:>10} {:>9} {:>10} {:>10} {:>8} {:>8} {:>8}",
        "Term", "Estimate", "SE", "CI low", "CI high", "t", "df", "p"
    );
    // term(36) + estimate(10) + se(9) + ci(10+10) + t(8) + df(8) + p(8) + spaces(7)
    print_separator(106);
    for row in rows {
        println!(
            "  {:<36} {:>10.3} {:>9.3} {:>10.3} {:>10.3} {:>8.2} {:>8.1} {:>8}",
            row.term,
            row.estimate,
            row.std_error,
            row.ci_lower,
            row.ci_upper,
            row.t_value,
            row.df,
            format_p(row.p_value),
        );
    }
    println!();
}

pub(crate) fn print_marginal_means(means: &[MarginalMean]) {
    println!("Estimated marginal means:");
    println!(
        "  {:<14} {:<15} {:>10} {:>9} {:>8} {:>10} {:>10}",
        "Treatment", "Risk", "EMM", "SE", "df", "CI low", "CI high"
    );
    print_separator(82);
    for mean in means {
        println!(
            "  {:<14} {:<15} {:>10.3} {:>9.3} {:>8.1} {:>10.3} {:>10.3}",
            mean.treatment.to_string(),
            mean.risk.to_string(),
            mean.estimate,
            mean.std_error,
            mean.df,
            mean.ci_lower,
            mean.ci_upper,
        );
    }
    println!();
}

fn print_contrast_rows(title: &str, rows: &[ContrastRow]) {
    println!("{title}:");
    println!(
        "  {:<52} {:>10} {:>9} {:>8} {:>8} {:>8}",
        "Contrast", "Estimate", "SE", "df", "t", "p"
    );
    print_separator(100);
    for row in rows {
        let label = if row.contrast.starts_with('(') {
            row.contrast.clone()
        } else {
            format!("{} [{}]", row.contrast, row.risk)
        };
        println!(
            "  {:<52} {:>10.3} {:>9.3} {:>8.1} {:>8.2} {:>8}",
            label,
            row.estimate,
            row.std_error,
            row.df,
            row.t_value,
            format_p(row.p_value),
        );
    }
    println!();
}

pub(crate) fn print_contrasts(table: &ContrastTable) {
    print_contrast_rows("Treatment contrasts", &table.pairwise);
    if !table.interactions.is_empty() {
        print_contrast_rows("Interaction contrasts", &table.interactions);
    }
}

pub(crate) fn print_equivalence(result: &EquivalenceResult) {
    println!(
        "Equivalence test (TOST) for {}, bounds [{}, {}], alpha = {}",
        result.effect, result.sesoi.lower, result.sesoi.upper, result.alpha
    );
    println!(
        "  {:<10} {:>10} {:>9} {:>8} {:>8}",
        "Bound", "Value", "t", "df", "p"
    );
    print_separator(49);
    println!(
        "  {:<10} {:>10.3} {:>9.3} {:>8.1} {:>8}",
        "lower",
        result.sesoi.lower,
        result.t_lower,
        result.df,
        format_p(result.p_lower),
    );
    println!(
        "  {:<10} {:>10.3} {:>9.3} {:>8.1} {:>8}",
        "upper",
        result.sesoi.upper,
        result.t_upper,
        result.df,
        format_p(result.p_upper),
    );
    println!();
    println!(
        "  Estimate {:.3} (SE {:.3}), {:.0}% CI [{:.3}, {:.3}]",
        result.estimate,
        result.std_error,
        100.0 * (1.0 - 2.0 * result.alpha),
        result.ci_lower,
        result.ci_upper,
    );
    let verdict = if result.equivalent {
        "equivalent"
    } else {
        "not shown to be equivalent"
    };
    println!(
        "  Conclusion: effect is {verdict} (p = {})",
        format_p(result.p_value())
    );
    println!();
}

pub(crate) fn print_diagnostics(report: &DiagnosticReport) {
    println!("Assumption checks:");
    println!(
        "  {:<36} {:<13} {:>10} {:>8} {:>10}",
        "Assumption", "Outcome", "Statistic", "p", "Threshold"
    );
    print_separator(81);
    for check in &report.checks {
        println!(
            "  {:<36} {:<13} {:>10} {:>8} {:>10}",
            check.assumption.to_string(),
            check.outcome.to_string(),
            format_optional(check.statistic),
            check.p_value.map_or("-".to_string(), format_p),
            format_optional(check.threshold),
        );
        if !check.detail.is_empty() {
            println!("      {}", check.detail);
        }
    }
    println!();

    if !report.gvif.is_empty() {
        println!("  {:<20} {:>4} {:>10} {:>14}", "Term", "Df", "GVIF", "GVIF^(1/2Df)");
        print_separator(51);
        for term in &report.gvif {
            println!(
                "  {:<20} {:>4} {:>10.3} {:>14.3}",
                term.term.label(),
                term.df,
                term.gvif,
                term.scaled
            );
        }
        println!();
    }

    let max_cook = report
        .cooks_distance
        .iter()
        .copied()
        .fold(0.0_f64, f64::max);
    println!("  Max Cook's distance: {max_cook:.4}");
    println!();
}

pub(crate) fn print_transform_candidates(suggestion: &TransformSuggestion) {
    println!("Covariate transform candidates:");
    println!("  {:<40} {:>12}", "Transform", "Pearson P/df");
    print_separator(53);
    for candidate in &suggestion.candidates {
        let marker = if candidate.transform == suggestion.transform {
            " *"
        } else {
            ""
        };
        println!(
            "  {:<40} {:>12.3}{marker}",
            candidate.transform.to_string(),
            candidate.pearson_p_per_df
        );
    }
    println!();
    println!("  Suggested covariate term: {}", suggestion.formula_term);
    println!("  (* = selected; lower Pearson P/df is closer to normal)");
    println!();
}
