use nudge_model::FittedModel;
use nudge_stats::distribution;
use serde::{Deserialize, Serialize};

/// Rounds `value` to `digits` decimal places.
#[must_use]
pub fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10_f64.powi(digits);
    (value * scale).round() / scale
}

/// Presentation row of the fixed-effects table.
///
/// Estimates, standard errors, interval bounds, t values and df are rounded
/// to two decimals; p-values to three.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRow {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub t_value: f64,
    pub df: f64,
    pub p_value: f64,
}

/// Coefficient table of `model` with Wald intervals at `confidence_level`,
/// using each coefficient's Satterthwaite df for the t quantile.
#[must_use]
pub fn coefficient_table(model: &FittedModel, confidence_level: f64) -> Vec<CoefficientRow> {
    model
        .coefficients()
        .into_iter()
        .map(|c| {
            let half_width = distribution::t_critical(confidence_level, c.df) * c.std_error;
            CoefficientRow {
                term: c.term,
                estimate: round_to(c.estimate, 2),
                std_error: round_to(c.std_error, 2),
                ci_lower: round_to(c.estimate - half_width, 2),
                ci_upper: round_to(c.estimate + half_width, 2),
                t_value: round_to(c.t_value, 2),
                df: round_to(c.df, 2),
                p_value: round_to(c.p_value, 3),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use nudge_data::{
        AnalysisSubset, CohortKind,
        simulate::{SimulationParams, simulate_seeded},
    };
    use nudge_model::{ModelFormula, fit};

    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(0.04449, 3), 0.044);
        assert_eq!(round_to(-2.675_01, 2), -2.68);
    }

    #[test]
    fn test_table_is_rounded_and_ordered() {
        let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
        let subset = AnalysisSubset::split(&dataset, CohortKind::AtRisk).unwrap();
        let model = fit(&subset, ModelFormula::for_cohort(CohortKind::AtRisk)).unwrap();
        let table = coefficient_table(&model, 0.95);

        let terms = table.iter().map(|r| r.term.as_str()).collect::<Vec<_>>();
        assert_eq!(terms, model.design().column_names());
        for row in &table {
            assert_eq!(row.estimate, round_to(row.estimate, 2));
            assert_eq!(row.p_value, round_to(row.p_value, 3));
            assert!(row.ci_lower <= row.estimate && row.estimate <= row.ci_upper);
        }
    }
}
