//! Full-grid population-level predictions, used to cross-check the marginal
//! means through an independent computation path.
//!
//! The grid crosses every treatment arm and risk level with every distinct
//! observed covariate value (model scale). Averages over the grid by arm, and
//! by arm × risk, must reproduce the marginal means: the prediction is linear
//! in the covariate, and each distinct value is weighted by how often it was
//! observed, so the averaged covariate is the covariate mean. With unique
//! covariate values every weight is one and the averages are simple means.

use nudge_data::{RiskCategory, TreatmentArm};
use nudge_model::{DesignError, FittedModel};
use nudge_stats::distribution;
use serde::{Deserialize, Serialize};

use crate::emmeans::{MarginalMean, RiskLabel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub treatment: TreatmentArm,
    pub risk: RiskCategory,
    pub covariate: f64,
    /// Number of observations with this covariate value.
    pub multiplicity: usize,
    pub estimate: f64,
    pub std_error: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Multiplicity-weighted average of grid predictions for one arm and risk label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionAggregate {
    pub treatment: TreatmentArm,
    pub risk: RiskLabel,
    pub rows: usize,
    pub estimate: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum CrossCheckError {
    #[display(
        "marginal mean for {treatment} / {risk} is {marginal_mean} but the prediction average is {prediction} (relative difference {relative_difference:e})"
    )]
    Mismatch {
        treatment: TreatmentArm,
        risk: RiskLabel,
        marginal_mean: f64,
        prediction: f64,
        relative_difference: f64,
    },
    #[display("no prediction aggregate for {treatment} / {risk}")]
    MissingAggregate {
        treatment: TreatmentArm,
        risk: RiskLabel,
    },
}

/// Sorted distinct values with their multiplicities.
fn distinct(mut values: Vec<f64>) -> Vec<(f64, usize)> {
    values.sort_by(f64::total_cmp);
    let mut counted: Vec<(f64, usize)> = Vec::with_capacity(values.len());
    for value in values {
        match counted.last_mut() {
            Some((last, count)) if *last == value => *count += 1,
            _ => counted.push((value, 1)),
        }
    }
    counted
}

/// Predictions for every grid cell, with intervals at `confidence_level`
/// using the residual degrees of freedom.
pub fn prediction_grid(
    model: &FittedModel,
    confidence_level: f64,
) -> Result<Vec<PredictionRow>, DesignError> {
    let design = model.design();
    let covariates = distinct(model.covariate_values());
    #[expect(clippy::cast_precision_loss)]
    let critical = distribution::t_critical(confidence_level, model.residual_df() as f64);

    let mut rows = Vec::with_capacity(
        design.treatment_levels().len() * design.risk_levels().len() * covariates.len(),
    );
    for treatment in design.treatment_levels().iter() {
        for risk in design.risk_levels().iter() {
            for &(covariate, multiplicity) in &covariates {
                let x = design.row(treatment, risk, covariate)?;
                let estimate = model.predict(&x);
                let std_error = nudge_stats::linalg::quad_form(model.cov_beta(), &x).sqrt();
                rows.push(PredictionRow {
                    treatment,
                    risk,
                    covariate,
                    multiplicity,
                    estimate,
                    std_error,
                    ci_lower: estimate - critical * std_error,
                    ci_upper: estimate + critical * std_error,
                });
            }
        }
    }
    log::debug!("prediction grid: {} rows", rows.len());
    Ok(rows)
}

#[expect(clippy::cast_precision_loss)]
fn aggregate<'a, I>(
    treatment: TreatmentArm,
    risk: RiskLabel,
    rows: I,
) -> Option<PredictionAggregate>
where
    I: IntoIterator<Item = &'a PredictionRow>,
{
    let (count, weight, estimate, lower, upper) = rows.into_iter().fold(
        (0, 0.0, 0.0, 0.0, 0.0),
        |(count, weight, estimate, lower, upper), row| {
            let w = row.multiplicity as f64;
            (
                count + 1,
                weight + w,
                estimate + w * row.estimate,
                lower + w * row.ci_lower,
                upper + w * row.ci_upper,
            )
        },
    );
    (weight > 0.0).then(|| PredictionAggregate {
        treatment,
        risk,
        rows: count,
        estimate: estimate / weight,
        ci_lower: lower / weight,
        ci_upper: upper / weight,
    })
}

/// Averages the grid by arm × risk category, then by arm (`All`).
#[must_use]
pub fn aggregate_predictions(rows: &[PredictionRow]) -> Vec<PredictionAggregate> {
    let mut arms = rows.iter().map(|r| r.treatment).collect::<Vec<_>>();
    arms.dedup();
    let mut risks = rows.iter().map(|r| r.risk).collect::<Vec<_>>();
    risks.sort();
    risks.dedup();

    let mut aggregates = Vec::new();
    for &treatment in &arms {
        for &risk in &risks {
            aggregates.extend(aggregate(
                treatment,
                RiskLabel::Category(risk),
                rows.iter().filter(|r| r.treatment == treatment && r.risk == risk),
            ));
        }
    }
    for &treatment in &arms {
        aggregates.extend(aggregate(
            treatment,
            RiskLabel::All,
            rows.iter().filter(|r| r.treatment == treatment),
        ));
    }
    aggregates
}

/// Checks that every marginal mean is reproduced by the matching prediction
/// aggregate within `tolerance`, relative to the larger magnitude.
pub fn cross_check(
    means: &[MarginalMean],
    aggregates: &[PredictionAggregate],
    tolerance: f64,
) -> Result<(), CrossCheckError> {
    for mean in means {
        let aggregate = aggregates
            .iter()
            .find(|a| a.treatment == mean.treatment && a.risk == mean.risk)
            .ok_or(CrossCheckError::MissingAggregate {
                treatment: mean.treatment,
                risk: mean.risk,
            })?;
        let scale = mean.estimate.abs().max(aggregate.estimate.abs());
        let difference = (mean.estimate - aggregate.estimate).abs();
        let relative_difference = if scale > 0.0 { difference / scale } else { 0.0 };
        if relative_difference.is_nan() || relative_difference > tolerance {
            return Err(CrossCheckError::Mismatch {
                treatment: mean.treatment,
                risk: mean.risk,
                marginal_mean: mean.estimate,
                prediction: aggregate.estimate,
                relative_difference,
            });
        }
    }
    log::info!(
        "cross-check passed: {} marginal means agree with the prediction grid",
        means.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use nudge_data::{
        AnalysisSubset, CohortKind,
        simulate::{SimulationParams, simulate_seeded},
    };
    use nudge_model::{ModelFormula, fit};

    use super::*;
    use crate::emmeans::marginal_means;

    fn model(kind: CohortKind) -> FittedModel {
        let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
        let subset = AnalysisSubset::split(&dataset, kind).unwrap();
        fit(&subset, ModelFormula::for_cohort(kind)).unwrap()
    }

    #[test]
    fn test_grid_size() {
        let model = model(CohortKind::AtRisk);
        let grid = prediction_grid(&model, 0.95).unwrap();
        let distinct = distinct(model.covariate_values()).len();
        assert_eq!(grid.len(), 2 * 3 * distinct);
        assert!(grid.iter().all(|r| r.ci_lower < r.estimate && r.estimate < r.ci_upper));
    }

    #[test]
    fn test_distinct_counts_ties() {
        assert_eq!(
            distinct(vec![3.0, 1.0, 3.0, 2.0, 3.0]),
            [(1.0, 1), (2.0, 1), (3.0, 3)]
        );
    }

    #[test]
    fn test_tied_covariates_still_reproduce_marginal_means() {
        let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
        let rounded = dataset
            .iter()
            .map(|obs| nudge_data::Observation {
                pre_stake: (obs.pre_stake / 10.0).round() * 10.0,
                ..*obs
            })
            .collect();
        let dataset = nudge_data::Dataset::new(rounded).unwrap();
        let subset = AnalysisSubset::split(&dataset, CohortKind::AtRisk).unwrap();
        let model = fit(&subset, ModelFormula::for_cohort(CohortKind::AtRisk)).unwrap();

        let grid = prediction_grid(&model, 0.95).unwrap();
        assert!(grid.iter().any(|r| r.multiplicity > 1));
        let means = marginal_means(&model, 0.95).unwrap();
        cross_check(&means, &aggregate_predictions(&grid), 1e-6).unwrap();
    }

    #[test]
    fn test_aggregates_reproduce_marginal_means() {
        for kind in CohortKind::ALL {
            let model = model(kind);
            let means = marginal_means(&model, 0.95).unwrap();
            let aggregates = aggregate_predictions(&prediction_grid(&model, 0.95).unwrap());
            assert_eq!(aggregates.len(), means.len());
            cross_check(&means, &aggregates, 1e-6).unwrap();
        }
    }

    #[test]
    fn test_mismatch_names_the_row() {
        let model = model(CohortKind::NoRisk);
        let mut means = marginal_means(&model, 0.95).unwrap();
        let aggregates = aggregate_predictions(&prediction_grid(&model, 0.95).unwrap());
        means[1].estimate += 1.0;
        let err = cross_check(&means, &aggregates, 1e-6).unwrap_err();
        assert!(matches!(
            err,
            CrossCheckError::Mismatch {
                treatment: TreatmentArm::Feedback,
                risk: RiskLabel::Category(RiskCategory::NoRisk),
                ..
            }
        ));
        assert!(err.to_string().contains("Feedback / No risk"));
    }
}
