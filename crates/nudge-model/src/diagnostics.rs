//! Assumption checks for a fitted random-intercept model.
//!
//! Every check yields an [`AssumptionCheck`] with an outcome, the test
//! statistic and either a p-value or the threshold it was compared against.
//! A check that cannot be computed (too few groups, no spread, a singular
//! correlation matrix) is reported as [`CheckOutcome::Inconclusive`] rather
//! than failing the whole report.

use std::fmt;

use ndarray::Array2;
use nudge_data::{RiskCategory, TreatmentArm};
use nudge_stats::{
    descriptive::{self, DescriptiveStats},
    distribution, linalg, normality, percentiles,
};
use serde::{Deserialize, Serialize};

use crate::{design::Term, lmm::FittedModel};

/// Significance level of the hypothesis-test based checks.
pub const SIGNIFICANCE: f64 = 0.05;
/// Minimum number of groups for a meaningful check of the random effects.
pub const MIN_GROUPS_FOR_RANDOM_EFFECTS: usize = 5;
pub const GVIF_THRESHOLD: f64 = 10.0;
pub const SKEWNESS_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assumption {
    Linearity,
    HomogeneityOfVariance,
    ResidualNormality,
    RandomEffectNormality,
    InfluentialObservations,
    Multicollinearity,
    CovariateSkewness,
}

impl Assumption {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Linearity => "linearity",
            Self::HomogeneityOfVariance => "homogeneity of variance",
            Self::ResidualNormality => "normality of residuals",
            Self::RandomEffectNormality => "normality of random effects",
            Self::InfluentialObservations => "influential observations",
            Self::Multicollinearity => "multicollinearity",
            Self::CovariateSkewness => "covariate skewness",
        }
    }
}

impl fmt::Display for Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::IsVariant,
)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    #[display("pass")]
    Pass,
    #[display("FAIL")]
    Fail,
    #[display("inconclusive")]
    Inconclusive,
}

impl CheckOutcome {
    fn from_p_value(p: f64) -> Self {
        if p.is_nan() {
            Self::Inconclusive
        } else if p >= SIGNIFICANCE {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    fn from_limit(value: f64, limit: f64) -> Self {
        if value.is_nan() || limit.is_nan() {
            Self::Inconclusive
        } else if value > limit {
            Self::Fail
        } else {
            Self::Pass
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionCheck {
    pub assumption: Assumption,
    pub outcome: CheckOutcome,
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub threshold: Option<f64>,
    pub detail: String,
}

impl AssumptionCheck {
    fn inconclusive(assumption: Assumption, detail: impl Into<String>) -> Self {
        Self {
            assumption,
            outcome: CheckOutcome::Inconclusive,
            statistic: None,
            p_value: None,
            threshold: None,
            detail: detail.into(),
        }
    }

    fn tested(assumption: Assumption, statistic: f64, p_value: f64, detail: String) -> Self {
        Self {
            assumption,
            outcome: CheckOutcome::from_p_value(p_value),
            statistic: Some(statistic),
            p_value: Some(p_value),
            threshold: Some(SIGNIFICANCE),
            detail,
        }
    }
}

/// Generalised variance inflation factor of one model term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermGvif {
    pub term: Term,
    pub df: usize,
    pub gvif: f64,
    /// `GVIF^(1 / (2 df))`, comparable across terms of different size.
    pub scaled: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub checks: Vec<AssumptionCheck>,
    pub gvif: Vec<TermGvif>,
    pub cooks_distance: Vec<f64>,
}

impl DiagnosticReport {
    #[must_use]
    pub fn check(&self, assumption: Assumption) -> Option<&AssumptionCheck> {
        self.checks.iter().find(|c| c.assumption == assumption)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AssumptionCheck> + '_ {
        self.checks.iter().filter(|c| c.outcome.is_fail())
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.outcome.is_pass())
    }
}

/// Runs every assumption check on `model`.
#[must_use]
pub fn diagnose(model: &FittedModel) -> DiagnosticReport {
    let cooks_distance = cooks_distance(model);
    let gvif = gvif(model);
    let checks = vec![
        linearity(model),
        homogeneity(model),
        residual_normality(model),
        random_effect_normality(model),
        influence(model, &cooks_distance),
        multicollinearity(gvif.as_deref()),
        covariate_skewness(model),
    ];
    for check in checks.iter().filter(|c| c.outcome.is_fail()) {
        log::warn!("assumption check failed: {} ({})", check.assumption, check.detail);
    }
    DiagnosticReport {
        checks,
        gvif: gvif.unwrap_or_default(),
        cooks_distance,
    }
}

fn linearity(model: &FittedModel) -> AssumptionCheck {
    let residuals = model.conditional_residuals().to_vec();
    let fitted = model.conditional_fitted().to_vec();
    let Some(center) = descriptive::mean(&fitted) else {
        return AssumptionCheck::inconclusive(Assumption::Linearity, "no fitted values");
    };
    let curvature = fitted.iter().map(|f| (f - center).powi(2)).collect::<Vec<_>>();
    let Some(r) = descriptive::pearson_correlation(&residuals, &curvature) else {
        return AssumptionCheck::inconclusive(Assumption::Linearity, "fitted values have no spread");
    };
    let df = df_f64(residuals.len().saturating_sub(2));
    let t = r * (df / (1.0 - r * r)).sqrt();
    let p = distribution::t_two_sided_p(t, df);
    AssumptionCheck::tested(
        Assumption::Linearity,
        t,
        p,
        format!("correlation of residuals with squared centred fitted values r = {r:.3}"),
    )
}

/// Brown-Forsythe test: one-way ANOVA on absolute deviations from cell medians.
fn homogeneity(model: &FittedModel) -> AssumptionCheck {
    let residuals = model.conditional_residuals();
    let mut cells: Vec<((TreatmentArm, RiskCategory), Vec<f64>)> = Vec::new();
    for (obs, e) in model.subset().observations().iter().zip(&residuals) {
        let key = (obs.treatment, obs.risk);
        match cells.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(*e),
            None => cells.push((key, vec![*e])),
        }
    }

    let deviations = cells
        .iter()
        .filter_map(|(_, values)| {
            let median = percentiles::median(values)?;
            Some(values.iter().map(|v| (v - median).abs()).collect::<Vec<_>>())
        })
        .collect::<Vec<_>>();
    let k = deviations.len();
    let total = deviations.iter().map(Vec::len).sum::<usize>();
    if k < 2 || total <= k {
        return AssumptionCheck::inconclusive(
            Assumption::HomogeneityOfVariance,
            "fewer than two cells with residuals",
        );
    }

    let all = deviations.iter().flatten().copied().collect::<Vec<_>>();
    let grand_mean = descriptive::mean(&all).unwrap_or(f64::NAN);
    let (between, within) = deviations.iter().fold((0.0, 0.0), |(between, within), cell| {
        let cell_mean = descriptive::mean(cell).unwrap_or(f64::NAN);
        let spread = cell.iter().map(|z| (z - cell_mean).powi(2)).sum::<f64>();
        (
            between + df_f64(cell.len()) * (cell_mean - grand_mean).powi(2),
            within + spread,
        )
    });
    let (d1, d2) = (df_f64(k - 1), df_f64(total - k));
    let f = (between / d1) / (within / d2);
    let p = distribution::f_sf(f, d1, d2);
    AssumptionCheck::tested(
        Assumption::HomogeneityOfVariance,
        f,
        p,
        format!("Brown-Forsythe F({d1}, {d2}) across {k} treatment x risk cells"),
    )
}

fn residual_normality(model: &FittedModel) -> AssumptionCheck {
    let residuals = model.conditional_residuals().to_vec();
    match normality::jarque_bera(&residuals) {
        Some(test) => AssumptionCheck::tested(
            Assumption::ResidualNormality,
            test.statistic,
            test.p_value,
            format!("Jarque-Bera on {} conditional residuals", residuals.len()),
        ),
        None => {
            AssumptionCheck::inconclusive(Assumption::ResidualNormality, "residuals have no spread")
        }
    }
}

fn random_effect_normality(model: &FittedModel) -> AssumptionCheck {
    let blups = model.random_effects().iter().map(|e| e.blup).collect::<Vec<_>>();
    if blups.len() < MIN_GROUPS_FOR_RANDOM_EFFECTS {
        return AssumptionCheck::inconclusive(
            Assumption::RandomEffectNormality,
            format!(
                "only {} groups; at least {MIN_GROUPS_FOR_RANDOM_EFFECTS} are needed",
                blups.len()
            ),
        );
    }
    match normality::jarque_bera(&blups) {
        Some(test) => AssumptionCheck::tested(
            Assumption::RandomEffectNormality,
            test.statistic,
            test.p_value,
            format!("Jarque-Bera on {} conditional modes", blups.len()),
        ),
        None => AssumptionCheck::inconclusive(
            Assumption::RandomEffectNormality,
            "conditional modes have no spread",
        ),
    }
}

/// Cook's distance `D_i = r_i² / (p σ²) · h_i / (1 - h_i)²` with GLS leverage.
fn cooks_distance(model: &FittedModel) -> Vec<f64> {
    let p = df_f64(model.n_parameters());
    let sigma2 = model.variance_components().residual;
    model
        .marginal_residuals()
        .iter()
        .zip(&model.leverages())
        .map(|(r, h)| {
            if *h >= 1.0 {
                f64::NAN
            } else {
                r * r / (p * sigma2) * h / (1.0 - h).powi(2)
            }
        })
        .collect()
}

fn influence(model: &FittedModel, cooks_distance: &[f64]) -> AssumptionCheck {
    let p = df_f64(model.n_parameters());
    let threshold = distribution::f_quantile(0.5, p, df_f64(model.residual_df()));
    let finite = cooks_distance.iter().copied().filter(|d| d.is_finite());
    let Some(max) = finite.clone().reduce(f64::max) else {
        return AssumptionCheck::inconclusive(
            Assumption::InfluentialObservations,
            "no finite Cook's distances",
        );
    };
    let influential = finite.filter(|d| *d > threshold).count();
    AssumptionCheck {
        assumption: Assumption::InfluentialObservations,
        outcome: CheckOutcome::from_limit(max, threshold),
        statistic: Some(max),
        p_value: None,
        threshold: Some(threshold),
        detail: format!(
            "{influential} observations with Cook's distance above the F(p, n - p) median"
        ),
    }
}

/// Generalised VIFs from the correlation matrix of the non-intercept columns.
///
/// `None` when the correlation matrix is singular.
fn gvif(model: &FittedModel) -> Option<Vec<TermGvif>> {
    let design = model.design();
    let columns = design
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.term != Term::Intercept)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    let r = correlation_matrix(model.x(), &columns)?;
    let log_det_all = linalg::spd_log_det(&r)?;

    let mut result = Vec::new();
    for term in design.terms().into_iter().filter(|t| *t != Term::Intercept) {
        let (inside, outside): (Vec<usize>, Vec<usize>) = (0..columns.len())
            .partition(|&k| design.columns()[columns[k]].term == term);
        let log_det_inside = linalg::spd_log_det(&linalg::select(&r, &inside))?;
        let log_det_outside = if outside.is_empty() {
            0.0
        } else {
            linalg::spd_log_det(&linalg::select(&r, &outside))?
        };
        let gvif = (log_det_inside + log_det_outside - log_det_all).exp();
        let df = inside.len();
        result.push(TermGvif {
            term,
            df,
            gvif,
            scaled: gvif.powf(1.0 / (2.0 * df_f64(df))),
        });
    }
    Some(result)
}

fn correlation_matrix(x: &Array2<f64>, columns: &[usize]) -> Option<Array2<f64>> {
    let n = df_f64(x.nrows());
    let centered = columns
        .iter()
        .map(|&j| {
            let column = x.column(j);
            let mean = column.sum() / n;
            column.mapv(|v| v - mean)
        })
        .collect::<Vec<_>>();
    let norms = centered
        .iter()
        .map(|c| c.dot(c).sqrt())
        .collect::<Vec<_>>();
    if norms.iter().any(|s| *s <= 0.0) {
        return None;
    }
    let k = columns.len();
    Some(Array2::from_shape_fn((k, k), |(a, b)| {
        centered[a].dot(&centered[b]) / (norms[a] * norms[b])
    }))
}

fn multicollinearity(gvif: Option<&[TermGvif]>) -> AssumptionCheck {
    let Some(max) = gvif.and_then(|terms| terms.iter().max_by(|a, b| a.gvif.total_cmp(&b.gvif)))
    else {
        return AssumptionCheck::inconclusive(
            Assumption::Multicollinearity,
            "predictor correlation matrix is singular",
        );
    };
    AssumptionCheck {
        assumption: Assumption::Multicollinearity,
        outcome: CheckOutcome::from_limit(max.gvif, GVIF_THRESHOLD),
        statistic: Some(max.gvif),
        p_value: None,
        threshold: Some(GVIF_THRESHOLD),
        detail: format!("largest GVIF is for {}", max.term.label()),
    }
}

fn covariate_skewness(model: &FittedModel) -> AssumptionCheck {
    let Some(stats) = DescriptiveStats::new(model.covariate_values()) else {
        return AssumptionCheck::inconclusive(Assumption::CovariateSkewness, "no covariate values");
    };
    AssumptionCheck {
        assumption: Assumption::CovariateSkewness,
        outcome: CheckOutcome::from_limit(stats.skewness.abs(), SKEWNESS_THRESHOLD),
        statistic: Some(stats.skewness),
        p_value: None,
        threshold: Some(SKEWNESS_THRESHOLD),
        detail: format!("sample skewness of {}", model.formula().covariate_term()),
    }
}

#[expect(clippy::cast_precision_loss)]
fn df_f64(n: usize) -> f64 {
    n as f64
}

#[cfg(test)]
mod tests {
    use nudge_data::{
        AnalysisSubset, CohortKind, Dataset, Observation,
        simulate::{SimulationParams, simulate_seeded},
    };

    use super::*;
    use crate::{formula::ModelFormula, lmm};

    fn fitted(kind: CohortKind) -> FittedModel {
        let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
        let subset = AnalysisSubset::split(&dataset, kind).unwrap();
        lmm::fit(&subset, ModelFormula::for_cohort(kind)).unwrap()
    }

    #[test]
    fn test_report_covers_every_assumption() {
        let model = fitted(CohortKind::AtRisk);
        let report = diagnose(&model);
        assert_eq!(report.checks.len(), 7);
        assert_eq!(report.cooks_distance.len(), model.n_observations());
        for check in &report.checks {
            if !check.outcome.is_inconclusive() {
                assert!(check.statistic.is_some(), "{check:?}");
                assert!(check.p_value.is_some() || check.threshold.is_some(), "{check:?}");
            }
        }
        // two settings are too few to judge the random effects
        assert_eq!(
            report.check(Assumption::RandomEffectNormality).unwrap().outcome,
            CheckOutcome::Inconclusive
        );
    }

    #[test]
    fn test_gvif_terms() {
        let model = fitted(CohortKind::NoRisk);
        let report = diagnose(&model);
        let terms = report.gvif.iter().map(|g| g.term).collect::<Vec<_>>();
        assert_eq!(terms, [Term::Treatment, Term::Covariate]);
        // two single-column terms share one correlation: GVIF = 1 / (1 - r²)
        assert!((report.gvif[0].gvif - report.gvif[1].gvif).abs() < 1e-9);
        assert!(report.gvif.iter().all(|g| g.gvif >= 1.0 - 1e-12));

        let at_risk = diagnose(&fitted(CohortKind::AtRisk));
        let interaction = at_risk
            .gvif
            .iter()
            .find(|g| g.term == Term::TreatmentRisk)
            .unwrap();
        assert_eq!(interaction.df, 2);
    }

    #[test]
    fn test_outlier_is_influential() {
        let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
        let mut observations = dataset.observations().to_vec();
        let target = observations
            .iter_mut()
            .find(|o| o.risk == nudge_data::RiskCategory::NoRisk)
            .unwrap();
        *target = Observation {
            pre_stake: 400.0,
            post_stake: 5.0,
            ..*target
        };
        let dataset = Dataset::new(observations).unwrap();
        let subset = AnalysisSubset::split(&dataset, CohortKind::NoRisk).unwrap();
        let model = lmm::fit(&subset, ModelFormula::for_cohort(CohortKind::NoRisk)).unwrap();
        let report = diagnose(&model);
        let influence = report.check(Assumption::InfluentialObservations).unwrap();
        assert_eq!(influence.outcome, CheckOutcome::Fail, "{influence:?}");
        let skew = report.check(Assumption::CovariateSkewness).unwrap();
        assert_eq!(skew.outcome, CheckOutcome::Fail, "{skew:?}");
    }

    #[test]
    fn test_outcome_rules() {
        assert_eq!(CheckOutcome::from_p_value(0.2), CheckOutcome::Pass);
        assert_eq!(CheckOutcome::from_p_value(0.01), CheckOutcome::Fail);
        assert_eq!(CheckOutcome::from_p_value(f64::NAN), CheckOutcome::Inconclusive);
        assert_eq!(CheckOutcome::from_limit(11.0, 10.0), CheckOutcome::Fail);
        assert_eq!(CheckOutcome::from_limit(2.0, 10.0), CheckOutcome::Pass);
    }
}
