//! REML fit of the random-intercept linear mixed model
//!
//! ```text
//! y = Xβ + Zu + ε,   u ~ N(0, σ_b² I_q),   ε ~ N(0, σ² I_n)
//! ```
//!
//! where `Z` maps each observation to its setting. Writing `λ = σ_b² / σ²`,
//! the marginal covariance is `σ² H` with `H = I + λ Z Z'`. Because `Z`
//! indicates disjoint groups, `H⁻¹` has the closed form
//!
//! ```text
//! (H⁻¹ v)_i = v_i - c_g Σ_{m ∈ g} v_m,   c_g = λ / (1 + n_g λ)
//! ```
//!
//! so every quantity below is computed without forming `H`.
//!
//! # Estimation
//!
//! With `σ²` profiled out, the REML deviance depends on `λ` alone:
//!
//! ```text
//! d(λ) = Σ_g ln(1 + n_g λ) + ln|X'H⁻¹X| + (n - p)(1 + ln(2π r'H⁻¹r / (n - p)))
//! ```
//!
//! It is minimised over `θ = √λ` by golden-section search on `[0, THETA_MAX]`,
//! after which the boundary `θ = 0` is compared explicitly. Fits that end on
//! the boundary are flagged as singular, not rejected.
//!
//! # Degrees of freedom
//!
//! Tests on `L'β` use the Satterthwaite approximation with the REML expected
//! information of `(σ_b², σ²)`. When the information matrix cannot be
//! inverted the residual degrees of freedom `n - p` are used instead.

use std::f64::consts::PI;

use ndarray::{Array1, Array2, ArrayView1};
use nudge_data::{AnalysisSubset, Setting};
use nudge_stats::{
    linalg::{self, quad_form},
    percentiles::Percentiles,
};
use serde::{Deserialize, Serialize};

use crate::{
    design::{Design, DesignError},
    formula::ModelFormula,
    inference::LinearEstimate,
    transform::TransformSelection,
};

/// Upper end of the search interval for `θ = σ_b / σ`.
pub const THETA_MAX: f64 = 20.0;

const THETA_TOLERANCE: f64 = 1e-7;
const MAX_ITERATIONS: usize = 200;
/// `θ` below which a fit is reported as singular.
const SINGULAR_THETA: f64 = 1e-4;
/// Deviance slack within which the boundary `θ = 0` is preferred.
const BOUNDARY_SLACK: f64 = 1e-8;

#[derive(
    Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, derive_more::IsVariant,
)]
pub enum FitError {
    #[display("model has {parameters} fixed effects but only {observations} observations")]
    InsufficientData {
        observations: usize,
        parameters: usize,
    },
    #[display("model needs at least one {grouping} group")]
    NoGroups { grouping: &'static str },
    #[display("fixed-effects design is rank deficient (X'X is singular)")]
    RankDeficient,
    #[display("REML optimisation did not converge: {reason}")]
    Convergence { reason: String },
    #[display("cannot build design matrix: {source}")]
    Design { source: DesignError },
}

/// One row of the fixed-effects coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub df: f64,
    pub t_value: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarianceComponents {
    /// Variance of the setting random intercept, `σ_b²`.
    pub setting_intercept: f64,
    /// Residual variance, `σ²`.
    pub residual: f64,
}

/// Conditional mode of the random intercept of one setting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomEffect {
    pub setting: Setting,
    pub observations: usize,
    pub blup: f64,
}

/// Serializable overview of a fit, as printed by model summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub formula: String,
    pub reml_criterion: f64,
    /// Min, Q1, median, Q3 and max of the scaled conditional residuals.
    pub scaled_residuals: [f64; 5],
    pub variance_components: VarianceComponents,
    pub random_effects: Vec<RandomEffect>,
    pub coefficients: Vec<Coefficient>,
    pub observations: usize,
    pub groups: usize,
    pub singular: bool,
}

/// Observation data arranged for the grouped closed-form `H⁻¹`.
#[derive(Debug, Clone)]
struct Problem {
    x: Array2<f64>,
    y: Array1<f64>,
    groups: Vec<usize>,
    group_sizes: Vec<usize>,
}

#[derive(Debug)]
struct Evaluation {
    lambda: f64,
    wx: Array2<f64>,
    xtwx: Array2<f64>,
    beta: Array1<f64>,
    rwr: f64,
    deviance: f64,
}

impl Problem {
    fn n(&self) -> usize {
        self.y.len()
    }

    fn p(&self) -> usize {
        self.x.ncols()
    }

    fn shrinkage(&self, lambda: f64) -> Vec<f64> {
        self.group_sizes
            .iter()
            .map(|&n_g| lambda / (1.0 + size_f64(n_g) * lambda))
            .collect()
    }

    fn group_sums(&self, v: ArrayView1<f64>) -> Vec<f64> {
        let mut sums = vec![0.0; self.group_sizes.len()];
        for (value, &g) in v.iter().zip(&self.groups) {
            sums[g] += value;
        }
        sums
    }

    fn apply_h_inv(&self, shrinkage: &[f64], v: ArrayView1<f64>) -> Array1<f64> {
        let sums = self.group_sums(v);
        Array1::from_shape_fn(v.len(), |i| {
            let g = self.groups[i];
            v[i] - shrinkage[g] * sums[g]
        })
    }

    /// Evaluates the profiled REML deviance at `λ`.
    ///
    /// Returns `None` when `X'H⁻¹X` is not positive definite.
    fn evaluate(&self, lambda: f64) -> Option<Evaluation> {
        let shrinkage = self.shrinkage(lambda);
        let mut wx = Array2::zeros(self.x.dim());
        for (j, column) in self.x.columns().into_iter().enumerate() {
            wx.column_mut(j).assign(&self.apply_h_inv(&shrinkage, column));
        }
        let xtwx = self.x.t().dot(&wx);
        let beta = linalg::spd_solve(&xtwx, &wx.t().dot(&self.y))?;
        let residuals = &self.y - &self.x.dot(&beta);
        let rwr = residuals.dot(&self.apply_h_inv(&shrinkage, residuals.view()));
        let log_det_xtwx = linalg::spd_log_det(&xtwx)?;
        let log_det_h = self
            .group_sizes
            .iter()
            .map(|&n_g| (size_f64(n_g) * lambda).ln_1p())
            .sum::<f64>();
        let dof = size_f64(self.n() - self.p());
        let deviance = log_det_h + log_det_xtwx + dof * (1.0 + (2.0 * PI * rwr / dof).ln());
        Some(Evaluation {
            lambda,
            wx,
            xtwx,
            beta,
            rwr,
            deviance,
        })
    }

    fn deviance_at_theta(&self, theta: f64) -> Result<f64, FitError> {
        let eval = self.evaluate(theta * theta).ok_or(FitError::RankDeficient)?;
        if eval.deviance.is_finite() {
            Ok(eval.deviance)
        } else {
            Err(FitError::Convergence {
                reason: format!("REML criterion is not finite at theta = {theta}"),
            })
        }
    }

    /// Golden-section minimisation of the deviance over `θ ∈ [0, THETA_MAX]`.
    fn optimise_theta(&self) -> Result<(f64, usize), FitError> {
        let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
        let (mut a, mut b) = (0.0, THETA_MAX);
        let mut c = b - inv_phi * (b - a);
        let mut d = a + inv_phi * (b - a);
        let mut fc = self.deviance_at_theta(c)?;
        let mut fd = self.deviance_at_theta(d)?;

        let mut iterations = 0;
        while b - a > THETA_TOLERANCE {
            if iterations == MAX_ITERATIONS {
                return Err(FitError::Convergence {
                    reason: format!("no convergence after {MAX_ITERATIONS} iterations"),
                });
            }
            iterations += 1;
            if fc < fd {
                b = d;
                d = c;
                fd = fc;
                c = b - inv_phi * (b - a);
                fc = self.deviance_at_theta(c)?;
            } else {
                a = c;
                c = d;
                fc = fd;
                d = a + inv_phi * (b - a);
                fd = self.deviance_at_theta(d)?;
            }
        }
        let theta = 0.5 * (a + b);
        log::debug!("golden-section search: theta = {theta:.6} after {iterations} iterations");

        if THETA_MAX - theta < 1e3 * THETA_TOLERANCE {
            return Err(FitError::Convergence {
                reason: format!("optimum is pinned at the upper bound theta = {THETA_MAX}"),
            });
        }
        let interior = self.deviance_at_theta(theta)?;
        let boundary = self.deviance_at_theta(0.0)?;
        if boundary <= interior + BOUNDARY_SLACK {
            Ok((0.0, iterations))
        } else {
            Ok((theta, iterations))
        }
    }
}

#[expect(clippy::cast_precision_loss)]
fn size_f64(n: usize) -> f64 {
    n as f64
}

/// A fitted random-intercept model. Immutable; re-fitting produces a new value.
#[derive(Debug, Clone)]
pub struct FittedModel {
    subset: AnalysisSubset,
    design: Design,
    problem: Problem,
    settings: Vec<Setting>,
    beta: Array1<f64>,
    cov_beta: Array2<f64>,
    xtwx_inv: Array2<f64>,
    wx: Array2<f64>,
    vinv_x: Array2<f64>,
    information_inverse: Option<Array2<f64>>,
    sigma2: f64,
    lambda: f64,
    reml_criterion: f64,
    singular: bool,
    blups: Vec<f64>,
}

/// Fits `formula` to `subset` by REML.
pub fn fit(subset: &AnalysisSubset, formula: ModelFormula) -> Result<FittedModel, FitError> {
    let design = Design::new(subset, formula);
    let x = design
        .matrix(subset.observations())
        .map_err(|source| FitError::Design { source })?;
    let y = subset
        .observations()
        .iter()
        .map(|obs| obs.post_stake)
        .collect::<Array1<f64>>();

    let settings = subset.settings();
    if settings.is_empty() {
        return Err(FitError::NoGroups {
            grouping: crate::formula::GROUPING,
        });
    }
    let groups = subset
        .observations()
        .iter()
        .map(|obs| settings.iter().position(|s| *s == obs.setting).unwrap_or(0))
        .collect::<Vec<_>>();
    let mut group_sizes = vec![0; settings.len()];
    for &g in &groups {
        group_sizes[g] += 1;
    }

    let problem = Problem {
        x,
        y,
        groups,
        group_sizes,
    };
    let (n, p) = (problem.n(), problem.p());
    if n <= p {
        return Err(FitError::InsufficientData {
            observations: n,
            parameters: p,
        });
    }
    if linalg::cholesky(&problem.x.t().dot(&problem.x)).is_none() {
        return Err(FitError::RankDeficient);
    }

    let (theta, iterations) = problem.optimise_theta()?;
    let eval = problem
        .evaluate(theta * theta)
        .ok_or(FitError::RankDeficient)?;
    let xtwx_inv = linalg::spd_inverse(&eval.xtwx).ok_or(FitError::RankDeficient)?;
    let sigma2 = eval.rwr / size_f64(n - p);
    let cov_beta = &xtwx_inv * sigma2;
    let vinv_x = &eval.wx / sigma2;
    let singular = theta < SINGULAR_THETA;
    if singular {
        log::warn!(
            "boundary (singular) fit for {}: setting intercept variance is estimated as zero",
            design.formula()
        );
    }

    let information_inverse = reml_information(&problem, eval.lambda, sigma2, &vinv_x, &cov_beta)
        .and_then(|info| linalg::spd_inverse(&info));
    if information_inverse.is_none() {
        log::warn!("variance-parameter information is singular; using residual df");
    }

    let shrinkage = problem.shrinkage(eval.lambda);
    let marginal = &problem.y - &problem.x.dot(&eval.beta);
    let blups = problem
        .group_sums(marginal.view())
        .iter()
        .zip(&shrinkage)
        .map(|(sum, c)| c * sum)
        .collect();

    log::info!(
        "fitted {} on {} cohort: n = {n}, REML = {:.3}, theta = {theta:.4} ({iterations} iterations)",
        design.formula(),
        subset.kind(),
        eval.deviance
    );

    Ok(FittedModel {
        subset: subset.clone(),
        design,
        problem,
        settings,
        beta: eval.beta,
        cov_beta,
        xtwx_inv,
        wx: eval.wx,
        vinv_x,
        information_inverse,
        sigma2,
        lambda: eval.lambda,
        reml_criterion: eval.deviance,
        singular,
        blups,
    })
}

/// Expected REML information of `(σ_b², σ²)`.
fn reml_information(
    problem: &Problem,
    lambda: f64,
    sigma2: f64,
    vinv_x: &Array2<f64>,
    cov_beta: &Array2<f64>,
) -> Option<Array2<f64>> {
    let n = problem.n();
    let q = problem.group_sizes.len();
    let shrinkage = problem.shrinkage(lambda);
    let groups = &problem.groups;

    // P = V⁻¹ - V⁻¹X C X'V⁻¹
    let correction = vinv_x.dot(cov_beta).dot(&vinv_x.t());
    let p_mat = Array2::from_shape_fn((n, n), |(i, j)| {
        let identity = if i == j { 1.0 } else { 0.0 };
        let within = if groups[i] == groups[j] {
            shrinkage[groups[i]]
        } else {
            0.0
        };
        (identity - within) / sigma2 - correction[[i, j]]
    });

    let mut pz = Array2::<f64>::zeros((n, q));
    for i in 0..n {
        for (m, &g) in groups.iter().enumerate() {
            pz[[i, g]] += p_mat[[i, m]];
        }
    }
    let mut ztpz = Array2::<f64>::zeros((q, q));
    for (i, &g) in groups.iter().enumerate() {
        for h in 0..q {
            ztpz[[g, h]] += pz[[i, h]];
        }
    }

    let half_sq_norm = |a: &Array2<f64>| 0.5 * a.iter().map(|v| v * v).sum::<f64>();
    let i11 = half_sq_norm(&ztpz);
    let i12 = half_sq_norm(&pz);
    let i22 = half_sq_norm(&p_mat);
    let info = ndarray::array![[i11, i12], [i12, i22]];
    info.iter().all(|v| v.is_finite()).then_some(info)
}

impl FittedModel {
    #[must_use]
    pub fn subset(&self) -> &AnalysisSubset {
        &self.subset
    }

    #[must_use]
    pub fn design(&self) -> &Design {
        &self.design
    }

    #[must_use]
    pub fn formula(&self) -> &ModelFormula {
        self.design.formula()
    }

    #[must_use]
    pub fn beta(&self) -> &Array1<f64> {
        &self.beta
    }

    /// Covariance matrix of the fixed effects, `σ² (X'H⁻¹X)⁻¹`.
    #[must_use]
    pub fn cov_beta(&self) -> &Array2<f64> {
        &self.cov_beta
    }

    /// Fixed-effects design matrix of the observations.
    #[must_use]
    pub fn x(&self) -> &Array2<f64> {
        &self.problem.x
    }

    #[must_use]
    pub fn response(&self) -> &Array1<f64> {
        &self.problem.y
    }

    #[must_use]
    pub fn n_observations(&self) -> usize {
        self.problem.n()
    }

    #[must_use]
    pub fn n_parameters(&self) -> usize {
        self.problem.p()
    }

    #[must_use]
    pub fn n_groups(&self) -> usize {
        self.settings.len()
    }

    /// Residual degrees of freedom, `n - p`.
    #[must_use]
    pub fn residual_df(&self) -> usize {
        self.problem.n() - self.problem.p()
    }

    #[must_use]
    pub fn reml_criterion(&self) -> f64 {
        self.reml_criterion
    }

    #[must_use]
    pub fn is_singular(&self) -> bool {
        self.singular
    }

    #[must_use]
    pub fn variance_components(&self) -> VarianceComponents {
        VarianceComponents {
            setting_intercept: self.lambda * self.sigma2,
            residual: self.sigma2,
        }
    }

    #[must_use]
    pub fn random_effects(&self) -> Vec<RandomEffect> {
        self.settings
            .iter()
            .zip(&self.problem.group_sizes)
            .zip(&self.blups)
            .map(|((&setting, &observations), &blup)| RandomEffect {
                setting,
                observations,
                blup,
            })
            .collect()
    }

    /// Model-scale covariate value of every observation.
    #[must_use]
    pub fn covariate_values(&self) -> Vec<f64> {
        let formula = self.formula();
        self.subset
            .observations()
            .iter()
            .map(|obs| formula.covariate_value(obs.pre_stake))
            .collect()
    }

    /// Population-level fitted values `Xβ`.
    #[must_use]
    pub fn marginal_fitted(&self) -> Array1<f64> {
        self.problem.x.dot(&self.beta)
    }

    /// Fitted values including the setting's conditional mode, `Xβ + Zû`.
    #[must_use]
    pub fn conditional_fitted(&self) -> Array1<f64> {
        let mut fitted = self.marginal_fitted();
        for (value, &g) in fitted.iter_mut().zip(&self.problem.groups) {
            *value += self.blups[g];
        }
        fitted
    }

    #[must_use]
    pub fn marginal_residuals(&self) -> Array1<f64> {
        &self.problem.y - &self.marginal_fitted()
    }

    #[must_use]
    pub fn conditional_residuals(&self) -> Array1<f64> {
        &self.problem.y - &self.conditional_fitted()
    }

    /// GLS leverages `h_i = x_i' (X'H⁻¹X)⁻¹ (H⁻¹X)_i`.
    #[must_use]
    pub fn leverages(&self) -> Array1<f64> {
        let projected = self.problem.x.dot(&self.xtwx_inv);
        Array1::from_shape_fn(self.problem.n(), |i| projected.row(i).dot(&self.wx.row(i)))
    }

    /// Observations in each setting group, aligned with [`Self::random_effects`].
    #[must_use]
    pub fn group_indices(&self) -> Vec<Vec<usize>> {
        let mut indices = vec![Vec::new(); self.settings.len()];
        for (i, &g) in self.problem.groups.iter().enumerate() {
            indices[g].push(i);
        }
        indices
    }

    /// Population-level prediction for a design row.
    #[must_use]
    pub fn predict(&self, row: &Array1<f64>) -> f64 {
        row.dot(&self.beta)
    }

    /// Estimate, standard error and Satterthwaite df of `L'β`.
    #[must_use]
    pub fn estimate(&self, l: &Array1<f64>) -> LinearEstimate {
        let variance = quad_form(&self.cov_beta, l);
        LinearEstimate {
            estimate: l.dot(&self.beta),
            std_error: variance.sqrt(),
            df: self.satterthwaite_df(l, variance),
        }
    }

    fn satterthwaite_df(&self, l: &Array1<f64>, variance: f64) -> f64 {
        let fallback = size_f64(self.residual_df());
        let Some(a) = &self.information_inverse else {
            return fallback;
        };
        // gradient of L'C L with respect to (σ_b², σ²)
        let g = self.vinv_x.dot(&self.cov_beta.dot(l));
        let g1 = self
            .problem
            .group_sums(g.view())
            .iter()
            .map(|s| s * s)
            .sum::<f64>();
        let g2 = g.dot(&g);
        let grad = ndarray::array![g1, g2];
        let denominator = quad_form(a, &grad);
        let df = 2.0 * variance * variance / denominator;
        if df.is_finite() && denominator > 0.0 {
            df.max(1.0)
        } else {
            fallback
        }
    }

    /// Fixed-effects table: estimate, SE, Satterthwaite df, t and p per column.
    #[must_use]
    pub fn coefficients(&self) -> Vec<Coefficient> {
        let p = self.problem.p();
        self.design
            .columns()
            .iter()
            .enumerate()
            .map(|(j, column)| {
                let l = Array1::from_shape_fn(p, |k| if k == j { 1.0 } else { 0.0 });
                let est = self.estimate(&l);
                Coefficient {
                    term: column.name.clone(),
                    estimate: est.estimate,
                    std_error: est.std_error,
                    df: est.df,
                    t_value: est.t_value(),
                    p_value: est.p_value(),
                }
            })
            .collect()
    }

    /// Five-number summary of the conditional residuals divided by `σ`.
    #[must_use]
    pub fn scaled_residual_summary(&self) -> [f64; 5] {
        let sigma = self.sigma2.sqrt();
        let scaled = self
            .conditional_residuals()
            .iter()
            .map(|r| r / sigma)
            .collect::<Vec<_>>();
        let percentiles = Percentiles::five_number(&scaled);
        let mut summary = [f64::NAN; 5];
        for (slot, (_, value)) in summary.iter_mut().zip(percentiles.iter()) {
            *slot = value;
        }
        summary
    }

    #[must_use]
    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            formula: self.formula().to_string(),
            reml_criterion: self.reml_criterion,
            scaled_residuals: self.scaled_residual_summary(),
            variance_components: self.variance_components(),
            random_effects: self.random_effects(),
            coefficients: self.coefficients(),
            observations: self.n_observations(),
            groups: self.n_groups(),
            singular: self.singular,
        }
    }

    /// Re-fits the same subset with the covariate replaced by its transformed
    /// version. The current model is consumed.
    pub fn respecify(self, selection: &TransformSelection) -> Result<FittedModel, FitError> {
        let formula = self
            .formula()
            .with_covariate_transform(selection.transform);
        log::info!("re-specifying model as {formula}");
        fit(&self.subset, formula)
    }
}

#[cfg(test)]
mod tests {
    use nudge_data::{
        CohortKind, Dataset, Observation, RiskCategory, TreatmentArm,
        simulate::{SimulationParams, simulate_seeded},
    };

    use super::*;
    use crate::transform::select_transform;

    fn simulated(kind: CohortKind) -> AnalysisSubset {
        let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
        AnalysisSubset::split(&dataset, kind).unwrap()
    }

    fn with_venue_shift(shift: f64) -> AnalysisSubset {
        let dataset = simulate_seeded(42, SimulationParams::default()).unwrap();
        let shifted = dataset
            .iter()
            .map(|obs| {
                let offset = if obs.setting == Setting::Venue { shift } else { 0.0 };
                Observation {
                    post_stake: obs.post_stake + offset,
                    ..*obs
                }
            })
            .collect();
        let dataset = Dataset::new(shifted).unwrap();
        AnalysisSubset::split(&dataset, CohortKind::AtRisk).unwrap()
    }

    fn obs(id: u32, treatment: TreatmentArm, pre: f64, post: f64, setting: Setting) -> Observation {
        Observation {
            id,
            treatment,
            risk: RiskCategory::NoRisk,
            pre_stake: pre,
            post_stake: post,
            setting,
        }
    }

    #[test]
    fn test_fit_at_risk_cohort() {
        let subset = simulated(CohortKind::AtRisk);
        let model = fit(&subset, ModelFormula::for_cohort(CohortKind::AtRisk)).unwrap();
        assert_eq!(model.n_parameters(), 7);
        assert_eq!(model.n_groups(), 2);
        assert_eq!(model.residual_df(), subset.len() - 7);
        assert!(model.reml_criterion().is_finite());
        assert!(model.variance_components().residual > 0.0);
        assert!(model.variance_components().setting_intercept >= 0.0);

        let coefficients = model.coefficients();
        assert_eq!(coefficients.len(), 7);
        assert_eq!(coefficients[0].term, "(Intercept)");
        for c in &coefficients {
            assert!(c.std_error > 0.0 && c.std_error.is_finite(), "{c:?}");
            assert!(c.df >= 1.0, "{c:?}");
            assert!((0.0..=1.0).contains(&c.p_value), "{c:?}");
        }
    }

    #[test]
    fn test_fitted_plus_residuals_reproduce_response() {
        let model = fit(
            &simulated(CohortKind::NoRisk),
            ModelFormula::for_cohort(CohortKind::NoRisk),
        )
        .unwrap();
        let rebuilt = model.conditional_fitted() + model.conditional_residuals();
        for (a, b) in rebuilt.iter().zip(model.response()) {
            assert!((a - b).abs() < 1e-9);
        }
        let marginal = model.marginal_fitted() + model.marginal_residuals();
        for (a, b) in marginal.iter().zip(model.response()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_setting_effect_is_recovered() {
        let model = fit(
            &with_venue_shift(60.0),
            ModelFormula::for_cohort(CohortKind::AtRisk),
        )
        .unwrap();
        assert!(!model.is_singular());
        assert!(model.variance_components().setting_intercept > 100.0);

        let effects = model.random_effects();
        let venue = effects.iter().find(|e| e.setting == Setting::Venue).unwrap();
        let online = effects.iter().find(|e| e.setting == Setting::Online).unwrap();
        assert!(venue.blup > 0.0);
        assert!(online.blup < 0.0);

        // between-group intercept has few df; within-group treatment effect has many
        let coefficients = model.coefficients();
        assert!(coefficients[0].df < 5.0, "{:?}", coefficients[0]);
        assert!(coefficients[1].df > 50.0, "{:?}", coefficients[1]);
    }

    #[test]
    fn test_no_group_effect_is_singular_or_small() {
        let model = fit(
            &with_venue_shift(0.0),
            ModelFormula::for_cohort(CohortKind::AtRisk),
        )
        .unwrap();
        let vc = model.variance_components();
        assert!(vc.setting_intercept < vc.residual);
        if model.is_singular() {
            assert_eq!(vc.setting_intercept, 0.0);
            assert!(model.random_effects().iter().all(|e| e.blup == 0.0));
        }
    }

    #[test]
    fn test_leverages_sum_to_rank() {
        let model = fit(
            &simulated(CohortKind::AtRisk),
            ModelFormula::for_cohort(CohortKind::AtRisk),
        )
        .unwrap();
        let leverages = model.leverages();
        // tr(X (X'WX)⁻¹ X'W) = p
        assert!((leverages.sum() - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_insufficient_data() {
        let dataset = Dataset::new(vec![
            obs(1, TreatmentArm::Feedback, 10.0, 9.9, Setting::Online),
            obs(2, TreatmentArm::NoFeedback, 20.0, 20.0, Setting::Venue),
            obs(3, TreatmentArm::Feedback, 30.0, 29.7, Setting::Venue),
        ])
        .unwrap();
        let subset = AnalysisSubset::split(&dataset, CohortKind::NoRisk).unwrap();
        assert_eq!(
            fit(&subset, ModelFormula::for_cohort(CohortKind::NoRisk)).unwrap_err(),
            FitError::InsufficientData {
                observations: 3,
                parameters: 3
            }
        );
    }

    #[test]
    fn test_rank_deficient_design() {
        let observations = (1..=10)
            .map(|id| {
                let treatment = if id % 2 == 0 {
                    TreatmentArm::Feedback
                } else {
                    TreatmentArm::NoFeedback
                };
                let setting = if id <= 5 { Setting::Online } else { Setting::Venue };
                obs(id, treatment, 50.0, f64::from(id), setting)
            })
            .collect();
        let dataset = Dataset::new(observations).unwrap();
        let subset = AnalysisSubset::split(&dataset, CohortKind::NoRisk).unwrap();
        assert!(
            fit(&subset, ModelFormula::for_cohort(CohortKind::NoRisk))
                .unwrap_err()
                .is_rank_deficient()
        );
    }

    #[test]
    fn test_respecify_refits_with_transformed_covariate() {
        let subset = simulated(CohortKind::NoRisk);
        let model = fit(&subset, ModelFormula::for_cohort(CohortKind::NoRisk)).unwrap();
        let raw = subset.observations().iter().map(|o| o.pre_stake).collect::<Vec<_>>();
        let selection = select_transform(&raw).unwrap();
        let refit = model.respecify(&selection).unwrap();
        let expected = (!selection.transform.is_identity()).then_some(selection.transform);
        assert_eq!(refit.formula().covariate_transform, expected);
        assert_eq!(refit.n_observations(), subset.len());
        let covariates = refit.covariate_values();
        for (c, t) in covariates.iter().zip(&selection.transformed) {
            assert!((c - t).abs() < 1e-12);
        }
    }

    #[test]
    fn test_summary_quartiles_are_ordered() {
        let model = fit(
            &simulated(CohortKind::AtRisk),
            ModelFormula::for_cohort(CohortKind::AtRisk),
        )
        .unwrap();
        let summary = model.summary();
        assert!(summary.scaled_residuals.is_sorted());
        assert_eq!(summary.observations, model.n_observations());
        assert_eq!(
            summary.formula,
            "post_stake ~ treatment * risk + pre_stake + (1 | setting)"
        );
    }
}
