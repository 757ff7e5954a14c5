//! Two one-sided tests (TOST) against a smallest effect size of interest.
//!
//! Given an estimate `θ̂` with standard error `SE` and Satterthwaite df,
//! and bounds `[lower, upper]` around zero:
//!
//! ```text
//! t_L = (θ̂ - lower) / SE,   p_L = P(T_df ≥ t_L)
//! t_U = (θ̂ - upper) / SE,   p_U = P(T_df ≤ t_U)
//! ```
//!
//! The effect is declared equivalent to zero when both p-values fall below
//! `α`, which is the same as the `1 - 2α` confidence interval lying inside
//! the bounds.

use nudge_model::LinearEstimate;
use nudge_stats::distribution;
use serde::{Deserialize, Serialize};

/// Equivalence bounds, in the units of the response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sesoi {
    pub lower: f64,
    pub upper: f64,
}

impl Sesoi {
    /// Bounds `[-bound, bound]`.
    #[must_use]
    pub fn symmetric(bound: f64) -> Self {
        Self {
            lower: -bound,
            upper: bound,
        }
    }

    /// Checks the bounds and a one-sided `alpha` for use in a TOST.
    pub fn validate(&self, alpha: f64) -> Result<(), EquivalenceError> {
        let Self { lower, upper } = *self;
        if !(lower.is_finite() && upper.is_finite()) || lower >= upper {
            return Err(EquivalenceError::InvalidBounds { lower, upper });
        }
        if lower >= 0.0 || upper <= 0.0 {
            return Err(EquivalenceError::BoundsExcludeZero { lower, upper });
        }
        if alpha.is_nan() || alpha <= 0.0 || alpha >= 0.5 {
            return Err(EquivalenceError::InvalidAlpha { alpha });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum EquivalenceError {
    #[display("equivalence bounds [{lower}, {upper}] are not an interval")]
    InvalidBounds { lower: f64, upper: f64 },
    #[display("equivalence bounds [{lower}, {upper}] do not bracket zero")]
    BoundsExcludeZero { lower: f64, upper: f64 },
    #[display("equivalence alpha must lie in (0, 0.5), got {alpha}")]
    InvalidAlpha { alpha: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceResult {
    /// Name of the tested effect, e.g. the coefficient term.
    pub effect: String,
    pub sesoi: Sesoi,
    pub alpha: f64,
    pub estimate: f64,
    pub std_error: f64,
    pub df: f64,
    pub t_lower: f64,
    pub p_lower: f64,
    pub t_upper: f64,
    pub p_upper: f64,
    /// `1 - 2α` confidence interval of the effect.
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub equivalent: bool,
}

impl EquivalenceResult {
    /// The larger of the two one-sided p-values, i.e. the TOST p-value.
    #[must_use]
    pub fn p_value(&self) -> f64 {
        self.p_lower.max(self.p_upper)
    }
}

/// Runs the TOST procedure on `estimate`.
pub fn tost(
    effect: &str,
    estimate: &LinearEstimate,
    sesoi: Sesoi,
    alpha: f64,
) -> Result<EquivalenceResult, EquivalenceError> {
    sesoi.validate(alpha)?;
    let LinearEstimate {
        estimate: value,
        std_error,
        df,
    } = *estimate;
    let t = estimate.t_value();
    let t_lower = t - sesoi.lower / std_error;
    let t_upper = t - sesoi.upper / std_error;
    let p_lower = distribution::t_sf(t_lower, df);
    let p_upper = distribution::t_cdf(t_upper, df);
    let ci = estimate.confidence_interval(1.0 - 2.0 * alpha);
    let equivalent = p_lower < alpha && p_upper < alpha;
    log::info!(
        "TOST for {effect} within [{}, {}]: p_L = {p_lower:.4}, p_U = {p_upper:.4}, equivalent = {equivalent}",
        sesoi.lower,
        sesoi.upper
    );
    Ok(EquivalenceResult {
        effect: effect.to_owned(),
        sesoi,
        alpha,
        estimate: value,
        std_error,
        df,
        t_lower,
        p_lower,
        t_upper,
        p_upper,
        ci_lower: ci.lower,
        ci_upper: ci.upper,
        equivalent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(value: f64, se: f64) -> LinearEstimate {
        LinearEstimate {
            estimate: value,
            std_error: se,
            df: 60.0,
        }
    }

    #[test]
    fn test_precise_small_effect_is_equivalent() {
        let result = tost("treatmentFeedback", &estimate(-1.0, 0.5), Sesoi::symmetric(5.0), 0.10)
            .unwrap();
        assert!(result.equivalent);
        assert!(result.ci_lower > -5.0 && result.ci_upper < 5.0);
        assert!((result.t_lower - 8.0).abs() < 1e-12);
        assert!((result.t_upper + 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_imprecise_effect_is_not_equivalent() {
        let result = tost("x", &estimate(1.0, 4.0), Sesoi::symmetric(5.0), 0.10).unwrap();
        assert!(!result.equivalent);
        assert!(result.p_value() >= 0.10);
    }

    #[test]
    fn test_decision_matches_interval_inclusion() {
        for (value, se) in [(0.0, 1.0), (3.0, 1.5), (-4.0, 0.4), (4.5, 0.2), (2.0, 3.0)] {
            let result = tost("x", &estimate(value, se), Sesoi::symmetric(5.0), 0.05).unwrap();
            let inside = result.ci_lower > -5.0 && result.ci_upper < 5.0;
            assert_eq!(result.equivalent, inside, "{result:?}");
        }
    }

    #[test]
    fn test_widening_bounds_keeps_equivalence() {
        let est = estimate(1.5, 1.2);
        let mut was_equivalent = false;
        for bound in [1.0, 2.0, 3.0, 4.0, 5.0, 8.0, 13.0] {
            let result = tost("x", &est, Sesoi::symmetric(bound), 0.10).unwrap();
            assert!(!was_equivalent || result.equivalent, "bound {bound}");
            was_equivalent = result.equivalent;
        }
        assert!(was_equivalent);
    }

    #[test]
    fn test_invalid_settings() {
        let est = estimate(0.0, 1.0);
        assert_eq!(
            tost("x", &est, Sesoi { lower: 5.0, upper: -5.0 }, 0.1).unwrap_err(),
            EquivalenceError::InvalidBounds { lower: 5.0, upper: -5.0 }
        );
        assert_eq!(
            tost("x", &est, Sesoi { lower: 1.0, upper: 5.0 }, 0.1).unwrap_err(),
            EquivalenceError::BoundsExcludeZero { lower: 1.0, upper: 5.0 }
        );
        assert_eq!(
            tost("x", &est, Sesoi::symmetric(5.0), 0.5).unwrap_err(),
            EquivalenceError::InvalidAlpha { alpha: 0.5 }
        );
    }
}
