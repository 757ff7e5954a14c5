//! Tail probabilities and quantiles of the reference distributions used by
//! model inference and diagnostics.
//!
//! Thin wrappers around [`statrs`] distributions. Invalid parameters (e.g. a
//! non-positive degrees of freedom) yield `f64::NAN` rather than an error, so
//! callers can fold them into table output without extra plumbing.

use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};

fn students_t(df: f64) -> Option<StudentsT> {
    StudentsT::new(0.0, 1.0, df).ok()
}

fn standard_normal() -> Option<Normal> {
    Normal::new(0.0, 1.0).ok()
}

/// `P(T_df <= t)`.
#[must_use]
pub fn t_cdf(t: f64, df: f64) -> f64 {
    students_t(df).map_or(f64::NAN, |d| d.cdf(t))
}

/// `P(T_df >= t)`.
#[must_use]
pub fn t_sf(t: f64, df: f64) -> f64 {
    students_t(df).map_or(f64::NAN, |d| d.sf(t))
}

/// Two-sided p-value `P(|T_df| >= |t|)`.
///
/// ```
/// use nudge_stats::distribution::t_two_sided_p;
///
/// let p = t_two_sided_p(2.0, 1e6);
/// assert!((p - 0.0455).abs() < 1e-3);
/// ```
#[must_use]
pub fn t_two_sided_p(t: f64, df: f64) -> f64 {
    (2.0 * t_sf(t.abs(), df)).min(1.0)
}

/// Quantile function of Student's t distribution.
///
/// ```
/// use nudge_stats::distribution::t_quantile;
///
/// let q = t_quantile(0.975, 10.0);
/// assert!((q - 2.228).abs() < 1e-3);
/// ```
#[must_use]
pub fn t_quantile(p: f64, df: f64) -> f64 {
    students_t(df).map_or(f64::NAN, |d| d.inverse_cdf(p))
}

/// Critical value `t_{1 - (1 - level) / 2, df}` for a two-sided interval at
/// the given confidence level.
#[must_use]
pub fn t_critical(confidence_level: f64, df: f64) -> f64 {
    t_quantile(1.0 - (1.0 - confidence_level) / 2.0, df)
}

/// Standard normal CDF.
#[must_use]
pub fn normal_cdf(z: f64) -> f64 {
    standard_normal().map_or(f64::NAN, |d| d.cdf(z))
}

/// Standard normal quantile function.
#[must_use]
pub fn normal_quantile(p: f64) -> f64 {
    standard_normal().map_or(f64::NAN, |d| d.inverse_cdf(p))
}

/// Upper tail `P(F_{d1,d2} >= f)`.
#[must_use]
pub fn f_sf(f: f64, d1: f64, d2: f64) -> f64 {
    FisherSnedecor::new(d1, d2).map_or(f64::NAN, |d| d.sf(f))
}

/// Quantile function of the F distribution.
#[must_use]
pub fn f_quantile(p: f64, d1: f64, d2: f64) -> f64 {
    FisherSnedecor::new(d1, d2).map_or(f64::NAN, |d| d.inverse_cdf(p))
}

/// Upper tail `P(X^2_df >= x)`.
#[must_use]
pub fn chi_squared_sf(x: f64, df: f64) -> f64 {
    ChiSquared::new(df).map_or(f64::NAN, |d| d.sf(x))
}
