//! Search for a normalising transform of a skewed continuous predictor.
//!
//! Every candidate in a fixed family of monotonic transforms is fitted to the
//! values (Box-Cox and Yeo-Johnson pick their λ by profile likelihood) and
//! scored with the Pearson P statistic per degree of freedom of the
//! transformed values. The lowest score wins; ties go to the earlier, simpler
//! candidate.
//!
//! The result is advisory: nothing here changes a fitted model. Feeding a
//! [`TransformSelection`] into
//! [`FittedModel::respecify`](crate::lmm::FittedModel::respecify) is an
//! explicit, separate step.

use std::fmt;

use nudge_stats::{descriptive::DescriptiveStats, normality};
use serde::{Deserialize, Serialize};

/// Smallest value a shifted variable is moved to before taking logs or powers.
const SHIFT_EPSILON: f64 = 1e-3;

/// λ grid for Box-Cox and Yeo-Johnson: -2.00, -1.99, ..., 2.00.
const LAMBDA_STEPS: i32 = 400;
const LAMBDA_MIN: f64 = -2.0;
const LAMBDA_MAX: f64 = 2.0;

/// A monotonic transform with its fitted parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    Identity,
    Log { offset: f64 },
    Sqrt { offset: f64 },
    Arcsinh,
    BoxCox { lambda: f64, offset: f64 },
    YeoJohnson { lambda: f64 },
}

impl Transform {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Log { .. } => "log",
            Self::Sqrt { .. } => "sqrt",
            Self::Arcsinh => "arcsinh",
            Self::BoxCox { .. } => "box_cox",
            Self::YeoJohnson { .. } => "yeo_johnson",
        }
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    #[must_use]
    pub fn apply(&self, x: f64) -> f64 {
        match *self {
            Self::Identity => x,
            Self::Log { offset } => (x + offset).ln(),
            Self::Sqrt { offset } => (x + offset).sqrt(),
            Self::Arcsinh => x.asinh(),
            Self::BoxCox { lambda, offset } => box_cox(x + offset, lambda),
            Self::YeoJohnson { lambda } => yeo_johnson(x, lambda),
        }
    }

    #[must_use]
    pub fn apply_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|x| self.apply(*x)).collect()
    }

    /// Name of the transformed variable in a formula, e.g. `log(pre_stake + 0.5)`.
    #[must_use]
    pub fn wrap(&self, variable: &str) -> String {
        match *self {
            Self::Identity => variable.to_owned(),
            Self::Arcsinh => format!("asinh({variable})"),
            Self::Log { offset } | Self::Sqrt { offset } if offset == 0.0 => {
                format!("{}({variable})", self.name())
            }
            Self::Log { offset } | Self::Sqrt { offset } => {
                format!("{}({variable} + {offset:.4})", self.name())
            }
            Self::BoxCox { lambda, offset } if offset == 0.0 => {
                format!("box_cox({variable}, lambda = {lambda:.2})")
            }
            Self::BoxCox { lambda, offset } => {
                format!("box_cox({variable} + {offset:.4}, lambda = {lambda:.2})")
            }
            Self::YeoJohnson { lambda } => format!("yeo_johnson({variable}, lambda = {lambda:.2})"),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.wrap("x"))
    }
}

fn box_cox(x: f64, lambda: f64) -> f64 {
    if lambda.abs() < 1e-8 {
        x.ln()
    } else {
        (x.powf(lambda) - 1.0) / lambda
    }
}

fn yeo_johnson(x: f64, lambda: f64) -> f64 {
    if x >= 0.0 {
        if lambda.abs() < 1e-8 {
            x.ln_1p()
        } else {
            ((x + 1.0).powf(lambda) - 1.0) / lambda
        }
    } else if (lambda - 2.0).abs() < 1e-8 {
        -(-x).ln_1p()
    } else {
        -((1.0 - x).powf(2.0 - lambda) - 1.0) / (2.0 - lambda)
    }
}

/// Score of one candidate transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub transform: Transform,
    /// Pearson P statistic divided by its degrees of freedom (lower is more normal).
    pub pearson_p_per_df: f64,
}

/// The selected transform, the transformed values, and every candidate's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSelection {
    pub transform: Transform,
    pub pearson_p_per_df: f64,
    pub transformed: Vec<f64>,
    pub candidates: Vec<CandidateScore>,
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum TransformError {
    #[display("at least {min} values are needed to rank transforms, got {count}")]
    TooFewValues { count: usize, min: usize },
    #[display("value {value} is not finite")]
    NonFinite { value: f64 },
    #[display("values have no spread")]
    NoSpread,
}

const MIN_VALUES: usize = 5;

/// Ranks the candidate family on `values` and returns the most normal one.
pub fn select_transform(values: &[f64]) -> Result<TransformSelection, TransformError> {
    if values.len() < MIN_VALUES {
        return Err(TransformError::TooFewValues {
            count: values.len(),
            min: MIN_VALUES,
        });
    }
    if let Some(value) = values.iter().copied().find(|v| !v.is_finite()) {
        return Err(TransformError::NonFinite { value });
    }
    let stats = DescriptiveStats::new(values.iter().copied()).ok_or(TransformError::NoSpread)?;
    if stats.variance <= 0.0 {
        return Err(TransformError::NoSpread);
    }

    let offset = if stats.min > 0.0 {
        0.0
    } else {
        SHIFT_EPSILON - stats.min
    };
    let sqrt_offset = (-stats.min).max(0.0);

    let family = [
        Transform::Identity,
        Transform::Log { offset },
        Transform::Sqrt {
            offset: sqrt_offset,
        },
        Transform::Arcsinh,
        Transform::BoxCox {
            lambda: box_cox_lambda(values, offset),
            offset,
        },
        Transform::YeoJohnson {
            lambda: yeo_johnson_lambda(values),
        },
    ];

    let mut best: Option<(CandidateScore, Vec<f64>)> = None;
    let mut candidates = Vec::with_capacity(family.len());
    for transform in family {
        let transformed = transform.apply_all(values);
        let Some(score) = normality::pearson_p(&transformed).map(|p| p.per_df()) else {
            log::debug!("transform {transform} produced values without spread; skipped");
            continue;
        };
        let candidate = CandidateScore {
            transform,
            pearson_p_per_df: score,
        };
        candidates.push(candidate);
        if best
            .as_ref()
            .is_none_or(|(b, _)| score < b.pearson_p_per_df)
        {
            best = Some((candidate, transformed));
        }
    }

    let (chosen, transformed) = best.ok_or(TransformError::NoSpread)?;
    log::info!(
        "selected transform {} (Pearson P/df = {:.3})",
        chosen.transform,
        chosen.pearson_p_per_df
    );
    Ok(TransformSelection {
        transform: chosen.transform,
        pearson_p_per_df: chosen.pearson_p_per_df,
        transformed,
        candidates,
    })
}

#[expect(clippy::cast_precision_loss)]
fn gaussian_profile_log_likelihood(transformed: &[f64], log_jacobian: f64) -> f64 {
    let n = transformed.len() as f64;
    DescriptiveStats::new(transformed.iter().copied())
        .filter(|s| s.variance > 0.0 && s.variance.is_finite())
        .map_or(f64::NEG_INFINITY, |s| {
            -0.5 * n * s.variance.ln() + log_jacobian
        })
}

fn lambda_grid() -> impl Iterator<Item = f64> {
    (0..=LAMBDA_STEPS)
        .map(|i| LAMBDA_MIN + (LAMBDA_MAX - LAMBDA_MIN) * f64::from(i) / f64::from(LAMBDA_STEPS))
}

fn argmax_lambda<F>(log_likelihood: F) -> f64
where
    F: Fn(f64) -> f64,
{
    lambda_grid()
        .map(|lambda| (lambda, log_likelihood(lambda)))
        .filter(|(_, ll)| ll.is_finite())
        .fold((1.0, f64::NEG_INFINITY), |best, cur| {
            if cur.1 > best.1 { cur } else { best }
        })
        .0
}

fn box_cox_lambda(values: &[f64], offset: f64) -> f64 {
    let sum_log = values.iter().map(|x| (x + offset).ln()).sum::<f64>();
    argmax_lambda(|lambda| {
        let transformed = values
            .iter()
            .map(|x| box_cox(x + offset, lambda))
            .collect::<Vec<_>>();
        gaussian_profile_log_likelihood(&transformed, (lambda - 1.0) * sum_log)
    })
}

fn yeo_johnson_lambda(values: &[f64]) -> f64 {
    let sum_signed_log = values
        .iter()
        .map(|x| x.signum() * x.abs().ln_1p())
        .sum::<f64>();
    argmax_lambda(|lambda| {
        let transformed = values
            .iter()
            .map(|x| yeo_johnson(*x, lambda))
            .collect::<Vec<_>>();
        gaussian_profile_log_likelihood(&transformed, (lambda - 1.0) * sum_signed_log)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_normal_like(n: u32) -> Vec<f64> {
        // exp of evenly spaced normal quantiles: strongly right-skewed
        (1..=n)
            .map(|i| {
                let p = (f64::from(i) - 0.5) / f64::from(n);
                nudge_stats::distribution::normal_quantile(p).exp()
            })
            .collect()
    }

    #[test]
    fn test_skewed_values_prefer_log_like_transform() {
        let values = log_normal_like(200);
        let selection = select_transform(&values).unwrap();
        assert!(!selection.transform.is_identity());
        let identity = selection
            .candidates
            .iter()
            .find(|c| c.transform.is_identity())
            .unwrap();
        assert!(selection.pearson_p_per_df < identity.pearson_p_per_df);
        assert_eq!(selection.transformed.len(), values.len());
        assert_eq!(selection.candidates.len(), 6);
    }

    #[test]
    fn test_box_cox_lambda_near_zero_for_log_normal() {
        let values = log_normal_like(500);
        let lambda = box_cox_lambda(&values, 0.0);
        assert!(lambda.abs() < 0.1, "lambda = {lambda}");
    }

    #[test]
    fn test_transforms_are_monotonic() {
        let transforms = [
            Transform::Log { offset: 1.0 },
            Transform::Sqrt { offset: 0.0 },
            Transform::Arcsinh,
            Transform::BoxCox {
                lambda: -0.5,
                offset: 1.0,
            },
            Transform::YeoJohnson { lambda: 0.3 },
            Transform::YeoJohnson { lambda: 2.0 },
        ];
        for t in transforms {
            let ys = [0.0, 0.5, 1.0, 4.0, 9.0].map(|x| t.apply(x));
            assert!(ys.is_sorted_by(|a, b| a < b), "{t}: {ys:?}");
        }
        let yj = Transform::YeoJohnson { lambda: 0.5 };
        assert!(yj.apply(-2.0) < yj.apply(-1.0));
    }

    #[test]
    fn test_rejects_degenerate_input() {
        assert!(matches!(
            select_transform(&[1.0, 2.0]),
            Err(TransformError::TooFewValues { count: 2, .. })
        ));
        assert!(matches!(
            select_transform(&[3.0; 10]),
            Err(TransformError::NoSpread)
        ));
        assert!(matches!(
            select_transform(&[1.0, 2.0, f64::NAN, 3.0, 4.0]),
            Err(TransformError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_wrap_names_variable() {
        assert_eq!(Transform::Identity.wrap("pre_stake"), "pre_stake");
        assert_eq!(Transform::Log { offset: 0.0 }.wrap("pre_stake"), "log(pre_stake)");
        assert_eq!(
            Transform::YeoJohnson { lambda: 0.5 }.wrap("pre_stake"),
            "yeo_johnson(pre_stake, lambda = 0.50)"
        );
    }
}
