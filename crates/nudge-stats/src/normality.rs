//! Goodness-of-fit statistics against the normal distribution.
//!
//! - [`jarque_bera`]: moment-based test used by the model diagnostics
//! - [`pearson_p`]: binned chi-squared statistic used to rank normalising transforms

use crate::{descriptive::DescriptiveStats, distribution};

/// Result of a normality test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalityTest {
    /// Test statistic.
    pub statistic: f64,
    /// Degrees of freedom of the reference chi-squared distribution.
    pub df: f64,
    /// Upper-tail p-value.
    pub p_value: f64,
}

/// Jarque-Bera test `n / 6 * (S^2 + K^2 / 4)` against chi-squared with 2 df.
///
/// Returns `None` for fewer than three values or values without spread.
///
/// # Examples
///
/// ```
/// use nudge_stats::normality::jarque_bera;
///
/// let symmetric = [-2.0, -1.0, -0.5, 0.0, 0.5, 1.0, 2.0];
/// let test = jarque_bera(&symmetric).unwrap();
/// assert!(test.p_value > 0.5);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn jarque_bera(values: &[f64]) -> Option<NormalityTest> {
    if values.len() < 3 {
        return None;
    }
    let stats = DescriptiveStats::new(values.iter().copied())?;
    if stats.variance <= 0.0 {
        return None;
    }
    let n = values.len() as f64;
    let statistic = n / 6.0 * (stats.skewness.powi(2) + stats.excess_kurtosis.powi(2) / 4.0);
    Some(NormalityTest {
        statistic,
        df: 2.0,
        p_value: distribution::chi_squared_sf(statistic, 2.0),
    })
}

/// Pearson chi-squared statistic over equiprobable normal classes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PearsonP {
    /// Sum of `(observed - expected)^2 / expected` over all classes.
    pub statistic: f64,
    /// Number of equiprobable classes, `ceil(2 n^(2/5))`.
    pub classes: usize,
    /// Degrees of freedom, `classes - 3` (mean and sd are estimated).
    pub df: f64,
}

impl PearsonP {
    /// Statistic per degree of freedom; closer to 1 means closer to normal.
    #[must_use]
    pub fn per_df(&self) -> f64 {
        self.statistic / self.df
    }

    /// Upper-tail p-value against chi-squared with [`Self::df`] degrees of freedom.
    #[must_use]
    pub fn p_value(&self) -> f64 {
        distribution::chi_squared_sf(self.statistic, self.df)
    }
}

/// Computes the Pearson P statistic of `values` after standardising them with
/// their mean and sample standard deviation.
///
/// Returns `None` for fewer than five values or values without spread.
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#[must_use]
pub fn pearson_p(values: &[f64]) -> Option<PearsonP> {
    if values.len() < 5 {
        return None;
    }
    let stats = DescriptiveStats::new(values.iter().copied())?;
    let sd = stats.sample_std_dev();
    if sd.is_nan() || sd <= 0.0 {
        return None;
    }

    let n = values.len() as f64;
    let classes = (2.0 * n.powf(0.4)).ceil() as usize;
    let mut observed = vec![0_usize; classes];
    for v in values {
        let u = distribution::normal_cdf((v - stats.mean) / sd);
        let idx = ((u * classes as f64) as usize).min(classes - 1);
        observed[idx] += 1;
    }

    let expected = n / classes as f64;
    let statistic = observed
        .iter()
        .map(|&o| (o as f64 - expected).powi(2) / expected)
        .sum();

    Some(PearsonP {
        statistic,
        classes,
        df: (classes - 3) as f64,
    })
}
