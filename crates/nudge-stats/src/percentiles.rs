//! Sample quantiles.
//!
//! Quantiles interpolate linearly between order statistics (Hyndman and Fan
//! type 7): the `p`-th percentile of `n` sorted values sits at the fractional
//! position `(n - 1) * p / 100`. This is the rule behind the scaled-residual
//! quartiles of a mixed-model summary.

/// Quantile points of one sample, looked up by percentile.
///
/// # Examples
///
/// ```
/// use nudge_stats::percentiles::Percentiles;
///
/// let residuals = [-1.5, 0.5, -0.5, 2.0, 0.0];
/// let summary = Percentiles::five_number(&residuals);
///
/// assert_eq!(summary.get(0.0), Some(-1.5));
/// assert_eq!(summary.get(50.0), Some(0.0));
/// assert_eq!(summary.get(100.0), Some(2.0));
/// ```
#[derive(Debug, Clone)]
pub struct Percentiles {
    /// `(percentile, value)` in the order requested, percentile in `0.0..=100.0`.
    points: Vec<(f64, f64)>,
}

/// Minimum, lower quartile, median, upper quartile and maximum.
pub const FIVE_NUMBER_POINTS: [f64; 5] = [0.0, 25.0, 50.0, 75.0, 100.0];

impl Percentiles {
    /// Evaluates `percentile_points` on an already sorted sample.
    ///
    /// # Panics
    ///
    /// Panics if `sorted_values` is not in ascending order.
    #[must_use]
    pub fn from_sorted(sorted_values: &[f64], percentile_points: &[f64]) -> Self {
        assert!(
            sorted_values.is_sorted_by(|a, b| a <= b),
            "values must be sorted in ascending order"
        );
        let points = percentile_points
            .iter()
            .map(|&p| (p, compute_percentile(sorted_values, p)))
            .collect();
        Self { points }
    }

    /// Sorts a copy of `values` and evaluates `percentile_points` on it.
    ///
    /// ```
    /// use nudge_stats::percentiles::Percentiles;
    ///
    /// let values = [10.0, 1.0, 4.0, 7.0];
    /// let quartiles = Percentiles::new(&values, &[25.0, 75.0]);
    ///
    /// assert_eq!(quartiles.get(25.0), Some(3.25));
    /// assert_eq!(quartiles.get(75.0), Some(7.75));
    /// ```
    #[must_use]
    pub fn new(values: &[f64], percentile_points: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self::from_sorted(&sorted, percentile_points)
    }

    #[must_use]
    pub fn five_number(values: &[f64]) -> Self {
        Self::new(values, &FIVE_NUMBER_POINTS)
    }

    /// Value at `percentile`, or `None` when it was not one of the requested points.
    #[must_use]
    pub fn get(&self, percentile: f64) -> Option<f64> {
        self.points
            .iter()
            .find(|(p, _)| (p - percentile).abs() < f64::EPSILON)
            .map(|&(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.iter().copied()
    }
}

/// Type-7 quantile of sorted data; `NaN` for an empty slice.
///
/// Percentiles outside `0.0..=100.0` are clamped to the extremes.
///
/// ```
/// use nudge_stats::percentiles::compute_percentile;
///
/// let sorted = [1.0, 2.0, 3.0, 4.0];
/// assert_eq!(compute_percentile(&sorted, 50.0), 2.5);
/// assert_eq!(compute_percentile(&sorted, 100.0), 4.0);
/// ```
#[expect(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]
#[must_use]
pub fn compute_percentile(sorted_values: &[f64], percentile: f64) -> f64 {
    let Some(last) = sorted_values.len().checked_sub(1) else {
        return f64::NAN;
    };
    let position = last as f64 * (percentile / 100.0).clamp(0.0, 1.0);
    let below = position.floor() as usize;
    let above = (below + 1).min(last);
    let fraction = position - below as f64;
    sorted_values[below] + fraction * (sorted_values[above] - sorted_values[below])
}

/// Median of unsorted values; `None` for an empty slice.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(compute_percentile(&sorted, 50.0))
}
