use nudge_stats::distribution;
use serde::{Deserialize, Serialize};

/// A linear combination `L'β` of the fixed effects with its standard error
/// and Satterthwaite degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearEstimate {
    pub estimate: f64,
    pub std_error: f64,
    pub df: f64,
}

impl LinearEstimate {
    #[must_use]
    pub fn t_value(&self) -> f64 {
        self.estimate / self.std_error
    }

    /// Two-sided p-value for `H0: L'β = 0`.
    #[must_use]
    pub fn p_value(&self) -> f64 {
        distribution::t_two_sided_p(self.t_value(), self.df)
    }

    /// Two-sided confidence interval at `level` (e.g. 0.95).
    #[must_use]
    pub fn confidence_interval(&self, level: f64) -> ConfidenceInterval {
        let half_width = distribution::t_critical(level, self.df) * self.std_error;
        ConfidenceInterval {
            lower: self.estimate - half_width,
            upper: self.estimate + half_width,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_t_and_interval() {
        let est = LinearEstimate {
            estimate: 4.0,
            std_error: 2.0,
            df: 1e6,
        };
        assert!((est.t_value() - 2.0).abs() < 1e-12);
        assert!((est.p_value() - 0.0455).abs() < 1e-3);
        let ci = est.confidence_interval(0.95);
        assert!((ci.lower - (4.0 - 1.96 * 2.0)).abs() < 1e-2);
        assert!(ci.contains(4.0));
        assert!(!ci.contains(0.0));
        assert!((ci.width() - 2.0 * 1.96 * 2.0).abs() < 1e-2);
    }

    #[test]
    fn test_small_df_widens_interval() {
        let wide = LinearEstimate {
            estimate: 0.0,
            std_error: 1.0,
            df: 3.0,
        }
        .confidence_interval(0.95);
        let narrow = LinearEstimate {
            estimate: 0.0,
            std_error: 1.0,
            df: 300.0,
        }
        .confidence_interval(0.95);
        assert!(wide.width() > narrow.width());
    }
}
