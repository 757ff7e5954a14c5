//! Analysis configuration, loadable from JSON.
//!
//! Every field has a default, so a configuration file only needs to name the
//! values it overrides:
//!
//! ```
//! use nudge_analysis::config::AnalysisConfig;
//!
//! let config: AnalysisConfig = serde_json::from_str(r#"{ "seed": 7 }"#).unwrap();
//! assert_eq!(config.seed, 7);
//! assert_eq!(config.simulation.sample_size, 300);
//! assert_eq!(config.sesoi.upper, 5.0);
//! ```

use nudge_data::SimulationParams;
use serde::{Deserialize, Serialize};

use crate::equivalence::{EquivalenceError, Sesoi};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Seed of the dataset simulator.
    pub seed: u64,
    pub simulation: SimulationParams,
    /// Smallest effect size of interest for the no-risk equivalence test.
    pub sesoi: Sesoi,
    /// One-sided significance level of each TOST test.
    pub equivalence_alpha: f64,
    /// Confidence level of coefficient, marginal-mean and contrast intervals.
    pub confidence_level: f64,
    /// Relative tolerance of the marginal-means / prediction cross-check.
    pub cross_check_tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            seed: 123,
            simulation: SimulationParams::default(),
            sesoi: Sesoi::symmetric(5.0),
            equivalence_alpha: 0.10,
            confidence_level: 0.95,
            cross_check_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("confidence level must lie in (0, 1), got {value}")]
    ConfidenceLevel { value: f64 },
    #[display("cross-check tolerance must be positive, got {value}")]
    Tolerance { value: f64 },
    #[display("invalid equivalence settings: {source}")]
    Equivalence { source: EquivalenceError },
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.confidence_level;
        if level.is_nan() || level <= 0.0 || level >= 1.0 {
            return Err(ConfigError::ConfidenceLevel {
                value: self.confidence_level,
            });
        }
        if self.cross_check_tolerance.is_nan() || self.cross_check_tolerance <= 0.0 {
            return Err(ConfigError::Tolerance {
                value: self.cross_check_tolerance,
            });
        }
        self.sesoi
            .validate(self.equivalence_alpha)
            .map_err(|source| ConfigError::Equivalence { source })
    }
}
