use std::fmt;

use nudge_data::CohortKind;
use serde::{Deserialize, Serialize};

use crate::transform::Transform;

pub const RESPONSE: &str = "post_stake";
pub const COVARIATE: &str = "pre_stake";
pub const GROUPING: &str = "setting";

/// Fixed-effect structure of the stake model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedEffects {
    /// `treatment * risk + pre_stake`: main effects and their interaction.
    TreatmentByRisk,
    /// `treatment + pre_stake`, for subsets with a single risk level.
    TreatmentOnly,
}

/// Model specification: `post_stake ~ <fixed> + (1 | setting)`.
///
/// The covariate may carry a normalising transform, which only ever enters
/// through [`FittedModel::respecify`](crate::lmm::FittedModel::respecify).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelFormula {
    pub fixed: FixedEffects,
    pub covariate_transform: Option<Transform>,
}

impl ModelFormula {
    /// The default specification for a cohort.
    #[must_use]
    pub fn for_cohort(kind: CohortKind) -> Self {
        let fixed = match kind {
            CohortKind::AtRisk => FixedEffects::TreatmentByRisk,
            CohortKind::NoRisk => FixedEffects::TreatmentOnly,
        };
        Self {
            fixed,
            covariate_transform: None,
        }
    }

    #[must_use]
    pub fn with_covariate_transform(self, transform: Transform) -> Self {
        Self {
            covariate_transform: (!transform.is_identity()).then_some(transform),
            ..self
        }
    }

    /// Covariate value on the scale the model sees.
    #[must_use]
    pub fn covariate_value(&self, raw: f64) -> f64 {
        self.covariate_transform.map_or(raw, |t| t.apply(raw))
    }

    #[must_use]
    pub fn covariate_term(&self) -> String {
        self.covariate_transform
            .map_or_else(|| COVARIATE.to_owned(), |t| t.wrap(COVARIATE))
    }
}

impl fmt::Display for ModelFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fixed = match self.fixed {
            FixedEffects::TreatmentByRisk => "treatment * risk",
            FixedEffects::TreatmentOnly => "treatment",
        };
        write!(
            f,
            "{RESPONSE} ~ {fixed} + {} + (1 | {GROUPING})",
            self.covariate_term()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cohort_formulas() {
        assert_eq!(
            ModelFormula::for_cohort(CohortKind::AtRisk).to_string(),
            "post_stake ~ treatment * risk + pre_stake + (1 | setting)"
        );
        assert_eq!(
            ModelFormula::for_cohort(CohortKind::NoRisk).to_string(),
            "post_stake ~ treatment + pre_stake + (1 | setting)"
        );
    }

    #[test]
    fn test_transformed_covariate() {
        let formula = ModelFormula::for_cohort(CohortKind::NoRisk)
            .with_covariate_transform(Transform::Log { offset: 0.0 });
        assert_eq!(
            formula.to_string(),
            "post_stake ~ treatment + log(pre_stake) + (1 | setting)"
        );
        assert!((formula.covariate_value(1.0)).abs() < 1e-12);

        let identity = formula.with_covariate_transform(Transform::Identity);
        assert_eq!(identity.covariate_transform, None);
        assert_eq!(identity.covariate_value(3.5), 3.5);
    }
}
