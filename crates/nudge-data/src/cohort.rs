//! Partitioning a dataset into the two analysis cohorts.
//!
//! | Cohort    | Risk levels                      | Risk reference |
//! |-----------|----------------------------------|----------------|
//! | at-risk   | Low, Moderate, High              | Low risk       |
//! | no-risk   | No risk                          | No risk        |
//!
//! Both cohorts use `No Feedback` as the treatment reference. Every risk
//! category belongs to exactly one cohort, so the cohorts are disjoint and
//! together cover the dataset.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    factor::{FactorLevel, LevelError, Levels, RiskCategory, Setting, TreatmentArm},
    observation::{Dataset, Observation},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CohortKind {
    AtRisk,
    NoRisk,
}

impl CohortKind {
    pub const ALL: [Self; 2] = [Self::AtRisk, Self::NoRisk];

    #[must_use]
    pub fn to_str(self) -> &'static str {
        match self {
            Self::AtRisk => "at-risk",
            Self::NoRisk => "no-risk",
        }
    }

    /// Risk levels of the cohort, reference level first.
    #[must_use]
    pub fn risk_levels(self) -> &'static [RiskCategory] {
        match self {
            Self::AtRisk => &[
                RiskCategory::LowRisk,
                RiskCategory::ModerateRisk,
                RiskCategory::HighRisk,
            ],
            Self::NoRisk => &[RiskCategory::NoRisk],
        }
    }

    #[must_use]
    pub fn contains(self, risk: RiskCategory) -> bool {
        self.risk_levels().contains(&risk)
    }

    #[must_use]
    pub fn of(risk: RiskCategory) -> Self {
        if risk == RiskCategory::NoRisk {
            Self::NoRisk
        } else {
            Self::AtRisk
        }
    }
}

impl fmt::Display for CohortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.to_str(), f)
    }
}

impl FromStr for CohortKind {
    type Err = ParseCohortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.to_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseCohortError {
                input: s.to_owned(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("unknown cohort '{input}' (expected at-risk or no-risk)")]
pub struct ParseCohortError {
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum SplitError {
    #[display("{cohort} cohort has no observations for {factor} level '{level}'")]
    EmptyLevel {
        cohort: CohortKind,
        factor: &'static str,
        level: String,
    },
    #[display("invalid re-leveling of {cohort} cohort: {source}")]
    Relevel {
        cohort: CohortKind,
        source: LevelError,
    },
}

/// A filtered, re-leveled view of a dataset restricted to one cohort.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSubset {
    kind: CohortKind,
    observations: Vec<Observation>,
    treatment_levels: Levels<TreatmentArm>,
    risk_levels: Levels<RiskCategory>,
}

impl AnalysisSubset {
    /// Extracts the observations of `kind` from `dataset`.
    ///
    /// Fails if any treatment arm or risk level of the cohort has no
    /// observations, so a level can never be dropped silently.
    pub fn split(dataset: &Dataset, kind: CohortKind) -> Result<Self, SplitError> {
        let observations = dataset
            .iter()
            .filter(|obs| kind.contains(obs.risk))
            .copied()
            .collect::<Vec<_>>();
        let relevel = |source| SplitError::Relevel {
            cohort: kind,
            source,
        };
        let treatment_levels = Levels::new(TreatmentArm::ALL.to_vec()).map_err(relevel)?;
        let risk_levels = Levels::new(kind.risk_levels().to_vec()).map_err(relevel)?;

        ensure_levels_present(kind, &observations, &treatment_levels, |obs| obs.treatment)?;
        ensure_levels_present(kind, &observations, &risk_levels, |obs| obs.risk)?;

        log::debug!("{kind} cohort: {} observations", observations.len());
        Ok(Self {
            kind,
            observations,
            treatment_levels,
            risk_levels,
        })
    }

    /// Splits `dataset` into the at-risk and no-risk cohorts.
    pub fn split_all(dataset: &Dataset) -> Result<(Self, Self), SplitError> {
        Ok((
            Self::split(dataset, CohortKind::AtRisk)?,
            Self::split(dataset, CohortKind::NoRisk)?,
        ))
    }

    /// Returns a copy of this subset with a different risk reference level.
    pub fn with_risk_reference(&self, reference: RiskCategory) -> Result<Self, SplitError> {
        let risk_levels = self
            .risk_levels
            .with_reference(reference)
            .map_err(|source| SplitError::Relevel {
                cohort: self.kind,
                source,
            })?;
        Ok(Self {
            risk_levels,
            ..self.clone()
        })
    }

    #[must_use]
    pub fn kind(&self) -> CohortKind {
        self.kind
    }

    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    #[must_use]
    pub fn treatment_levels(&self) -> &Levels<TreatmentArm> {
        &self.treatment_levels
    }

    #[must_use]
    pub fn risk_levels(&self) -> &Levels<RiskCategory> {
        &self.risk_levels
    }

    /// Settings observed in the subset, in natural order.
    #[must_use]
    pub fn settings(&self) -> Vec<Setting> {
        Setting::ALL
            .iter()
            .copied()
            .filter(|s| self.observations.iter().any(|obs| obs.setting == *s))
            .collect()
    }
}

fn ensure_levels_present<T, F>(
    cohort: CohortKind,
    observations: &[Observation],
    levels: &Levels<T>,
    value: F,
) -> Result<(), SplitError>
where
    T: FactorLevel,
    F: Fn(&Observation) -> T,
{
    for level in levels.iter() {
        if !observations.iter().any(|obs| value(obs) == level) {
            return Err(SplitError::EmptyLevel {
                cohort,
                factor: T::FACTOR,
                level: level.label().to_owned(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::simulate::{SimulationParams, simulate_seeded};

    #[test]
    fn test_cohorts_partition_dataset() {
        let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
        let (at_risk, no_risk) = AnalysisSubset::split_all(&dataset).unwrap();

        let at_risk_ids = at_risk.observations().iter().map(|o| o.id).collect::<BTreeSet<_>>();
        let no_risk_ids = no_risk.observations().iter().map(|o| o.id).collect::<BTreeSet<_>>();
        let all_ids = dataset.iter().map(|o| o.id).collect::<BTreeSet<_>>();

        assert!(at_risk_ids.is_disjoint(&no_risk_ids));
        assert_eq!(
            at_risk_ids.union(&no_risk_ids).copied().collect::<BTreeSet<_>>(),
            all_ids
        );
        assert_eq!(at_risk.risk_levels().reference(), RiskCategory::LowRisk);
        assert_eq!(no_risk.risk_levels().reference(), RiskCategory::NoRisk);
        assert_eq!(
            at_risk.treatment_levels().reference(),
            TreatmentArm::NoFeedback
        );
    }

    #[test]
    fn test_missing_level_fails_fast() {
        let dataset = Dataset::new(vec![
            Observation {
                id: 1,
                treatment: TreatmentArm::Feedback,
                risk: RiskCategory::LowRisk,
                pre_stake: 10.0,
                post_stake: 9.0,
                setting: Setting::Online,
            },
            Observation {
                id: 2,
                treatment: TreatmentArm::NoFeedback,
                risk: RiskCategory::LowRisk,
                pre_stake: 10.0,
                post_stake: 10.0,
                setting: Setting::Online,
            },
        ])
        .unwrap();
        assert_eq!(
            AnalysisSubset::split(&dataset, CohortKind::AtRisk),
            Err(SplitError::EmptyLevel {
                cohort: CohortKind::AtRisk,
                factor: "risk",
                level: "Moderate risk".to_owned(),
            })
        );
    }

    #[test]
    fn test_relevel() {
        let dataset = simulate_seeded(5, SimulationParams::default()).unwrap();
        let at_risk = AnalysisSubset::split(&dataset, CohortKind::AtRisk).unwrap();
        let releveled = at_risk
            .with_risk_reference(RiskCategory::HighRisk)
            .unwrap();
        assert_eq!(releveled.risk_levels().reference(), RiskCategory::HighRisk);
        assert_eq!(releveled.observations(), at_risk.observations());
        assert!(at_risk.with_risk_reference(RiskCategory::NoRisk).is_err());
    }

    #[test]
    fn test_cohort_kind_parsing() {
        assert_eq!("at-risk".parse::<CohortKind>(), Ok(CohortKind::AtRisk));
        assert_eq!("No-Risk".parse::<CohortKind>(), Ok(CohortKind::NoRisk));
        let err = "all".parse::<CohortKind>().unwrap_err();
        assert_eq!(err.input, "all");
        assert_eq!(
            err.to_string(),
            "unknown cohort 'all' (expected at-risk or no-risk)"
        );
        for risk in RiskCategory::ALL {
            assert!(CohortKind::of(*risk).contains(*risk));
        }
    }
}
