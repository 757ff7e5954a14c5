use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A categorical variable with a fixed, ordered set of levels.
pub trait FactorLevel: Copy + Eq + Ord + fmt::Debug + fmt::Display + 'static {
    /// Column name of the factor in data files and design matrices.
    const FACTOR: &'static str;
    /// Every level, in natural order.
    const ALL: &'static [Self];

    fn label(self) -> &'static str;

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.label() == label)
    }
}

/// Intervention arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TreatmentArm {
    #[serde(rename = "No Feedback")]
    NoFeedback,
    #[serde(rename = "Feedback")]
    Feedback,
}

/// PGSI risk category, ordered from lowest to highest risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskCategory {
    #[serde(rename = "No risk")]
    NoRisk,
    #[serde(rename = "Low risk")]
    LowRisk,
    #[serde(rename = "Moderate risk")]
    ModerateRisk,
    #[serde(rename = "High risk")]
    HighRisk,
}

/// Gambling setting the participant was recruited from; the clustering variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Setting {
    Online,
    Venue,
}

impl FactorLevel for TreatmentArm {
    const FACTOR: &'static str = "treatment";
    const ALL: &'static [Self] = &[Self::NoFeedback, Self::Feedback];

    fn label(self) -> &'static str {
        match self {
            Self::NoFeedback => "No Feedback",
            Self::Feedback => "Feedback",
        }
    }
}

impl FactorLevel for RiskCategory {
    const FACTOR: &'static str = "risk";
    const ALL: &'static [Self] = &[
        Self::NoRisk,
        Self::LowRisk,
        Self::ModerateRisk,
        Self::HighRisk,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::NoRisk => "No risk",
            Self::LowRisk => "Low risk",
            Self::ModerateRisk => "Moderate risk",
            Self::HighRisk => "High risk",
        }
    }
}

impl FactorLevel for Setting {
    const FACTOR: &'static str = "setting";
    const ALL: &'static [Self] = &[Self::Online, Self::Venue];

    fn label(self) -> &'static str {
        match self {
            Self::Online => "Online",
            Self::Venue => "Venue",
        }
    }
}

macro_rules! impl_display_from_str {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(self.label(), f)
                }
            }

            impl FromStr for $ty {
                type Err = LevelError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Self::from_label(s.trim()).ok_or_else(|| LevelError::UnknownLevel {
                        factor: <$ty as FactorLevel>::FACTOR,
                        level: s.to_owned(),
                    })
                }
            }
        )*
    };
}

impl_display_from_str!(TreatmentArm, RiskCategory, Setting);

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum LevelError {
    #[display("unknown level '{level}' for factor '{factor}'")]
    UnknownLevel { factor: &'static str, level: String },
    #[display("factor '{factor}' has no levels")]
    NoLevels { factor: &'static str },
    #[display("level '{level}' appears more than once in factor '{factor}'")]
    DuplicateLevel { factor: &'static str, level: String },
    #[display("level '{level}' is not a level of this '{factor}' factor")]
    NotALevel { factor: &'static str, level: String },
}

/// An ordered, non-empty set of distinct levels; the first level is the
/// reference level used by treatment coding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Levels<T> {
    levels: Vec<T>,
}

impl<T> Levels<T>
where
    T: FactorLevel,
{
    pub fn new(levels: Vec<T>) -> Result<Self, LevelError> {
        if levels.is_empty() {
            return Err(LevelError::NoLevels { factor: T::FACTOR });
        }
        for (i, level) in levels.iter().enumerate() {
            if levels[..i].contains(level) {
                return Err(LevelError::DuplicateLevel {
                    factor: T::FACTOR,
                    level: level.label().to_owned(),
                });
            }
        }
        Ok(Self { levels })
    }

    /// Returns the same levels with `reference` moved to the front; the
    /// remaining levels keep their relative order.
    pub fn with_reference(&self, reference: T) -> Result<Self, LevelError> {
        if !self.contains(reference) {
            return Err(LevelError::NotALevel {
                factor: T::FACTOR,
                level: reference.label().to_owned(),
            });
        }
        let levels = std::iter::once(reference)
            .chain(self.levels.iter().copied().filter(|l| *l != reference))
            .collect();
        Ok(Self { levels })
    }

    #[must_use]
    pub fn reference(&self) -> T {
        self.levels[0]
    }

    #[must_use]
    pub fn contains(&self, level: T) -> bool {
        self.levels.contains(&level)
    }

    #[must_use]
    pub fn index_of(&self, level: T) -> Option<usize> {
        self.levels.iter().position(|l| *l == level)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.levels.iter().copied()
    }

    /// Levels other than the reference, in order.
    pub fn non_reference(&self) -> impl Iterator<Item = T> + '_ {
        self.levels.iter().skip(1).copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for risk in RiskCategory::ALL {
            assert_eq!(risk.to_string().parse::<RiskCategory>(), Ok(*risk));
        }
        assert_eq!("Feedback".parse::<TreatmentArm>(), Ok(TreatmentArm::Feedback));
        assert!("Very high risk".parse::<RiskCategory>().is_err());
    }

    #[test]
    fn test_levels_reject_duplicates_and_empty() {
        assert!(Levels::<Setting>::new(vec![]).is_err());
        assert!(Levels::new(vec![Setting::Online, Setting::Online]).is_err());
    }

    #[test]
    fn test_with_reference_moves_level_to_front() {
        let levels = Levels::new(vec![
            RiskCategory::LowRisk,
            RiskCategory::ModerateRisk,
            RiskCategory::HighRisk,
        ])
        .unwrap();
        let releveled = levels.with_reference(RiskCategory::HighRisk).unwrap();
        assert_eq!(
            releveled.as_slice(),
            &[
                RiskCategory::HighRisk,
                RiskCategory::LowRisk,
                RiskCategory::ModerateRisk
            ]
        );
        assert_eq!(
            levels.with_reference(RiskCategory::NoRisk),
            Err(LevelError::NotALevel {
                factor: "risk",
                level: "No risk".to_owned()
            })
        );
    }
}
