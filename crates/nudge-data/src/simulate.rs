//! Seeded generation of a synthetic study dataset.
//!
//! Each participant draws a treatment arm, a risk category and a setting
//! uniformly and independently, and two stakes from a half-normal
//! distribution (`|N(mean, sd)|`). The post-intervention stake is then
//! overwritten by [`derive_post_stake`].
//!
//! The random-number generator is always passed in explicitly; the same seed
//! produces the same dataset.

use rand::{Rng, SeedableRng as _};
use rand_distr::{Distribution as _, Normal};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::{
    factor::{FactorLevel, RiskCategory, Setting, TreatmentArm},
    observation::{DataError, Dataset, Observation},
};

/// Relative change applied to the pre-intervention stake of no-risk
/// participants who receive feedback.
pub const NO_RISK_RELATIVE_CHANGE: f64 = -0.01;

/// Multiplier applied to the simulated post-intervention stake of
/// participants who receive feedback, by risk category.
///
/// `None` for the no-risk category, which is derived from the pre stake instead.
#[must_use]
pub const fn feedback_factor(risk: RiskCategory) -> Option<f64> {
    match risk {
        RiskCategory::NoRisk => None,
        RiskCategory::LowRisk => Some(0.95),
        RiskCategory::ModerateRisk => Some(0.90),
        RiskCategory::HighRisk => Some(0.85),
    }
}

/// Post-intervention stake of a participant.
///
/// - No feedback: the stake is unchanged, `pre`.
/// - Feedback, no risk: `pre + pre * NO_RISK_RELATIVE_CHANGE`, based on the
///   pre stake.
/// - Feedback, other categories: `drawn_post * factor`, based on the
///   independently drawn post stake.
#[must_use]
pub fn derive_post_stake(
    treatment: TreatmentArm,
    risk: RiskCategory,
    pre: f64,
    drawn_post: f64,
) -> f64 {
    match (treatment, feedback_factor(risk)) {
        (TreatmentArm::NoFeedback, _) => pre,
        (TreatmentArm::Feedback, None) => pre + pre * NO_RISK_RELATIVE_CHANGE,
        (TreatmentArm::Feedback, Some(factor)) => drawn_post * factor,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Number of participants.
    pub sample_size: usize,
    /// Location of the normal distribution the stakes are folded from.
    pub stake_mean: f64,
    /// Scale of the normal distribution the stakes are folded from.
    pub stake_sd: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            sample_size: 300,
            stake_mean: 100.0,
            stake_sd: 20.0,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum SimulationError {
    #[display("invalid stake distribution (mean {mean}, sd {sd})")]
    InvalidDistribution { mean: f64, sd: f64 },
    #[display("sample size must be positive")]
    EmptySample,
    #[display("sample size {sample_size} exceeds the participant id range")]
    TooLarge { sample_size: usize },
    #[display("simulated dataset is invalid: {source}")]
    Dataset { source: DataError },
}

#[derive(Debug, Clone)]
pub struct Simulator {
    params: SimulationParams,
    stake: Normal<f64>,
}

impl Simulator {
    pub fn new(params: SimulationParams) -> Result<Self, SimulationError> {
        let invalid = || SimulationError::InvalidDistribution {
            mean: params.stake_mean,
            sd: params.stake_sd,
        };
        if !(params.stake_mean.is_finite() && params.stake_sd.is_finite()) || params.stake_sd <= 0.0
        {
            return Err(invalid());
        }
        if params.sample_size == 0 {
            return Err(SimulationError::EmptySample);
        }
        if u32::try_from(params.sample_size).is_err() {
            return Err(SimulationError::TooLarge {
                sample_size: params.sample_size,
            });
        }
        let stake = Normal::new(params.stake_mean, params.stake_sd).map_err(|_| invalid())?;
        Ok(Self { params, stake })
    }

    #[must_use]
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Draws one dataset from `rng`.
    pub fn simulate<R>(&self, rng: &mut R) -> Result<Dataset, SimulationError>
    where
        R: Rng + ?Sized,
    {
        let observations = (1..)
            .take(self.params.sample_size)
            .map(|id| self.draw(id, rng))
            .collect();
        let dataset =
            Dataset::new(observations).map_err(|source| SimulationError::Dataset { source })?;
        log::info!(
            "simulated {} participants (stake ~ |N({}, {})|)",
            dataset.len(),
            self.params.stake_mean,
            self.params.stake_sd
        );
        Ok(dataset)
    }

    fn draw<R>(&self, id: u32, rng: &mut R) -> Observation
    where
        R: Rng + ?Sized,
    {
        let treatment = pick(TreatmentArm::ALL, rng);
        let risk = pick(RiskCategory::ALL, rng);
        let setting = pick(Setting::ALL, rng);
        let pre_stake = self.stake.sample(rng).abs();
        let drawn_post = self.stake.sample(rng).abs();
        Observation {
            id,
            treatment,
            risk,
            pre_stake,
            post_stake: derive_post_stake(treatment, risk, pre_stake, drawn_post),
            setting,
        }
    }
}

fn pick<T, R>(levels: &[T], rng: &mut R) -> T
where
    T: Copy,
    R: Rng + ?Sized,
{
    levels[rng.random_range(0..levels.len())]
}

/// Simulates a dataset from a fresh generator seeded with `seed`.
pub fn simulate_seeded(seed: u64, params: SimulationParams) -> Result<Dataset, SimulationError> {
    let mut rng = Pcg64::seed_from_u64(seed);
    Simulator::new(params)?.simulate(&mut rng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_table() {
        let pre = 80.0;
        let drawn = 120.0;
        for risk in RiskCategory::ALL {
            assert_eq!(
                derive_post_stake(TreatmentArm::NoFeedback, *risk, pre, drawn),
                pre
            );
        }
        let feedback = |risk| derive_post_stake(TreatmentArm::Feedback, risk, pre, drawn);
        assert!((feedback(RiskCategory::NoRisk) - 79.2).abs() < 1e-12);
        assert_eq!(feedback(RiskCategory::LowRisk), 120.0 * 0.95);
        assert_eq!(feedback(RiskCategory::ModerateRisk), 120.0 * 0.90);
        assert_eq!(feedback(RiskCategory::HighRisk), 120.0 * 0.85);
        // pre * 0.85 * (drawn / pre)
        assert!((feedback(RiskCategory::HighRisk) - pre * 0.85 * (drawn / pre)).abs() < 1e-12);
    }

    #[test]
    fn test_factors_more_favorable_with_risk() {
        let factors = [
            RiskCategory::LowRisk,
            RiskCategory::ModerateRisk,
            RiskCategory::HighRisk,
        ]
        .map(|r| feedback_factor(r).unwrap());
        assert!(factors.is_sorted_by(|a, b| a > b));
    }

    #[test]
    fn test_same_seed_same_dataset() {
        let params = SimulationParams {
            sample_size: 50,
            ..SimulationParams::default()
        };
        let a = simulate_seeded(7, params).unwrap();
        let b = simulate_seeded(7, params).unwrap();
        let c = simulate_seeded(8, params).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_simulated_records_follow_derivation() {
        let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
        assert_eq!(dataset.len(), 300);
        for (expected_id, obs) in (1..).zip(dataset.iter()) {
            assert_eq!(obs.id, expected_id);
            assert!(obs.pre_stake >= 0.0 && obs.post_stake >= 0.0);
            match (obs.treatment, obs.risk) {
                (TreatmentArm::NoFeedback, _) => assert_eq!(obs.post_stake, obs.pre_stake),
                (TreatmentArm::Feedback, RiskCategory::NoRisk) => {
                    assert_eq!(obs.post_stake, obs.pre_stake + obs.pre_stake * -0.01);
                }
                (TreatmentArm::Feedback, _) => {}
            }
        }
    }

    #[test]
    fn test_invalid_params() {
        let bad_sd = SimulationParams {
            stake_sd: 0.0,
            ..SimulationParams::default()
        };
        assert!(matches!(
            Simulator::new(bad_sd),
            Err(SimulationError::InvalidDistribution { .. })
        ));
        let empty = SimulationParams {
            sample_size: 0,
            ..SimulationParams::default()
        };
        assert!(matches!(
            Simulator::new(empty),
            Err(SimulationError::EmptySample)
        ));
    }
}
