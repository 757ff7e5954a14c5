//! Participant data for the stake-feedback study.
//!
//! - [`factor`]: categorical variables (treatment arm, PGSI risk category, setting)
//!   and their ordered level sets
//! - [`observation`]: the per-participant record and CSV-backed [`Dataset`]
//! - [`simulate`]: seeded synthetic dataset generation
//! - [`cohort`]: partitioning a dataset into the at-risk and no-risk analysis subsets

pub use self::{
    cohort::{AnalysisSubset, CohortKind, ParseCohortError, SplitError},
    factor::{FactorLevel, LevelError, Levels, RiskCategory, Setting, TreatmentArm},
    observation::{DataError, Dataset, Observation},
    simulate::{SimulationError, SimulationParams, Simulator},
};

pub mod cohort;
pub mod factor;
pub mod observation;
pub mod simulate;
