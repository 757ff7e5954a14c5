//! Linear mixed-effects modelling of post-intervention stakes.
//!
//! The model for each cohort is a random-intercept LMM with `setting` as the
//! grouping factor, fitted by REML:
//!
//! ```text
//! at-risk: post_stake ~ treatment * risk + pre_stake + (1 | setting)
//! no-risk: post_stake ~ treatment + pre_stake + (1 | setting)
//! ```
//!
//! # Modules
//!
//! - [`formula`]: model specifications per cohort, optionally with a transformed covariate
//! - [`design`]: treatment-coded design matrices and design rows for arbitrary cells
//! - [`lmm`]: REML fitting, Satterthwaite degrees of freedom, conditional modes
//! - [`inference`]: estimates of linear combinations of fixed effects
//! - [`diagnostics`]: assumption checks on a fitted model
//! - [`transform`]: normalising-transform search for a skewed covariate
//!
//! # Example
//!
//! ```
//! use nudge_data::{AnalysisSubset, CohortKind, simulate::{SimulationParams, simulate_seeded}};
//! use nudge_model::{formula::ModelFormula, lmm};
//!
//! let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
//! let subset = AnalysisSubset::split(&dataset, CohortKind::NoRisk).unwrap();
//! let model = lmm::fit(&subset, ModelFormula::for_cohort(CohortKind::NoRisk)).unwrap();
//! assert_eq!(model.coefficients().len(), 3);
//! ```

pub use self::{
    design::{Design, DesignError, Term},
    diagnostics::{AssumptionCheck, CheckOutcome, DiagnosticReport, diagnose},
    formula::{FixedEffects, ModelFormula},
    inference::{ConfidenceInterval, LinearEstimate},
    lmm::{Coefficient, FitError, FittedModel, ModelSummary, fit},
    transform::{Transform, TransformError, TransformSelection, select_transform},
};

pub mod design;
pub mod diagnostics;
pub mod formula;
pub mod inference;
pub mod lmm;
pub mod transform;
