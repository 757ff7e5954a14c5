//! Inference and reporting for the stake-feedback study
//!
//! This crate turns fitted mixed models into the tables the study reports and
//! runs the whole batch pipeline.
//!
//! # Overview
//!
//! 1. **Split** the dataset into the at-risk and no-risk cohorts
//! 2. **Fit** one random-intercept model per cohort ([`cohort::CohortAnalysis`])
//! 3. **Diagnose** the model assumptions
//! 4. **Summarise**: coefficient table ([`coefficients`]), estimated marginal
//!    means ([`emmeans`]) and treatment contrasts ([`contrasts`])
//! 5. **Cross-check** the marginal means against full-grid predictions
//!    ([`prediction`])
//! 6. **Test equivalence** of the no-risk feedback effect against the
//!    smallest effect size of interest ([`equivalence`])
//!
//! [`pipeline::run`] performs all of the above and returns an
//! [`AnalysisReport`](pipeline::AnalysisReport).
//!
//! # Example
//!
//! ```no_run
//! use nudge_analysis::{config::AnalysisConfig, emmeans::RiskLabel, pipeline};
//! use nudge_data::{CohortKind, TreatmentArm};
//!
//! let config = AnalysisConfig::default();
//! let dataset = pipeline::simulate_dataset(&config)?;
//! let report = pipeline::run(&config, &dataset)?;
//!
//! let feedback = report
//!     .marginal_mean(CohortKind::AtRisk, TreatmentArm::Feedback, RiskLabel::All)
//!     .unwrap();
//! println!("All / Feedback: {:.2}", feedback.estimate);
//! println!("no-risk effect equivalent to zero: {}", report.equivalence.equivalent);
//! # Ok::<(), nudge_analysis::pipeline::PipelineError>(())
//! ```

pub mod coefficients;
pub mod cohort;
pub mod config;
pub mod contrasts;
pub mod emmeans;
pub mod equivalence;
pub mod pipeline;
pub mod prediction;
