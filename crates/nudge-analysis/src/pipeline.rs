//! End-to-end batch run: split, fit, diagnose, summarise, cross-check and test.

use nudge_data::{
    AnalysisSubset, CohortKind, Dataset, SimulationError, SplitError, TreatmentArm, simulate,
};
use nudge_model::{DiagnosticReport, ModelSummary, Transform, TransformSelection};
use serde::{Deserialize, Serialize};

use crate::{
    cohort::{AnalysisError, CohortAnalysis},
    coefficients::CoefficientRow,
    config::{AnalysisConfig, ConfigError},
    contrasts::ContrastTable,
    emmeans::{MarginalMean, RiskLabel, find_mean},
    equivalence::EquivalenceResult,
    prediction::{PredictionAggregate, PredictionRow},
};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum PipelineError {
    #[display("invalid configuration: {source}")]
    Config { source: ConfigError },
    #[display("simulation failed: {source}")]
    Simulation { source: SimulationError },
    #[display("cohort split failed: {source}")]
    Split { source: SplitError },
    #[display("{source}")]
    Analysis { source: AnalysisError },
}

impl From<AnalysisError> for PipelineError {
    fn from(source: AnalysisError) -> Self {
        Self::Analysis { source }
    }
}

/// Score summary of a transform search, without the transformed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSuggestion {
    pub transform: Transform,
    pub formula_term: String,
    pub pearson_p_per_df: f64,
    pub candidates: Vec<nudge_model::transform::CandidateScore>,
}

impl From<&TransformSelection> for TransformSuggestion {
    fn from(selection: &TransformSelection) -> Self {
        Self {
            transform: selection.transform,
            formula_term: selection.transform.wrap(nudge_model::formula::COVARIATE),
            pearson_p_per_df: selection.pearson_p_per_df,
            candidates: selection.candidates.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortReport {
    pub cohort: CohortKind,
    pub model: ModelSummary,
    pub coefficients: Vec<CoefficientRow>,
    pub marginal_means: Vec<MarginalMean>,
    pub contrasts: ContrastTable,
    pub prediction_aggregates: Vec<PredictionAggregate>,
    #[serde(skip)]
    pub predictions: Vec<PredictionRow>,
    pub diagnostics: DiagnosticReport,
    pub transform_suggestion: Option<TransformSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub config: AnalysisConfig,
    pub observations: usize,
    pub cohorts: Vec<CohortReport>,
    pub equivalence: EquivalenceResult,
}

impl AnalysisReport {
    #[must_use]
    pub fn cohort(&self, kind: CohortKind) -> Option<&CohortReport> {
        self.cohorts.iter().find(|c| c.cohort == kind)
    }

    #[must_use]
    pub fn marginal_mean(
        &self,
        kind: CohortKind,
        treatment: TreatmentArm,
        risk: RiskLabel,
    ) -> Option<&MarginalMean> {
        find_mean(&self.cohort(kind)?.marginal_means, treatment, risk)
    }
}

/// Simulates the dataset described by `config`.
pub fn simulate_dataset(config: &AnalysisConfig) -> Result<Dataset, PipelineError> {
    simulate::simulate_seeded(config.seed, config.simulation)
        .map_err(|source| PipelineError::Simulation { source })
}

/// Runs every analysis step on `dataset`.
pub fn run(config: &AnalysisConfig, dataset: &Dataset) -> Result<AnalysisReport, PipelineError> {
    config
        .validate()
        .map_err(|source| PipelineError::Config { source })?;
    let (at_risk, no_risk) =
        AnalysisSubset::split_all(dataset).map_err(|source| PipelineError::Split { source })?;

    let mut cohorts = Vec::with_capacity(2);
    let mut equivalence = None;
    for subset in [at_risk, no_risk] {
        let mut analysis = CohortAnalysis::new(subset);
        analysis.fit()?;
        log::info!("analysing {} cohort", analysis.kind());
        if analysis.kind() == CohortKind::NoRisk {
            equivalence = Some(analysis.equivalence(config.sesoi, config.equivalence_alpha)?);
        }
        cohorts.push(cohort_report(config, &analysis)?);
    }
    let equivalence = equivalence.ok_or(AnalysisError::ModelNotFitted {
        cohort: CohortKind::NoRisk,
    })?;

    Ok(AnalysisReport {
        config: *config,
        observations: dataset.len(),
        cohorts,
        equivalence,
    })
}

fn cohort_report(
    config: &AnalysisConfig,
    analysis: &CohortAnalysis,
) -> Result<CohortReport, AnalysisError> {
    let level = config.confidence_level;
    let predictions = analysis.verify_predictions(level, config.cross_check_tolerance)?;
    let transform_suggestion = match analysis.suggest_transform() {
        Ok(selection) => Some(TransformSuggestion::from(&selection)),
        Err(err) => {
            log::warn!("{err}");
            None
        }
    };
    Ok(CohortReport {
        cohort: analysis.kind(),
        model: analysis.model()?.summary(),
        coefficients: analysis.coefficients(level)?,
        marginal_means: analysis.marginal_means(level)?,
        contrasts: analysis.contrasts(level)?,
        prediction_aggregates: predictions.aggregates,
        predictions: predictions.rows,
        diagnostics: analysis.diagnostics()?,
        transform_suggestion,
    })
}
