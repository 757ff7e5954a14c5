//! Per-cohort analysis state: the subset, its model specification and,
//! once fitted, the model every report is computed from.

use nudge_data::{AnalysisSubset, CohortKind};
use nudge_model::{
    DesignError, DiagnosticReport, FitError, FittedModel, ModelFormula, TransformError,
    TransformSelection, diagnose, fit, select_transform,
};

use crate::{
    coefficients::{CoefficientRow, coefficient_table},
    contrasts::{ContrastTable, contrasts},
    emmeans::{MarginalMean, marginal_means},
    equivalence::{EquivalenceError, EquivalenceResult, Sesoi, tost},
    prediction::{
        CrossCheckError, PredictionAggregate, PredictionRow, aggregate_predictions, cross_check,
        prediction_grid,
    },
};

/// Name of the coefficient tested for equivalence.
pub const TREATMENT_EFFECT: &str = "treatmentFeedback";

#[derive(
    Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, derive_more::IsVariant,
)]
pub enum AnalysisError {
    #[display("no model has been fitted for the {cohort} cohort")]
    ModelNotFitted { cohort: CohortKind },
    #[display("failed to fit the {cohort} model: {source}")]
    Fit { cohort: CohortKind, source: FitError },
    #[display("{cohort} reference grid: {source}")]
    Design {
        cohort: CohortKind,
        source: DesignError,
    },
    #[display("equivalence testing applies to the no-risk cohort, not {cohort}")]
    EquivalenceCohort { cohort: CohortKind },
    #[display("model of the {cohort} cohort has no {term} coefficient")]
    MissingTerm { cohort: CohortKind, term: String },
    #[display("equivalence test failed: {source}")]
    Equivalence { source: EquivalenceError },
    #[display("{cohort} cross-check failed: {source}")]
    CrossCheck {
        cohort: CohortKind,
        source: CrossCheckError,
    },
    #[display("transform search on the {cohort} covariate failed: {source}")]
    Transform {
        cohort: CohortKind,
        source: TransformError,
    },
}

/// Grid predictions with their aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    pub rows: Vec<PredictionRow>,
    pub aggregates: Vec<PredictionAggregate>,
}

#[derive(Debug, Clone)]
pub struct CohortAnalysis {
    subset: AnalysisSubset,
    formula: ModelFormula,
    model: Option<FittedModel>,
}

impl CohortAnalysis {
    /// An unfitted analysis using the default specification of the subset's cohort.
    #[must_use]
    pub fn new(subset: AnalysisSubset) -> Self {
        let formula = ModelFormula::for_cohort(subset.kind());
        Self {
            subset,
            formula,
            model: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> CohortKind {
        self.subset.kind()
    }

    #[must_use]
    pub fn subset(&self) -> &AnalysisSubset {
        &self.subset
    }

    #[must_use]
    pub fn formula(&self) -> &ModelFormula {
        &self.formula
    }

    /// Fits (or re-fits) the model and stores it.
    pub fn fit(&mut self) -> Result<&FittedModel, AnalysisError> {
        let cohort = self.kind();
        let model = fit(&self.subset, self.formula)
            .map_err(|source| AnalysisError::Fit { cohort, source })?;
        Ok(self.model.insert(model))
    }

    pub fn model(&self) -> Result<&FittedModel, AnalysisError> {
        self.model
            .as_ref()
            .ok_or(AnalysisError::ModelNotFitted { cohort: self.kind() })
    }

    fn design_error(&self) -> impl Fn(DesignError) -> AnalysisError {
        let cohort = self.kind();
        move |source| AnalysisError::Design { cohort, source }
    }

    pub fn coefficients(
        &self,
        confidence_level: f64,
    ) -> Result<Vec<CoefficientRow>, AnalysisError> {
        Ok(coefficient_table(self.model()?, confidence_level))
    }

    pub fn marginal_means(
        &self,
        confidence_level: f64,
    ) -> Result<Vec<MarginalMean>, AnalysisError> {
        marginal_means(self.model()?, confidence_level).map_err(self.design_error())
    }

    pub fn contrasts(&self, confidence_level: f64) -> Result<ContrastTable, AnalysisError> {
        contrasts(self.model()?, confidence_level).map_err(self.design_error())
    }

    pub fn diagnostics(&self) -> Result<DiagnosticReport, AnalysisError> {
        Ok(diagnose(self.model()?))
    }

    pub fn predictions(&self, confidence_level: f64) -> Result<Predictions, AnalysisError> {
        let rows = prediction_grid(self.model()?, confidence_level).map_err(self.design_error())?;
        let aggregates = aggregate_predictions(&rows);
        Ok(Predictions { rows, aggregates })
    }

    /// Recomputes the marginal means through the prediction grid and compares.
    pub fn verify_predictions(
        &self,
        confidence_level: f64,
        tolerance: f64,
    ) -> Result<Predictions, AnalysisError> {
        let means = self.marginal_means(confidence_level)?;
        let predictions = self.predictions(confidence_level)?;
        cross_check(&means, &predictions.aggregates, tolerance).map_err(|source| {
            AnalysisError::CrossCheck {
                cohort: self.kind(),
                source,
            }
        })?;
        Ok(predictions)
    }

    /// TOST on the treatment coefficient of the no-risk model.
    pub fn equivalence(
        &self,
        sesoi: Sesoi,
        alpha: f64,
    ) -> Result<EquivalenceResult, AnalysisError> {
        let cohort = self.kind();
        if cohort != CohortKind::NoRisk {
            return Err(AnalysisError::EquivalenceCohort { cohort });
        }
        let model = self.model()?;
        let column = model
            .design()
            .column_index(TREATMENT_EFFECT)
            .ok_or_else(|| AnalysisError::MissingTerm {
                cohort,
                term: TREATMENT_EFFECT.to_owned(),
            })?;
        let l = ndarray::Array1::from_shape_fn(model.n_parameters(), |k| {
            if k == column { 1.0 } else { 0.0 }
        });
        tost(TREATMENT_EFFECT, &model.estimate(&l), sesoi, alpha)
            .map_err(|source| AnalysisError::Equivalence { source })
    }

    /// Searches for a normalising transform of the raw covariate. Advisory only.
    pub fn suggest_transform(&self) -> Result<TransformSelection, AnalysisError> {
        let raw = self
            .subset
            .observations()
            .iter()
            .map(|obs| obs.pre_stake)
            .collect::<Vec<_>>();
        select_transform(&raw).map_err(|source| AnalysisError::Transform {
            cohort: self.kind(),
            source,
        })
    }

    /// Replaces the fitted model by one re-specified with `selection`.
    pub fn respecify(
        &mut self,
        selection: &TransformSelection,
    ) -> Result<&FittedModel, AnalysisError> {
        let cohort = self.kind();
        let model = self
            .model
            .take()
            .ok_or(AnalysisError::ModelNotFitted { cohort })?;
        let refit = model
            .respecify(selection)
            .map_err(|source| AnalysisError::Fit { cohort, source })?;
        self.formula = *refit.formula();
        Ok(self.model.insert(refit))
    }
}

#[cfg(test)]
mod tests {
    use nudge_data::simulate::{SimulationParams, simulate_seeded};

    use super::*;

    fn analysis(kind: CohortKind) -> CohortAnalysis {
        let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
        CohortAnalysis::new(AnalysisSubset::split(&dataset, kind).unwrap())
    }

    #[test]
    fn test_reports_require_fitted_model() {
        let analysis = analysis(CohortKind::NoRisk);
        let expected = AnalysisError::ModelNotFitted {
            cohort: CohortKind::NoRisk,
        };
        assert_eq!(analysis.coefficients(0.95).unwrap_err(), expected);
        assert_eq!(analysis.marginal_means(0.95).unwrap_err(), expected);
        assert_eq!(analysis.contrasts(0.95).unwrap_err(), expected);
        assert_eq!(analysis.diagnostics().unwrap_err(), expected);
        assert_eq!(analysis.predictions(0.95).unwrap_err(), expected);
        assert_eq!(
            analysis
                .equivalence(Sesoi::symmetric(5.0), 0.1)
                .unwrap_err(),
            expected
        );
    }

    #[test]
    fn test_equivalence_only_for_no_risk() {
        let mut at_risk = analysis(CohortKind::AtRisk);
        at_risk.fit().unwrap();
        assert!(
            at_risk
                .equivalence(Sesoi::symmetric(5.0), 0.1)
                .unwrap_err()
                .is_equivalence_cohort()
        );

        let mut no_risk = analysis(CohortKind::NoRisk);
        no_risk.fit().unwrap();
        let result = no_risk.equivalence(Sesoi::symmetric(5.0), 0.1).unwrap();
        assert_eq!(result.effect, TREATMENT_EFFECT);
        // simulated no-risk feedback changes stakes by one percent
        assert!(result.equivalent, "{result:?}");
    }

    #[test]
    fn test_respecify_replaces_model() {
        let mut analysis = analysis(CohortKind::AtRisk);
        let early = analysis.suggest_transform().unwrap();
        assert!(analysis.respecify(&early).unwrap_err().is_model_not_fitted());
        analysis.fit().unwrap();
        let selection = analysis.suggest_transform().unwrap();
        let model = analysis.respecify(&selection).unwrap();
        assert_eq!(
            model.formula().covariate_transform,
            (!selection.transform.is_identity()).then_some(selection.transform)
        );
        assert_eq!(analysis.formula().covariate_transform, model_transform(&analysis));
        analysis.verify_predictions(0.95, 1e-6).unwrap();
    }

    fn model_transform(analysis: &CohortAnalysis) -> Option<nudge_model::Transform> {
        analysis.model().unwrap().formula().covariate_transform
    }
}
