//! Treatment-coded fixed-effects design matrices.
//!
//! Columns follow the usual model-matrix order: intercept, main effects,
//! covariate, then interactions. Each non-reference level of a factor gets an
//! indicator column named `<factor><level>`, e.g. `riskModerate risk`.

use ndarray::{Array1, Array2};
use nudge_data::{AnalysisSubset, FactorLevel, Levels, Observation, RiskCategory, TreatmentArm};
use serde::{Deserialize, Serialize};

use crate::formula::{FixedEffects, ModelFormula};

/// Model term a design column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Intercept,
    Treatment,
    Risk,
    Covariate,
    TreatmentRisk,
}

impl Term {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Intercept => "(Intercept)",
            Self::Treatment => "treatment",
            Self::Risk => "risk",
            Self::Covariate => "pre_stake",
            Self::TreatmentRisk => "treatment:risk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub term: Term,
    pub name: String,
    kind: ColumnKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum ColumnKind {
    Intercept,
    Treatment(TreatmentArm),
    Risk(RiskCategory),
    Covariate,
    Interaction(TreatmentArm, RiskCategory),
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum DesignError {
    #[display("{factor} level '{level}' is not part of the model")]
    UnknownLevel { factor: &'static str, level: String },
}

/// Column layout of a fitted model, able to build rows for arbitrary cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    formula: ModelFormula,
    treatment_levels: Levels<TreatmentArm>,
    risk_levels: Levels<RiskCategory>,
    columns: Vec<Column>,
}

impl Design {
    #[must_use]
    pub fn new(subset: &AnalysisSubset, formula: ModelFormula) -> Self {
        let treatment_levels = subset.treatment_levels().clone();
        let risk_levels = subset.risk_levels().clone();

        let mut columns = vec![Column {
            term: Term::Intercept,
            name: Term::Intercept.label().to_owned(),
            kind: ColumnKind::Intercept,
        }];
        columns.extend(treatment_levels.non_reference().map(|t| Column {
            term: Term::Treatment,
            name: indicator_name(t),
            kind: ColumnKind::Treatment(t),
        }));
        let with_risk = formula.fixed == FixedEffects::TreatmentByRisk;
        if with_risk {
            columns.extend(risk_levels.non_reference().map(|r| Column {
                term: Term::Risk,
                name: indicator_name(r),
                kind: ColumnKind::Risk(r),
            }));
        }
        columns.push(Column {
            term: Term::Covariate,
            name: formula.covariate_term(),
            kind: ColumnKind::Covariate,
        });
        if with_risk {
            for t in treatment_levels.non_reference() {
                columns.extend(risk_levels.non_reference().map(|r| Column {
                    term: Term::TreatmentRisk,
                    name: format!("{}:{}", indicator_name(t), indicator_name(r)),
                    kind: ColumnKind::Interaction(t, r),
                }));
            }
        }

        Self {
            formula,
            treatment_levels,
            risk_levels,
            columns,
        }
    }

    #[must_use]
    pub fn formula(&self) -> &ModelFormula {
        &self.formula
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn treatment_levels(&self) -> &Levels<TreatmentArm> {
        &self.treatment_levels
    }

    #[must_use]
    pub fn risk_levels(&self) -> &Levels<RiskCategory> {
        &self.risk_levels
    }

    /// Distinct model terms in column order.
    #[must_use]
    pub fn terms(&self) -> Vec<Term> {
        let mut terms = Vec::new();
        for column in &self.columns {
            if !terms.contains(&column.term) {
                terms.push(column.term);
            }
        }
        terms
    }

    /// Indices of the columns belonging to `term`.
    #[must_use]
    pub fn term_columns(&self, term: Term) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.term == term)
            .map(|(i, _)| i)
            .collect()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Design row for one cell; `covariate` is already on the model scale.
    pub fn row(
        &self,
        treatment: TreatmentArm,
        risk: RiskCategory,
        covariate: f64,
    ) -> Result<Array1<f64>, DesignError> {
        check_level(&self.treatment_levels, treatment)?;
        check_level(&self.risk_levels, risk)?;
        Ok(self.row_unchecked(treatment, risk, covariate))
    }

    fn row_unchecked(
        &self,
        treatment: TreatmentArm,
        risk: RiskCategory,
        covariate: f64,
    ) -> Array1<f64> {
        self.columns
            .iter()
            .map(|c| match c.kind {
                ColumnKind::Intercept => 1.0,
                ColumnKind::Treatment(t) => indicator(treatment == t),
                ColumnKind::Risk(r) => indicator(risk == r),
                ColumnKind::Covariate => covariate,
                ColumnKind::Interaction(t, r) => indicator(treatment == t && risk == r),
            })
            .collect()
    }

    /// Design matrix of `observations`, one row each.
    pub fn matrix(&self, observations: &[Observation]) -> Result<Array2<f64>, DesignError> {
        let mut x = Array2::zeros((observations.len(), self.columns.len()));
        for (i, obs) in observations.iter().enumerate() {
            let covariate = self.formula.covariate_value(obs.pre_stake);
            let row = self.row(obs.treatment, obs.risk, covariate)?;
            x.row_mut(i).assign(&row);
        }
        Ok(x)
    }
}

fn indicator(on: bool) -> f64 {
    if on { 1.0 } else { 0.0 }
}

fn indicator_name<T>(level: T) -> String
where
    T: FactorLevel,
{
    format!("{}{}", T::FACTOR, level.label())
}

fn check_level<T>(levels: &Levels<T>, level: T) -> Result<(), DesignError>
where
    T: FactorLevel,
{
    if levels.contains(level) {
        Ok(())
    } else {
        Err(DesignError::UnknownLevel {
            factor: T::FACTOR,
            level: level.label().to_owned(),
        })
    }
}
