//! Treatment contrasts on the marginal-means reference grid.
//!
//! Within each risk label (every category, plus `All` when present) the
//! non-reference arm is compared against the reference arm, e.g.
//! `Feedback - No Feedback`. Interaction contrasts compare that arm
//! difference in each non-reference risk category with the one in the
//! reference category.

use ndarray::Array1;
use nudge_data::{RiskCategory, TreatmentArm};
use nudge_model::{DesignError, FittedModel};
use serde::{Deserialize, Serialize};

use crate::emmeans::{RiskLabel, reference_grid};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContrastRow {
    pub contrast: String,
    pub risk: RiskLabel,
    pub estimate: f64,
    pub std_error: f64,
    pub df: f64,
    pub t_value: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContrastTable {
    pub pairwise: Vec<ContrastRow>,
    pub interactions: Vec<ContrastRow>,
}

impl ContrastTable {
    /// The pairwise arm contrast within `risk`.
    #[must_use]
    pub fn pairwise(&self, risk: RiskLabel) -> Option<&ContrastRow> {
        self.pairwise.iter().find(|c| c.risk == risk)
    }
}

fn contrast_row(
    model: &FittedModel,
    contrast: String,
    risk: RiskLabel,
    l: &Array1<f64>,
    confidence_level: f64,
) -> ContrastRow {
    let est = model.estimate(l);
    let ci = est.confidence_interval(confidence_level);
    ContrastRow {
        contrast,
        risk,
        estimate: est.estimate,
        std_error: est.std_error,
        df: est.df,
        t_value: est.t_value(),
        p_value: est.p_value(),
        ci_lower: ci.lower,
        ci_upper: ci.upper,
    }
}

/// Pairwise and interaction contrasts of `model`.
pub fn contrasts(model: &FittedModel, confidence_level: f64) -> Result<ContrastTable, DesignError> {
    let grid = reference_grid(model)?;
    let design = model.design();
    let reference_arm = design.treatment_levels().reference();
    let row_of = |treatment: TreatmentArm, risk: RiskLabel| {
        grid.iter()
            .find(|(t, r, _)| *t == treatment && *r == risk)
            .map(|(_, _, row)| row)
    };

    let mut labels = design
        .risk_levels()
        .iter()
        .map(RiskLabel::Category)
        .collect::<Vec<_>>();
    if grid.iter().any(|(_, r, _)| *r == RiskLabel::All) {
        labels.push(RiskLabel::All);
    }

    let mut pairwise = Vec::new();
    let mut differences: Vec<(RiskCategory, TreatmentArm, Array1<f64>)> = Vec::new();
    for arm in design.treatment_levels().non_reference() {
        let name = format!("{arm} - {reference_arm}");
        for &risk in &labels {
            let (Some(treated), Some(reference)) = (row_of(arm, risk), row_of(reference_arm, risk))
            else {
                continue;
            };
            let l = treated - reference;
            pairwise.push(contrast_row(model, name.clone(), risk, &l, confidence_level));
            if let RiskLabel::Category(category) = risk {
                differences.push((category, arm, l));
            }
        }
    }

    let reference_risk = design.risk_levels().reference();
    let mut interactions = Vec::new();
    for arm in design.treatment_levels().non_reference() {
        let Some((_, _, base)) = differences
            .iter()
            .find(|(r, a, _)| *r == reference_risk && *a == arm)
        else {
            continue;
        };
        for risk in design.risk_levels().non_reference() {
            let Some((_, _, l)) = differences.iter().find(|(r, a, _)| *r == risk && *a == arm)
            else {
                continue;
            };
            let name = format!("({arm} - {reference_arm}) {risk} - {reference_risk}");
            interactions.push(contrast_row(
                model,
                name,
                RiskLabel::Category(risk),
                &(l - base),
                confidence_level,
            ));
        }
    }

    Ok(ContrastTable {
        pairwise,
        interactions,
    })
}
