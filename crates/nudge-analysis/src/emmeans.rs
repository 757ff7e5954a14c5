//! Estimated marginal means.
//!
//! The reference grid holds every treatment × risk cell of the model with the
//! covariate at its mean (on the model scale) and the random effect at zero.
//! Each cell mean is `x_cell'β`; the aggregate `All` row of an arm is the
//! equally weighted average of its cell rows, so its design row is the
//! average of theirs.

use std::{fmt, str::FromStr};

use ndarray::Array1;
use nudge_data::{FactorLevel as _, LevelError, RiskCategory, TreatmentArm};
use nudge_model::{DesignError, FittedModel};
use nudge_stats::descriptive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Risk column of result tables: one category, or `All` categories of the cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RiskLabel {
    All,
    Category(RiskCategory),
}

impl RiskLabel {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Category(risk) => risk.label(),
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

impl FromStr for RiskLabel {
    type Err = LevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "All" {
            return Ok(Self::All);
        }
        s.parse().map(Self::Category)
    }
}

impl Serialize for RiskLabel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for RiskLabel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginalMean {
    pub treatment: TreatmentArm,
    pub risk: RiskLabel,
    pub estimate: f64,
    pub std_error: f64,
    pub df: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Design rows of the reference grid, keyed by treatment and risk label.
///
/// Cells come first (treatment-major, in level order), followed by one `All`
/// row per arm. With a single risk level the `All` row repeats its cell.
pub fn reference_grid(
    model: &FittedModel,
) -> Result<Vec<(TreatmentArm, RiskLabel, Array1<f64>)>, DesignError> {
    let design = model.design();
    let covariate = descriptive::mean(&model.covariate_values()).unwrap_or(f64::NAN);
    let risks = design.risk_levels().as_slice();

    let mut grid = Vec::new();
    for treatment in design.treatment_levels().iter() {
        for &risk in risks {
            let row = design.row(treatment, risk, covariate)?;
            grid.push((treatment, RiskLabel::Category(risk), row));
        }
    }
    let cells = grid.len();
    for treatment in design.treatment_levels().iter() {
        let rows = grid[..cells]
            .iter()
            .filter(|(t, _, _)| *t == treatment)
            .map(|(_, _, row)| row);
        let average = average_rows(rows, design.len());
        grid.push((treatment, RiskLabel::All, average));
    }
    Ok(grid)
}

pub(crate) fn average_rows<'a, I>(rows: I, width: usize) -> Array1<f64>
where
    I: IntoIterator<Item = &'a Array1<f64>>,
{
    let mut sum = Array1::zeros(width);
    let mut count = 0_u32;
    for row in rows {
        sum += row;
        count += 1;
    }
    sum / f64::from(count.max(1))
}

/// Marginal-means table of `model` with intervals at `confidence_level`.
pub fn marginal_means(
    model: &FittedModel,
    confidence_level: f64,
) -> Result<Vec<MarginalMean>, DesignError> {
    let table = reference_grid(model)?
        .into_iter()
        .map(|(treatment, risk, row)| {
            let est = model.estimate(&row);
            let ci = est.confidence_interval(confidence_level);
            MarginalMean {
                treatment,
                risk,
                estimate: est.estimate,
                std_error: est.std_error,
                df: est.df,
                ci_lower: ci.lower,
                ci_upper: ci.upper,
            }
        })
        .collect();
    Ok(table)
}

/// Looks up the row of one arm and risk label.
#[must_use]
pub fn find_mean(
    table: &[MarginalMean],
    treatment: TreatmentArm,
    risk: RiskLabel,
) -> Option<&MarginalMean> {
    table.iter().find(|m| m.treatment == treatment && m.risk == risk)
}
