use std::{collections::HashSet, io, path::Path};

use serde::{Deserialize, Serialize};

use crate::factor::{RiskCategory, Setting, TreatmentArm};

/// One participant: arm, risk category, setting and stake before/after the
/// intervention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: u32,
    pub treatment: TreatmentArm,
    pub risk: RiskCategory,
    pub pre_stake: f64,
    pub post_stake: f64,
    pub setting: Setting,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum DataError {
    #[display("failed to read dataset from {path}: {source}")]
    Read { path: String, source: csv::Error },
    #[display("failed to write dataset: {source}")]
    Write { source: csv::Error },
    #[display("failed to flush dataset: {source}")]
    Flush { source: io::Error },
    #[display("dataset contains no observations")]
    Empty,
    #[display("participant id {id} appears more than once")]
    DuplicateId { id: u32 },
    #[display("participant {id} has invalid {column} value {value}")]
    InvalidStake {
        id: u32,
        column: &'static str,
        value: f64,
    },
}

/// A validated set of observations with unique ids and finite, non-negative stakes.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    observations: Vec<Observation>,
}

impl Dataset {
    pub fn new(observations: Vec<Observation>) -> Result<Self, DataError> {
        if observations.is_empty() {
            return Err(DataError::Empty);
        }
        let mut seen = HashSet::with_capacity(observations.len());
        for obs in &observations {
            if !seen.insert(obs.id) {
                return Err(DataError::DuplicateId { id: obs.id });
            }
            for (column, value) in [("pre_stake", obs.pre_stake), ("post_stake", obs.post_stake)] {
                if !value.is_finite() || value < 0.0 {
                    return Err(DataError::InvalidStake {
                        id: obs.id,
                        column,
                        value,
                    });
                }
            }
        }
        Ok(Self { observations })
    }

    /// Reads a dataset from a CSV file with columns
    /// `id,treatment,risk,pre_stake,post_stake,setting`.
    pub fn read_csv<P>(path: P) -> Result<Self, DataError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let read_err = |source| DataError::Read {
            path: path.display().to_string(),
            source,
        };
        let mut reader = csv::Reader::from_path(path).map_err(read_err)?;
        let observations = reader
            .deserialize::<Observation>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err)?;
        log::info!(
            "read {} observations from {}",
            observations.len(),
            path.display()
        );
        Self::new(observations)
    }

    /// Reads a dataset from any CSV source, e.g. an in-memory buffer.
    pub fn from_csv_reader<R>(reader: R) -> Result<Self, DataError>
    where
        R: io::Read,
    {
        let mut reader = csv::Reader::from_reader(reader);
        let observations = reader
            .deserialize::<Observation>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| DataError::Read {
                path: "<reader>".to_owned(),
                source,
            })?;
        Self::new(observations)
    }

    /// Writes the dataset as CSV with a header row.
    pub fn write_csv<W>(&self, writer: W) -> Result<(), DataError>
    where
        W: io::Write,
    {
        let mut writer = csv::Writer::from_writer(writer);
        for obs in &self.observations {
            writer
                .serialize(obs)
                .map_err(|source| DataError::Write { source })?;
        }
        writer
            .flush()
            .map_err(|source| DataError::Flush { source })?;
        Ok(())
    }

    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> + '_ {
        self.observations.iter()
    }
}
