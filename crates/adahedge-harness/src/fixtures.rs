//! Fixture loading and management.

use std::path::Path;

use adahedge_core::{InvalidShape, LossTable};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// Reference outcome of one fixture case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expected {
    /// Full outputs of a successful run.
    Forecast {
        /// `T × K` weight rows.
        weights: Vec<Vec<f64>>,
        /// Incurred loss per step.
        incurred: Vec<f64>,
        /// Final accumulated mixability gap.
        mixability_gap: f64,
    },
    /// The run must be rejected. Only `invalid_shape` is defined.
    Error { error: String },
}

/// A single fixture case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureCase {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Number of experts `K`; kept explicitly so `T = 0` cases retain it.
    pub experts: usize,
    /// Loss rows.
    pub losses: Vec<Vec<f64>>,
    pub expected: Expected,
}

impl FixtureCase {
    /// Build the loss table, checking rows against the declared expert count.
    pub fn loss_table(&self) -> Result<LossTable, InvalidShape> {
        shaped_table(self.experts, &self.losses)
    }
}

fn shaped_table(experts: usize, rows: &[Vec<f64>]) -> Result<LossTable, InvalidShape> {
    if rows.is_empty() {
        return Ok(LossTable::empty(experts));
    }
    let table = LossTable::from_rows(rows)?;
    if table.experts() != experts {
        return Err(InvalidShape::RaggedRow {
            row: 0,
            expected: experts,
            found: table.experts(),
        });
    }
    Ok(table)
}

/// A collection of fixture cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureSet {
    /// Schema version.
    pub version: String,
    pub family: String,
    /// Provenance of the expected values.
    #[serde(default)]
    pub generated_by: String,
    pub cases: Vec<FixtureCase>,
}

impl FixtureSet {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }
}

/// Loss input accepted by the `run` command: bare rows, or rows with an
/// explicit expert count (needed to express an empty horizon).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LossInput {
    Shaped {
        experts: usize,
        losses: Vec<Vec<f64>>,
    },
    Rows(Vec<Vec<f64>>),
}

impl LossInput {
    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn into_table(self) -> Result<LossTable, InvalidShape> {
        match self {
            Self::Rows(rows) => LossTable::from_rows(&rows),
            Self::Shaped { experts, losses } => shaped_table(experts, &losses),
        }
    }
}
