//! Simulation facade boundary.
//!
//! # Responsibility
//! - Define the read-only contract the extraction pipeline consumes from a
//!   simulation run: key enumeration and tabular gather operations.
//! - Define the tabular shapes handed across that boundary.
//!
//! # Invariants
//! - Sources are passed explicitly to every pipeline entry point; there is
//!   no process-wide "current" source.
//! - Parameter keys are formatted `group:name`.

use crate::model::axis::AxisLabel;
use crate::model::ensemble::RealizationIndex;
use crate::model::key::InvalidKeyError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory;

pub use memory::InMemorySource;

pub type SourceResult<T> = Result<T, SourceError>;

/// Failure reported by a simulation source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Source does not know the requested key (or ensemble).
    KeyNotFound(String),
    /// Gathering data for a known key failed.
    Gather { key: String, message: String },
    /// Enumerated key is malformed.
    InvalidKey(InvalidKeyError),
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyNotFound(key) => write!(f, "simulation source has no key `{key}`"),
            Self::Gather { key, message } => write!(f, "failed to gather `{key}`: {message}"),
            Self::InvalidKey(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidKey(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InvalidKeyError> for SourceError {
    fn from(value: InvalidKeyError) -> Self {
        Self::InvalidKey(value)
    }
}

/// Measured points of one observation, in parallel sequences.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservationData {
    pub key_indexes: Vec<AxisLabel>,
    pub data_indexes: Vec<AxisLabel>,
    pub values: Vec<f64>,
    pub stds: Vec<f64>,
    /// Per-point activity mask; points without an entry count as active.
    pub active: Vec<bool>,
}

impl ObservationData {
    pub fn new(
        key_indexes: Vec<AxisLabel>,
        data_indexes: Vec<AxisLabel>,
        values: Vec<f64>,
        stds: Vec<f64>,
    ) -> Self {
        Self {
            key_indexes,
            data_indexes,
            values,
            stds,
            active: Vec::new(),
        }
    }

    /// Replaces the activity mask.
    pub fn with_active(mut self, active: Vec<bool>) -> Self {
        self.active = active;
        self
    }

    /// Drops deactivated points from every sequence.
    ///
    /// Sequences are filtered independently by position, so a length
    /// mismatch in the source survives and is rejected by the repository.
    pub fn retain_active(self) -> Self {
        let active = self.active;
        let is_active = |position: usize| active.get(position).copied().unwrap_or(true);
        Self {
            key_indexes: keep_positions(self.key_indexes, is_active),
            data_indexes: keep_positions(self.data_indexes, is_active),
            values: keep_positions(self.values, is_active),
            stds: keep_positions(self.stds, is_active),
            active: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn keep_positions<T>(items: Vec<T>, keep: impl Fn(usize) -> bool) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter(|(position, _)| keep(*position))
        .map(|(_, item)| item)
        .collect()
}

/// Scalar value per realization for one parameter key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterTable {
    pub rows: Vec<(RealizationIndex, f64)>,
}

impl ParameterTable {
    pub fn new(rows: Vec<(RealizationIndex, f64)>) -> Self {
        Self { rows }
    }
}

/// Wide response table: one shared axis, one value column per realization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseTable {
    pub indexes: Vec<AxisLabel>,
    pub realizations: Vec<(RealizationIndex, Vec<f64>)>,
}

impl ResponseTable {
    pub fn new(indexes: Vec<AxisLabel>) -> Self {
        Self {
            indexes,
            realizations: Vec::new(),
        }
    }

    /// Appends one realization's series.
    pub fn with_realization(mut self, index: RealizationIndex, values: Vec<f64>) -> Self {
        self.realizations.push((index, values));
        self
    }
}

/// Read-only view of one simulation run.
pub trait SimulationSource {
    fn list_observation_keys(&self) -> SourceResult<Vec<String>>;
    /// Calibratable parameter keys, each formatted `group:name`.
    fn list_parameter_keys(&self) -> SourceResult<Vec<String>>;
    /// Response keys across all response families.
    fn list_response_keys(&self) -> SourceResult<Vec<String>>;
    fn gather_observation(&self, key: &str) -> SourceResult<ObservationData>;
    fn gather_parameter(&self, ensemble: &str, key: &str) -> SourceResult<ParameterTable>;
    fn gather_response(&self, ensemble: &str, key: &str) -> SourceResult<ResponseTable>;
    /// Observation key scored against `response_key`, if any.
    fn observation_key_for_response(&self, response_key: &str) -> SourceResult<Option<String>>;
}
