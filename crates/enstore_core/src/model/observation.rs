//! Observation (ground truth) records.
//!
//! # Invariants
//! - `name` is globally unique.
//! - `key_indexes`, `data_indexes`, `values` and `stds` have equal length;
//!   element `i` of each sequence describes the same data point.

use crate::model::axis::AxisLabel;
use serde::{Deserialize, Serialize};

pub type ObservationId = i64;

/// Reference data used to score simulated responses.
///
/// Independent of any ensemble and read-only once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    pub name: String,
    /// Response-series position each data point belongs to.
    pub key_indexes: Vec<AxisLabel>,
    /// Axis position of each data point.
    pub data_indexes: Vec<AxisLabel>,
    pub values: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Observation {
    /// Number of data points.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
