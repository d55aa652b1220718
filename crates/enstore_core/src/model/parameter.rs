//! Scalar calibratable input sampled for one realization.

use crate::model::ensemble::RealizationId;
use serde::{Deserialize, Serialize};

pub type ParameterId = i64;

/// `(name, group, realization_id)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: ParameterId,
    pub name: String,
    pub group: String,
    pub value: f64,
    pub realization_id: RealizationId,
}
