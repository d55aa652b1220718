//! Response series and their shared per-ensemble definitions.
//!
//! # Invariants
//! - `(ResponseDefinition::name, ensemble_id)` and
//!   `(Response::name, realization_id)` are unique.
//! - `Response::values` aligns 1:1 with `Response::indexes`, and with the
//!   definition's `indexes` when a definition exists for the name.
//! - `observation_id` is resolved once at insert time and never relinked.

use crate::model::axis::AxisLabel;
use crate::model::ensemble::{EnsembleId, RealizationId};
use crate::model::observation::ObservationId;
use serde::{Deserialize, Serialize};

pub type ResponseDefinitionId = i64;
pub type ResponseId = i64;

/// Shape and identity of a response series across one ensemble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDefinition {
    pub id: ResponseDefinitionId,
    pub name: String,
    pub indexes: Vec<AxisLabel>,
    pub ensemble_id: EnsembleId,
    pub observation_id: Option<ObservationId>,
}

/// Simulated output series of one realization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: ResponseId,
    pub name: String,
    pub values: Vec<f64>,
    pub indexes: Vec<AxisLabel>,
    pub realization_id: RealizationId,
    pub observation_id: Option<ObservationId>,
}
