//! Ensemble and realization records.
//!
//! # Invariants
//! - `Ensemble::name` is globally unique.
//! - `(Realization::index, Realization::ensemble_id)` is unique.

use serde::{Deserialize, Serialize};

pub type EnsembleId = i64;
pub type RealizationId = i64;

/// Member number of one realization inside its ensemble.
pub type RealizationIndex = i64;

/// Named collection of realizations from one experiment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ensemble {
    pub id: EnsembleId,
    pub name: String,
}

/// One indexed member (sample) of an ensemble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Realization {
    pub id: RealizationId,
    pub index: RealizationIndex,
    pub ensemble_id: EnsembleId,
}
