//! Normalized entity model for ensemble experiment results.
//!
//! # Responsibility
//! - Define the records persisted by the repository layer.
//! - Define the typed key vocabulary shared by extraction and read paths.
//!
//! # Invariants
//! - Entity ids are store-assigned surrogate keys; callers address entities
//!   by natural keys (names and realization indexes).
//! - Entities are never updated field-by-field after creation.

pub mod axis;
pub mod ensemble;
pub mod key;
pub mod observation;
pub mod parameter;
pub mod response;
