//! Read-side use-case services.
//!
//! # Responsibility
//! - Translate normalized repository rows into consumer-facing shapes.
//! - Keep transport wrappers decoupled from storage details.

pub mod read_service;

pub use read_service::{
    CaseInfo, KeyInfo, KeyMetadata, ObservationPoint, ReadService, RealizationTable, TableRow,
};
