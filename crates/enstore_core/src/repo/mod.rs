//! Repository layer contracts and SQLite persistence.
//!
//! # Responsibility
//! - Expose natural-key oriented get/add operations over the experiment
//!   schema; callers never pass surrogate ids except resolved observation
//!   links.
//! - Stage writes in a transaction that callers commit or roll back.
//! - Translate storage failures into semantic errors (`DuplicateKey`,
//!   `NotFound`, `LengthMismatch`, `Integrity`, `Closed`).
//!
//! # Invariants
//! - A duplicate insert is never coerced into an update.
//! - Length checks run before any SQL mutation, so a rejected entity leaves
//!   no partial row.

pub mod error;
pub mod experiment_repo;
mod rows;
pub mod sqlite_repo;

pub use error::{EntityKind, RepoError, RepoResult};
pub use experiment_repo::{ExperimentRepository, ObservationLinkPolicy, RepositoryOptions};
pub use sqlite_repo::SqliteExperimentRepository;
