//! Ensemble experiment store.
//! Normalized storage for ensembles, realizations, parameters, responses and
//! observations, plus the extraction pipeline and read facade around it.

pub mod db;
pub mod extraction;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod source;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use extraction::{
    extract_all, ExtractionError, ExtractionOptions, ExtractionReport, RerunPolicy, StepReport,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::axis::AxisLabel;
pub use model::key::{KeyKind, ParameterKey};
pub use repo::{
    EntityKind, ExperimentRepository, ObservationLinkPolicy, RepoError, RepoResult,
    RepositoryOptions, SqliteExperimentRepository,
};
pub use service::ReadService;
pub use source::{InMemorySource, SimulationSource, SourceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
