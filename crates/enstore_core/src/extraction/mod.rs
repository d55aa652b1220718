//! Batch extraction from a simulation source into the experiment repository.
//!
//! # Responsibility
//! - Pull observations, parameters and responses through a
//!   `SimulationSource` and materialize them as normalized rows.
//! - Link each response to its observation once, at ingestion time.
//!
//! # Invariants
//! - Observations are extracted before responses.
//! - Each step is its own commit boundary; a failing step rolls back only
//!   its own writes.
//! - A gather failure aborts the run; steps committed earlier remain.
//! - Re-running against an unchanged source converges to the same rows
//!   under `RerunPolicy::SkipExisting`.

use crate::model::ensemble::{Ensemble, RealizationIndex};
use crate::repo::{ExperimentRepository, RepoError};
use crate::source::{SimulationSource, SourceError};
use log::{error, info};
use serde::Serialize;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};
use uuid::Uuid;

mod observations;
mod parameters;
mod responses;

pub use observations::extract_observations;
pub use parameters::extract_parameters;
pub use responses::extract_responses;

/// What a step does with rows that already exist for the natural key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RerunPolicy {
    /// Check before insert and skip existing rows.
    #[default]
    SkipExisting,
    /// Insert unconditionally; existing rows fail the step with `DuplicateKey`.
    FailOnExisting,
}

/// Pipeline behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionOptions {
    pub rerun: RerunPolicy,
    /// Drop observation points the source marks inactive.
    pub drop_inactive_observations: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            rerun: RerunPolicy::SkipExisting,
            drop_inactive_observations: true,
        }
    }
}

/// Error raised by an extraction run.
#[derive(Debug)]
pub enum ExtractionError {
    Source(SourceError),
    Repo(RepoError),
    /// A row an earlier step created could not be found.
    InvariantViolation(String),
}

impl Display for ExtractionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(err) => write!(f, "simulation source error: {err}"),
            Self::Repo(err) => write!(f, "repository error: {err}"),
            Self::InvariantViolation(message) => {
                write!(f, "extraction invariant violated: {message}")
            }
        }
    }
}

impl Error for ExtractionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::InvariantViolation(_) => None,
        }
    }
}

impl From<SourceError> for ExtractionError {
    fn from(value: SourceError) -> Self {
        Self::Source(value)
    }
}

impl From<RepoError> for ExtractionError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Extraction step identity, used in reports and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStep {
    Observations,
    Parameters,
    Responses,
}

impl ExtractionStep {
    fn event(self) -> &'static str {
        match self {
            Self::Observations => "extract_observations",
            Self::Parameters => "extract_parameters",
            Self::Responses => "extract_responses",
        }
    }
}

/// Row counts of one committed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: ExtractionStep,
    pub inserted: usize,
    pub skipped: usize,
}

impl StepReport {
    fn new(step: ExtractionStep) -> Self {
        Self {
            step,
            inserted: 0,
            skipped: 0,
        }
    }
}

/// Summary of one full extraction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    pub run_id: Uuid,
    pub ensemble: String,
    pub observations: StepReport,
    pub parameters: StepReport,
    pub responses: StepReport,
    pub duration: Duration,
}

/// Runs observation, parameter and response extraction for one ensemble.
///
/// Fails fast: the first failing step aborts the run. Steps committed before
/// the failure stay committed.
pub fn extract_all<S, R>(
    source: &S,
    repo: &R,
    ensemble_name: &str,
    options: &ExtractionOptions,
) -> Result<ExtractionReport, ExtractionError>
where
    S: SimulationSource,
    R: ExperimentRepository,
{
    let run_id = Uuid::new_v4();
    let started_at = Instant::now();
    info!(
        "event=extract_all module=extraction status=start run_id={run_id} ensemble={ensemble_name}"
    );

    let result = (|| {
        let observations = extract_observations(source, repo, options)?;
        let parameters = extract_parameters(source, repo, ensemble_name, options)?;
        let responses = extract_responses(source, repo, ensemble_name, options)?;
        Ok::<_, ExtractionError>((observations, parameters, responses))
    })();

    match result {
        Ok((observations, parameters, responses)) => {
            let duration = started_at.elapsed();
            info!(
                "event=extract_all module=extraction status=ok run_id={run_id} ensemble={ensemble_name} duration_ms={}",
                duration.as_millis()
            );
            Ok(ExtractionReport {
                run_id,
                ensemble: ensemble_name.to_string(),
                observations,
                parameters,
                responses,
                duration,
            })
        }
        Err(err) => {
            error!(
                "event=extract_all module=extraction status=error run_id={run_id} ensemble={ensemble_name} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            Err(err)
        }
    }
}

/// Runs `body` as one transactional step with start/ok/error log events.
fn run_step<R, F>(
    repo: &R,
    step: ExtractionStep,
    body: F,
) -> Result<StepReport, ExtractionError>
where
    R: ExperimentRepository,
    F: FnOnce(&R, &mut StepReport) -> Result<(), ExtractionError>,
{
    let started_at = Instant::now();
    let event = step.event();
    info!("event={event} module=extraction status=start");

    let mut report = StepReport::new(step);
    match repo.in_transaction(|repo| body(repo, &mut report)) {
        Ok(()) => {
            info!(
                "event={event} module=extraction status=ok inserted={} skipped={} duration_ms={}",
                report.inserted,
                report.skipped,
                started_at.elapsed().as_millis()
            );
            Ok(report)
        }
        Err(err) => {
            error!(
                "event={event} module=extraction status=error duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            Err(err)
        }
    }
}

/// Returns the ensemble, creating it on first sight.
fn ensure_ensemble<R: ExperimentRepository>(
    repo: &R,
    ensemble_name: &str,
) -> Result<Ensemble, ExtractionError> {
    match repo.get_ensemble(ensemble_name)? {
        Some(ensemble) => Ok(ensemble),
        None => Ok(repo.add_ensemble(ensemble_name)?),
    }
}

/// Realizations known to exist within one step.
struct RealizationTracker<'a> {
    ensemble_name: &'a str,
    known: HashSet<RealizationIndex>,
}

impl<'a> RealizationTracker<'a> {
    fn new(ensemble: &'a Ensemble) -> Self {
        Self {
            ensemble_name: &ensemble.name,
            known: HashSet::new(),
        }
    }

    /// Creates the realization on first sight, looks it up thereafter.
    fn ensure<R: ExperimentRepository>(
        &mut self,
        repo: &R,
        index: RealizationIndex,
    ) -> Result<(), ExtractionError> {
        if self.known.contains(&index) {
            return Ok(());
        }
        if repo.get_realization(index, self.ensemble_name)?.is_none() {
            repo.add_realization(index, self.ensemble_name)
                .map_err(invariant_violation)?;
        }
        self.known.insert(index);
        Ok(())
    }
}

/// Treats `NotFound` for rows created earlier in the run as fatal.
fn invariant_violation(err: RepoError) -> ExtractionError {
    match err {
        RepoError::NotFound { entity, key } => {
            ExtractionError::InvariantViolation(format!("{entity} `{key}` vanished mid-run"))
        }
        other => ExtractionError::Repo(other),
    }
}
