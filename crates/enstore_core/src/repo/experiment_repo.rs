//! Experiment repository contract.
//!
//! # Responsibility
//! - Define the natural-key API consumed by extraction and read services.
//! - Define transaction control shared by every implementation.
//!
//! # Invariants
//! - Writes are staged until `commit()`; `commit()` is all-or-nothing.
//! - After `close()` every operation fails with `RepoError::Closed`.

use crate::model::axis::AxisLabel;
use crate::model::ensemble::{Ensemble, Realization, RealizationIndex};
use crate::model::key::ParameterKey;
use crate::model::observation::{Observation, ObservationId};
use crate::model::parameter::Parameter;
use crate::model::response::{Response, ResponseDefinition};
use crate::repo::error::{RepoError, RepoResult};
use log::warn;

/// How `add_response_definition` treats an unknown observation name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ObservationLinkPolicy {
    /// Missing observation fails with `NotFound`.
    #[default]
    Eager,
    /// Missing observation is logged and the definition is stored unlinked.
    Lenient,
}

/// Behavior switches for repository implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositoryOptions {
    pub observation_link: ObservationLinkPolicy,
}

/// Repository interface for ensemble experiment storage.
pub trait ExperimentRepository {
    /// Fails with `DuplicateKey` if the name exists.
    fn add_ensemble(&self, name: &str) -> RepoResult<Ensemble>;
    fn get_ensemble(&self, name: &str) -> RepoResult<Option<Ensemble>>;
    /// Lists ensembles in creation order.
    fn list_ensembles(&self) -> RepoResult<Vec<Ensemble>>;

    fn add_realization(
        &self,
        index: RealizationIndex,
        ensemble_name: &str,
    ) -> RepoResult<Realization>;
    /// Stages a batch of realizations; on failure none of the batch is staged.
    fn add_realizations(
        &self,
        indexes: &[RealizationIndex],
        ensemble_name: &str,
    ) -> RepoResult<Vec<Realization>>;
    /// Returns `None` when either the ensemble or the realization is absent.
    fn get_realization(
        &self,
        index: RealizationIndex,
        ensemble_name: &str,
    ) -> RepoResult<Option<Realization>>;
    /// Lists realizations ordered by index.
    fn list_realizations(&self, ensemble_name: &str) -> RepoResult<Vec<Realization>>;

    fn add_parameter(
        &self,
        name: &str,
        group: &str,
        value: f64,
        realization_index: RealizationIndex,
        ensemble_name: &str,
    ) -> RepoResult<Parameter>;
    fn get_parameter(
        &self,
        name: &str,
        group: &str,
        realization_index: RealizationIndex,
        ensemble_name: &str,
    ) -> RepoResult<Option<Parameter>>;
    /// Distinct parameter keys of one ensemble, in first-insert order.
    fn list_parameter_keys(&self, ensemble_name: &str) -> RepoResult<Vec<ParameterKey>>;
    /// Per-realization values of one parameter, ordered by realization index.
    fn parameter_values(
        &self,
        ensemble_name: &str,
        key: &ParameterKey,
    ) -> RepoResult<Vec<(RealizationIndex, f64)>>;

    /// Resolves `observation_name` according to `ObservationLinkPolicy`.
    fn add_response_definition(
        &self,
        name: &str,
        indexes: &[AxisLabel],
        ensemble_name: &str,
        observation_name: Option<&str>,
    ) -> RepoResult<ResponseDefinition>;
    fn get_response_definition(
        &self,
        name: &str,
        ensemble_name: &str,
    ) -> RepoResult<Option<ResponseDefinition>>;
    fn list_response_definitions(&self, ensemble_name: &str)
        -> RepoResult<Vec<ResponseDefinition>>;

    /// Fails with `LengthMismatch` before touching storage when `values`
    /// and `indexes` (or the stored definition axis) disagree in length.
    fn add_response(
        &self,
        name: &str,
        values: &[f64],
        indexes: &[AxisLabel],
        realization_index: RealizationIndex,
        ensemble_name: &str,
        observation_id: Option<ObservationId>,
    ) -> RepoResult<Response>;
    fn get_response(
        &self,
        name: &str,
        realization_index: RealizationIndex,
        ensemble_name: &str,
    ) -> RepoResult<Option<Response>>;
    /// All realizations' series for one response name, ordered by index.
    fn response_series(
        &self,
        ensemble_name: &str,
        name: &str,
    ) -> RepoResult<Vec<(RealizationIndex, Response)>>;
    /// Distinct `(response name, observation link)` pairs in first-insert order.
    fn response_observation_links(
        &self,
        ensemble_name: &str,
    ) -> RepoResult<Vec<(String, Option<ObservationId>)>>;

    fn add_observation(
        &self,
        name: &str,
        key_indexes: &[AxisLabel],
        data_indexes: &[AxisLabel],
        values: &[f64],
        stds: &[f64],
    ) -> RepoResult<Observation>;
    fn get_observation(&self, name: &str) -> RepoResult<Option<Observation>>;
    fn get_observation_by_id(&self, id: ObservationId) -> RepoResult<Option<Observation>>;
    /// Observation names in insertion order.
    fn all_observation_keys(&self) -> RepoResult<Vec<String>>;

    /// Flushes staged writes; a constraint violation discards the whole
    /// batch and fails with `RepoError::Integrity`.
    fn commit(&self) -> RepoResult<()>;
    /// Discards staged writes.
    fn rollback(&self) -> RepoResult<()>;
    /// Releases the connection. Closing twice is a no-op.
    fn close(&mut self) -> RepoResult<()>;

    /// Runs `f`, commits when it succeeds and rolls back when it fails.
    ///
    /// Writes staged before the call are committed or discarded together
    /// with the writes made by `f`.
    fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    warn!(
                        "event=repo_rollback module=repo status=error error={rollback_err}"
                    );
                }
                Err(err)
            }
        }
    }
}
