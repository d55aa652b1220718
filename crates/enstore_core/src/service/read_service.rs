//! Read facade for plotting consumers.
//!
//! # Responsibility
//! - List the data keys of one ensemble with their observation names,
//!   dimensionality and data-origin tag.
//! - Rebuild realization-indexed tables from normalized rows.
//!
//! # Invariants
//! - Read-only: no method stages a write.
//! - Every query is scoped to one ensemble.
//! - Parameter keys are listed before response keys, each in first-insert
//!   order.

use crate::model::axis::AxisLabel;
use crate::model::ensemble::{Ensemble, RealizationIndex};
use crate::model::key::{KeyKind, ParameterKey};
use crate::model::observation::ObservationId;
use crate::repo::{EntityKind, ExperimentRepository, RepoError, RepoResult};
use serde::Serialize;

/// Origin metadata attached to a listed key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyMetadata {
    pub data_origin: String,
}

/// One listed data key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyInfo {
    pub key: String,
    pub kind: KeyKind,
    /// Names of linked observations, empty when unlinked.
    pub observations: Vec<String>,
    pub dimensionality: u8,
    pub metadata: KeyMetadata,
}

impl KeyInfo {
    fn new(key: String, kind: KeyKind, observations: Vec<String>) -> Self {
        Self {
            key,
            kind,
            observations,
            dimensionality: kind.dimensionality(),
            metadata: KeyMetadata {
                data_origin: kind.data_origin().to_string(),
            },
        }
    }
}

/// Values of one realization, aligned with `RealizationTable::columns`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub realization: RealizationIndex,
    pub values: Vec<f64>,
}

/// Realization-by-axis table for one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealizationTable {
    pub key: String,
    pub kind: KeyKind,
    pub columns: Vec<AxisLabel>,
    /// Rows ordered by realization index.
    pub rows: Vec<TableRow>,
}

impl RealizationTable {
    pub fn row(&self, realization: RealizationIndex) -> Option<&TableRow> {
        self.rows.iter().find(|row| row.realization == realization)
    }
}

/// Ensemble as listed to case pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseInfo {
    pub name: String,
    pub has_data: bool,
    pub hidden: bool,
}

/// One measured point of an observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationPoint {
    pub key: String,
    pub key_index: AxisLabel,
    pub data_index: AxisLabel,
    pub value: f64,
    pub std: f64,
}

/// Read-only facade over repository implementations.
pub struct ReadService<R: ExperimentRepository> {
    repo: R,
}

impl<R: ExperimentRepository> ReadService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Returns the repository, e.g. to close it explicitly.
    pub fn into_inner(self) -> R {
        self.repo
    }

    /// Lists every ensemble; nothing is ever hidden.
    pub fn list_cases(&self) -> RepoResult<Vec<CaseInfo>> {
        self.repo
            .list_ensembles()?
            .into_iter()
            .map(|ensemble| -> RepoResult<CaseInfo> {
                let has_data = !self.repo.list_realizations(&ensemble.name)?.is_empty();
                Ok(CaseInfo {
                    name: ensemble.name,
                    has_data,
                    hidden: false,
                })
            })
            .collect()
    }

    /// Lists parameter keys (`group:name`) followed by response names.
    pub fn list_keys(&self, ensemble_name: &str) -> RepoResult<Vec<KeyInfo>> {
        let ensemble = self.require_ensemble(ensemble_name)?;

        let mut keys: Vec<KeyInfo> = self
            .repo
            .list_parameter_keys(&ensemble.name)?
            .into_iter()
            .map(|key| KeyInfo::new(key.to_string(), KeyKind::Parameter, Vec::new()))
            .collect();

        let mut responses: Vec<(String, Vec<ObservationId>)> = Vec::new();
        for definition in self.repo.list_response_definitions(&ensemble.name)? {
            responses.push((
                definition.name,
                definition.observation_id.into_iter().collect(),
            ));
        }
        for (name, observation_id) in self.repo.response_observation_links(&ensemble.name)? {
            let position = match responses.iter().position(|(known, _)| *known == name) {
                Some(position) => position,
                None => {
                    responses.push((name, Vec::new()));
                    responses.len() - 1
                }
            };
            let linked = &mut responses[position].1;
            if let Some(observation_id) = observation_id {
                if !linked.contains(&observation_id) {
                    linked.push(observation_id);
                }
            }
        }

        for (name, observation_ids) in responses {
            let observations = self.observation_names(&observation_ids)?;
            keys.push(KeyInfo::new(name, KeyKind::Response, observations));
        }
        Ok(keys)
    }

    /// Builds the realization table for one key.
    ///
    /// A response name takes precedence over a parameter key of the same
    /// spelling. Parameter tables have a single column labeled `0`.
    pub fn fetch_table(&self, ensemble_name: &str, key: &str) -> RepoResult<RealizationTable> {
        let ensemble = self.require_ensemble(ensemble_name)?;

        let definition = self.repo.get_response_definition(key, &ensemble.name)?;
        let series = self.repo.response_series(&ensemble.name, key)?;
        if definition.is_some() || !series.is_empty() {
            let columns = match (definition, series.first()) {
                (Some(definition), _) => definition.indexes,
                (None, Some((_, response))) => response.indexes.clone(),
                (None, None) => Vec::new(),
            };
            let rows = series
                .into_iter()
                .map(|(realization, response)| TableRow {
                    realization,
                    values: response.values,
                })
                .collect();
            return Ok(RealizationTable {
                key: key.to_string(),
                kind: KeyKind::Response,
                columns,
                rows,
            });
        }

        let not_found = || RepoError::NotFound {
            entity: EntityKind::DataKey,
            key: key.to_string(),
        };
        let parameter_key = ParameterKey::parse(key).map_err(|_| not_found())?;
        let values = self.repo.parameter_values(&ensemble.name, &parameter_key)?;
        if values.is_empty() {
            return Err(not_found());
        }
        Ok(RealizationTable {
            key: key.to_string(),
            kind: KeyKind::Parameter,
            columns: vec![AxisLabel::Integer(0)],
            rows: values
                .into_iter()
                .map(|(realization, value)| TableRow {
                    realization,
                    values: vec![value],
                })
                .collect(),
        })
    }

    /// Flattens the named observations into points, in the order requested.
    pub fn observations_for_keys(&self, keys: &[&str]) -> RepoResult<Vec<ObservationPoint>> {
        let mut points = Vec::new();
        for key in keys {
            let observation = self
                .repo
                .get_observation(key)?
                .ok_or_else(|| RepoError::NotFound {
                    entity: EntityKind::Observation,
                    key: (*key).to_string(),
                })?;
            points.reserve(observation.len());
            let rows = observation
                .key_indexes
                .into_iter()
                .zip(observation.data_indexes)
                .zip(observation.values.into_iter().zip(observation.stds));
            for ((key_index, data_index), (value, std)) in rows {
                points.push(ObservationPoint {
                    key: observation.name.clone(),
                    key_index,
                    data_index,
                    value,
                    std,
                });
            }
        }
        Ok(points)
    }

    fn require_ensemble(&self, ensemble_name: &str) -> RepoResult<Ensemble> {
        self.repo
            .get_ensemble(ensemble_name)?
            .ok_or_else(|| RepoError::NotFound {
                entity: EntityKind::Ensemble,
                key: ensemble_name.to_string(),
            })
    }

    fn observation_names(&self, observation_ids: &[ObservationId]) -> RepoResult<Vec<String>> {
        let mut names = Vec::with_capacity(observation_ids.len());
        for id in observation_ids {
            let observation =
                self.repo
                    .get_observation_by_id(*id)?
                    .ok_or_else(|| RepoError::NotFound {
                        entity: EntityKind::Observation,
                        key: id.to_string(),
                    })?;
            if !names.contains(&observation.name) {
                names.push(observation.name);
            }
        }
        Ok(names)
    }
}
