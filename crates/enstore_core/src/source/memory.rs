//! In-process simulation source.
//!
//! Holds pre-gathered tables keyed by ensemble and facade key. Used by tests
//! and by embedders that already have simulation output in memory.

use crate::source::{
    ObservationData, ParameterTable, ResponseTable, SimulationSource, SourceError, SourceResult,
};
use std::collections::{BTreeSet, HashMap};

/// Builder-style `SimulationSource` backed by in-memory tables.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    observation_keys: Vec<String>,
    observations: HashMap<String, ObservationData>,
    parameter_keys: Vec<String>,
    parameters: HashMap<(String, String), ParameterTable>,
    response_keys: Vec<String>,
    responses: HashMap<(String, String), ResponseTable>,
    response_links: HashMap<String, String>,
    failing_keys: BTreeSet<String>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observation(mut self, key: impl Into<String>, data: ObservationData) -> Self {
        let key = key.into();
        remember_key(&mut self.observation_keys, &key);
        self.observations.insert(key, data);
        self
    }

    /// Registers a `group:name` parameter table for one ensemble.
    pub fn with_parameter(
        mut self,
        ensemble: impl Into<String>,
        key: impl Into<String>,
        table: ParameterTable,
    ) -> Self {
        let key = key.into();
        remember_key(&mut self.parameter_keys, &key);
        self.parameters.insert((ensemble.into(), key), table);
        self
    }

    pub fn with_response(
        mut self,
        ensemble: impl Into<String>,
        key: impl Into<String>,
        table: ResponseTable,
    ) -> Self {
        let key = key.into();
        remember_key(&mut self.response_keys, &key);
        self.responses.insert((ensemble.into(), key), table);
        self
    }

    /// Declares that `response_key` is scored against `observation_key`.
    pub fn with_response_link(
        mut self,
        response_key: impl Into<String>,
        observation_key: impl Into<String>,
    ) -> Self {
        self.response_links
            .insert(response_key.into(), observation_key.into());
        self
    }

    /// Makes every gather call for `key` fail.
    pub fn with_failing_key(mut self, key: impl Into<String>) -> Self {
        self.failing_keys.insert(key.into());
        self
    }

    fn check_gather(&self, key: &str) -> SourceResult<()> {
        if self.failing_keys.contains(key) {
            return Err(SourceError::Gather {
                key: key.to_string(),
                message: "simulated gather failure".to_string(),
            });
        }
        Ok(())
    }
}

impl SimulationSource for InMemorySource {
    fn list_observation_keys(&self) -> SourceResult<Vec<String>> {
        Ok(self.observation_keys.clone())
    }

    fn list_parameter_keys(&self) -> SourceResult<Vec<String>> {
        Ok(self.parameter_keys.clone())
    }

    fn list_response_keys(&self) -> SourceResult<Vec<String>> {
        Ok(self.response_keys.clone())
    }

    fn gather_observation(&self, key: &str) -> SourceResult<ObservationData> {
        self.check_gather(key)?;
        self.observations
            .get(key)
            .cloned()
            .ok_or_else(|| SourceError::KeyNotFound(key.to_string()))
    }

    fn gather_parameter(&self, ensemble: &str, key: &str) -> SourceResult<ParameterTable> {
        self.check_gather(key)?;
        self.parameters
            .get(&(ensemble.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::KeyNotFound(format!("{ensemble}/{key}")))
    }

    fn gather_response(&self, ensemble: &str, key: &str) -> SourceResult<ResponseTable> {
        self.check_gather(key)?;
        self.responses
            .get(&(ensemble.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::KeyNotFound(format!("{ensemble}/{key}")))
    }

    fn observation_key_for_response(&self, response_key: &str) -> SourceResult<Option<String>> {
        Ok(self.response_links.get(response_key).cloned())
    }
}

fn remember_key(keys: &mut Vec<String>, key: &str) {
    if !keys.iter().any(|known| known == key) {
        keys.push(key.to_string());
    }
}
