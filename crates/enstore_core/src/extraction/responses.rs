use super::{
    ensure_ensemble, invariant_violation, run_step, ExtractionError, ExtractionOptions,
    ExtractionStep, RealizationTracker, RerunPolicy, StepReport,
};
use crate::model::key::ResponseKey;
use crate::model::observation::Observation;
use crate::repo::ExperimentRepository;
use crate::source::{ResponseTable, SimulationSource};
use log::{debug, warn};
use std::collections::HashMap;

/// Stores per-realization response series and links them to observations.
///
/// Source keys are stored under their name with any `@step` suffix removed.
/// Every key is gathered; when two source keys share a stored name, the
/// last one enumerated wins and keeps the position of the first.
pub fn extract_responses<S, R>(
    source: &S,
    repo: &R,
    ensemble_name: &str,
    options: &ExtractionOptions,
) -> Result<StepReport, ExtractionError>
where
    S: SimulationSource,
    R: ExperimentRepository,
{
    run_step(repo, ExtractionStep::Responses, |repo, report| {
        let ensemble = ensure_ensemble(repo, ensemble_name)?;
        let mut realizations = RealizationTracker::new(&ensemble);

        let keys: Vec<ResponseKey> = source
            .list_response_keys()?
            .into_iter()
            .map(ResponseKey::from_source)
            .collect();
        let links = observation_links(source, repo, &keys)?;
        let gathered = gather_tables(source, &ensemble.name, keys)?;

        for (key, table) in &gathered {
            let observation = links.get(&key.source_key).and_then(Option::as_ref);

            let definition_exists = options.rerun == RerunPolicy::SkipExisting
                && repo
                    .get_response_definition(&key.name, &ensemble.name)?
                    .is_some();
            if !definition_exists {
                repo.add_response_definition(
                    &key.name,
                    &table.indexes,
                    &ensemble.name,
                    observation.map(|observation| observation.name.as_str()),
                )
                .map_err(invariant_violation)?;
            }

            for (index, values) in &table.realizations {
                realizations.ensure(repo, *index)?;

                if options.rerun == RerunPolicy::SkipExisting
                    && repo
                        .get_response(&key.name, *index, &ensemble.name)?
                        .is_some()
                {
                    report.skipped += 1;
                    continue;
                }

                repo.add_response(
                    &key.name,
                    values,
                    &table.indexes,
                    *index,
                    &ensemble.name,
                    observation.map(|observation| observation.id),
                )
                .map_err(invariant_violation)?;
                report.inserted += 1;
            }
        }
        Ok(())
    })
}

/// Gathers every key, collapsing keys that share a stored name.
fn gather_tables<S: SimulationSource>(
    source: &S,
    ensemble_name: &str,
    keys: Vec<ResponseKey>,
) -> Result<Vec<(ResponseKey, ResponseTable)>, ExtractionError> {
    let mut gathered: Vec<(ResponseKey, ResponseTable)> = Vec::with_capacity(keys.len());
    for key in keys {
        let table = source.gather_response(ensemble_name, &key.source_key)?;
        match gathered.iter_mut().find(|(known, _)| known.name == key.name) {
            Some(slot) => {
                debug!(
                    "event=extract_responses module=extraction status=replace name={} shadowed={} key={}",
                    key.name, slot.0.source_key, key.source_key
                );
                *slot = (key, table);
            }
            None => gathered.push((key, table)),
        }
    }
    Ok(gathered)
}

/// Resolves the observation of every response key once per run.
///
/// A key mapped to an observation that was never stored stays unlinked.
fn observation_links<S, R>(
    source: &S,
    repo: &R,
    keys: &[ResponseKey],
) -> Result<HashMap<String, Option<Observation>>, ExtractionError>
where
    S: SimulationSource,
    R: ExperimentRepository,
{
    let mut links = HashMap::with_capacity(keys.len());
    for key in keys {
        let observation = match source.observation_key_for_response(&key.source_key)? {
            Some(observation_key) => {
                let stored = repo.get_observation(&observation_key)?;
                if stored.is_none() {
                    warn!(
                        "event=extract_responses module=extraction status=unlinked key={} observation={observation_key}",
                        key.source_key
                    );
                }
                stored
            }
            None => None,
        };
        links.insert(key.source_key.clone(), observation);
    }
    Ok(links)
}
