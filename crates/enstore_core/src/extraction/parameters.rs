use super::{
    ensure_ensemble, invariant_violation, run_step, ExtractionError, ExtractionOptions,
    ExtractionStep, RealizationTracker, RerunPolicy, StepReport,
};
use crate::model::key::ParameterKey;
use crate::repo::ExperimentRepository;
use crate::source::{SimulationSource, SourceError};

/// Stores one scalar row per (parameter key, realization).
///
/// Keys must be formatted `group:name`; a malformed key aborts the step.
pub fn extract_parameters<S, R>(
    source: &S,
    repo: &R,
    ensemble_name: &str,
    options: &ExtractionOptions,
) -> Result<StepReport, ExtractionError>
where
    S: SimulationSource,
    R: ExperimentRepository,
{
    run_step(repo, ExtractionStep::Parameters, |repo, report| {
        let ensemble = ensure_ensemble(repo, ensemble_name)?;
        let mut realizations = RealizationTracker::new(&ensemble);

        for raw_key in source.list_parameter_keys()? {
            let key = ParameterKey::parse(&raw_key).map_err(SourceError::from)?;
            let table = source.gather_parameter(&ensemble.name, &raw_key)?;

            for (index, value) in table.rows {
                realizations.ensure(repo, index)?;

                if options.rerun == RerunPolicy::SkipExisting
                    && repo
                        .get_parameter(&key.name, &key.group, index, &ensemble.name)?
                        .is_some()
                {
                    report.skipped += 1;
                    continue;
                }

                repo.add_parameter(&key.name, &key.group, value, index, &ensemble.name)
                    .map_err(invariant_violation)?;
                report.inserted += 1;
            }
        }
        Ok(())
    })
}
