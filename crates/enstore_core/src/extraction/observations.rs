use super::{run_step, ExtractionError, ExtractionOptions, ExtractionStep, StepReport};
use crate::repo::ExperimentRepository;
use crate::source::SimulationSource;
use log::debug;

/// Stores every observation the source enumerates.
///
/// Names already present are skipped regardless of the rerun policy, so the
/// step is idempotent. A concurrent insert surfacing as `DuplicateKey` is
/// treated the same way.
pub fn extract_observations<S, R>(
    source: &S,
    repo: &R,
    options: &ExtractionOptions,
) -> Result<StepReport, ExtractionError>
where
    S: SimulationSource,
    R: ExperimentRepository,
{
    run_step(repo, ExtractionStep::Observations, |repo, report| {
        for key in source.list_observation_keys()? {
            if repo.get_observation(&key)?.is_some() {
                report.skipped += 1;
                continue;
            }

            let mut data = source.gather_observation(&key)?;
            if options.drop_inactive_observations {
                data = data.retain_active();
            }
            if data.is_empty() {
                debug!("event=extract_observations module=extraction status=skip key={key} reason=no_active_points");
                report.skipped += 1;
                continue;
            }

            match repo.add_observation(
                &key,
                &data.key_indexes,
                &data.data_indexes,
                &data.values,
                &data.stds,
            ) {
                Ok(_) => report.inserted += 1,
                Err(err) if err.is_duplicate_key() => report.skipped += 1,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    })
}
