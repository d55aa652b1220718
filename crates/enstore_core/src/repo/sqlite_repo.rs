//! SQLite-backed experiment repository.
//!
//! # Responsibility
//! - Own one migrated connection for the lifetime of the repository.
//! - Stage writes in a lazily opened transaction.
//! - Resolve natural keys (ensemble name, realization index, observation
//!   name) to surrogate ids inside the storage boundary.
//!
//! # Invariants
//! - The connection is released on `close()` or drop, on every exit path.
//! - Dropping a repository with staged writes rolls them back.
//! - Foreign keys are deferred; their violations surface at `commit()`.

use crate::db::codec::{encode_floats, encode_labels};
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::open_db;
use crate::db::open_db_in_memory;
use crate::model::axis::AxisLabel;
use crate::model::ensemble::{Ensemble, Realization, RealizationIndex};
use crate::model::key::ParameterKey;
use crate::model::observation::{Observation, ObservationId};
use crate::model::parameter::Parameter;
use crate::model::response::{Response, ResponseDefinition};
use crate::repo::error::{map_insert_error, EntityKind, RepoError, RepoResult};
use crate::repo::experiment_repo::{
    ExperimentRepository, ObservationLinkPolicy, RepositoryOptions,
};
use crate::repo::rows::{
    parse_ensemble, parse_indexed_response, parse_observation, parse_parameter,
    parse_realization, parse_response, parse_response_definition, query_all, query_first,
    DEFINITION_SELECT_SQL, ENSEMBLE_SELECT_SQL, OBSERVATION_SELECT_SQL, PARAMETER_SELECT_SQL,
    REALIZATION_SELECT_SQL, RESPONSE_SELECT_SQL,
};
use log::{debug, error, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Instant;

const REQUIRED_TABLES: &[&str] = &[
    "ensembles",
    "realizations",
    "parameters",
    "observations",
    "response_definitions",
    "responses",
];

/// Experiment repository over one owned SQLite connection.
pub struct SqliteExperimentRepository {
    conn: Option<Connection>,
    options: RepositoryOptions,
}

impl SqliteExperimentRepository {
    /// Opens (or creates) a store file and wraps it.
    pub fn open(path: impl AsRef<Path>, options: RepositoryOptions) -> RepoResult<Self> {
        Self::try_new(open_db(path)?, options)
    }

    /// Wraps a fresh in-memory store.
    pub fn open_in_memory(options: RepositoryOptions) -> RepoResult<Self> {
        Self::try_new(open_db_in_memory()?, options)
    }

    /// Takes ownership of a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations were not applied.
    /// - `MissingRequiredTable` when the schema lacks an experiment table.
    pub fn try_new(conn: Connection, options: RepositoryOptions) -> RepoResult<Self> {
        ensure_connection_ready(&conn)?;
        Ok(Self {
            conn: Some(conn),
            options,
        })
    }

    pub fn options(&self) -> RepositoryOptions {
        self.options
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Returns whether writes are staged and not yet committed.
    pub fn has_staged_writes(&self) -> bool {
        self.conn
            .as_ref()
            .is_some_and(|conn| !conn.is_autocommit())
    }

    /// Borrows the underlying connection for read-only diagnostics.
    pub fn connection(&self) -> RepoResult<&Connection> {
        self.conn.as_ref().ok_or(RepoError::Closed)
    }

    fn writer(&self) -> RepoResult<&Connection> {
        let conn = self.connection()?;
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN DEFERRED;")?;
        }
        Ok(conn)
    }

    fn require_ensemble(&self, conn: &Connection, name: &str) -> RepoResult<Ensemble> {
        find_ensemble(conn, name)?.ok_or_else(|| RepoError::NotFound {
            entity: EntityKind::Ensemble,
            key: name.to_string(),
        })
    }

    fn require_realization(
        &self,
        conn: &Connection,
        index: RealizationIndex,
        ensemble_name: &str,
    ) -> RepoResult<Realization> {
        self.require_ensemble(conn, ensemble_name)?;
        find_realization(conn, index, ensemble_name)?.ok_or_else(|| RepoError::NotFound {
            entity: EntityKind::Realization,
            key: realization_key(index, ensemble_name),
        })
    }

    fn resolve_observation_link(
        &self,
        conn: &Connection,
        definition_name: &str,
        observation_name: Option<&str>,
    ) -> RepoResult<Option<ObservationId>> {
        let Some(observation_name) = observation_name else {
            return Ok(None);
        };
        match find_observation_id(conn, observation_name)? {
            Some(id) => Ok(Some(id)),
            None => match self.options.observation_link {
                ObservationLinkPolicy::Eager => Err(RepoError::NotFound {
                    entity: EntityKind::Observation,
                    key: observation_name.to_string(),
                }),
                ObservationLinkPolicy::Lenient => {
                    warn!(
                        "event=link_observation module=repo status=skipped definition={definition_name} observation={observation_name} reason=observation_missing"
                    );
                    Ok(None)
                }
            },
        }
    }

    fn insert_realization(
        &self,
        conn: &Connection,
        index: RealizationIndex,
        ensemble: &Ensemble,
    ) -> RepoResult<Realization> {
        conn.execute(
            "INSERT INTO realizations (realization_index, ensemble_id) VALUES (?1, ?2);",
            params![index, ensemble.id],
        )
        .map_err(|err| {
            map_insert_error(
                err,
                EntityKind::Realization,
                &realization_key(index, &ensemble.name),
            )
        })?;
        Ok(Realization {
            id: conn.last_insert_rowid(),
            index,
            ensemble_id: ensemble.id,
        })
    }
}

impl ExperimentRepository for SqliteExperimentRepository {
    fn add_ensemble(&self, name: &str) -> RepoResult<Ensemble> {
        let conn = self.writer()?;
        conn.execute("INSERT INTO ensembles (name) VALUES (?1);", [name])
            .map_err(|err| map_insert_error(err, EntityKind::Ensemble, name))?;
        Ok(Ensemble {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    fn get_ensemble(&self, name: &str) -> RepoResult<Option<Ensemble>> {
        find_ensemble(self.connection()?, name)
    }

    fn list_ensembles(&self) -> RepoResult<Vec<Ensemble>> {
        query_all(
            self.connection()?,
            &format!("{ENSEMBLE_SELECT_SQL} ORDER BY id ASC;"),
            [],
            parse_ensemble,
        )
    }

    fn add_realization(
        &self,
        index: RealizationIndex,
        ensemble_name: &str,
    ) -> RepoResult<Realization> {
        let ensemble = self.require_ensemble(self.connection()?, ensemble_name)?;
        let conn = self.writer()?;
        self.insert_realization(conn, index, &ensemble)
    }

    fn add_realizations(
        &self,
        indexes: &[RealizationIndex],
        ensemble_name: &str,
    ) -> RepoResult<Vec<Realization>> {
        let ensemble = self.require_ensemble(self.connection()?, ensemble_name)?;
        let conn = self.writer()?;

        conn.execute_batch("SAVEPOINT add_realizations;")?;
        let staged = indexes
            .iter()
            .map(|index| self.insert_realization(conn, *index, &ensemble))
            .collect::<RepoResult<Vec<_>>>();
        match staged {
            Ok(realizations) => {
                conn.execute_batch("RELEASE SAVEPOINT add_realizations;")?;
                Ok(realizations)
            }
            Err(err) => {
                conn.execute_batch(
                    "ROLLBACK TO SAVEPOINT add_realizations;
                     RELEASE SAVEPOINT add_realizations;",
                )?;
                Err(err)
            }
        }
    }

    fn get_realization(
        &self,
        index: RealizationIndex,
        ensemble_name: &str,
    ) -> RepoResult<Option<Realization>> {
        find_realization(self.connection()?, index, ensemble_name)
    }

    fn list_realizations(&self, ensemble_name: &str) -> RepoResult<Vec<Realization>> {
        query_all(
            self.connection()?,
            &format!("{REALIZATION_SELECT_SQL} WHERE e.name = ?1 ORDER BY r.realization_index ASC;"),
            [ensemble_name],
            parse_realization,
        )
    }

    fn add_parameter(
        &self,
        name: &str,
        group: &str,
        value: f64,
        realization_index: RealizationIndex,
        ensemble_name: &str,
    ) -> RepoResult<Parameter> {
        let realization =
            self.require_realization(self.connection()?, realization_index, ensemble_name)?;
        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO parameters (name, group_name, value, realization_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![name, group, value, realization.id],
        )
        .map_err(|err| {
            map_insert_error(
                err,
                EntityKind::Parameter,
                &format!(
                    "{} ({})",
                    ParameterKey::new(group, name),
                    realization_key(realization_index, ensemble_name)
                ),
            )
        })?;
        Ok(Parameter {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            group: group.to_string(),
            value,
            realization_id: realization.id,
        })
    }

    fn get_parameter(
        &self,
        name: &str,
        group: &str,
        realization_index: RealizationIndex,
        ensemble_name: &str,
    ) -> RepoResult<Option<Parameter>> {
        query_first(
            self.connection()?,
            &format!(
                "{PARAMETER_SELECT_SQL}
                 WHERE e.name = ?1
                   AND r.realization_index = ?2
                   AND p.group_name = ?3
                   AND p.name = ?4;"
            ),
            params![ensemble_name, realization_index, group, name],
            parse_parameter,
        )
    }

    fn list_parameter_keys(&self, ensemble_name: &str) -> RepoResult<Vec<ParameterKey>> {
        query_all(
            self.connection()?,
            "SELECT p.group_name AS group_name, p.name AS name
             FROM parameters p
             JOIN realizations r ON r.id = p.realization_id
             JOIN ensembles e ON e.id = r.ensemble_id
             WHERE e.name = ?1
             GROUP BY p.group_name, p.name
             ORDER BY MIN(p.id) ASC;",
            [ensemble_name],
            |row| {
                Ok(ParameterKey::new(
                    row.get::<_, String>("group_name")?,
                    row.get::<_, String>("name")?,
                ))
            },
        )
    }

    fn parameter_values(
        &self,
        ensemble_name: &str,
        key: &ParameterKey,
    ) -> RepoResult<Vec<(RealizationIndex, f64)>> {
        query_all(
            self.connection()?,
            "SELECT r.realization_index AS realization_index, p.value AS value
             FROM parameters p
             JOIN realizations r ON r.id = p.realization_id
             JOIN ensembles e ON e.id = r.ensemble_id
             WHERE e.name = ?1
               AND p.group_name = ?2
               AND p.name = ?3
             ORDER BY r.realization_index ASC;",
            params![ensemble_name, key.group, key.name],
            |row| Ok((row.get("realization_index")?, row.get("value")?)),
        )
    }

    fn add_response_definition(
        &self,
        name: &str,
        indexes: &[AxisLabel],
        ensemble_name: &str,
        observation_name: Option<&str>,
    ) -> RepoResult<ResponseDefinition> {
        let reader = self.connection()?;
        let ensemble = self.require_ensemble(reader, ensemble_name)?;
        let observation_id = self.resolve_observation_link(reader, name, observation_name)?;
        let encoded_indexes = encode_labels(indexes)?;

        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO response_definitions (name, indexes, ensemble_id, observation_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![name, encoded_indexes, ensemble.id, observation_id],
        )
        .map_err(|err| {
            map_insert_error(
                err,
                EntityKind::ResponseDefinition,
                &format!("{name} (ensemble {ensemble_name})"),
            )
        })?;
        Ok(ResponseDefinition {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            indexes: indexes.to_vec(),
            ensemble_id: ensemble.id,
            observation_id,
        })
    }

    fn get_response_definition(
        &self,
        name: &str,
        ensemble_name: &str,
    ) -> RepoResult<Option<ResponseDefinition>> {
        query_first(
            self.connection()?,
            &format!("{DEFINITION_SELECT_SQL} WHERE e.name = ?1 AND d.name = ?2;"),
            [ensemble_name, name],
            parse_response_definition,
        )
    }

    fn list_response_definitions(
        &self,
        ensemble_name: &str,
    ) -> RepoResult<Vec<ResponseDefinition>> {
        query_all(
            self.connection()?,
            &format!("{DEFINITION_SELECT_SQL} WHERE e.name = ?1 ORDER BY d.id ASC;"),
            [ensemble_name],
            parse_response_definition,
        )
    }

    fn add_response(
        &self,
        name: &str,
        values: &[f64],
        indexes: &[AxisLabel],
        realization_index: RealizationIndex,
        ensemble_name: &str,
        observation_id: Option<ObservationId>,
    ) -> RepoResult<Response> {
        ensure_same_length(EntityKind::Response, name, indexes.len(), values.len())?;

        let reader = self.connection()?;
        let realization = self.require_realization(reader, realization_index, ensemble_name)?;
        if let Some(definition) = self.get_response_definition(name, ensemble_name)? {
            ensure_same_length(
                EntityKind::Response,
                name,
                definition.indexes.len(),
                values.len(),
            )?;
        }
        let encoded_values = encode_floats(values)?;
        let encoded_indexes = encode_labels(indexes)?;

        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO responses (name, response_values, indexes, realization_id, observation_id)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                name,
                encoded_values,
                encoded_indexes,
                realization.id,
                observation_id
            ],
        )
        .map_err(|err| {
            map_insert_error(
                err,
                EntityKind::Response,
                &format!(
                    "{name} ({})",
                    realization_key(realization_index, ensemble_name)
                ),
            )
        })?;
        Ok(Response {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            values: values.to_vec(),
            indexes: indexes.to_vec(),
            realization_id: realization.id,
            observation_id,
        })
    }

    fn get_response(
        &self,
        name: &str,
        realization_index: RealizationIndex,
        ensemble_name: &str,
    ) -> RepoResult<Option<Response>> {
        query_first(
            self.connection()?,
            &format!(
                "{RESPONSE_SELECT_SQL}
                 WHERE e.name = ?1
                   AND r.realization_index = ?2
                   AND s.name = ?3;"
            ),
            params![ensemble_name, realization_index, name],
            parse_response,
        )
    }

    fn response_series(
        &self,
        ensemble_name: &str,
        name: &str,
    ) -> RepoResult<Vec<(RealizationIndex, Response)>> {
        query_all(
            self.connection()?,
            &format!(
                "{RESPONSE_SELECT_SQL}
                 WHERE e.name = ?1
                   AND s.name = ?2
                 ORDER BY r.realization_index ASC;"
            ),
            [ensemble_name, name],
            parse_indexed_response,
        )
    }

    fn response_observation_links(
        &self,
        ensemble_name: &str,
    ) -> RepoResult<Vec<(String, Option<ObservationId>)>> {
        query_all(
            self.connection()?,
            "SELECT s.name AS name, s.observation_id AS observation_id
             FROM responses s
             JOIN realizations r ON r.id = s.realization_id
             JOIN ensembles e ON e.id = r.ensemble_id
             WHERE e.name = ?1
             GROUP BY s.name, s.observation_id
             ORDER BY MIN(s.id) ASC;",
            [ensemble_name],
            |row| Ok((row.get("name")?, row.get("observation_id")?)),
        )
    }

    fn add_observation(
        &self,
        name: &str,
        key_indexes: &[AxisLabel],
        data_indexes: &[AxisLabel],
        values: &[f64],
        stds: &[f64],
    ) -> RepoResult<Observation> {
        let expected = key_indexes.len();
        for actual in [data_indexes.len(), values.len(), stds.len()] {
            ensure_same_length(EntityKind::Observation, name, expected, actual)?;
        }
        let encoded_key_indexes = encode_labels(key_indexes)?;
        let encoded_data_indexes = encode_labels(data_indexes)?;
        let encoded_values = encode_floats(values)?;
        let encoded_stds = encode_floats(stds)?;

        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO observations (name, key_indexes, data_indexes, obs_values, stds)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                name,
                encoded_key_indexes,
                encoded_data_indexes,
                encoded_values,
                encoded_stds
            ],
        )
        .map_err(|err| map_insert_error(err, EntityKind::Observation, name))?;
        Ok(Observation {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            key_indexes: key_indexes.to_vec(),
            data_indexes: data_indexes.to_vec(),
            values: values.to_vec(),
            stds: stds.to_vec(),
        })
    }

    fn get_observation(&self, name: &str) -> RepoResult<Option<Observation>> {
        query_first(
            self.connection()?,
            &format!("{OBSERVATION_SELECT_SQL} WHERE name = ?1;"),
            [name],
            parse_observation,
        )
    }

    fn get_observation_by_id(&self, id: ObservationId) -> RepoResult<Option<Observation>> {
        query_first(
            self.connection()?,
            &format!("{OBSERVATION_SELECT_SQL} WHERE id = ?1;"),
            [id],
            parse_observation,
        )
    }

    fn all_observation_keys(&self) -> RepoResult<Vec<String>> {
        query_all(
            self.connection()?,
            "SELECT name FROM observations ORDER BY id ASC;",
            [],
            |row| Ok(row.get("name")?),
        )
    }

    fn commit(&self) -> RepoResult<()> {
        let conn = self.connection()?;
        if conn.is_autocommit() {
            return Ok(());
        }

        let started_at = Instant::now();
        if let Err(err) = conn.execute_batch("COMMIT;") {
            // A failed COMMIT on deferred constraints keeps the transaction open.
            if !conn.is_autocommit() {
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK;") {
                    error!(
                        "event=repo_commit module=repo status=error error_code=rollback_failed error={rollback_err}"
                    );
                }
            }
            let err = RepoError::from(err);
            error!(
                "event=repo_commit module=repo status=error duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(err);
        }

        debug!(
            "event=repo_commit module=repo status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn rollback(&self) -> RepoResult<()> {
        let conn = self.connection()?;
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch("ROLLBACK;")?;
        debug!("event=repo_rollback module=repo status=ok");
        Ok(())
    }

    fn close(&mut self) -> RepoResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if !conn.is_autocommit() {
            warn!("event=repo_close module=repo status=rollback reason=staged_writes_pending");
            conn.execute_batch("ROLLBACK;")?;
        }
        conn.close().map_err(|(_conn, err)| RepoError::from(err))?;
        debug!("event=repo_close module=repo status=ok");
        Ok(())
    }
}

impl Drop for SqliteExperimentRepository {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if !conn.is_autocommit() {
            warn!("event=repo_drop module=repo status=rollback reason=staged_writes_pending");
            if let Err(err) = conn.execute_batch("ROLLBACK;") {
                error!("event=repo_drop module=repo status=error error={err}");
            }
        }
    }
}

fn find_ensemble(conn: &Connection, name: &str) -> RepoResult<Option<Ensemble>> {
    query_first(
        conn,
        &format!("{ENSEMBLE_SELECT_SQL} WHERE name = ?1;"),
        [name],
        parse_ensemble,
    )
}

fn find_realization(
    conn: &Connection,
    index: RealizationIndex,
    ensemble_name: &str,
) -> RepoResult<Option<Realization>> {
    query_first(
        conn,
        &format!("{REALIZATION_SELECT_SQL} WHERE e.name = ?1 AND r.realization_index = ?2;"),
        params![ensemble_name, index],
        parse_realization,
    )
}

fn find_observation_id(conn: &Connection, name: &str) -> RepoResult<Option<ObservationId>> {
    let id = conn
        .query_row(
            "SELECT id FROM observations WHERE name = ?1;",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn ensure_same_length(
    entity: EntityKind,
    name: &str,
    expected: usize,
    actual: usize,
) -> RepoResult<()> {
    if expected != actual {
        return Err(RepoError::LengthMismatch {
            entity,
            name: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn realization_key(index: RealizationIndex, ensemble_name: &str) -> String {
    format!("realization {index} of ensemble {ensemble_name}")
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(*table));
        }
    }

    Ok(())
}
