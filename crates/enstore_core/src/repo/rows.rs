//! SQL column lists and row decoders shared by the SQLite repository.

use crate::db::codec::{decode_floats, decode_labels};
use crate::model::ensemble::{Ensemble, Realization, RealizationIndex};
use crate::model::observation::Observation;
use crate::model::parameter::Parameter;
use crate::model::response::{Response, ResponseDefinition};
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::{Connection, Params, Row};

pub(crate) const ENSEMBLE_SELECT_SQL: &str = "SELECT id, name FROM ensembles";

pub(crate) const REALIZATION_SELECT_SQL: &str = "SELECT
    r.id AS id,
    r.realization_index AS realization_index,
    r.ensemble_id AS ensemble_id
FROM realizations r
JOIN ensembles e ON e.id = r.ensemble_id";

pub(crate) const PARAMETER_SELECT_SQL: &str = "SELECT
    p.id AS id,
    p.name AS name,
    p.group_name AS group_name,
    p.value AS value,
    p.realization_id AS realization_id
FROM parameters p
JOIN realizations r ON r.id = p.realization_id
JOIN ensembles e ON e.id = r.ensemble_id";

pub(crate) const DEFINITION_SELECT_SQL: &str = "SELECT
    d.id AS id,
    d.name AS name,
    d.indexes AS indexes,
    d.ensemble_id AS ensemble_id,
    d.observation_id AS observation_id
FROM response_definitions d
JOIN ensembles e ON e.id = d.ensemble_id";

pub(crate) const RESPONSE_SELECT_SQL: &str = "SELECT
    s.id AS id,
    s.name AS name,
    s.response_values AS response_values,
    s.indexes AS indexes,
    s.realization_id AS realization_id,
    s.observation_id AS observation_id,
    r.realization_index AS realization_index
FROM responses s
JOIN realizations r ON r.id = s.realization_id
JOIN ensembles e ON e.id = r.ensemble_id";

pub(crate) const OBSERVATION_SELECT_SQL: &str = "SELECT
    id,
    name,
    key_indexes,
    data_indexes,
    obs_values,
    stds
FROM observations";

/// Runs `sql` and decodes every row with `parse`.
pub(crate) fn query_all<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    parse: impl Fn(&Row<'_>) -> RepoResult<T>,
) -> RepoResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse(row)?);
    }
    Ok(items)
}

/// Runs `sql` and decodes the first row, if any.
pub(crate) fn query_first<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    parse: impl Fn(&Row<'_>) -> RepoResult<T>,
) -> RepoResult<Option<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(parse(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn parse_ensemble(row: &Row<'_>) -> RepoResult<Ensemble> {
    Ok(Ensemble {
        id: row.get("id")?,
        name: row.get("name")?,
    })
}

pub(crate) fn parse_realization(row: &Row<'_>) -> RepoResult<Realization> {
    Ok(Realization {
        id: row.get("id")?,
        index: row.get("realization_index")?,
        ensemble_id: row.get("ensemble_id")?,
    })
}

pub(crate) fn parse_parameter(row: &Row<'_>) -> RepoResult<Parameter> {
    Ok(Parameter {
        id: row.get("id")?,
        name: row.get("name")?,
        group: row.get("group_name")?,
        value: row.get("value")?,
        realization_id: row.get("realization_id")?,
    })
}

pub(crate) fn parse_response_definition(row: &Row<'_>) -> RepoResult<ResponseDefinition> {
    let indexes: Vec<u8> = row.get("indexes")?;
    Ok(ResponseDefinition {
        id: row.get("id")?,
        name: row.get("name")?,
        indexes: decode_labels(&indexes)
            .map_err(|err| column_error("response_definitions.indexes", err))?,
        ensemble_id: row.get("ensemble_id")?,
        observation_id: row.get("observation_id")?,
    })
}

pub(crate) fn parse_response(row: &Row<'_>) -> RepoResult<Response> {
    let values: Vec<u8> = row.get("response_values")?;
    let indexes: Vec<u8> = row.get("indexes")?;
    let response = Response {
        id: row.get("id")?,
        name: row.get("name")?,
        values: decode_floats(&values)
            .map_err(|err| column_error("responses.response_values", err))?,
        indexes: decode_labels(&indexes).map_err(|err| column_error("responses.indexes", err))?,
        realization_id: row.get("realization_id")?,
        observation_id: row.get("observation_id")?,
    };
    if response.values.len() != response.indexes.len() {
        return Err(RepoError::InvalidData(format!(
            "response `{}` stores {} values for {} indexes",
            response.name,
            response.values.len(),
            response.indexes.len()
        )));
    }
    Ok(response)
}

pub(crate) fn parse_indexed_response(row: &Row<'_>) -> RepoResult<(RealizationIndex, Response)> {
    Ok((row.get("realization_index")?, parse_response(row)?))
}

pub(crate) fn parse_observation(row: &Row<'_>) -> RepoResult<Observation> {
    let key_indexes: Vec<u8> = row.get("key_indexes")?;
    let data_indexes: Vec<u8> = row.get("data_indexes")?;
    let values: Vec<u8> = row.get("obs_values")?;
    let stds: Vec<u8> = row.get("stds")?;
    let observation = Observation {
        id: row.get("id")?,
        name: row.get("name")?,
        key_indexes: decode_labels(&key_indexes)
            .map_err(|err| column_error("observations.key_indexes", err))?,
        data_indexes: decode_labels(&data_indexes)
            .map_err(|err| column_error("observations.data_indexes", err))?,
        values: decode_floats(&values).map_err(|err| column_error("observations.obs_values", err))?,
        stds: decode_floats(&stds).map_err(|err| column_error("observations.stds", err))?,
    };
    let len = observation.values.len();
    if [
        observation.key_indexes.len(),
        observation.data_indexes.len(),
        observation.stds.len(),
    ]
    .iter()
    .any(|other| *other != len)
    {
        return Err(RepoError::InvalidData(format!(
            "observation `{}` stores sequences of inconsistent length",
            observation.name
        )));
    }
    Ok(observation)
}

fn column_error(column: &str, err: impl std::fmt::Display) -> RepoError {
    RepoError::InvalidData(format!("{column}: {err}"))
}
