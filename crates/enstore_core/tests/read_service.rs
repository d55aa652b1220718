use enstore_core::service::{CaseInfo, ObservationPoint};
use enstore_core::source::{ObservationData, ParameterTable, ResponseTable};
use enstore_core::{
    extract_all, AxisLabel, EntityKind, ExperimentRepository, ExtractionOptions, InMemorySource,
    KeyKind, ReadService, RepoError, RepositoryOptions, SqliteExperimentRepository,
};
use serde_json::json;

fn new_repo() -> SqliteExperimentRepository {
    SqliteExperimentRepository::open_in_memory(RepositoryOptions::default()).unwrap()
}

fn labels(values: &[i64]) -> Vec<AxisLabel> {
    values.iter().copied().map(AxisLabel::Integer).collect()
}

/// Ensemble "E", realization 0, observation "O" and response "R" linked to it.
fn scenario_repo() -> SqliteExperimentRepository {
    let repo = new_repo();
    repo.add_ensemble("E").unwrap();
    repo.add_realization(0, "E").unwrap();
    let observation = repo
        .add_observation("O", &labels(&[0, 3]), &labels(&[0, 3]), &[10.1, 10.2], &[1.0, 3.0])
        .unwrap();
    repo.add_response(
        "R",
        &[11.1, 11.2],
        &labels(&[0, 1]),
        0,
        "E",
        Some(observation.id),
    )
    .unwrap();
    repo.commit().unwrap();
    repo
}

#[test]
fn list_keys_reports_linked_observation_names() {
    let service = ReadService::new(scenario_repo());

    let keys = service.list_keys("E").unwrap();

    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].key, "R");
    assert_eq!(keys[0].kind, KeyKind::Response);
    assert_eq!(keys[0].observations, ["O"]);
    assert_eq!(keys[0].dimensionality, 2);
    assert_eq!(keys[0].metadata.data_origin, "Response");
}

#[test]
fn fetch_table_returns_values_per_realization() {
    let service = ReadService::new(scenario_repo());

    let table = service.fetch_table("E", "R").unwrap();

    assert_eq!(table.kind, KeyKind::Response);
    assert_eq!(table.columns, labels(&[0, 1]));
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.row(0).unwrap().values, [11.1, 11.2]);
    assert!(table.row(1).is_none());
}

#[test]
fn extracted_ensemble_lists_parameters_before_responses() {
    let repo = new_repo();
    let source = InMemorySource::new()
        .with_observation(
            "WOPR_OP1_9",
            ObservationData::new(labels(&[0]), labels(&[0]), vec![0.5], vec![0.05]),
        )
        .with_parameter(
            "default",
            "SNAKE_OIL_PARAM:OP1_PERSISTENCE",
            ParameterTable::new(vec![(0, 0.3), (1, 0.4)]),
        )
        .with_response(
            "default",
            "WOPR:OP1",
            ResponseTable::new(labels(&[0]))
                .with_realization(0, vec![0.6])
                .with_realization(1, vec![0.7]),
        )
        .with_response(
            "default",
            "FOPR",
            ResponseTable::new(labels(&[0])).with_realization(0, vec![1.0]),
        )
        .with_response_link("WOPR:OP1", "WOPR_OP1_9");
    extract_all(&source, &repo, "default", &ExtractionOptions::default()).unwrap();
    let service = ReadService::new(repo);

    let keys = service.list_keys("default").unwrap();

    let summary: Vec<(&str, KeyKind, Vec<String>)> = keys
        .iter()
        .map(|info| (info.key.as_str(), info.kind, info.observations.clone()))
        .collect();
    assert_eq!(
        summary,
        [
            (
                "SNAKE_OIL_PARAM:OP1_PERSISTENCE",
                KeyKind::Parameter,
                Vec::new()
            ),
            ("WOPR:OP1", KeyKind::Response, vec!["WOPR_OP1_9".to_string()]),
            ("FOPR", KeyKind::Response, Vec::new()),
        ]
    );
    assert_eq!(keys[0].dimensionality, 1);
    assert_eq!(keys[0].metadata.data_origin, "Parameters");

    let parameter = service
        .fetch_table("default", "SNAKE_OIL_PARAM:OP1_PERSISTENCE")
        .unwrap();
    assert_eq!(parameter.kind, KeyKind::Parameter);
    assert_eq!(parameter.columns, labels(&[0]));
    assert_eq!(parameter.row(1).unwrap().values, [0.4]);
}

#[test]
fn fetch_table_for_unknown_key_or_ensemble_is_not_found() {
    let service = ReadService::new(scenario_repo());

    let err = service.fetch_table("E", "MISSING").unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound {
            entity: EntityKind::DataKey,
            ..
        }
    ));

    let err = service.fetch_table("E", "G:MISSING").unwrap_err();
    assert!(err.is_not_found());

    let err = service.list_keys("NOPE").unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound {
            entity: EntityKind::Ensemble,
            ..
        }
    ));
}

#[test]
fn key_info_serializes_with_metadata_block() {
    let service = ReadService::new(scenario_repo());

    let keys = service.list_keys("E").unwrap();
    let value = serde_json::to_value(&keys[0]).unwrap();

    assert_eq!(
        value,
        json!({
            "key": "R",
            "kind": "response",
            "observations": ["O"],
            "dimensionality": 2,
            "metadata": { "data_origin": "Response" }
        })
    );
}

#[test]
fn list_cases_reports_every_ensemble_visible() {
    let repo = scenario_repo();
    repo.add_ensemble("empty").unwrap();
    repo.commit().unwrap();
    let service = ReadService::new(repo);

    let cases = service.list_cases().unwrap();

    assert_eq!(
        cases,
        [
            CaseInfo {
                name: "E".to_string(),
                has_data: true,
                hidden: false,
            },
            CaseInfo {
                name: "empty".to_string(),
                has_data: false,
                hidden: false,
            },
        ]
    );
}

#[test]
fn observations_for_keys_flattens_points() {
    let service = ReadService::new(scenario_repo());

    let points = service.observations_for_keys(&["O"]).unwrap();

    assert_eq!(
        points,
        [
            ObservationPoint {
                key: "O".to_string(),
                key_index: AxisLabel::Integer(0),
                data_index: AxisLabel::Integer(0),
                value: 10.1,
                std: 1.0,
            },
            ObservationPoint {
                key: "O".to_string(),
                key_index: AxisLabel::Integer(3),
                data_index: AxisLabel::Integer(3),
                value: 10.2,
                std: 3.0,
            },
        ]
    );

    let err = service.observations_for_keys(&["O", "MISSING"]).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn read_service_never_stages_writes() {
    let service = ReadService::new(scenario_repo());

    service.list_cases().unwrap();
    service.list_keys("E").unwrap();
    service.fetch_table("E", "R").unwrap();
    let _ = service.fetch_table("E", "MISSING");

    assert!(!service.repository().has_staged_writes());

    let mut repo = service.into_inner();
    repo.close().unwrap();
    assert!(repo.is_closed());
}
