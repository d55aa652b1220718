use enstore_core::model::axis::positional_axis;
use enstore_core::{
    AxisLabel, EntityKind, ExperimentRepository, ObservationLinkPolicy, ParameterKey, RepoError,
    RepositoryOptions, SqliteExperimentRepository,
};

fn new_repo() -> SqliteExperimentRepository {
    let repo = SqliteExperimentRepository::open_in_memory(RepositoryOptions::default()).unwrap();
    assert_eq!(repo.options().observation_link, ObservationLinkPolicy::Eager);
    repo
}

fn lenient_repo() -> SqliteExperimentRepository {
    SqliteExperimentRepository::open_in_memory(RepositoryOptions {
        observation_link: ObservationLinkPolicy::Lenient,
    })
    .unwrap()
}

fn labels(values: &[i64]) -> Vec<AxisLabel> {
    values.iter().copied().map(AxisLabel::Integer).collect()
}

fn seed_realization(repo: &SqliteExperimentRepository, ensemble: &str, index: i64) {
    if repo.get_ensemble(ensemble).unwrap().is_none() {
        repo.add_ensemble(ensemble).unwrap();
    }
    repo.add_realization(index, ensemble).unwrap();
}

#[test]
fn add_ensemble_twice_fails_with_duplicate_key() {
    let repo = new_repo();

    let ensemble = repo.add_ensemble("default").unwrap();
    assert_eq!(ensemble.name, "default");

    let err = repo.add_ensemble("default").unwrap_err();
    match err {
        RepoError::DuplicateKey { entity, key } => {
            assert_eq!(entity, EntityKind::Ensemble);
            assert_eq!(key, "default");
        }
        other => panic!("unexpected error: {other}"),
    }

    let loaded = repo.get_ensemble("default").unwrap().unwrap();
    assert_eq!(loaded, ensemble);
    assert!(repo.get_ensemble("missing").unwrap().is_none());
}

#[test]
fn list_ensembles_keeps_creation_order() {
    let repo = new_repo();
    repo.add_ensemble("prior").unwrap();
    repo.add_ensemble("posterior").unwrap();

    let names: Vec<String> = repo
        .list_ensembles()
        .unwrap()
        .into_iter()
        .map(|ensemble| ensemble.name)
        .collect();
    assert_eq!(names, ["prior", "posterior"]);
}

#[test]
fn realization_index_is_unique_per_ensemble_only() {
    let repo = new_repo();
    seed_realization(&repo, "prior", 0);
    seed_realization(&repo, "posterior", 0);

    let err = repo.add_realization(0, "prior").unwrap_err();
    assert!(err.is_duplicate_key());

    let prior = repo.get_realization(0, "prior").unwrap().unwrap();
    let posterior = repo.get_realization(0, "posterior").unwrap().unwrap();
    assert_ne!(prior.id, posterior.id);
    assert_ne!(prior.ensemble_id, posterior.ensemble_id);
}

#[test]
fn add_realization_requires_existing_ensemble() {
    let repo = new_repo();

    let err = repo.add_realization(0, "missing").unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound {
            entity: EntityKind::Ensemble,
            ..
        }
    ));
    assert!(repo.get_realization(0, "missing").unwrap().is_none());
}

#[test]
fn add_realizations_is_all_or_nothing() {
    let repo = new_repo();
    seed_realization(&repo, "default", 2);

    let err = repo.add_realizations(&[0, 1, 2, 3], "default").unwrap_err();
    assert!(err.is_duplicate_key());

    let indexes: Vec<i64> = repo
        .list_realizations("default")
        .unwrap()
        .into_iter()
        .map(|realization| realization.index)
        .collect();
    assert_eq!(indexes, [2]);

    let added = repo.add_realizations(&[1, 0], "default").unwrap();
    assert_eq!(added.len(), 2);
    let indexes: Vec<i64> = repo
        .list_realizations("default")
        .unwrap()
        .into_iter()
        .map(|realization| realization.index)
        .collect();
    assert_eq!(indexes, [0, 1, 2]);
}

#[test]
fn parameter_natural_key_is_name_group_and_realization() {
    let repo = new_repo();
    seed_realization(&repo, "default", 0);
    seed_realization(&repo, "default", 1);

    repo.add_parameter("OP1_PERSISTENCE", "SNAKE_OIL_PARAM", 0.3, 0, "default")
        .unwrap();
    repo.add_parameter("OP1_PERSISTENCE", "SNAKE_OIL_PARAM", 0.4, 1, "default")
        .unwrap();
    repo.add_parameter("OP1_PERSISTENCE", "OTHER_GROUP", 7.0, 0, "default")
        .unwrap();

    let err = repo
        .add_parameter("OP1_PERSISTENCE", "SNAKE_OIL_PARAM", 0.9, 0, "default")
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::DuplicateKey {
            entity: EntityKind::Parameter,
            ..
        }
    ));

    let loaded = repo
        .get_parameter("OP1_PERSISTENCE", "SNAKE_OIL_PARAM", 1, "default")
        .unwrap()
        .unwrap();
    assert_eq!(loaded.value, 0.4);
    assert_eq!(loaded.group, "SNAKE_OIL_PARAM");
}

#[test]
fn add_parameter_for_unknown_realization_is_not_found() {
    let repo = new_repo();
    repo.add_ensemble("default").unwrap();

    let err = repo
        .add_parameter("A", "G", 1.0, 5, "default")
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound {
            entity: EntityKind::Realization,
            ..
        }
    ));
}

#[test]
fn parameter_keys_and_values_are_scoped_to_one_ensemble() {
    let repo = new_repo();
    seed_realization(&repo, "prior", 0);
    seed_realization(&repo, "prior", 1);
    seed_realization(&repo, "posterior", 0);

    repo.add_parameter("B", "G", 2.0, 1, "prior").unwrap();
    repo.add_parameter("A", "G", 1.0, 0, "prior").unwrap();
    repo.add_parameter("B", "G", 3.0, 0, "prior").unwrap();
    repo.add_parameter("C", "G", 9.0, 0, "posterior").unwrap();

    let keys = repo.list_parameter_keys("prior").unwrap();
    assert_eq!(keys, [ParameterKey::new("G", "B"), ParameterKey::new("G", "A")]);

    let values = repo
        .parameter_values("prior", &ParameterKey::new("G", "B"))
        .unwrap();
    assert_eq!(values, [(0, 3.0), (1, 2.0)]);
}

#[test]
fn response_length_mismatch_leaves_no_row() {
    let repo = new_repo();
    seed_realization(&repo, "default", 0);

    let err = repo
        .add_response("FOPR", &[1.0, 2.0, 3.0], &labels(&[0, 1]), 0, "default", None)
        .unwrap_err();
    match err {
        RepoError::LengthMismatch {
            entity,
            name,
            expected,
            actual,
        } => {
            assert_eq!(entity, EntityKind::Response);
            assert_eq!(name, "FOPR");
            assert_eq!(expected, 2);
            assert_eq!(actual, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(repo.get_response("FOPR", 0, "default").unwrap().is_none());
}

#[test]
fn response_must_match_definition_axis_length() {
    let repo = new_repo();
    seed_realization(&repo, "default", 0);
    repo.add_response_definition("FOPR", &labels(&[0, 1, 2]), "default", None)
        .unwrap();

    let err = repo
        .add_response("FOPR", &[1.0, 2.0], &labels(&[0, 1]), 0, "default", None)
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::LengthMismatch {
            expected: 3,
            actual: 2,
            ..
        }
    ));
}

#[test]
fn response_roundtrip_preserves_values_and_mixed_axis() {
    let repo = new_repo();
    seed_realization(&repo, "default", 0);
    let axis = vec![
        AxisLabel::Text("2010-01-01".to_string()),
        AxisLabel::Text("2010-02-01".to_string()),
    ];

    repo.add_response("FOPR", &[11.1, 11.2], &axis, 0, "default", None)
        .unwrap();
    let err = repo
        .add_response("FOPR", &[0.0, 0.0], &axis, 0, "default", None)
        .unwrap_err();
    assert!(err.is_duplicate_key());

    let loaded = repo.get_response("FOPR", 0, "default").unwrap().unwrap();
    assert_eq!(loaded.values, [11.1, 11.2]);
    assert_eq!(loaded.indexes, axis);
    assert_eq!(loaded.observation_id, None);

    let series = repo.response_series("default", "FOPR").unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].0, 0);
}

#[test]
fn observation_sequences_must_have_equal_length() {
    let repo = new_repo();

    let err = repo
        .add_observation(
            "WOPR_OP1",
            &labels(&[0, 3]),
            &labels(&[0, 3]),
            &[10.1, 10.2],
            &[1.0],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::LengthMismatch {
            entity: EntityKind::Observation,
            expected: 2,
            actual: 1,
            ..
        }
    ));
    assert!(repo.get_observation("WOPR_OP1").unwrap().is_none());
}

#[test]
fn observation_name_is_globally_unique() {
    let repo = new_repo();
    let stored = repo
        .add_observation("O", &labels(&[0, 3]), &labels(&[0, 3]), &[10.1, 10.2], &[1.0, 3.0])
        .unwrap();

    let err = repo
        .add_observation("O", &labels(&[0]), &labels(&[0]), &[1.0], &[1.0])
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::DuplicateKey {
            entity: EntityKind::Observation,
            ..
        }
    ));

    let by_name = repo.get_observation("O").unwrap().unwrap();
    let by_id = repo.get_observation_by_id(stored.id).unwrap().unwrap();
    assert_eq!(by_name, by_id);
    assert_eq!(by_name.stds, [1.0, 3.0]);
    assert_eq!(repo.all_observation_keys().unwrap(), ["O"]);
}

#[test]
fn eager_policy_rejects_definition_with_unknown_observation() {
    let repo = new_repo();
    repo.add_ensemble("default").unwrap();

    let err = repo
        .add_response_definition("FOPR", &positional_axis(2), "default", Some("missing"))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound {
            entity: EntityKind::Observation,
            ..
        }
    ));
    assert!(repo
        .get_response_definition("FOPR", "default")
        .unwrap()
        .is_none());
}

#[test]
fn lenient_policy_stores_definition_unlinked() {
    let repo = lenient_repo();
    assert_eq!(
        repo.options().observation_link,
        ObservationLinkPolicy::Lenient
    );
    repo.add_ensemble("default").unwrap();

    let definition = repo
        .add_response_definition("FOPR", &positional_axis(2), "default", Some("missing"))
        .unwrap();
    assert_eq!(definition.observation_id, None);
}

#[test]
fn definition_links_existing_observation() {
    let repo = new_repo();
    repo.add_ensemble("default").unwrap();
    let observation = repo
        .add_observation("O", &labels(&[0]), &labels(&[0]), &[1.0], &[0.1])
        .unwrap();

    repo.add_response_definition("R", &positional_axis(1), "default", Some("O"))
        .unwrap();

    let loaded = repo.get_response_definition("R", "default").unwrap().unwrap();
    assert_eq!(loaded.observation_id, Some(observation.id));
    assert_eq!(loaded.indexes, labels(&[0]));
    assert_eq!(repo.list_response_definitions("default").unwrap(), [loaded]);
}

#[test]
fn commit_with_dangling_observation_link_fails_and_discards_batch() {
    let repo = new_repo();
    seed_realization(&repo, "default", 0);
    repo.add_response("R", &[1.0], &labels(&[0]), 0, "default", Some(999))
        .unwrap();

    let err = repo.commit().unwrap_err();
    assert!(matches!(err, RepoError::Integrity(_)), "got {err}");
    assert!(!repo.has_staged_writes());
    assert!(repo.get_ensemble("default").unwrap().is_none());
    assert!(repo.get_response("R", 0, "default").unwrap().is_none());
}

#[test]
fn rollback_discards_staged_writes() {
    let repo = new_repo();
    repo.add_ensemble("kept").unwrap();
    repo.commit().unwrap();

    repo.add_ensemble("discarded").unwrap();
    assert!(repo.has_staged_writes());
    repo.rollback().unwrap();

    assert!(repo.get_ensemble("kept").unwrap().is_some());
    assert!(repo.get_ensemble("discarded").unwrap().is_none());
}

#[test]
fn in_transaction_commits_on_ok_and_rolls_back_on_error() {
    let repo = new_repo();

    repo.in_transaction(|repo| repo.add_ensemble("committed"))
        .unwrap();
    assert!(!repo.has_staged_writes());

    let err = repo
        .in_transaction(|repo| {
            repo.add_ensemble("rolled_back")?;
            repo.add_ensemble("committed")
        })
        .unwrap_err();
    assert!(err.is_duplicate_key());

    assert!(repo.get_ensemble("committed").unwrap().is_some());
    assert!(repo.get_ensemble("rolled_back").unwrap().is_none());
}

#[test]
fn closed_repository_rejects_every_operation() {
    let mut repo = new_repo();
    repo.close().unwrap();
    repo.close().unwrap();

    assert!(repo.is_closed());
    assert!(matches!(repo.add_ensemble("x"), Err(RepoError::Closed)));
    assert!(matches!(repo.get_ensemble("x"), Err(RepoError::Closed)));
    assert!(matches!(repo.commit(), Err(RepoError::Closed)));
}

#[test]
fn committed_writes_survive_reopen_and_dropped_writes_do_not() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("experiments.db");

    {
        let mut repo =
            SqliteExperimentRepository::open(&path, RepositoryOptions::default()).unwrap();
        repo.add_ensemble("committed").unwrap();
        repo.commit().unwrap();
        repo.add_ensemble("closed_uncommitted").unwrap();
        repo.close().unwrap();
    }
    {
        let repo = SqliteExperimentRepository::open(&path, RepositoryOptions::default()).unwrap();
        repo.add_ensemble("dropped_uncommitted").unwrap();
    }

    let repo = SqliteExperimentRepository::open(&path, RepositoryOptions::default()).unwrap();
    let names: Vec<String> = repo
        .list_ensembles()
        .unwrap()
        .into_iter()
        .map(|ensemble| ensemble.name)
        .collect();
    assert_eq!(names, ["committed"]);
}
