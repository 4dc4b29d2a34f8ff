use std::collections::BTreeMap;

use firstlines_core::{
    build_matrix, AffinityPropagation, ClusterAssignment, ClusterError, Engine, EngineConfig,
    FileMatrixStore, MatrixStore, MemoryMatrixStore, Record, GLOBAL_CACHE_KEY,
};

const WITNESSES: [&str; 11] = [
    "The bees of Hybla have besides sweet honey smarting stings",
    "The Bees of Hybla have beside sweet hony smarting stings",
    "The bees of Hybla, have besides sweet honey; smarting stings.",
    "If eighty-eight be past then thrive",
    "If eightie eight be past, then thrive",
    "If eighty eight be past then thrive",
    "Go, lovely Rose",
    "Goe lovely rose",
    "Go lovely Rose, tell her that wastes her time and me",
    "Drink to me only with thine eyes",
    "Drinke to me onely with thine eyes",
];

const REPEATED: [&str; 8] = [
    "The bees of Hybla have sweet honey",
    "the Bees of hybla, have sweet hony",
    "If eighty-eight be past then thrive",
    "If eightie eight be past",
    "Go, lovely Rose",
    "Goe lovely rose",
    "Drink to me only with thine eyes",
    "",
];

// Draws from REPEATED whose message passing oscillates until the cap.
const OSCILLATING: [usize; 32] = [
    6, 6, 4, 0, 0, 2, 3, 5, 6, 5, 4, 5, 7, 5, 4, 4, 1, 5, 1, 4, 5, 3, 2, 3, 0, 2, 4, 3, 2, 5, 1, 2,
];

fn witnesses() -> Vec<Record> {
    WITNESSES
        .iter()
        .enumerate()
        .map(|(i, text)| Record::new(format!("w{}", 80_000 + i), *text))
        .collect()
}

fn memory_engine() -> Engine<MemoryMatrixStore> {
    Engine::new(EngineConfig::default(), MemoryMatrixStore::default()).unwrap()
}

fn labels(assignment: &ClusterAssignment) -> Vec<usize> {
    assignment.entries.iter().map(|(label, _)| *label).collect()
}

#[test]
fn hybla_scenario() {
    let records = vec![
        Record::new("1", "The bees of Hybla"),
        Record::new("2", "the Bees of hybla"),
        Record::new("3", "Totally different verse"),
    ];
    let engine = memory_engine();
    let estimator = engine.estimator();
    assert_eq!(estimator.distance(&records[0], &records[1]), 0.0);
    assert_eq!(estimator.distance(&records[0], &records[2]), 23.0);
    assert_eq!(estimator.distance(&records[1], &records[2]), 23.0);

    let assignment = engine.cluster_records(&records, GLOBAL_CACHE_KEY).unwrap();
    assert_eq!(assignment.label_of("1"), assignment.label_of("2"));
    assert_ne!(assignment.label_of("1"), assignment.label_of("3"));
    assert_eq!(assignment.cluster_count(), 2);
}

#[test]
fn witnesses_group_by_poem() {
    let assignment = memory_engine()
        .cluster_records(&witnesses(), GLOBAL_CACHE_KEY)
        .unwrap();
    assert_eq!(labels(&assignment), vec![0, 0, 0, 5, 5, 5, 6, 6, 6, 9, 9]);
}

#[test]
fn clustering_is_deterministic() {
    let first = memory_engine()
        .cluster_records(&witnesses(), GLOBAL_CACHE_KEY)
        .unwrap();
    let second = memory_engine()
        .cluster_records(&witnesses(), GLOBAL_CACHE_KEY)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn file_cache_roundtrip_and_stale_shape() {
    let dir = tempfile::tempdir().unwrap();
    let records = witnesses();

    let engine = Engine::new(EngineConfig::default(), FileMatrixStore::new(dir.path())).unwrap();
    let built = engine.matrix(&records, GLOBAL_CACHE_KEY).unwrap();
    assert!(dir.path().join("global.matrix").is_file());

    let reloaded = Engine::new(EngineConfig::default(), FileMatrixStore::new(dir.path()))
        .unwrap()
        .matrix(&records, GLOBAL_CACHE_KEY)
        .unwrap();
    assert_eq!(built, reloaded);
    assert_eq!(engine.store().load(GLOBAL_CACHE_KEY).unwrap(), built);

    let err = engine
        .cluster_records(&records[..4], GLOBAL_CACHE_KEY)
        .unwrap_err();
    assert!(matches!(
        err,
        ClusterError::ShapeMismatch {
            expected: 4,
            found: 11,
            ..
        }
    ));
    assert!(engine.cluster_records(&records[..4], "first_four").is_ok());
}

#[test]
fn subclusters_partition_every_parent() {
    let engine = memory_engine();
    let records = witnesses();
    let top = engine.cluster_records(&records, GLOBAL_CACHE_KEY).unwrap();
    let grouped = top.groups();
    let report = engine.subcluster(&grouped);
    assert!(report.is_complete());
    assert_eq!(report.assignment.len(), grouped.len());

    let expected: BTreeMap<usize, Vec<usize>> = [
        (0, vec![0, 1, 0]),
        (5, vec![0, 1, 0]),
        (6, vec![0, 0, 2]),
        (9, vec![0, 1]),
    ]
    .into_iter()
    .collect();
    for (parent, members) in &grouped {
        let sub = report.assignment.get(*parent).unwrap();
        assert_eq!(sub.len(), members.len());
        for record in members {
            assert!(sub.label_of(&record.id).is_some());
        }
        assert_eq!(&labels(sub), &expected[parent]);
    }

    let rows = report.assignment.rows();
    assert_eq!(rows.len(), records.len());
    assert_eq!(
        engine.store().keys(),
        vec!["cluster_0", "cluster_5", "cluster_6", "cluster_9", "global"]
    );
}

#[test]
fn copies_share_a_cluster_at_the_iteration_cap() {
    let records: Vec<Record> = OSCILLATING
        .iter()
        .enumerate()
        .map(|(i, &line)| Record::new(i.to_string(), REPEATED[line]))
        .collect();
    let engine = memory_engine();
    let matrix = build_matrix(engine.estimator(), &records);
    let clustering = AffinityPropagation::default().cluster(&matrix).unwrap();
    assert!(!clustering.converged);
    assert_eq!(clustering.iterations, 1000);
    for i in 0..records.len() {
        for j in i + 1..records.len() {
            if OSCILLATING[i] == OSCILLATING[j] {
                assert_eq!(clustering.labels[i], clustering.labels[j], "records {i} and {j}");
            }
        }
    }
    for &exemplar in &clustering.exemplars {
        assert_eq!(clustering.labels[exemplar], exemplar);
    }
}

#[test]
fn empty_input_is_vacuous() {
    let engine = memory_engine();
    assert!(engine.cluster_records(&[], GLOBAL_CACHE_KEY).unwrap().is_empty());
    assert!(engine.subcluster(&BTreeMap::new()).assignment.is_empty());
}
