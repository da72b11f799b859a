//! Top-level integration scenarios that exercise the full config-load ->
//! engine-build -> dispatch path, complementing the inline unit tests
//! each module carries for its own piece of the pipeline.

use std::io::Write as _;

use aminer_rs::config::parse::load_config;
use aminer_rs::persistence::{FilePersistenceStore, PersistenceStore};
use aminer_rs::pipeline::Engine;

fn write_config(dir: &std::path::Path, yaml: &str) -> std::path::PathBuf {
    let path = dir.join("config.yml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn write_log(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

/// spec.md §8 scenario: a global `LearnMode: false` override locks every
/// detector regardless of its own `auto_include_flag: true`, so a value
/// outside a pre-seeded range flags immediately instead of widening it.
#[tokio::test]
async fn global_learn_mode_override_locks_a_declared_learner() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = write_log(dir.path(), "metrics.log", "host-a 99\n");
    let persistence_dir = dir.path().join("state");
    let events_path = dir.path().join("events.jsonl");
    let yaml = format!(
        r#"
Parser:
  - id: line
    start: true
    type: sequence
    args: [host, sep, value]
  - id: host
    type: variable_byte
    args: "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-"
  - id: sep
    type: fixed
    args: " "
  - id: value
    type: decimal_integer
Input:
  Sources:
    - id: metrics
      path: {log_path}
Analysis:
  - id: host-range
    type: value_range
    id_path_list: [line/host]
    target_path_list: [line/value]
    auto_include_flag: true
EventHandlers:
  - id: json
    type: json
    path: {events_path}
LearnMode: false
Persistence:
  base_dir: {persistence_dir}
"#,
        log_path = log_path.display(),
        events_path = events_path.display(),
        persistence_dir = persistence_dir.display(),
    );
    let config_path = write_config(dir.path(), &yaml);
    let config = load_config(&config_path).unwrap();

    let store = FilePersistenceStore::new(persistence_dir);
    store.store_json("ValueRangeDetector/host-range", &serde_json::json!({"min": {"host-a": 10.0}, "max": {"host-a": 20.0}})).unwrap();

    let (engine, mut atom_source) = Engine::build(&config).unwrap();
    let atom = atom_source.next_atom().await.unwrap().unwrap();
    engine.dispatch(&atom);

    let events = std::fs::read_to_string(&events_path).unwrap();
    assert!(events.contains("Value range anomaly detected"), "expected an anomaly event, got: {events}");
}

/// spec.md §8 scenario: two sources declared under `MultiSource: true`
/// merge into one non-decreasing-by-timestamp stream before reaching the
/// detectors, rather than being read one source at a time.
#[tokio::test]
async fn multi_source_inputs_merge_in_timestamp_order() {
    let dir = tempfile::tempdir().unwrap();
    let log_a = write_log(dir.path(), "a.log", "1 host-a\n3 host-a\n");
    let log_b = write_log(dir.path(), "b.log", "2 host-b\n4 host-b\n");
    let persistence_dir = dir.path().join("state");
    let yaml = format!(
        r#"
Parser:
  - id: line
    start: true
    type: sequence
    args: [ts, sep, host]
  - id: ts
    type: decimal_integer
  - id: sep
    type: fixed
    args: " "
  - id: host
    type: variable_byte
    args: "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-"
Input:
  Sources:
    - id: source-a
      path: {log_a}
    - id: source-b
      path: {log_b}
  MultiSource: true
  TimestampPath: line/ts
  SourceGracePeriodSeconds: 1
Analysis:
  - id: new-paths
    type: new_match_path
    auto_include_flag: true
Persistence:
  base_dir: {persistence_dir}
"#,
        log_a = log_a.display(),
        log_b = log_b.display(),
        persistence_dir = persistence_dir.display(),
    );
    let config_path = write_config(dir.path(), &yaml);
    let config = load_config(&config_path).unwrap();

    let (engine, mut atom_source) = Engine::build(&config).unwrap();
    let mut timestamps = Vec::new();
    while let Some(atom) = atom_source.next_atom().await.unwrap() {
        engine.dispatch(&atom);
        timestamps.push(atom.timestamp.unwrap());
    }
    assert_eq!(timestamps, vec![1.0, 2.0, 3.0, 4.0]);
}

/// spec.md §8 scenario: a parser tree referencing an undeclared id fails
/// at config-load time, before any source is ever read.
#[tokio::test]
async fn unknown_parser_reference_fails_before_any_source_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = write_log(dir.path(), "access.log", "anything\n");
    let yaml = format!(
        r#"
Parser:
  - id: line
    start: true
    type: sequence
    args: [missing_child]
Input:
  Sources:
    - id: access-log
      path: {log_path}
"#,
        log_path = log_path.display(),
    );
    let config_path = write_config(dir.path(), &yaml);

    let err = load_config(&config_path).unwrap_err();
    assert!(err.to_string().contains("missing_child"), "expected the unresolved reference in the error, got: {err}");
}
