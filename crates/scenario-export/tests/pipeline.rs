use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use prost::Message;
use scenario_export::merge::read_all_records;
use scenario_export::pipeline::TEMP_DIR;
use scenario_export::{
    CancelToken, CollectingSink, ExportOptions, OutputNaming, UnitStatus, export_directory,
    run_export,
};
use scenario_proto::Scenario;
use serde_json::{Value, json};
use tempfile::tempdir;

fn scenario(id: &str, sdc: &str) -> Value {
    json!({
        "metadata": {"id": id, "ts": [0.0, 0.1], "sdc_id": sdc},
        "tracks": {
            "1": {
                "type": "VEHICLE",
                "state": {
                    "position": [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
                    "length": [4.0, 4.0], "width": [2.0, 2.0], "height": [1.5, 1.5],
                    "heading": [0.0, 0.0],
                    "velocity": [[10.0, 0.0], [10.0, 0.0]],
                    "valid": [true, true]
                },
                "metadata": {"track_length": 2}
            },
            "ped": {
                "type": "PEDESTRIAN",
                "state": {
                    "position": [[5.0, 5.0, 0.0], [0.0, 0.0, 0.0]],
                    "length": [0.5, 0.0], "width": [0.5, 0.0], "height": [1.8, 0.0],
                    "heading": [0.0, 0.0],
                    "velocity": [[1.0, 0.0], [0.0, 0.0]],
                    "valid": [true, false]
                }
            }
        },
        "map_features": {
            "100": {"type": "SURFACE_STREET", "speed_limit_mph": 30.0, "polyline": [[0.0, 0.0], [10.0, 0.0]]},
            "200": {"type": "STOP_SIGN", "position": [10.0, 0.0, 0.0], "lane": [100]}
        },
        "dynamic_map_states": {"traffic_light_states": {"100": {"state": ["GO", "STOP"]}}}
    })
}

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
    path
}

fn write_gz(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    enc.write_all(&serde_json::to_vec(value).unwrap()).unwrap();
    enc.finish().unwrap();
    path
}

fn options(input: &Path, output: &Path) -> ExportOptions {
    let mut opts = ExportOptions::new(input, output);
    opts.num_workers = 3;
    opts.show_progress = false;
    opts
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

fn decode_all(path: &Path) -> Vec<Scenario> {
    read_all_records(path)
        .unwrap()
        .iter()
        .map(|r| Scenario::decode(r.as_slice()).unwrap())
        .collect()
}

#[test]
fn one_bad_file_does_not_stop_the_rest() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    for i in 0..4 {
        write_json(input.path(), &format!("s{i}.json"), &scenario(&format!("id-{i}"), "1"));
    }
    fs::write(input.path().join("broken.json"), b"{ not json").unwrap();
    let mut missing = scenario("id-x", "1");
    missing["metadata"].as_object_mut().unwrap().remove("ts");
    write_json(input.path(), "missing.json", &missing);

    let sink = CollectingSink::new();
    let summary =
        export_directory(&options(input.path(), output.path()), &sink, &CancelToken::new())
            .unwrap();

    assert_eq!(summary.total(), 6);
    assert_eq!(summary.succeeded.len(), 4);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.cancelled, 0);
    assert_eq!(
        file_names(output.path()),
        ["s0.tfrecord", "s1.tfrecord", "s2.tfrecord", "s3.tfrecord"]
    );

    let failures: HashMap<_, _> = summary
        .outcomes
        .iter()
        .filter_map(|o| match &o.status {
            UnitStatus::Failed(msg) => Some((o.input.file_name().unwrap().to_owned(), msg.clone())),
            _ => None,
        })
        .collect();
    assert!(failures[std::ffi::OsStr::new("missing.json")].contains("metadata.ts"));
    assert!(failures[std::ffi::OsStr::new("broken.json")].contains("failed to parse"));
}

#[test]
fn each_output_holds_one_decodable_scenario() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_gz(input.path(), "compressed.json.gz", &scenario("gz-1", "ped"));

    let summary = export_directory(
        &options(input.path(), output.path()),
        &CollectingSink::new(),
        &CancelToken::new(),
    )
    .unwrap();
    let path = output.path().join("compressed.tfrecord");
    assert_eq!(summary.succeeded, vec![path.clone()]);

    let decoded = decode_all(&path);
    assert_eq!(decoded.len(), 1);
    let s = &decoded[0];
    assert_eq!(s.scenario_id.as_deref(), Some("gz-1"));
    assert_eq!(s.sdc_track_index, Some(1));
    assert_eq!(s.tracks[1].states[1].valid, Some(false));
    assert_eq!(s.tracks[1].states[1].center_x, None);
    assert_eq!(s.map_features.len(), 2);
    assert_eq!(s.dynamic_map_states.len(), 2);
}

#[test]
fn merged_file_matches_individual_exports() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    for name in ["c", "a", "b"] {
        write_json(input.path(), &format!("{name}.json"), &scenario(name, "1"));
    }
    fs::write(input.path().join("zzz.json"), b"[]").unwrap();

    let summary = run_export(
        &options(input.path(), output.path()),
        Some("all.tfrecord"),
        &CollectingSink::new(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(summary.export.failed, 1);
    let merge = summary.merge.unwrap();
    assert_eq!((merge.files, merge.records), (3, 3));

    let temp = output.path().join(TEMP_DIR);
    let mut individual = Vec::new();
    for name in ["a", "b", "c"] {
        individual.extend(read_all_records(&temp.join(format!("{name}.tfrecord"))).unwrap());
    }
    let merged = read_all_records(&output.path().join("all.tfrecord")).unwrap();
    assert_eq!(merged, individual);

    let ids: Vec<_> = decode_all(&output.path().join("all.tfrecord"))
        .into_iter()
        .map(|s| s.scenario_id.unwrap())
        .collect();
    assert_eq!(ids, ["a", "b", "c"]);
}

#[test]
fn repeated_runs_are_byte_identical() {
    let input = tempdir().unwrap();
    for i in 0..5 {
        write_json(input.path(), &format!("{i}.json"), &scenario(&format!("det-{i}"), "1"));
    }
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    for out in [&first, &second] {
        run_export(
            &options(input.path(), out.path()),
            Some("merged.tfrecord"),
            &CollectingSink::new(),
            &CancelToken::new(),
        )
        .unwrap();
    }
    assert_eq!(
        fs::read(first.path().join("merged.tfrecord")).unwrap(),
        fs::read(second.path().join("merged.tfrecord")).unwrap()
    );
    for i in 0..5 {
        let name = format!("{TEMP_DIR}/{i}.tfrecord");
        assert_eq!(
            fs::read(first.path().join(&name)).unwrap(),
            fs::read(second.path().join(&name)).unwrap()
        );
    }
}

#[test]
fn cancelled_run_starts_nothing() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    for i in 0..3 {
        write_json(input.path(), &format!("{i}.json"), &scenario("x", "1"));
    }
    let cancel = CancelToken::new();
    cancel.cancel();

    let summary = run_export(
        &options(input.path(), output.path()),
        Some("merged.tfrecord"),
        &CollectingSink::new(),
        &cancel,
    )
    .unwrap();
    assert_eq!(summary.export.cancelled, 3);
    assert!(summary.export.succeeded.is_empty());
    assert!(summary.merge.is_none());
    assert!(file_names(&output.path().join(TEMP_DIR)).is_empty());
    assert!(!output.path().join("merged.tfrecord").exists());
}

#[test]
fn scenario_id_naming_and_collisions() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_json(input.path(), "first.json", &scenario("shared", "1"));
    write_json(input.path(), "second.json", &scenario("shared", "1"));
    write_json(input.path(), "third.json", &scenario("unique", "1"));

    let mut opts = options(input.path(), output.path());
    opts.naming = OutputNaming::ScenarioId;
    let summary = export_directory(&opts, &CollectingSink::new(), &CancelToken::new()).unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(
        file_names(output.path()),
        ["shared.tfrecord", "unique.tfrecord"]
    );
}

#[test]
fn existing_outputs_need_overwrite() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_json(input.path(), "a.json", &scenario("a", "1"));
    let mut opts = options(input.path(), output.path());

    let sink = CollectingSink::new();
    let cancel = CancelToken::new();
    assert_eq!(export_directory(&opts, &sink, &cancel).unwrap().succeeded.len(), 1);

    let again = export_directory(&opts, &sink, &cancel).unwrap();
    assert_eq!(again.failed, 1);
    match &again.outcomes[0].status {
        UnitStatus::Failed(msg) => assert!(msg.contains("--overwrite")),
        other => panic!("expected failure, got {other:?}"),
    }

    opts.overwrite = true;
    assert_eq!(export_directory(&opts, &sink, &cancel).unwrap().failed, 0);
}

#[test]
fn overrunning_units_leave_no_output() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_json(input.path(), "a.json", &scenario("a", "1"));
    write_json(input.path(), "b.json", &scenario("b", "1"));

    let mut opts = options(input.path(), output.path());
    opts.unit_timeout = Some(Duration::ZERO);
    let summary = export_directory(&opts, &CollectingSink::new(), &CancelToken::new()).unwrap();

    assert_eq!(summary.failed, 2);
    for outcome in &summary.outcomes {
        match &outcome.status {
            UnitStatus::Failed(msg) => assert!(msg.contains("budget"), "{msg}"),
            other => panic!("expected deadline failure, got {other:?}"),
        }
    }
    assert!(file_names(output.path()).is_empty());
}

#[test]
fn missing_sdc_still_exports_with_a_diagnostic() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_json(input.path(), "a.json", &scenario("scn-a", "nobody"));

    let sink = CollectingSink::new();
    let summary =
        export_directory(&options(input.path(), output.path()), &sink, &CancelToken::new())
            .unwrap();
    assert_eq!(summary.succeeded.len(), 1);
    let entries = sink.entries();
    assert!(entries.iter().any(|(id, d)| id == "scn-a"
        && matches!(d, scenario_export::Diagnostic::MissingSdcTrack { .. })));
    let decoded = decode_all(&summary.succeeded[0]);
    assert_eq!(decoded[0].sdc_track_index, None);
}
