//! End-to-end tests of the `cla` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fmt::Write as _;
use tempfile::TempDir;

fn cla(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cla").expect("binary built");
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    cmd
}

fn categorical_csv(rows: usize) -> String {
    let mut out = String::from("region,band,score\n");
    for i in 0..rows {
        writeln!(out, "{},{},{}", i % 4, (i % 4) * 10, (i % 7) as f64 * 0.5).unwrap();
    }
    out
}

#[test]
fn test_compress_inspect_decompress_round_trip() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("in.csv"), categorical_csv(500)).unwrap();

    cla(&dir)
        .args(["compress", "in.csv", "m.cla", "--header", "--parallelism", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Compressed 500 x 3 matrix"));

    cla(&dir)
        .args(["inspect", "m.cla"])
        .assert()
        .success()
        .stdout(predicate::str::contains("500 x 3"))
        .stdout(predicate::str::contains("DDC8"));

    cla(&dir)
        .args(["decompress", "m.cla", "out.csv"])
        .assert()
        .success();

    let original: Vec<String> = categorical_csv(500).lines().skip(1).map(String::from).collect();
    let restored = std::fs::read_to_string(dir.path().join("out.csv")).unwrap();
    let restored: Vec<&str> = restored.lines().collect();
    assert_eq!(restored.len(), original.len());
    for (a, b) in restored.iter().zip(&original) {
        let a: Vec<f64> = a.split(',').map(|v| v.parse().unwrap()).collect();
        let b: Vec<f64> = b.split(',').map(|v| v.parse().unwrap()).collect();
        assert_eq!(a, b);
    }
}

#[test]
fn test_inspect_json_output() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("in.csv"), categorical_csv(300)).unwrap();
    cla(&dir)
        .args(["compress", "in.csv", "m.cla", "--header"])
        .assert()
        .success();

    let output = cla(&dir)
        .args(["inspect", "m.cla", "--format", "json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["rows"], 300);
    assert_eq!(json["cols"], 3);
    assert_eq!(json["compressed"], true);
}

#[test]
fn test_compress_stats_as_json() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("in.csv"), categorical_csv(300)).unwrap();

    cla(&dir)
        .args(["compress", "in.csv", "m.cla", "--header", "--stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"phases\""))
        .stdout(predicate::str::contains("\"original_size\""));
}

#[test]
fn test_incompressible_input_is_stored_uncompressed() {
    let dir = TempDir::new().unwrap();
    let mut csv = String::new();
    for i in 0..50 {
        writeln!(csv, "{},{}", f64::from(i) * 1.1, f64::from(i) * 2.3).unwrap();
    }
    std::fs::write(dir.path().join("in.csv"), csv).unwrap();

    cla(&dir)
        .args(["compress", "in.csv", "m.cla"])
        .assert()
        .success()
        .stdout(predicate::str::contains("uncompressed"));

    cla(&dir)
        .args(["inspect", "m.cla", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"compressed\": false"));
}

#[test]
fn test_config_file_is_applied() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("in.csv"), categorical_csv(300)).unwrap();
    std::fs::write(
        dir.path().join("cla.toml"),
        "[compression]\nparallelism = 0\n",
    )
    .unwrap();

    cla(&dir)
        .args(["compress", "in.csv", "m.cla", "--header"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parallelism"));
}

#[test]
fn test_bad_csv_reports_location() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("in.csv"), "1,2\n3,oops\n").unwrap();

    cla(&dir)
        .args(["compress", "in.csv", "m.cla"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("row 2, column 2"));
}

#[test]
fn test_corrupt_matrix_file_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("m.cla"), [1u8, 0, 0]).unwrap();

    cla(&dir)
        .args(["inspect", "m.cla"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CLA-003"));
}
