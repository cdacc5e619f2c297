//! Command line behavior of the `classshrink` binary

#[path = "../common/mod.rs"]
mod common;

use assert_cmd::Command;
use common::*;
use predicates::prelude::*;
use std::fs;

fn classshrink(ws: &Workspace) -> Command {
    let mut cmd = Command::cargo_bin("classshrink").unwrap();
    cmd.current_dir(ws.temp.path());
    cmd
}

/// Main -> Helper, plus an unused class, and a rules file keeping main
fn project(ws: &Workspace) {
    ws.add_program(&main_class(construct("com/example/Helper")));
    ws.add_program(&ClassBuilder::new("com/example/Helper").default_constructor());
    ws.add_program(&ClassBuilder::new("com/example/Dead").default_constructor());
    fs::write(ws.temp.path().join("app.pro"), KEEP_MAIN).unwrap();
}

fn json_summary(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).unwrap()
}

#[test]
fn test_help() {
    Command::cargo_bin("classshrink")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Remove unreachable code"))
        .stdout(predicate::str::contains("--program"))
        .stdout(predicate::str::contains("--incremental"));
}

#[test]
fn test_version() {
    Command::cargo_bin("classshrink")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_program_directories() {
    let ws = Workspace::new();
    classshrink(&ws)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No program directories"));
}

#[test]
fn test_empty_program_directory() {
    let ws = Workspace::new();
    classshrink(&ws)
        .args(["-p", "classes", "-o", "out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No program class files found."));
}

#[test]
fn test_misspelled_program_directory_fails() {
    let ws = Workspace::new();
    project(&ws);

    classshrink(&ws)
        .args(["-p", "clases", "-o", "out", "-k", "app.pro"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read program directories"));
    assert!(!ws.output.exists());
}

#[test]
fn test_output_inside_program_directory_fails() {
    let ws = Workspace::new();
    project(&ws);

    classshrink(&ws)
        .args(["-p", "classes", "-o", "classes", "-k", "app.pro"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("overlaps input directory"));
    assert!(ws.program.join("com/example/Dead.class").exists());
}

#[test]
fn test_json_summary() {
    let ws = Workspace::new();
    project(&ws);

    let assert = classshrink(&ws)
        .args(["-p", "classes", "-o", "out", "-k", "app.pro", "-f", "json"])
        .assert()
        .success();
    let summary = json_summary(&assert.get_output().stdout);

    assert_eq!(summary["version"], "1.0");
    assert_eq!(summary["mode"], "full");
    assert_eq!(summary["classes"]["total"], 3);
    assert_eq!(summary["classes"]["kept"], 2);
    assert_eq!(summary["written"], 2);
    assert!(ws.output_path("com/example/Helper").exists());
    assert!(!ws.output_path("com/example/Dead").exists());
}

#[test]
fn test_incremental_flag_reuses_snapshot() {
    let ws = Workspace::new();
    project(&ws);
    let args = ["-p", "classes", "-o", "out", "-k", "app.pro", "-f", "json", "--incremental"];

    let first = classshrink(&ws).args(args).assert().success();
    let first = json_summary(&first.get_output().stdout);
    assert_eq!(first["mode"], "full");
    assert!(first["fallback_reason"].is_string());
    assert!(ws.temp.path().join(".out-state/shrinker-state.json").exists());

    let second = classshrink(&ws).args(args).assert().success();
    let second = json_summary(&second.get_output().stdout);
    assert_eq!(second["mode"], "incremental");
    assert!(second["fallback_reason"].is_null());
}

#[test]
fn test_usage_file() {
    let ws = Workspace::new();
    project(&ws);

    classshrink(&ws)
        .args(["-p", "classes", "-o", "out", "-k", "app.pro", "-q", "--usage", "usage.txt"])
        .assert()
        .success();

    let usage = fs::read_to_string(ws.temp.path().join("usage.txt")).unwrap();
    assert!(usage.contains("com.example.Dead\n"));
    assert!(!usage.contains("com.example.Helper\n"));
}

#[test]
fn test_config_file() {
    let ws = Workspace::new();
    project(&ws);
    fs::write(
        ws.temp.path().join(".shrinker.yml"),
        "program:\n  - classes\noutput: shrunk\nkeep_rules:\n  - app.pro\nreport:\n  format: json\n",
    )
    .unwrap();

    let assert = classshrink(&ws).assert().success();
    let summary = json_summary(&assert.get_output().stdout);

    assert_eq!(summary["classes"]["kept"], 2);
    assert!(ws.temp.path().join("shrunk/com/example/Main.class").exists());
}

#[test]
fn test_invalid_rules_fail() {
    let ws = Workspace::new();
    project(&ws);
    fs::write(ws.temp.path().join("bad.pro"), "-dontshrink\n").unwrap();

    classshrink(&ws)
        .args(["-p", "classes", "-o", "out", "-k", "bad.pro"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("-dontshrink"));
}
