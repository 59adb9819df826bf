// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn pipeflow() -> Command {
    let mut cmd = Command::cargo_bin("pipeflow").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("PIPEFLOW_CONFIG");
    cmd
}

#[test]
fn test_validate_greeting_bundle() {
    pipeflow()
        .arg("validate")
        .arg(fixture("greeting.plx"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded domain 'greeting' with 4 pipes"))
        .stdout(predicate::str::contains("greet_formally"))
        .stdout(predicate::str::contains("Bundle is valid!"));
}

#[test]
fn test_graph_as_mermaid() {
    pipeflow()
        .args(["graph", "--format", "mermaid"])
        .arg(fixture("greeting.plx"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("graph TD"))
        .stdout(predicate::str::contains("greet_all --> greet_one"))
        .stdout(predicate::str::contains("choose_tone --> greet_formally"));
}

#[test]
fn test_dry_run_single_pipe() {
    pipeflow()
        .args(["dry-run", "--pipe", "greet_all", "--sequential"])
        .arg(fixture("greeting.plx"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run passed for 1 pipes"));
}

#[test]
fn test_run_batch_with_inputs() {
    pipeflow()
        .arg("run")
        .arg(fixture("greeting.plx"))
        .arg("--inputs")
        .arg(fixture("people.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello Ada!"))
        .stdout(predicate::str::contains("Hello Linus!"));
}

#[test]
fn test_run_reports_missing_inputs() {
    pipeflow()
        .args(["run", "--pipe", "greet_one"])
        .arg(fixture("greeting.plx"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing inputs: person"));
}

#[test]
fn test_validate_rejects_cyclic_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = dir.path().join("loop.plx");
    std::fs::write(
        &bundle,
        r#"
domain = "loop"

[pipe.a]
type = "PipeSequence"
inputs = { text = "Text" }
output = "Text"
steps = [{ pipe = "b" }]

[pipe.b]
type = "PipeSequence"
inputs = { text = "Text" }
output = "Text"
steps = [{ pipe = "a" }]
"#,
    )
    .unwrap();

    pipeflow()
        .arg("validate")
        .arg(&bundle)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load"));
}

#[test]
fn test_missing_bundle_file() {
    let dir = tempfile::tempdir().unwrap();
    pipeflow()
        .arg("graph")
        .arg(dir.path().join("absent.plx"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Bundle file not found"));
}
