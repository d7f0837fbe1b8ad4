use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::Path;

fn init(dir: &Path) {
    cargo_bin_cmd!("devins")
        .args(["init", dir.to_str().unwrap(), "--name", "demo"])
        .assert()
        .success();
}

fn config(dir: &Path) -> String {
    dir.join("devins.yaml").to_str().unwrap().to_string()
}

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_init_creates_project() {
    let dir = tempfile::tempdir().unwrap();
    init(dir.path());

    assert!(dir.path().join("devins.yaml").exists());
    assert!(dir.path().join("prompts/hello.devin").exists());
    assert!(dir.path().join(".devins/commands/summary.devin").exists());
    assert!(dir.path().join(".devins/agents/reviewer.devin").exists());

    // A second init refuses to overwrite
    cargo_bin_cmd!("devins")
        .args(["init", dir.path().to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn test_compile_sample() {
    let dir = tempfile::tempdir().unwrap();
    init(dir.path());
    let hello = dir.path().join("prompts/hello.devin");

    cargo_bin_cmd!("devins")
        .args(["--config", &config(dir.path()), "compile", hello.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello, world! Welcome to demo"));
}

#[test]
fn test_compile_with_vars_and_custom_command() {
    let dir = tempfile::tempdir().unwrap();
    init(dir.path());
    let file = write(dir.path(), "ask.devin", "Hi $who, /summary:notes");

    cargo_bin_cmd!("devins")
        .args([
            "--config",
            &config(dir.path()),
            "compile",
            &file,
            "--var",
            "who=Ada",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Hi Ada, Summarize notes in three bullet points.",
        ));
}

#[test]
fn test_compile_json() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "a.devin", "n=$n");

    let output = cargo_bin_cmd!("devins")
        .current_dir(dir.path())
        .args(["compile", &file, "--var", "n=3", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let result: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(result["output"], "n=3");
    assert_eq!(result["statistics"]["variable_count"], 1);
    assert_eq!(result["has_error"], false);
}

#[test]
fn test_strict_compile_fails() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "a.devin", "Hello $missing");

    cargo_bin_cmd!("devins")
        .current_dir(dir.path())
        .args(["compile", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello $missing"));

    cargo_bin_cmd!("devins")
        .current_dir(dir.path())
        .args(["compile", &file, "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Compilation of"));
}

#[test]
fn test_validate() {
    let dir = tempfile::tempdir().unwrap();
    init(dir.path());
    let good = write(dir.path(), "good.devin", "#if($a) yes #end");
    let bad = write(dir.path(), "bad.devin", "---\nwhen: { $a\n---\nbody");

    cargo_bin_cmd!("devins")
        .args(["--config", &config(dir.path()), "validate"])
        .assert()
        .success();
    cargo_bin_cmd!("devins")
        .args(["--config", &config(dir.path()), "validate", &good])
        .assert()
        .success();
    cargo_bin_cmd!("devins")
        .args(["--config", &config(dir.path()), "validate", &bad])
        .assert()
        .failure();
}

#[test]
fn test_validate_without_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    cargo_bin_cmd!("devins")
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_parse_prints_ast() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "a.devin", "Read /file:a.txt for $who");

    let output = cargo_bin_cmd!("devins")
        .args(["parse", &file])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let document: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let nodes = document["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 4);
    assert_eq!(nodes[1]["text"], "/file:a.txt");
}
