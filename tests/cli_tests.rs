mod common;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use std::str;
use tempfile::tempdir;

use common::{graph_bytes, graph_with_attrs_bytes, saved_model_bytes};

fn get_cli_path() -> &'static str {
    env!("CARGO_BIN_EXE_freeze_saved_model")
}

fn run_cli(model_dir: &Path, output_dir: &Path, extra: &[&str]) -> Output {
    Command::new(get_cli_path())
        .arg("--model_dir")
        .arg(model_dir)
        .arg("--output_dir")
        .arg(output_dir)
        .args(extra)
        .env("RUST_LOG", "info")
        .output()
        .expect("Failed to execute converter")
}

#[test]
fn test_cli_help_message() {
    let output = Command::new(get_cli_path())
        .arg("--help")
        .output()
        .expect("Failed to execute --help command");

    assert!(output.status.success(), "CLI --help exited with error: {:?}", output);
    let stdout = str::from_utf8(&output.stdout).expect("stdout is not valid UTF-8");
    assert!(stdout.contains("Usage:"), "Help message should contain 'Usage:'");
    assert!(stdout.contains("Options:"), "Help message should contain 'Options:'");
    assert!(stdout.contains("--model_dir"), "Help message should mention --model_dir");
    assert!(stdout.contains("--output_dir"), "Help message should mention --output_dir");
}

#[test]
fn test_cli_version_message() {
    let output = Command::new(get_cli_path())
        .arg("--version")
        .output()
        .expect("Failed to execute --version command");

    assert!(output.status.success(), "CLI --version exited with error: {:?}", output);
    let stdout = str::from_utf8(&output.stdout).expect("stdout is not valid UTF-8");
    assert!(stdout.contains("freeze_saved_model 0.1.0"), "Unexpected version output: {}", stdout);
}

#[test]
fn test_cli_missing_required_args() {
    let output = Command::new(get_cli_path())
        .arg("--model_dir")
        .arg("saved_model.pb")
        .output()
        .expect("Failed to execute command with missing --output_dir");

    assert_eq!(output.status.code(), Some(2), "Usage errors exit with 2. Output: {:?}", output);
    let stderr = str::from_utf8(&output.stderr).expect("stderr is not valid UTF-8");
    assert!(
        stderr.contains("the following required arguments were not provided"),
        "Stderr should indicate missing arguments. Stderr: {}",
        stderr
    );
    assert!(
        stderr.contains("--output_dir <OUTPUT_DIR>"),
        "Stderr should mention --output_dir. Stderr: {}",
        stderr
    );
}

#[test]
fn test_cli_empty_tag_is_usage_error() {
    let work = tempdir().unwrap();
    let model_path = work.path().join("saved_model.pb");
    fs::write(&model_path, saved_model_bytes(&[(vec!["serve"], graph_bytes(&[("a", "Const")]))])).unwrap();

    let output = run_cli(&model_path, work.path(), &["--tags", ""]);

    assert_eq!(output.status.code(), Some(2), "Usage errors exit with 2. Output: {:?}", output);
    let stderr = str::from_utf8(&output.stderr).expect("stderr is not valid UTF-8");
    assert!(stderr.contains("tags must not be empty"), "Stderr: {}", stderr);
    assert!(!work.path().join("frozen_graph.pb").exists());
}

#[test]
fn test_cli_writes_frozen_graph() {
    let graph = graph_bytes(&[("input", "Placeholder"), ("logits", "MatMul")]);
    let work = tempdir().unwrap();
    let model_path = work.path().join("saved_model.pb");
    fs::write(&model_path, saved_model_bytes(&[(vec!["serve"], graph.clone())])).unwrap();
    let out = tempdir().unwrap();

    let output = run_cli(&model_path, out.path(), &[]);

    assert!(output.status.success(), "Conversion failed: {:?}", output);
    assert_eq!(fs::read(out.path().join("frozen_graph.pb")).unwrap(), graph);
    assert!(output.stdout.is_empty(), "Nothing is printed to stdout by default");
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("Wrote"), "Expected a log line about the write. Stderr: {}", stderr);
}

#[test]
fn test_cli_keeps_node_attributes() {
    let graph = graph_with_attrs_bytes();
    let work = tempdir().unwrap();
    let model_path = work.path().join("saved_model.pb");
    fs::write(&model_path, saved_model_bytes(&[(vec!["serve"], graph.clone())])).unwrap();

    let output = run_cli(&model_path, work.path(), &["--list_nodes"]);

    assert!(output.status.success(), "Conversion failed: {:?}", output);
    assert_eq!(fs::read(work.path().join("frozen_graph.pb")).unwrap(), graph);
    let stdout = str::from_utf8(&output.stdout).unwrap();
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["input", "scale", "output"]);
}

#[test]
fn test_cli_accepts_export_directory() {
    let graph = graph_bytes(&[("a", "Const")]);
    let export = tempdir().unwrap();
    fs::write(
        export.path().join("saved_model.pb"),
        saved_model_bytes(&[(vec!["serve"], graph.clone())]),
    )
    .unwrap();
    let out = tempdir().unwrap();

    let output = run_cli(export.path(), out.path(), &[]);

    assert!(output.status.success(), "Conversion failed: {:?}", output);
    assert_eq!(fs::read(out.path().join("frozen_graph.pb")).unwrap(), graph);
}

#[test]
fn test_cli_list_nodes() {
    let graph = graph_bytes(&[("x", "Placeholder"), ("y", "Relu")]);
    let work = tempdir().unwrap();
    let model_path = work.path().join("model.pb");
    fs::write(&model_path, saved_model_bytes(&[(vec!["serve"], graph)])).unwrap();

    let output = run_cli(&model_path, work.path(), &["--list_nodes"]);

    assert!(output.status.success(), "Conversion failed: {:?}", output);
    let stdout = str::from_utf8(&output.stdout).unwrap();
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["x", "y"]);
}

#[test]
fn test_cli_summary_with_tags() {
    let serve = graph_bytes(&[("s", "Identity")]);
    let work = tempdir().unwrap();
    let model_path = work.path().join("model.pb");
    fs::write(
        &model_path,
        saved_model_bytes(&[
            (vec!["train"], graph_bytes(&[("t", "Identity")])),
            (vec!["serve"], serve.clone()),
        ]),
    )
    .unwrap();

    let output = run_cli(&model_path, work.path(), &["--tags", "serve", "--summary"]);

    assert!(output.status.success(), "Conversion failed: {:?}", output);
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("summary is not valid JSON");
    assert_eq!(summary["meta_graph_index"], 1);
    assert_eq!(summary["meta_graph_count"], 2);
    assert_eq!(summary["tags"], serde_json::json!(["serve"]));
    assert_eq!(summary["node_count"], 1);
    assert_eq!(summary["bytes_written"], serve.len());
    assert_eq!(fs::read(work.path().join("frozen_graph.pb")).unwrap(), serve);
}

#[test]
fn test_cli_missing_model_graceful_error() {
    let out = tempdir().unwrap();
    let missing = out.path().join("non_existent_model.pb");

    let output = run_cli(&missing, out.path(), &[]);

    assert_eq!(output.status.code(), Some(1), "Output: {:?}", output);
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(
        stderr.contains("Application error: failed to read SavedModel"),
        "Stderr: {}",
        stderr
    );
    assert!(stderr.contains("Caused by:"), "Stderr: {}", stderr);
    assert!(!out.path().join("frozen_graph.pb").exists());
}

#[test]
fn test_cli_empty_container_fails_without_output() {
    let work = tempdir().unwrap();
    let model_path = work.path().join("model.pb");
    fs::write(&model_path, saved_model_bytes(&[])).unwrap();

    let output = run_cli(&model_path, work.path(), &[]);

    assert_eq!(output.status.code(), Some(1), "Output: {:?}", output);
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("SavedModel contains no meta graphs"), "Stderr: {}", stderr);
    assert!(!work.path().join("frozen_graph.pb").exists());
}

#[test]
fn test_cli_malformed_input_reports_cause_chain() {
    let work = tempdir().unwrap();
    let model_path = work.path().join("model.pb");
    fs::write(&model_path, [0x12u8, 0x7F, 0x0A]).unwrap();

    let output = run_cli(&model_path, work.path(), &[]);

    assert_eq!(output.status.code(), Some(1), "Output: {:?}", output);
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("is not a well-formed SavedModel"), "Stderr: {}", stderr);
    assert!(stderr.contains("Caused by: malformed SavedModel"), "Stderr: {}", stderr);
    assert!(stderr.contains("Caused by: length prefix 127"), "Stderr: {}", stderr);
    assert!(!work.path().join("frozen_graph.pb").exists());
}

#[test]
fn test_cli_missing_output_directory() {
    let work = tempdir().unwrap();
    let model_path = work.path().join("model.pb");
    fs::write(&model_path, saved_model_bytes(&[(vec!["serve"], graph_bytes(&[("a", "Const")]))]))
        .unwrap();
    let missing_dir = work.path().join("nowhere");

    let output = run_cli(&model_path, &missing_dir, &[]);

    assert_eq!(output.status.code(), Some(1), "Output: {:?}", output);
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("failed to write frozen graph"), "Stderr: {}", stderr);
}
