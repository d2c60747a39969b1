// CLI integration tests: exit codes, payload output and error envelopes.
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::{Value, json};

fn cmd(home: &Path) -> Command {
    let exe = env!("CARGO_BIN_EXE_sqlmill");
    let mut command = Command::new(exe);
    command
        .env("HOME", home)
        .env_remove("SQLMILL_PROFILES_DIR")
        .env_remove("SQLMILL_PACKAGE_HUB_URL")
        .env_remove("SQLMILL_LOG")
        .stdin(Stdio::null());
    command
}

fn run(home: &Path, args: &[&str]) -> Output {
    cmd(home).args(args).output().expect("run sqlmill")
}

fn stderr_json(output: &Output) -> Value {
    let text = String::from_utf8_lossy(&output.stderr);
    let line = text
        .lines()
        .find(|line| line.trim_start().starts_with('{'))
        .unwrap_or_else(|| panic!("no json on stderr: {text}"));
    serde_json::from_str(line).expect("valid json")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("valid json on stdout")
}

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(path, contents).expect("write");
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}

#[test]
fn passing_run_results_exit_zero_and_print_payload() {
    let temp = tempfile::tempdir().expect("tempdir");
    let results = temp.path().join("run_results.json");
    write(
        &results,
        r#"{"results":[{"unique_id":"model.shop.orders","status":"success","execution_time":0.4}],"elapsed_time":0.5}"#,
    );

    let output = run(temp.path(), &["results", path_str(&results)]);
    assert_eq!(output.status.code(), Some(0));
    let payload = stdout_json(&output);
    assert_eq!(payload["results"][0]["unique_id"], "model.shop.orders");
}

#[test]
fn failing_run_results_exit_one_with_summary() {
    let temp = tempfile::tempdir().expect("tempdir");
    let results = temp.path().join("run_results.json");
    write(
        &results,
        r#"{"results":[
            {"unique_id":"model.shop.orders","status":"success"},
            {"unique_id":"test.shop.not_null_orders_id","status":"fail","failures":2,"message":"Got 2 results"}
        ]}"#,
    );

    let output = run(temp.path(), &["results", path_str(&results)]);
    assert_eq!(output.status.code(), Some(1));
    let failure = stderr_json(&output);
    assert_eq!(failure["failure"]["kind"], "run");
    assert_eq!(failure["failure"]["details"][0], "1 of 2 results failed");
}

#[test]
fn missing_artifact_exits_two_with_error_envelope() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("nope.json");
    let output = run(temp.path(), &["manifest", path_str(&missing)]);
    assert_eq!(output.status.code(), Some(2));
    let err = stderr_json(&output);
    assert_eq!(err["error"]["kind"], "NotFound");
    assert_eq!(err["error"]["path"], path_str(&missing));
}

#[test]
fn bad_arguments_exit_sixty_four() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run(temp.path(), &["results", "--frobnicate"]);
    assert_eq!(output.status.code(), Some(64));
    let err = stderr_json(&output);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(err["error"]["hint"].as_str().unwrap().contains("sqlmill"));

    let output = run(temp.path(), &[]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn help_exits_zero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run(temp.path(), &["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("EXIT CODES"));
}

#[test]
fn config_resolves_schema_and_applies_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run(
        temp.path(),
        &["config", "model", "--set", "materialized=table", "--set", "tags=[nightly]"],
    );
    assert_eq!(output.status.code(), Some(0));
    let payload = stdout_json(&output);
    assert_eq!(payload["schema"], "ModelConfig");
    assert_eq!(payload["config"]["materialized"], "table");
    assert_eq!(payload["config"]["access"], "protected");
    assert_eq!(payload["config"]["tags"], json!(["nightly"]));

    let output = run(temp.path(), &["config", "operation"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["schema"], "NodeConfig");
}

#[test]
fn config_required_fields_only_apply_to_full_table() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run(temp.path(), &["config", "snapshot"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr_json(&output);
    assert_eq!(err["error"]["kind"], "Config");
    assert!(err["error"]["message"].as_str().unwrap().contains("strategy"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    let diagnostics = stderr.lines().filter(|line| line.starts_with('{')).count();
    assert_eq!(diagnostics, 1, "one diagnostic per failure: {stderr}");

    let output = run(temp.path(), &["config", "snapshot", "--base"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["schema"], "SnapshotConfig");
}

#[test]
fn config_checks_severity_case_insensitively() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run(temp.path(), &["config", "test", "--set", "severity=WARN"]);
    assert_eq!(output.status.code(), Some(0));

    let output = run(temp.path(), &["config", "test", "--set", "severity=fatal"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn config_unknown_type_is_usage() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run(temp.path(), &["config", "widget"]);
    assert_eq!(output.status.code(), Some(64));
    assert_eq!(stderr_json(&output)["error"]["kind"], "Usage");
}

#[test]
fn catalog_errors_exit_one() {
    let temp = tempfile::tempdir().expect("tempdir");
    let clean = temp.path().join("catalog.json");
    write(&clean, r#"{"nodes":{},"sources":{},"errors":null}"#);
    assert_eq!(run(temp.path(), &["catalog", path_str(&clean)]).status.code(), Some(0));

    let broken = temp.path().join("broken.json");
    write(&broken, r#"{"nodes":{},"sources":{},"errors":["relation raw.payments does not exist"]}"#);
    let output = run(temp.path(), &["catalog", path_str(&broken)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_json(&output)["failure"]["details"][0]
        .as_str()
        .unwrap()
        .contains("raw.payments"));
}

#[test]
fn ls_filters_manifest_by_resource_type() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manifest = temp.path().join("manifest.json");
    write(
        &manifest,
        r#"{"nodes":{
            "model.shop.orders":{"unique_id":"model.shop.orders","resource_type":"model","name":"orders"},
            "seed.shop.countries":{"unique_id":"seed.shop.countries","resource_type":"seed","name":"countries"}
        }}"#,
    );
    let output = run(
        temp.path(),
        &["ls", "--manifest", path_str(&manifest), "--resource-type", "seed"],
    );
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "seed.shop.countries\n");
}

#[test]
fn selectors_lists_names_inside_a_project() {
    let temp = tempfile::tempdir().expect("tempdir");
    let project = temp.path().join("shop");
    write(&project.join("sqlmill_project.yml"), "name: shop\nprofile: shop\n");
    write(
        &project.join("selectors.yml"),
        "selectors:\n  - name: nightly\n    definition: tag:nightly\n  - name: marts\n    default: true\n    definition:\n      union:\n        - path:models/marts\n        - exclude:\n            - tag:deprecated\n",
    );

    let output = run(temp.path(), &["selectors", "--project-dir", path_str(&project)]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "nightly\nmarts\n");

    let outside = temp.path().join("elsewhere");
    std::fs::create_dir_all(&outside).expect("mkdir");
    let output = run(temp.path(), &["selectors", "--project-dir", path_str(&outside)]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn blank_selectors_file_lists_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let project = temp.path().join("shop");
    write(&project.join("sqlmill_project.yml"), "name: shop\n");
    write(&project.join("selectors.yml"), "\n");
    let output = run(temp.path(), &["selectors", "--project-dir", path_str(&project)]);
    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
}

#[test]
fn invalid_selectors_exit_two_with_path() {
    let temp = tempfile::tempdir().expect("tempdir");
    let project = temp.path().join("shop");
    write(&project.join("sqlmill_project.yml"), "name: shop\n");
    write(
        &project.join("selectors.yml"),
        "selectors:\n  - name: a\n    definition: tag:a\n    default: true\n  - name: b\n    definition: tag:b\n    default: true\n",
    );
    let output = run(temp.path(), &["selectors", "--project-dir", path_str(&project)]);
    assert_eq!(output.status.code(), Some(2));
    let err = stderr_json(&output);
    assert_eq!(err["error"]["kind"], "Selector");
    assert!(err["error"]["path"].as_str().unwrap().ends_with("selectors.yml"));
}

#[test]
fn init_then_debug() {
    let temp = tempfile::tempdir().expect("tempdir");
    let work = temp.path().join("work");
    let profiles = temp.path().join("profiles");
    std::fs::create_dir_all(&work).expect("mkdir");

    let output = run(
        temp.path(),
        &[
            "init",
            "jaffle_shop",
            "--skip-profile-setup",
            "--project-dir",
            path_str(&work),
            "--profiles-dir",
            path_str(&profiles),
        ],
    );
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let project = work.join("jaffle_shop");
    assert!(project.join("sqlmill_project.yml").is_file());
    assert!(project.join("models/example/schema.yml").is_file());

    let debug_args = [
        "debug",
        "--project-dir",
        path_str(&project),
        "--profiles-dir",
        path_str(&profiles),
    ];
    let output = run(temp.path(), &debug_args);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("[ERROR]"));

    write(
        &profiles.join("profiles.yml"),
        "jaffle_shop:\n  target: dev\n  outputs:\n    dev:\n      type: duckdb\n      path: dev.duckdb\n",
    );
    let output = run(temp.path(), &debug_args);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("All checks passed!"));
}

#[test]
fn init_with_profile_setup_reads_answers_from_stdin() {
    use std::io::Write;

    let temp = tempfile::tempdir().expect("tempdir");
    let work = temp.path().join("work");
    let profiles = temp.path().join("profiles");
    std::fs::create_dir_all(&work).expect("mkdir");

    let mut child = cmd(temp.path())
        .args([
            "init",
            "shop",
            "--project-dir",
            path_str(&work),
            "--profiles-dir",
            path_str(&profiles),
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"2\nwarehouse.duckdb\n4\n")
        .expect("answers");
    let output = child.wait_with_output().expect("wait");
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    let text = std::fs::read_to_string(profiles.join("profiles.yml")).expect("profiles");
    let profiles: Value = serde_yaml::from_str(&text).expect("yaml");
    assert_eq!(
        profiles["shop"],
        json!({"outputs": {"dev": {"type": "duckdb", "path": "warehouse.duckdb", "threads": 4}}, "target": "dev"})
    );
}

#[test]
fn init_with_closed_stdin_is_usage() {
    let temp = tempfile::tempdir().expect("tempdir");
    let work = temp.path().join("work");
    std::fs::create_dir_all(&work).expect("mkdir");
    let output = run(
        temp.path(),
        &["init", "--project-dir", path_str(&work), "--skip-profile-setup"],
    );
    assert_eq!(output.status.code(), Some(64));
}
